//! Column access over dynamic rows.
//!
//! Identifier case differs between backends: Postgres folds unquoted
//! camelCase column names to lowercase, SQLite and MySQL return them as
//! declared. Every read path goes through these helpers, which try the
//! camelCase spelling first and fall back to the lowercase one.

use crate::error::Result;
use sqlx::any::AnyRow;
use sqlx::Row;

fn fold(name: &str) -> String {
    name.to_lowercase()
}

pub fn get_i64(row: &AnyRow, name: &str) -> Result<i64> {
    match row.try_get::<i64, _>(name) {
        Ok(v) => Ok(v),
        Err(_) => Ok(row.try_get::<i64, _>(fold(name).as_str())?),
    }
}

pub fn get_u64(row: &AnyRow, name: &str) -> Result<u64> {
    Ok(get_i64(row, name)? as u64)
}

pub fn get_opt_i64(row: &AnyRow, name: &str) -> Result<Option<i64>> {
    match row.try_get::<Option<i64>, _>(name) {
        Ok(v) => Ok(v),
        Err(_) => Ok(row.try_get::<Option<i64>, _>(fold(name).as_str())?),
    }
}

pub fn get_f64(row: &AnyRow, name: &str) -> Result<f64> {
    match row.try_get::<f64, _>(name) {
        Ok(v) => Ok(v),
        Err(_) => Ok(row.try_get::<f64, _>(fold(name).as_str())?),
    }
}

pub fn get_string(row: &AnyRow, name: &str) -> Result<String> {
    match row.try_get::<String, _>(name) {
        Ok(v) => Ok(v),
        Err(_) => Ok(row.try_get::<String, _>(fold(name).as_str())?),
    }
}

pub fn get_blob(row: &AnyRow, name: &str) -> Result<Vec<u8>> {
    match row.try_get::<Vec<u8>, _>(name) {
        Ok(v) => Ok(v),
        Err(_) => Ok(row.try_get::<Vec<u8>, _>(fold(name).as_str())?),
    }
}

pub fn get_bool(row: &AnyRow, name: &str) -> Result<bool> {
    Ok(get_i64(row, name)? != 0)
}
