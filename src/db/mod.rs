//! BlockchainDb: typed persistence over the relational mirror.
//!
//! All mutation goes through this layer; every multi-row change runs in a
//! single database transaction. The same layer serves the mirrored
//! upstream-node read surface.

pub mod backend;
mod consistency;
mod reads;
mod row;
mod schema;
mod writes;

use crate::error::Result;
use backend::Backend;
use sqlx::any::{AnyArguments, AnyPoolOptions};
use sqlx::query::Query;
use sqlx::{Any, AnyPool, Executor};
use std::time::Duration;

/// Bulk inserts are issued in chunks of this many value rows per
/// statement to stay inside statement-size limits on every backend.
pub(crate) const INSERT_CHUNK_ROWS: usize = 25;

pub struct BlockchainDb {
    pool: AnyPool,
    backend: Backend,
}

impl BlockchainDb {
    pub async fn open(url: &str) -> Result<Self> {
        sqlx::any::install_default_drivers();
        let backend = Backend::from_url(url);

        let pool = AnyPoolOptions::new()
            .max_connections(if backend == Backend::Sqlite { 1 } else { 10 })
            .acquire_timeout(Duration::from_secs(30))
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    if backend == Backend::Sqlite {
                        conn.execute("PRAGMA foreign_keys = ON").await?;
                    }
                    Ok(())
                })
            })
            .connect(url)
            .await?;

        Ok(Self { pool, backend })
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Create the schema. Safe to call on an existing database.
    pub async fn init(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for stmt in schema::statements(self.backend) {
            sqlx::query(&stmt).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// One bound SQL value; rows are built as `Vec<Arg>` so bulk inserts can
/// be assembled generically.
#[derive(Debug, Clone)]
pub(crate) enum Arg {
    I64(i64),
    F64(f64),
    Text(String),
    Blob(Vec<u8>),
    Null,
}

pub(crate) fn push_bind<'q>(
    query: Query<'q, Any, AnyArguments<'q>>,
    arg: Arg,
) -> Query<'q, Any, AnyArguments<'q>> {
    match arg {
        Arg::I64(v) => query.bind(v),
        Arg::F64(v) => query.bind(v),
        Arg::Text(v) => query.bind(v),
        Arg::Blob(v) => query.bind(v),
        Arg::Null => query.bind(None::<i64>),
    }
}

/// Insert `rows` into `table`, chunked at [`INSERT_CHUNK_ROWS`] rows per
/// statement.
pub(crate) async fn insert_rows(
    tx: &mut sqlx::Transaction<'_, Any>,
    backend: Backend,
    table: &str,
    columns: &[&str],
    rows: &[Vec<Arg>],
) -> Result<()> {
    for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
        let mut groups = Vec::with_capacity(chunk.len());
        for (i, _) in chunk.iter().enumerate() {
            let start = i * columns.len() + 1;
            groups.push(format!("({})", backend.placeholders(start, columns.len())));
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            table,
            columns.join(", "),
            groups.join(", ")
        );

        let mut query = sqlx::query(&sql);
        for row in chunk {
            for arg in row {
                query = push_bind(query, arg.clone());
            }
        }
        query.execute(&mut **tx).await?;
    }
    Ok(())
}
