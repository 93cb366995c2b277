//! Backend dialect: the handful of SQL details that differ between
//! SQLite, MySQL and Postgres.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    MySql,
    Postgres,
}

impl Backend {
    pub fn from_url(url: &str) -> Self {
        if url.starts_with("mysql") {
            Backend::MySql
        } else if url.starts_with("postgres") {
            Backend::Postgres
        } else {
            Backend::Sqlite
        }
    }

    /// The n-th bind placeholder (1-based).
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            Backend::Postgres => format!("${}", n),
            _ => "?".to_string(),
        }
    }

    /// A comma-joined placeholder list for `count` values starting at
    /// bind position `start` (1-based).
    pub fn placeholders(&self, start: usize, count: usize) -> String {
        (0..count)
            .map(|i| self.placeholder(start + i))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn hash_type(&self) -> &'static str {
        "CHAR(64)"
    }

    pub fn key_type(&self) -> &'static str {
        "VARCHAR(16)"
    }

    pub fn blob_type(&self) -> &'static str {
        match self {
            Backend::Sqlite => "BLOB",
            Backend::MySql => "LONGBLOB",
            Backend::Postgres => "BYTEA",
        }
    }

    pub fn int_type(&self) -> &'static str {
        "INTEGER"
    }

    pub fn bigint_type(&self) -> &'static str {
        "BIGINT"
    }

    pub fn float_type(&self) -> &'static str {
        match self {
            Backend::Sqlite => "REAL",
            Backend::MySql => "DOUBLE",
            Backend::Postgres => "DOUBLE PRECISION",
        }
    }

    /// A guarded secondary-index statement, where the dialect has one.
    /// MySQL has no IF NOT EXISTS for CREATE INDEX; InnoDB already
    /// indexes the foreign-key columns we would cover.
    pub fn create_index(&self, name: &str, table: &str, columns: &str) -> Option<String> {
        match self {
            Backend::MySql => None,
            _ => Some(format!(
                "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                name, table, columns
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_backend_from_url() {
        assert_eq!(Backend::from_url("sqlite://x.db"), Backend::Sqlite);
        assert_eq!(Backend::from_url("sqlite::memory:"), Backend::Sqlite);
        assert_eq!(Backend::from_url("mysql://u:p@h/db"), Backend::MySql);
        assert_eq!(Backend::from_url("postgres://u:p@h/db"), Backend::Postgres);
    }

    #[test]
    fn postgres_uses_numbered_placeholders() {
        assert_eq!(Backend::Postgres.placeholder(3), "$3");
        assert_eq!(Backend::Postgres.placeholders(2, 3), "$2, $3, $4");
        assert_eq!(Backend::Sqlite.placeholders(2, 3), "?, ?, ?");
    }
}
