//! Environment-driven configuration

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_NODE_PORT: u16 = 11898;
pub const DEFAULT_API_PORT: u16 = 11899;
pub const DEFAULT_SQLITE_PATH: &str = "blockchain.sqlite3";

#[derive(Debug, Clone)]
pub struct Config {
    pub node: NodeConfig,
    pub db: DbConfig,
    pub fee: FeeConfig,
    pub api_port: u16,
    pub queue: QueueConfig,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    pub ssl: bool,
}

impl NodeConfig {
    pub fn base_url(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub enum DbConfig {
    Sqlite { path: PathBuf },
    MySql(DbCredentials),
    Postgres(DbCredentials),
}

#[derive(Debug, Clone)]
pub struct DbCredentials {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl DbConfig {
    pub fn url(&self) -> String {
        match self {
            DbConfig::Sqlite { path } => {
                format!("sqlite://{}?mode=rwc", path.display())
            }
            DbConfig::MySql(c) => format!(
                "mysql://{}:{}@{}:{}/{}",
                c.user, c.password, c.host, c.port, c.database
            ),
            DbConfig::Postgres(c) => format!(
                "postgres://{}:{}@{}:{}/{}",
                c.user, c.password, c.host, c.port, c.database
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeConfig {
    pub address: Option<String>,
    pub amount: u64,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub redis_url: String,
    pub queue_name: String,
}

fn truthy(value: &str) -> bool {
    matches!(value, "true" | "1")
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn credentials_from_env(default_port: u16) -> Result<DbCredentials> {
    let require = |key: &str| {
        env::var(key).map_err(|_| Error::Config(format!("{} is required for this backend", key)))
    };

    Ok(DbCredentials {
        host: require("DB_HOST")?,
        port: env_or("DB_PORT", &default_port.to_string())
            .parse()
            .map_err(|_| Error::Config("DB_PORT must be a port number".to_string()))?,
        user: require("DB_USER")?,
        password: require("DB_PASS")?,
        database: require("DB_NAME")?,
    })
}

impl Config {
    /// Assemble the runtime configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        if env_or("NODE_ENV", "") != "production" {
            tracing::warn!("NODE_ENV is not set to production");
        }

        let use_mysql = env::var("USE_MYSQL").map(|v| truthy(&v)).unwrap_or(false);
        let use_postgres = env::var("USE_POSTGRES").map(|v| truthy(&v)).unwrap_or(false);

        let db = if use_mysql {
            DbConfig::MySql(credentials_from_env(3306)?)
        } else if use_postgres {
            DbConfig::Postgres(credentials_from_env(5432)?)
        } else {
            DbConfig::Sqlite {
                path: PathBuf::from(env_or("SQLITE_PATH", DEFAULT_SQLITE_PATH)),
            }
        };

        let node = NodeConfig {
            host: env_or("NODE_HOST", "localhost"),
            port: env_or("NODE_PORT", &DEFAULT_NODE_PORT.to_string())
                .parse()
                .map_err(|_| Error::Config("NODE_PORT must be a port number".to_string()))?,
            ssl: env::var("NODE_SSL").map(|v| truthy(&v)).unwrap_or(false),
        };

        let fee = FeeConfig {
            address: env::var("FEE_ADDRESS").ok().filter(|s| !s.is_empty()),
            amount: env_or("FEE_AMOUNT", "0")
                .parse()
                .map_err(|_| Error::Config("FEE_AMOUNT must be an integer".to_string()))?,
        };

        let api_port = env_or("API_PORT", &DEFAULT_API_PORT.to_string())
            .parse()
            .map_err(|_| Error::Config("API_PORT must be a port number".to_string()))?;

        let queue = QueueConfig {
            redis_url: env_or("REDIS_URL", "redis://127.0.0.1/"),
            queue_name: env_or("QUEUE_NAME", "rawblocks"),
        };

        Ok(Config {
            node,
            db,
            fee,
            api_port,
            queue,
        })
    }
}
