//! chaincache: a relational mirror of an upstream chain daemon.
//!
//! A collector daemon pulls raw blocks, headers and auxiliary state from
//! the upstream over HTTP, decodes them into a normalized tabular model,
//! and persists them atomically. The storage layer doubles as the
//! upstream node's read API for downstream consumers.

pub mod api;
pub mod codec;
pub mod collector;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod upstream;
pub mod worker;

pub use collector::Collector;
pub use config::Config;
pub use db::BlockchainDb;
pub use error::{Error, Result};
