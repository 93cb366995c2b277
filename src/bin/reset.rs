//! Truncate the mirror

use chaincache::{BlockchainDb, Config};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let db = match BlockchainDb::open(&config.db.url()).await {
        Ok(db) => db,
        Err(e) => {
            error!("failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    info!("truncating mirror");
    if let Err(e) = db.reset().await {
        error!("reset failed: {}", e);
        std::process::exit(1);
    }
    db.close().await;
    info!("done");
}
