//! Collector daemon entry point

use chaincache::{
    api::ApiServer, upstream::NodeClient, BlockchainDb, Collector, Config,
};
use std::sync::Arc;
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

    info!("starting chaincache daemon");
    info!("upstream node: {}", config.node.base_url());

    let db = match BlockchainDb::open(&config.db.url()).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    let node = match NodeClient::new(&config.node) {
        Ok(node) => Arc::new(node),
        Err(e) => {
            error!("failed to build upstream client: {}", e);
            std::process::exit(1);
        }
    };

    let collector = Collector::new(db.clone(), node);
    if let Err(e) = collector.init().await {
        // A mirror without a genesis block cannot make progress.
        error!("collector startup failed: {}", e);
        std::process::exit(1);
    }

    let api = ApiServer::new(db, config.fee.clone(), config.api_port);
    tokio::spawn(async move {
        if let Err(e) = api.start().await {
            error!("API server error: {}", e);
        }
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {}", e);
    }
    info!("shutting down");
    collector.stop().await;
}
