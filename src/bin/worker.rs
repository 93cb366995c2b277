//! Offload worker entry point

use chaincache::worker::{RedisJobQueue, Worker};
use chaincache::{BlockchainDb, Config};
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

    let db = match BlockchainDb::open(&config.db.url()).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("failed to open database: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = db.init().await {
        error!("failed to initialize schema: {}", e);
        std::process::exit(1);
    }

    let queue = match RedisJobQueue::connect(&config.queue.redis_url, &config.queue.queue_name)
        .await
    {
        Ok(queue) => queue,
        Err(e) => {
            error!("failed to connect to queue: {}", e);
            std::process::exit(1);
        }
    };

    info!("worker consuming from {}", config.queue.queue_name);
    let mut worker = Worker::new(db, queue);
    if let Err(e) = worker.run().await {
        error!("worker stopped: {}", e);
        std::process::exit(1);
    }
}
