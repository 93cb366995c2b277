//! Rewind the mirror to a given height

use chaincache::{BlockchainDb, Config};
use clap::Parser;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "rewind")]
#[command(about = "Delete the chain suffix at and above a height", long_about = None)]
struct Args {
    /// Height to rewind to; this block and everything above it is
    /// deleted.
    height: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

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

    info!("rewinding to height {}", args.height);
    if let Err(e) = db.rewind(args.height).await {
        error!("rewind failed: {}", e);
        std::process::exit(1);
    }
    db.close().await;
    info!("done");
}
