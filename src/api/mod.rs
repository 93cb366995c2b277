//! HTTP read surface over the mirrored data

mod routes;

use crate::config::FeeConfig;
use crate::db::BlockchainDb;
use crate::error::{Error, Result};
use axum::{http::Method, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

pub struct AppState {
    pub db: Arc<BlockchainDb>,
    pub fee: FeeConfig,
}

pub struct ApiServer {
    state: Arc<AppState>,
    port: u16,
}

impl ApiServer {
    pub fn new(db: Arc<BlockchainDb>, fee: FeeConfig, port: u16) -> Self {
        Self {
            state: Arc::new(AppState { db, fee }),
            port,
        }
    }

    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers(Any);

        routes::routes(self.state.clone()).layer(cors)
    }

    pub async fn start(&self) -> Result<()> {
        let app = self.router();
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Internal(format!("Failed to bind: {}", e)))?;

        tracing::info!("API server listening on {}", addr);

        axum::serve(listener, app)
            .await
            .map_err(|e| Error::Internal(format!("Server error: {}", e)))?;

        Ok(())
    }
}
