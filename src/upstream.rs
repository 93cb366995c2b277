//! HTTP client for the upstream daemon.
//!
//! The collector only depends on [`NodeApi`], so tests can substitute a
//! scripted upstream.

use crate::config::NodeConfig;
use crate::error::{Error, Result};
use crate::models::{BlockHeader, RawBlockPayload, RawSyncRequest, RawSyncResponse, TransactionIndexes};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

const CLIENT_TIMEOUT: Duration = Duration::from_secs(120);

#[async_trait]
pub trait NodeApi: Send + Sync {
    async fn info(&self) -> Result<Value>;
    async fn peers(&self) -> Result<Value>;
    async fn raw_transaction_pool(&self) -> Result<Vec<Vec<u8>>>;
    async fn raw_block(&self, id: &str) -> Result<RawBlockPayload>;
    /// Header of the block identified by hash or height.
    async fn block(&self, id: &str) -> Result<BlockHeader>;
    async fn indexes(&self, start: u64, end: u64) -> Result<Vec<TransactionIndexes>>;
    /// Up to thirty headers, descending from the given height.
    async fn block_headers(&self, height: u64) -> Result<Vec<BlockHeader>>;
    async fn raw_sync(&self, request: &RawSyncRequest) -> Result<RawSyncResponse>;
}

#[derive(Deserialize)]
struct RawPoolResponse {
    #[serde(default, with = "crate::models::serde_hex_seq")]
    transactions: Vec<Vec<u8>>,
}

pub struct NodeClient {
    client: reqwest::Client,
    base_url: String,
}

impl NodeClient {
    pub fn new(config: &NodeConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(CLIENT_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url(),
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Error::Upstream(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    async fn post<B: serde::Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(&url).json(body).send().await?;
        if !response.status().is_success() {
            return Err(Error::Upstream(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl NodeApi for NodeClient {
    async fn info(&self) -> Result<Value> {
        self.get("/info").await
    }

    async fn peers(&self) -> Result<Value> {
        self.get("/peers").await
    }

    async fn raw_transaction_pool(&self) -> Result<Vec<Vec<u8>>> {
        let response: RawPoolResponse = self.get("/rawtransactionpool").await?;
        Ok(response.transactions)
    }

    async fn raw_block(&self, id: &str) -> Result<RawBlockPayload> {
        self.get(&format!("/rawblock/{}", id)).await
    }

    async fn block(&self, id: &str) -> Result<BlockHeader> {
        self.get(&format!("/block/{}", id)).await
    }

    async fn indexes(&self, start: u64, end: u64) -> Result<Vec<TransactionIndexes>> {
        self.get(&format!("/indexes/{}/{}", start, end)).await
    }

    async fn block_headers(&self, height: u64) -> Result<Vec<BlockHeader>> {
        self.get(&format!("/blockheaders/{}", height)).await
    }

    async fn raw_sync(&self, request: &RawSyncRequest) -> Result<RawSyncResponse> {
        self.post("/sync/raw", request).await
    }
}
