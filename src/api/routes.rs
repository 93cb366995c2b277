//! Route handlers mirroring the upstream node's API

use super::AppState;
use crate::error::{Error, Result};
use crate::models::{
    BlockHeader, ChainStatsEntry, HeightSummary, PoolChanges, PoolTransaction,
    RandomOutputsForAmount, RawBlockPayload, RawSyncRequest, RawSyncResponse, SyncResponse,
    TransactionDetail, TransactionIndexes, TransactionsStatus,
};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/block/header/top", get(last_block_header))
        .route("/block/:id", get(block_header))
        .route("/block", post(method_not_available))
        .route("/block/template", post(method_not_available))
        .route("/blockheaders/:height", get(block_headers))
        .route("/chain/stats", get(chain_stats))
        .route("/fee", get(fee))
        .route("/height", get(height))
        .route("/indexes/:start/:end", get(indexes))
        .route("/info", get(info))
        .route("/peers", get(peers))
        .route("/randomindexes", post(random_indexes))
        .route("/rawblock/:id", get(raw_block))
        .route("/rawtransaction/:hash", get(raw_transaction))
        .route("/rawtransactionpool", get(raw_transaction_pool))
        .route("/sync", post(sync))
        .route("/sync/raw", post(raw_sync))
        .route("/transaction/pool", get(transaction_pool))
        .route("/transaction/pool/changes", post(transaction_pool_changes))
        .route("/transaction/:hash", get(transaction))
        .route("/transaction", post(method_not_available))
        .route("/transactions/status", post(transactions_status))
        .with_state(state)
}

async fn method_not_available() -> Error {
    Error::MethodNotAvailable
}

async fn block_header(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BlockHeader>> {
    Ok(Json(state.db.block_header(&id).await?))
}

async fn last_block_header(State(state): State<Arc<AppState>>) -> Result<Json<BlockHeader>> {
    Ok(Json(state.db.last_block_header().await?))
}

async fn block_headers(
    State(state): State<Arc<AppState>>,
    Path(height): Path<u64>,
) -> Result<Json<Vec<BlockHeader>>> {
    Ok(Json(state.db.block_headers(height).await?))
}

async fn chain_stats(State(state): State<Arc<AppState>>) -> Result<Json<Vec<ChainStatsEntry>>> {
    Ok(Json(state.db.recent_chain_stats().await?))
}

async fn fee(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "address": state.fee.address,
        "amount": state.fee.amount,
    }))
}

async fn height(State(state): State<Arc<AppState>>) -> Result<Json<HeightSummary>> {
    Ok(Json(state.db.height_summary().await?))
}

async fn indexes(
    State(state): State<Arc<AppState>>,
    Path((start, end)): Path<(u64, u64)>,
) -> Result<Json<Vec<TransactionIndexes>>> {
    Ok(Json(state.db.indexes(start, end).await?))
}

async fn info(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    Ok(Json(state.db.mirrored_info().await?))
}

async fn peers(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    Ok(Json(state.db.stored_peers().await?))
}

#[derive(Deserialize)]
struct RandomIndexesRequest {
    amounts: Vec<u64>,
    count: u64,
}

async fn random_indexes(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RandomIndexesRequest>,
) -> Result<Json<Vec<RandomOutputsForAmount>>> {
    Ok(Json(
        state
            .db
            .random_indexes(&request.amounts, request.count)
            .await?,
    ))
}

async fn raw_block(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RawBlockPayload>> {
    Ok(Json(state.db.raw_block(&id).await?))
}

async fn raw_transaction(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
) -> Result<Json<Value>> {
    let blob = state.db.raw_transaction(&hash).await?;
    Ok(Json(json!({ "transaction": hex::encode(blob) })))
}

async fn raw_transaction_pool(State(state): State<Arc<AppState>>) -> Result<Json<Value>> {
    let blobs = state.db.raw_transaction_pool().await?;
    let encoded: Vec<String> = blobs.iter().map(hex::encode).collect();
    Ok(Json(json!({ "transactions": encoded })))
}

async fn sync(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RawSyncRequest>,
) -> Result<Json<SyncResponse>> {
    Ok(Json(state.db.sync(&request).await?))
}

async fn raw_sync(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RawSyncRequest>,
) -> Result<Json<RawSyncResponse>> {
    Ok(Json(state.db.raw_sync(&request).await?))
}

async fn transaction_pool(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<PoolTransaction>>> {
    Ok(Json(state.db.transaction_pool().await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoolChangesRequest {
    last_known_block: String,
    #[serde(default)]
    transactions: Vec<String>,
}

async fn transaction_pool_changes(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PoolChangesRequest>,
) -> Result<Json<PoolChanges>> {
    Ok(Json(
        state
            .db
            .transaction_pool_changes(&request.last_known_block, &request.transactions)
            .await?,
    ))
}

async fn transaction(
    State(state): State<Arc<AppState>>,
    Path(hash): Path<String>,
) -> Result<Json<TransactionDetail>> {
    Ok(Json(state.db.transaction(&hash).await?))
}

#[derive(Deserialize)]
struct TransactionsStatusRequest {
    transactions: Vec<String>,
}

async fn transactions_status(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TransactionsStatusRequest>,
) -> Result<Json<TransactionsStatus>> {
    Ok(Json(
        state.db.transactions_status(&request.transactions).await?,
    ))
}
