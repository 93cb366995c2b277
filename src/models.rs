//! Shared row structs and API payloads

use serde::{Deserialize, Serialize};

/// Hex-encoded byte blobs on the wire.
pub mod serde_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let value = String::deserialize(deserializer)?;
        hex::decode(value).map_err(serde::de::Error::custom)
    }
}

/// Hex-encoded blob lists on the wire.
pub mod serde_hex_seq {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(blobs: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(blobs.iter().map(hex::encode))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        let values = Vec::<String>::deserialize(deserializer)?;
        values
            .into_iter()
            .map(|v| hex::decode(v).map_err(serde::de::Error::custom))
            .collect()
    }
}

/// Block header fields as delivered by the upstream and mirrored in
/// block_meta.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub hash: String,
    pub prev_hash: String,
    pub height: u64,
    pub timestamp: u64,
    pub base_reward: u64,
    pub difficulty: u64,
    pub major_version: u32,
    pub minor_version: u32,
    pub nonce: u64,
    pub size: u64,
    pub already_generated_coins: u64,
    pub already_generated_transactions: u64,
    pub reward: u64,
    pub size_median: u64,
    pub total_fee_amount: u64,
    pub transactions_cumulative_size: u64,
    pub transactions_count: u64,
    pub orphan: bool,
    pub penalty: f64,
    /// Blocks above this one, filled in on reads.
    #[serde(default)]
    pub depth: u64,
}

/// One raw block on the wire: the block blob plus its user transaction
/// blobs, all hex encoded.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawBlockPayload {
    #[serde(with = "serde_hex")]
    pub block: Vec<u8>,
    #[serde(default, with = "serde_hex_seq")]
    pub transactions: Vec<Vec<u8>>,
}

/// Per-transaction global output indexes, ordered by output position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionIndexes {
    pub hash: String,
    pub indexes: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSyncRequest {
    #[serde(default)]
    pub checkpoints: Vec<String>,
    #[serde(default)]
    pub height: u64,
    #[serde(default)]
    pub timestamp: u64,
    #[serde(default)]
    pub skip_coinbase_only: bool,
    #[serde(default = "default_sync_count")]
    pub count: u32,
}

fn default_sync_count() -> u32 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopBlockSummary {
    pub hash: String,
    pub height: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSyncResponse {
    pub blocks: Vec<RawBlockPayload>,
    pub synced: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_block: Option<TopBlockSummary>,
}

/// Decoded form of a raw sync page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncBlock {
    pub hash: String,
    pub height: u64,
    pub timestamp: u64,
    pub transactions: Vec<SyncTransaction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncTransaction {
    pub hash: String,
    pub fee: u64,
    pub amount: u64,
    pub size: u64,
    pub coinbase: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub blocks: Vec<SyncBlock>,
    pub synced: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_block: Option<TopBlockSummary>,
}

/// A mirrored mempool entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolTransaction {
    pub hash: String,
    pub fee: u64,
    pub size: u64,
    pub amount: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolChanges {
    pub added: Vec<PoolTransaction>,
    pub deleted: Vec<String>,
    pub synced: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsStatus {
    pub in_pool: Vec<String>,
    pub in_block: Vec<String>,
    pub not_found: Vec<String>,
}

/// One (globalIndex, key) pair served by randomIndexes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RandomOutput {
    pub global_index: u64,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomOutputsForAmount {
    pub amount: u64,
    pub outputs: Vec<RandomOutput>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInputRecord {
    pub key_image: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionOutputRecord {
    pub index: u64,
    pub amount: u64,
    pub key: String,
    pub global_index: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetail {
    pub hash: String,
    pub fee: u64,
    pub amount: u64,
    pub size: u64,
    pub coinbase: bool,
    pub block_hash: String,
    pub block_height: u64,
    pub block_timestamp: u64,
    pub inputs: Vec<TransactionInputRecord>,
    pub outputs: Vec<TransactionOutputRecord>,
}

/// Per-block row of the recent-chain statistics window.
///
/// `size` mirrors the nonce column; see DESIGN.md for why this oddity is
/// kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStatsEntry {
    pub height: u64,
    pub timestamp: u64,
    pub difficulty: u64,
    pub nonce: u64,
    pub size: u64,
    pub tx_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeightSummary {
    pub height: u64,
    pub network_height: u64,
}

/// The offload queue's request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockJob {
    pub raw: RawBlockPayload,
    pub reply_to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockJobReply {
    pub hash: String,
    pub height: u64,
    pub transactions_count: u64,
}
