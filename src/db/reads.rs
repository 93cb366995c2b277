//! The mirrored read surface, served entirely from the database.

use super::row::{get_blob, get_bool, get_f64, get_opt_i64, get_string, get_u64};
use super::BlockchainDb;
use crate::codec;
use crate::error::{Error, Result};
use crate::models::{
    BlockHeader, ChainStatsEntry, PoolChanges, PoolTransaction, RandomOutput,
    RandomOutputsForAmount, RawBlockPayload, RawSyncRequest, RawSyncResponse, SyncBlock,
    SyncResponse, SyncTransaction, TopBlockSummary, TransactionDetail, TransactionIndexes,
    TransactionInputRecord, TransactionOutputRecord, TransactionsStatus,
};
use rand::Rng;
use sqlx::any::AnyRow;
use std::collections::HashSet;

/// Window served by the recent chain statistics query.
const CHAIN_STATS_WINDOW: i64 = 100;

const HEADER_SELECT: &str = "SELECT blockchain.height AS height, \
     blockchain.utctimestamp AS utctimestamp, \
     block_meta.hash AS hash, block_meta.prevHash AS prevHash, \
     block_meta.baseReward AS baseReward, block_meta.difficulty AS difficulty, \
     block_meta.majorVersion AS majorVersion, block_meta.minorVersion AS minorVersion, \
     block_meta.nonce AS nonce, block_meta.size AS size, \
     block_meta.alreadyGeneratedCoins AS alreadyGeneratedCoins, \
     block_meta.alreadyGeneratedTransactions AS alreadyGeneratedTransactions, \
     block_meta.reward AS reward, block_meta.sizeMedian AS sizeMedian, \
     block_meta.totalFeeAmount AS totalFeeAmount, \
     block_meta.transactionsCumulativeSize AS transactionsCumulativeSize, \
     block_meta.transactionsCount AS transactionsCount, \
     block_meta.orphan AS orphan, block_meta.penalty AS penalty \
     FROM blockchain INNER JOIN block_meta ON block_meta.hash = blockchain.hash";

fn header_from_row(row: &AnyRow, top_height: u64) -> Result<BlockHeader> {
    let height = get_u64(row, "height")?;
    Ok(BlockHeader {
        hash: get_string(row, "hash")?,
        prev_hash: get_string(row, "prevHash")?,
        height,
        timestamp: get_u64(row, "utctimestamp")?,
        base_reward: get_u64(row, "baseReward")?,
        difficulty: get_u64(row, "difficulty")?,
        major_version: get_u64(row, "majorVersion")? as u32,
        minor_version: get_u64(row, "minorVersion")? as u32,
        nonce: get_u64(row, "nonce")?,
        size: get_u64(row, "size")?,
        already_generated_coins: get_u64(row, "alreadyGeneratedCoins")?,
        already_generated_transactions: get_u64(row, "alreadyGeneratedTransactions")?,
        reward: get_u64(row, "reward")?,
        size_median: get_u64(row, "sizeMedian")?,
        total_fee_amount: get_u64(row, "totalFeeAmount")?,
        transactions_cumulative_size: get_u64(row, "transactionsCumulativeSize")?,
        transactions_count: get_u64(row, "transactionsCount")?,
        orphan: get_bool(row, "orphan")?,
        penalty: get_f64(row, "penalty")?,
        depth: top_height.saturating_sub(height),
    })
}

impl BlockchainDb {
    pub async fn height_from_hash(&self, hash: &str) -> Result<Option<u64>> {
        let sql = format!(
            "SELECT height FROM blockchain WHERE hash = {}",
            self.backend().placeholder(1)
        );
        let row = sqlx::query(&sql)
            .bind(hash.to_string())
            .fetch_optional(self.pool())
            .await?;
        row.map(|r| get_u64(&r, "height")).transpose()
    }

    pub async fn hash_from_height(&self, height: u64) -> Result<Option<String>> {
        let sql = format!(
            "SELECT hash FROM blockchain WHERE height = {}",
            self.backend().placeholder(1)
        );
        let row = sqlx::query(&sql)
            .bind(height as i64)
            .fetch_optional(self.pool())
            .await?;
        row.map(|r| get_string(&r, "hash")).transpose()
    }

    pub async fn have_genesis(&self) -> Result<bool> {
        Ok(self.hash_from_height(0).await?.is_some())
    }

    pub async fn genesis_hash(&self) -> Result<String> {
        self.hash_from_height(0)
            .await?
            .ok_or_else(|| Error::NotFound("genesis block".to_string()))
    }

    pub async fn top_block(&self) -> Result<Option<TopBlockSummary>> {
        let row = sqlx::query("SELECT height, hash FROM blockchain ORDER BY height DESC LIMIT 1")
            .fetch_optional(self.pool())
            .await?;
        row.map(|r| {
            Ok(TopBlockSummary {
                hash: get_string(&r, "hash")?,
                height: get_u64(&r, "height")?,
            })
        })
        .transpose()
    }

    async fn top_height(&self) -> Result<u64> {
        Ok(self.top_block().await?.map(|t| t.height).unwrap_or(0))
    }

    /// Produce the checkpoint list sent to the upstream: the top eleven
    /// consecutive hashes, then hashes at exponentially widening offsets
    /// below them, and always the genesis hash; descending, deduplicated.
    pub async fn hashes_for_sync(&self) -> Result<Vec<String>> {
        let top = match self.top_block().await? {
            Some(top) => top.height,
            None => return Ok(Vec::new()),
        };

        let mut heights: Vec<u64> = Vec::new();
        let mut current = top;
        for _ in 0..11 {
            heights.push(current);
            if current == 0 {
                break;
            }
            current -= 1;
        }

        let mut lowest = *heights.last().unwrap_or(&0);
        let mut exponent = 1u32;
        loop {
            let offset = 1u64 << exponent;
            if offset > lowest {
                break;
            }
            lowest -= offset;
            if lowest == 0 {
                break;
            }
            heights.push(lowest);
            exponent += 1;
        }
        heights.push(0);

        let mut seen = HashSet::new();
        let wanted: Vec<u64> = heights.into_iter().filter(|h| seen.insert(*h)).collect();

        let backend = self.backend();
        let sql = format!(
            "SELECT height, hash FROM blockchain WHERE height IN ({}) ORDER BY height DESC",
            backend.placeholders(1, wanted.len())
        );
        let mut query = sqlx::query(&sql);
        for height in &wanted {
            query = query.bind(*height as i64);
        }
        let rows = query.fetch_all(self.pool()).await?;
        rows.iter().map(|r| get_string(r, "hash")).collect()
    }

    /// Negotiate the resume height: the block after the newest matching
    /// checkpoint, the block after the newest block at or before the
    /// timestamp, or the caller-supplied height — whichever is highest.
    pub async fn get_sync_height(
        &self,
        checkpoints: &[String],
        height: u64,
        timestamp: u64,
    ) -> Result<u64> {
        let backend = self.backend();
        let mut candidates = vec![height];

        if !checkpoints.is_empty() {
            let clauses: Vec<String> = (1..=checkpoints.len())
                .map(|n| format!("hash = {}", backend.placeholder(n)))
                .collect();
            let sql = format!(
                "SELECT height FROM blockchain WHERE {} ORDER BY height DESC LIMIT 1",
                clauses.join(" OR ")
            );
            let mut query = sqlx::query(&sql);
            for checkpoint in checkpoints {
                query = query.bind(checkpoint.clone());
            }
            if let Some(row) = query.fetch_optional(self.pool()).await? {
                candidates.push(get_u64(&row, "height")? + 1);
            }
        }

        if timestamp > 0 {
            let sql = format!(
                "SELECT height FROM blockchain WHERE utctimestamp <= {} \
                 ORDER BY height DESC LIMIT 1",
                backend.placeholder(1)
            );
            if let Some(row) = sqlx::query(&sql)
                .bind(timestamp as i64)
                .fetch_optional(self.pool())
                .await?
            {
                candidates.push(get_u64(&row, "height")? + 1);
            }
        }

        Ok(candidates.into_iter().max().unwrap_or(0))
    }

    async fn non_coinbase_blobs(&self, block_hash: &str) -> Result<Vec<Vec<u8>>> {
        let sql = format!(
            "SELECT data FROM transactions WHERE block_hash = {} AND coinbase = 0 \
             ORDER BY hash",
            self.backend().placeholder(1)
        );
        let rows = sqlx::query(&sql)
            .bind(block_hash.to_string())
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(|r| get_blob(r, "data")).collect()
    }

    /// Serve a raw sync page. `synced` is reported exactly when the page
    /// comes back empty; the top-block summary is attached in that case.
    pub async fn raw_sync(&self, request: &RawSyncRequest) -> Result<RawSyncResponse> {
        let start = self
            .get_sync_height(&request.checkpoints, request.height, request.timestamp)
            .await?;

        let backend = self.backend();
        // block_meta may lag the raw block within a tick; it only joins
        // in when the coinbase-only filter actually needs it.
        let (join, filter) = if request.skip_coinbase_only {
            (
                " INNER JOIN block_meta ON block_meta.hash = blockchain.hash",
                " AND block_meta.transactionsCount > 1",
            )
        } else {
            ("", "")
        };
        let sql = format!(
            "SELECT blockchain.hash AS hash, blocks.data AS data \
             FROM blockchain \
             INNER JOIN blocks ON blocks.hash = blockchain.hash{} \
             WHERE blockchain.height >= {}{} \
             ORDER BY blockchain.height ASC LIMIT {}",
            join,
            backend.placeholder(1),
            filter,
            backend.placeholder(2)
        );
        let rows = sqlx::query(&sql)
            .bind(start as i64)
            .bind(request.count as i64)
            .fetch_all(self.pool())
            .await?;

        let mut blocks = Vec::with_capacity(rows.len());
        for row in &rows {
            let hash = get_string(row, "hash")?;
            blocks.push(RawBlockPayload {
                block: get_blob(row, "data")?,
                transactions: self.non_coinbase_blobs(&hash).await?,
            });
        }

        let synced = blocks.is_empty();
        let top_block = if synced { self.top_block().await? } else { None };
        Ok(RawSyncResponse {
            blocks,
            synced,
            top_block,
        })
    }

    /// The decoded form of [`Self::raw_sync`].
    pub async fn sync(&self, request: &RawSyncRequest) -> Result<SyncResponse> {
        let raw = self.raw_sync(request).await?;
        let mut blocks = Vec::with_capacity(raw.blocks.len());
        for payload in &raw.blocks {
            let decoded = codec::decode_block(&codec::RawBlockData {
                block: payload.block.clone(),
                transactions: payload.transactions.clone(),
            })?;
            blocks.push(SyncBlock {
                hash: decoded.hash.clone(),
                height: decoded.height,
                timestamp: decoded.timestamp,
                transactions: decoded
                    .transactions
                    .iter()
                    .map(|tx| SyncTransaction {
                        hash: tx.hash.clone(),
                        fee: tx.fee,
                        amount: tx.amount,
                        size: tx.size,
                        coinbase: tx.coinbase,
                    })
                    .collect(),
            });
        }
        Ok(SyncResponse {
            blocks,
            synced: raw.synced,
            top_block: raw.top_block,
        })
    }

    async fn resolve_hash(&self, id: &str) -> Result<String> {
        if let Ok(height) = id.parse::<u64>() {
            return self
                .hash_from_height(height)
                .await?
                .ok_or_else(|| Error::NotFound(format!("block at height {}", height)));
        }
        Ok(id.to_string())
    }

    /// Header for a block identified by hash or height.
    pub async fn block_header(&self, id: &str) -> Result<BlockHeader> {
        let hash = self.resolve_hash(id).await?;
        let top = self.top_height().await?;
        let sql = format!(
            "{} WHERE block_meta.hash = {}",
            HEADER_SELECT,
            self.backend().placeholder(1)
        );
        let row = sqlx::query(&sql)
            .bind(hash.clone())
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| Error::NotFound(format!("block {}", hash)))?;
        header_from_row(&row, top)
    }

    /// Up to thirty headers, descending from `height`.
    pub async fn block_headers(&self, height: u64) -> Result<Vec<BlockHeader>> {
        let top = self.top_height().await?;
        let sql = format!(
            "{} WHERE blockchain.height <= {} ORDER BY blockchain.height DESC LIMIT 30",
            HEADER_SELECT,
            self.backend().placeholder(1)
        );
        let rows = sqlx::query(&sql)
            .bind(height as i64)
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(|r| header_from_row(r, top)).collect()
    }

    pub async fn last_block_header(&self) -> Result<BlockHeader> {
        let top = self
            .top_block()
            .await?
            .ok_or_else(|| Error::NotFound("top block".to_string()))?;
        self.block_header(&top.hash).await
    }

    /// Global output indexes for every transaction in a height range.
    pub async fn indexes(&self, start: u64, end: u64) -> Result<Vec<TransactionIndexes>> {
        let backend = self.backend();
        let sql = format!(
            "SELECT transactions.hash AS hash, transaction_outputs.globalIdx AS globalIdx \
             FROM blockchain \
             INNER JOIN transactions ON transactions.block_hash = blockchain.hash \
             INNER JOIN transaction_outputs ON transaction_outputs.hash = transactions.hash \
             WHERE blockchain.height >= {} AND blockchain.height <= {} \
             ORDER BY blockchain.height ASC, transactions.hash ASC, transaction_outputs.idx ASC",
            backend.placeholder(1),
            backend.placeholder(2)
        );
        let rows = sqlx::query(&sql)
            .bind(start as i64)
            .bind(end as i64)
            .fetch_all(self.pool())
            .await?;

        let mut out: Vec<TransactionIndexes> = Vec::new();
        for row in &rows {
            let hash = get_string(row, "hash")?;
            let index = get_opt_i64(row, "globalIdx")?.unwrap_or(0) as u64;
            match out.last_mut() {
                Some(entry) if entry.hash == hash => entry.indexes.push(index),
                _ => out.push(TransactionIndexes {
                    hash,
                    indexes: vec![index],
                }),
            }
        }
        Ok(out)
    }

    pub async fn raw_block(&self, id: &str) -> Result<RawBlockPayload> {
        let hash = self.resolve_hash(id).await?;
        let sql = format!(
            "SELECT data FROM blocks WHERE hash = {}",
            self.backend().placeholder(1)
        );
        let row = sqlx::query(&sql)
            .bind(hash.clone())
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| Error::NotFound(format!("block {}", hash)))?;
        Ok(RawBlockPayload {
            block: get_blob(&row, "data")?,
            transactions: self.non_coinbase_blobs(&hash).await?,
        })
    }

    pub async fn raw_transaction(&self, hash: &str) -> Result<Vec<u8>> {
        let sql = format!(
            "SELECT data FROM transactions WHERE hash = {}",
            self.backend().placeholder(1)
        );
        let row = sqlx::query(&sql)
            .bind(hash.to_string())
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| Error::NotFound(format!("transaction {}", hash)))?;
        get_blob(&row, "data")
    }

    pub async fn transaction(&self, hash: &str) -> Result<TransactionDetail> {
        let backend = self.backend();
        let sql = format!(
            "SELECT transactions.hash AS hash, transactions.coinbase AS coinbase, \
             transactions.block_hash AS block_hash, \
             transaction_meta.fee AS fee, transaction_meta.amount AS amount, \
             transaction_meta.size AS size, \
             blockchain.height AS height, blockchain.utctimestamp AS utctimestamp \
             FROM transactions \
             INNER JOIN transaction_meta ON transaction_meta.hash = transactions.hash \
             INNER JOIN blockchain ON blockchain.hash = transactions.block_hash \
             WHERE transactions.hash = {}",
            backend.placeholder(1)
        );
        let row = sqlx::query(&sql)
            .bind(hash.to_string())
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| Error::NotFound(format!("transaction {}", hash)))?;

        let inputs_sql = format!(
            "SELECT keyImage FROM transaction_inputs WHERE hash = {} ORDER BY keyImage",
            backend.placeholder(1)
        );
        let inputs = sqlx::query(&inputs_sql)
            .bind(hash.to_string())
            .fetch_all(self.pool())
            .await?
            .iter()
            .map(|r| {
                Ok(TransactionInputRecord {
                    key_image: get_string(r, "keyImage")?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let outputs_sql = format!(
            "SELECT idx, amount, outputKey, globalIdx FROM transaction_outputs \
             WHERE hash = {} ORDER BY idx ASC",
            backend.placeholder(1)
        );
        let outputs = sqlx::query(&outputs_sql)
            .bind(hash.to_string())
            .fetch_all(self.pool())
            .await?
            .iter()
            .map(|r| {
                Ok(TransactionOutputRecord {
                    index: get_u64(r, "idx")?,
                    amount: get_u64(r, "amount")?,
                    key: get_string(r, "outputKey")?,
                    global_index: get_opt_i64(r, "globalIdx")?.map(|v| v as u64),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(TransactionDetail {
            hash: get_string(&row, "hash")?,
            fee: get_u64(&row, "fee")?,
            amount: get_u64(&row, "amount")?,
            size: get_u64(&row, "size")?,
            coinbase: get_bool(&row, "coinbase")?,
            block_hash: get_string(&row, "block_hash")?,
            block_height: get_u64(&row, "height")?,
            block_timestamp: get_u64(&row, "utctimestamp")?,
            inputs,
            outputs,
        })
    }

    pub async fn transaction_pool(&self) -> Result<Vec<PoolTransaction>> {
        let rows =
            sqlx::query("SELECT hash, fee, size, amount FROM transaction_pool ORDER BY hash")
                .fetch_all(self.pool())
                .await?;
        rows.iter()
            .map(|r| {
                Ok(PoolTransaction {
                    hash: get_string(r, "hash")?,
                    fee: get_u64(r, "fee")?,
                    size: get_u64(r, "size")?,
                    amount: get_u64(r, "amount")?,
                })
            })
            .collect()
    }

    pub async fn raw_transaction_pool(&self) -> Result<Vec<Vec<u8>>> {
        let rows = sqlx::query("SELECT data FROM transaction_pool ORDER BY hash")
            .fetch_all(self.pool())
            .await?;
        rows.iter().map(|r| get_blob(r, "data")).collect()
    }

    /// Report, of the hashes the caller knows about, which are present
    /// in the pool (`added`) and which have gone (`deleted`).
    pub async fn transaction_pool_changes(
        &self,
        last_known_hash: &str,
        known: &[String],
    ) -> Result<PoolChanges> {
        let pool = self.transaction_pool().await?;
        let pool_hashes: HashSet<&str> = pool.iter().map(|t| t.hash.as_str()).collect();

        let added = pool
            .iter()
            .filter(|t| known.iter().any(|k| k == &t.hash))
            .cloned()
            .collect();
        let deleted = known
            .iter()
            .filter(|k| !pool_hashes.contains(k.as_str()))
            .cloned()
            .collect();

        let synced = match self.top_block().await? {
            Some(top) => top.hash == last_known_hash,
            None => false,
        };
        Ok(PoolChanges {
            added,
            deleted,
            synced,
        })
    }

    pub async fn transactions_status(&self, hashes: &[String]) -> Result<TransactionsStatus> {
        let mut status = TransactionsStatus {
            in_pool: Vec::new(),
            in_block: Vec::new(),
            not_found: Vec::new(),
        };
        if hashes.is_empty() {
            return Ok(status);
        }

        let backend = self.backend();
        let list = backend.placeholders(1, hashes.len());

        let sql = format!("SELECT hash FROM transaction_pool WHERE hash IN ({})", list);
        let mut query = sqlx::query(&sql);
        for hash in hashes {
            query = query.bind(hash.clone());
        }
        let in_pool: HashSet<String> = query
            .fetch_all(self.pool())
            .await?
            .iter()
            .map(|r| get_string(r, "hash"))
            .collect::<Result<_>>()?;

        let sql = format!("SELECT hash FROM transactions WHERE hash IN ({})", list);
        let mut query = sqlx::query(&sql);
        for hash in hashes {
            query = query.bind(hash.clone());
        }
        let in_block: HashSet<String> = query
            .fetch_all(self.pool())
            .await?
            .iter()
            .map(|r| get_string(r, "hash"))
            .collect::<Result<_>>()?;

        for hash in hashes {
            if in_pool.contains(hash) {
                status.in_pool.push(hash.clone());
            } else if in_block.contains(hash) {
                status.in_block.push(hash.clone());
            } else {
                status.not_found.push(hash.clone());
            }
        }
        Ok(status)
    }

    /// For each amount, draw `count` distinct output indexes uniformly
    /// from [0, maxGlobalIdx] and return the (index, key) pairs in
    /// ascending index order.
    pub async fn random_indexes(
        &self,
        amounts: &[u64],
        count: u64,
    ) -> Result<Vec<RandomOutputsForAmount>> {
        let backend = self.backend();
        let mut out = Vec::with_capacity(amounts.len());

        for &amount in amounts {
            let max_sql = format!(
                "SELECT MAX(globalIdx) AS maxIdx FROM transaction_outputs WHERE amount = {}",
                backend.placeholder(1)
            );
            let row = sqlx::query(&max_sql)
                .bind(amount as i64)
                .fetch_one(self.pool())
                .await?;
            let max = get_opt_i64(&row, "maxIdx")?.unwrap_or(-1);
            if max < 0 || (max as u64) <= count {
                return Err(Error::OutOfRange(format!(
                    "not enough outputs for amount {}",
                    amount
                )));
            }
            let max = max as u64;

            let picks: Vec<u64> = {
                let mut rng = rand::thread_rng();
                let mut picks = HashSet::new();
                while (picks.len() as u64) < count {
                    picks.insert(rng.gen_range(0..=max));
                }
                picks.into_iter().collect()
            };

            let select_sql = format!(
                "SELECT globalIdx, outputKey FROM transaction_outputs \
                 WHERE amount = {} AND globalIdx IN ({}) ORDER BY globalIdx ASC",
                backend.placeholder(1),
                backend.placeholders(2, picks.len())
            );
            let mut query = sqlx::query(&select_sql).bind(amount as i64);
            for pick in &picks {
                query = query.bind(*pick as i64);
            }
            let rows = query.fetch_all(self.pool()).await?;
            let outputs = rows
                .iter()
                .map(|r| {
                    Ok(RandomOutput {
                        global_index: get_u64(r, "globalIdx")?,
                        key: get_string(r, "outputKey")?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            out.push(RandomOutputsForAmount { amount, outputs });
        }
        Ok(out)
    }

    /// Per-block statistics over the most recent window, newest first.
    pub async fn recent_chain_stats(&self) -> Result<Vec<ChainStatsEntry>> {
        let sql = format!(
            "SELECT blockchain.height AS height, blockchain.utctimestamp AS utctimestamp, \
             block_meta.difficulty AS difficulty, block_meta.nonce AS nonce, \
             block_meta.transactionsCount AS transactionsCount \
             FROM blockchain INNER JOIN block_meta ON block_meta.hash = blockchain.hash \
             ORDER BY blockchain.height DESC LIMIT {}",
            CHAIN_STATS_WINDOW
        );
        let rows = sqlx::query(&sql).fetch_all(self.pool()).await?;
        rows.iter()
            .map(|r| {
                let nonce = get_u64(r, "nonce")?;
                Ok(ChainStatsEntry {
                    height: get_u64(r, "height")?,
                    timestamp: get_u64(r, "utctimestamp")?,
                    difficulty: get_u64(r, "difficulty")?,
                    nonce,
                    // Mirrors the upstream behavior of reading the nonce
                    // column here; see DESIGN.md.
                    size: nonce,
                    tx_count: get_u64(r, "transactionsCount")?,
                })
            })
            .collect()
    }

    async fn information(&self, key: &str) -> Result<serde_json::Value> {
        let sql = format!(
            "SELECT data FROM information WHERE idx = {}",
            self.backend().placeholder(1)
        );
        let row = sqlx::query(&sql)
            .bind(key.to_string())
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| Error::NotFound(format!("information row {}", key)))?;
        Ok(serde_json::from_slice(&get_blob(&row, "data")?)?)
    }

    pub async fn stored_info(&self) -> Result<serde_json::Value> {
        self.information("info").await
    }

    pub async fn stored_peers(&self) -> Result<serde_json::Value> {
        self.information("peers").await
    }

    async fn non_coinbase_count(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM transactions WHERE coinbase = 0")
            .fetch_one(self.pool())
            .await?;
        get_u64(&row, "cnt")
    }

    /// The mirrored /info document: the stored upstream info with the
    /// cache-local fields overwritten from the top of the mirror.
    pub async fn mirrored_info(&self) -> Result<serde_json::Value> {
        let mut info = self.stored_info().await?;
        let top = self.last_block_header().await?;

        let network_height = info
            .get("networkHeight")
            .and_then(|v| v.as_u64())
            .unwrap_or(top.height)
            .saturating_sub(1);

        let map = info
            .as_object_mut()
            .ok_or_else(|| Error::Upstream("info document is not an object".to_string()))?;
        map.insert("isCacheApi".to_string(), serde_json::json!(true));
        map.insert("height".to_string(), serde_json::json!(top.height));
        map.insert("networkHeight".to_string(), serde_json::json!(network_height));
        map.insert(
            "synced".to_string(),
            serde_json::json!(top.height == network_height),
        );
        map.insert("difficulty".to_string(), serde_json::json!(top.difficulty));
        map.insert(
            "hashrate".to_string(),
            serde_json::json!((top.difficulty as f64 / 30.0).round() as u64),
        );
        map.insert("lastBlockIndex".to_string(), serde_json::json!(top.height));
        map.insert(
            "majorVersion".to_string(),
            serde_json::json!(top.major_version),
        );
        map.insert(
            "minorVersion".to_string(),
            serde_json::json!(top.minor_version),
        );
        map.insert(
            "transactionsSize".to_string(),
            serde_json::json!(self.non_coinbase_count().await?),
        );
        Ok(info)
    }

    /// Mirrored height summary. The network height is reported exactly
    /// as the upstream last published it.
    pub async fn height_summary(&self) -> Result<crate::models::HeightSummary> {
        let height = self.top_height().await?;
        let network_height = match self.stored_info().await {
            Ok(info) => info
                .get("networkHeight")
                .and_then(|v| v.as_u64())
                .unwrap_or(height),
            Err(Error::NotFound(_)) => height,
            Err(e) => return Err(e),
        };
        Ok(crate::models::HeightSummary {
            height,
            network_height,
        })
    }

    /// Idempotency probe used by the offload workers.
    pub async fn block_summary(&self, hash: &str) -> Result<Option<(u64, u64)>> {
        let height = match self.height_from_hash(hash).await? {
            Some(height) => height,
            None => return Ok(None),
        };
        let sql = format!(
            "SELECT COUNT(*) AS cnt FROM transactions WHERE block_hash = {}",
            self.backend().placeholder(1)
        );
        let row = sqlx::query(&sql)
            .bind(hash.to_string())
            .fetch_one(self.pool())
            .await?;
        Ok(Some((height, get_u64(&row, "cnt")?)))
    }
}
