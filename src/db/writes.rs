//! Write operations: block ingest, header upsert, pool snapshots,
//! information upserts, rewind and reset.

use super::{insert_rows, push_bind, Arg, BlockchainDb};
use crate::codec::{DecodedBlock, DecodedTransaction, TxInput, TxOutput};
use crate::error::Result;
use crate::models::{BlockHeader, TransactionIndexes};
use serde_json::Value;
use sqlx::Any;
use std::collections::{HashSet, VecDeque};
use tracing::warn;

const BLOCK_COLUMNS: &[&str] = &["hash", "data"];
const BLOCKCHAIN_COLUMNS: &[&str] = &["height", "hash", "utctimestamp"];
const TRANSACTION_COLUMNS: &[&str] = &["hash", "block_hash", "coinbase", "data"];
const TRANSACTION_META_COLUMNS: &[&str] = &["hash", "fee", "amount", "size"];
const INPUT_COLUMNS: &[&str] = &["hash", "keyImage"];
const OUTPUT_COLUMNS: &[&str] = &["hash", "idx", "amount", "outputKey", "globalIdx"];
const PAYMENT_ID_COLUMNS: &[&str] = &["hash", "paymentId"];
const POOL_COLUMNS: &[&str] = &["hash", "fee", "size", "amount", "data"];
const BLOCK_META_COLUMNS: &[&str] = &[
    "hash",
    "prevHash",
    "baseReward",
    "difficulty",
    "majorVersion",
    "minorVersion",
    "nonce",
    "size",
    "alreadyGeneratedCoins",
    "alreadyGeneratedTransactions",
    "reward",
    "sizeMedian",
    "totalFeeAmount",
    "transactionsCumulativeSize",
    "transactionsCount",
    "orphan",
    "penalty",
];

struct BlockRowGroups {
    blocks: Vec<Vec<Arg>>,
    blockchain: Vec<Vec<Arg>>,
    transactions: Vec<Vec<Arg>>,
    transaction_meta: Vec<Vec<Arg>>,
    inputs: Vec<Vec<Arg>>,
    outputs: Vec<Vec<Arg>>,
    payment_ids: Vec<Vec<Arg>>,
}

fn collect_rows(blocks: &[DecodedBlock]) -> BlockRowGroups {
    let mut groups = BlockRowGroups {
        blocks: Vec::new(),
        blockchain: Vec::new(),
        transactions: Vec::new(),
        transaction_meta: Vec::new(),
        inputs: Vec::new(),
        outputs: Vec::new(),
        payment_ids: Vec::new(),
    };

    for block in blocks {
        groups.blocks.push(vec![
            Arg::Text(block.hash.clone()),
            Arg::Blob(block.blob.clone()),
        ]);
        groups.blockchain.push(vec![
            Arg::I64(block.height as i64),
            Arg::Text(block.hash.clone()),
            Arg::I64(block.timestamp as i64),
        ]);

        for tx in &block.transactions {
            groups.transactions.push(vec![
                Arg::Text(tx.hash.clone()),
                Arg::Text(block.hash.clone()),
                Arg::I64(tx.coinbase as i64),
                Arg::Blob(tx.blob.clone()),
            ]);
            groups.transaction_meta.push(vec![
                Arg::Text(tx.hash.clone()),
                Arg::I64(tx.fee as i64),
                Arg::I64(tx.amount as i64),
                Arg::I64(tx.size as i64),
            ]);

            for input in &tx.inputs {
                if let TxInput::Key { key_image, .. } = input {
                    groups.inputs.push(vec![
                        Arg::Text(tx.hash.clone()),
                        Arg::Text(key_image.clone()),
                    ]);
                }
            }
            for (idx, output) in tx.outputs.iter().enumerate() {
                let TxOutput::Key { amount, key } = output;
                groups.outputs.push(vec![
                    Arg::Text(tx.hash.clone()),
                    Arg::I64(idx as i64),
                    Arg::I64(*amount as i64),
                    Arg::Text(key.clone()),
                    Arg::Null,
                ]);
            }
            if let Some(payment_id) = &tx.payment_id {
                groups.payment_ids.push(vec![
                    Arg::Text(tx.hash.clone()),
                    Arg::Text(payment_id.clone()),
                ]);
            }
        }
    }

    groups
}

impl BlockchainDb {
    async fn insert_block_rows(
        &self,
        tx: &mut sqlx::Transaction<'_, Any>,
        groups: &BlockRowGroups,
    ) -> Result<()> {
        let backend = self.backend();
        insert_rows(tx, backend, "blocks", BLOCK_COLUMNS, &groups.blocks).await?;
        insert_rows(tx, backend, "blockchain", BLOCKCHAIN_COLUMNS, &groups.blockchain).await?;
        insert_rows(
            tx,
            backend,
            "transactions",
            TRANSACTION_COLUMNS,
            &groups.transactions,
        )
        .await?;
        insert_rows(
            tx,
            backend,
            "transaction_meta",
            TRANSACTION_META_COLUMNS,
            &groups.transaction_meta,
        )
        .await?;
        insert_rows(tx, backend, "transaction_inputs", INPUT_COLUMNS, &groups.inputs).await?;
        insert_rows(
            tx,
            backend,
            "transaction_outputs",
            OUTPUT_COLUMNS,
            &groups.outputs,
        )
        .await?;
        insert_rows(
            tx,
            backend,
            "transaction_paymentids",
            PAYMENT_ID_COLUMNS,
            &groups.payment_ids,
        )
        .await?;
        Ok(())
    }

    /// Persist an ordered batch of decoded blocks. The chain suffix from
    /// the batch's lowest height is rewound first, so re-ingesting an
    /// overlapping range is idempotent. Returns the heights (ascending)
    /// and hashes of the batch.
    pub async fn save_raw_blocks(
        &self,
        blocks: &[DecodedBlock],
    ) -> Result<(Vec<u64>, Vec<String>)> {
        if blocks.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        let min_height = blocks.iter().map(|b| b.height).min().unwrap_or(0);
        self.rewind(min_height).await?;

        let groups = collect_rows(blocks);
        let mut tx = self.pool().begin().await?;
        self.insert_block_rows(&mut tx, &groups).await?;
        tx.commit().await?;

        let mut pairs: Vec<(u64, String)> = blocks
            .iter()
            .map(|b| (b.height, b.hash.clone()))
            .collect();
        pairs.sort_by_key(|(height, _)| *height);
        Ok(pairs.into_iter().unzip())
    }

    /// Persist a single raw block without touching the rest of the
    /// chain; used by the offload workers.
    pub async fn save_raw_block(&self, block: &DecodedBlock) -> Result<()> {
        let groups = collect_rows(std::slice::from_ref(block));
        let mut tx = self.pool().begin().await?;
        self.insert_block_rows(&mut tx, &groups).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Upsert block headers. Deduplicates by hash; each header is
    /// DELETEd and re-INSERTed so re-ingest is idempotent. Runs in one
    /// transaction.
    pub async fn save_blocks_meta(&self, headers: &[BlockHeader]) -> Result<()> {
        let mut seen = HashSet::new();
        let deduped: Vec<&BlockHeader> = headers
            .iter()
            .filter(|h| seen.insert(h.hash.clone()))
            .collect();

        let backend = self.backend();
        let mut tx = self.pool().begin().await?;

        let delete_sql = format!(
            "DELETE FROM block_meta WHERE hash = {}",
            backend.placeholder(1)
        );
        let insert_sql = format!(
            "INSERT INTO block_meta ({}) VALUES ({})",
            BLOCK_META_COLUMNS.join(", "),
            backend.placeholders(1, BLOCK_META_COLUMNS.len())
        );

        for header in deduped {
            sqlx::query(&delete_sql)
                .bind(header.hash.clone())
                .execute(&mut *tx)
                .await?;

            let args = vec![
                Arg::Text(header.hash.clone()),
                Arg::Text(header.prev_hash.clone()),
                Arg::I64(header.base_reward as i64),
                Arg::I64(header.difficulty as i64),
                Arg::I64(header.major_version as i64),
                Arg::I64(header.minor_version as i64),
                Arg::I64(header.nonce as i64),
                Arg::I64(header.size as i64),
                Arg::I64(header.already_generated_coins as i64),
                Arg::I64(header.already_generated_transactions as i64),
                Arg::I64(header.reward as i64),
                Arg::I64(header.size_median as i64),
                Arg::I64(header.total_fee_amount as i64),
                Arg::I64(header.transactions_cumulative_size as i64),
                Arg::I64(header.transactions_count as i64),
                Arg::I64(header.orphan as i64),
                Arg::F64(header.penalty),
            ];
            let mut query = sqlx::query(&insert_sql);
            for arg in args {
                query = push_bind(query, arg);
            }
            query.execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Write the global output index for each output position of each
    /// transaction. One transaction for the whole batch; indexes are
    /// written once per ingest and never updated afterwards.
    pub async fn save_output_global_indexes(
        &self,
        indexes: &[TransactionIndexes],
    ) -> Result<()> {
        let backend = self.backend();
        let sql = format!(
            "UPDATE transaction_outputs SET globalIdx = {} WHERE hash = {} AND idx = {}",
            backend.placeholder(1),
            backend.placeholder(2),
            backend.placeholder(3)
        );

        let mut tx = self.pool().begin().await?;
        for entry in indexes {
            for (position, global_index) in entry.indexes.iter().enumerate() {
                sqlx::query(&sql)
                    .bind(*global_index as i64)
                    .bind(entry.hash.clone())
                    .bind(position as i64)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    /// Replace the mempool snapshot wholesale.
    pub async fn save_transaction_pool(&self, txns: &[DecodedTransaction]) -> Result<()> {
        let rows: Vec<Vec<Arg>> = txns
            .iter()
            .map(|tx| {
                vec![
                    Arg::Text(tx.hash.clone()),
                    Arg::I64(tx.fee as i64),
                    Arg::I64(tx.size as i64),
                    Arg::I64(tx.amount as i64),
                    Arg::Blob(tx.blob.clone()),
                ]
            })
            .collect();

        let mut tx = self.pool().begin().await?;
        sqlx::query("DELETE FROM transaction_pool")
            .execute(&mut *tx)
            .await?;
        insert_rows(&mut tx, self.backend(), "transaction_pool", POOL_COLUMNS, &rows).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn upsert_information(&self, key: &str, value: &Value) -> Result<()> {
        let backend = self.backend();
        let data = serde_json::to_vec(value)?;

        let mut tx = self.pool().begin().await?;
        sqlx::query(&format!(
            "DELETE FROM information WHERE idx = {}",
            backend.placeholder(1)
        ))
        .bind(key.to_string())
        .execute(&mut *tx)
        .await?;
        sqlx::query(&format!(
            "INSERT INTO information (idx, data) VALUES ({})",
            backend.placeholders(1, 2)
        ))
        .bind(key.to_string())
        .bind(data)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn save_information(&self, info: &Value) -> Result<()> {
        self.upsert_information("info", info).await
    }

    pub async fn save_peers(&self, peers: &Value) -> Result<()> {
        self.upsert_information("peers", peers).await
    }

    /// Delete the chain suffix at and above `height`. Blocks are removed
    /// one per transaction; a failing delete is re-queued at the back of
    /// the work list so transient locking errors self-heal. Foreign-key
    /// cascades clean out every dependent row.
    pub async fn rewind(&self, height: u64) -> Result<()> {
        let backend = self.backend();
        let select_sql = format!(
            "SELECT hash FROM blockchain WHERE height >= {} ORDER BY height DESC",
            backend.placeholder(1)
        );
        let rows = sqlx::query(&select_sql)
            .bind(height as i64)
            .fetch_all(self.pool())
            .await?;

        let mut work: VecDeque<String> = rows
            .iter()
            .map(|row| super::row::get_string(row, "hash"))
            .collect::<Result<_>>()?;

        let delete_sql = format!(
            "DELETE FROM blocks WHERE hash = {}",
            backend.placeholder(1)
        );
        while let Some(hash) = work.pop_front() {
            match sqlx::query(&delete_sql)
                .bind(hash.clone())
                .execute(self.pool())
                .await
            {
                Ok(_) => {}
                Err(e) => {
                    warn!("failed to delete block {}, re-queueing: {}", hash, e);
                    work.push_back(hash);
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                }
            }
        }
        Ok(())
    }

    /// Truncate the mirror. Cascades clean out every dependent table.
    pub async fn reset(&self) -> Result<()> {
        let mut tx = self.pool().begin().await?;
        for table in ["blocks", "transaction_pool", "information"] {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
