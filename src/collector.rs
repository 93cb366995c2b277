//! The synchronization engine.
//!
//! Three independent five-second tickers drive the daemon: node info,
//! transaction pool, and chain sync. Each ticker runs in its own task and
//! is serial with itself; a tick that overruns the period delays the next
//! tick instead of stacking. Sync failures never escape the tick body:
//! they rewind the mirror to the last safe height and shrink the batch.

use crate::codec::{self, RawBlockData};
use crate::db::BlockchainDb;
use crate::error::{Error, Result};
use crate::models::{BlockHeader, RawSyncRequest, TransactionIndexes};
use crate::upstream::NodeApi;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub const DEFAULT_BATCH_SIZE: u32 = 100;

const TICKER_PERIOD: Duration = Duration::from_millis(5000);
const HEADER_BULK_SPAN: u64 = 30;
const INDEX_CHUNK_SPAN: u64 = 11;
const HEADER_RETRIES: u32 = 5;
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Grow the batch a quarter at a time, saturating at the default.
pub(crate) fn grow_batch(current: u32, default: u32) -> u32 {
    if current >= default {
        default
    } else {
        default.min((current * 5 + 3) / 4)
    }
}

/// Halve the batch, saturating at two.
pub(crate) fn shrink_batch(current: u32) -> u32 {
    if current <= 2 {
        2
    } else {
        (current + 1) / 2
    }
}

#[derive(Debug, Clone, Copy)]
enum TickKind {
    Info,
    Pool,
    Sync,
}

pub struct Collector {
    db: Arc<BlockchainDb>,
    node: Arc<dyn NodeApi>,
    running: AtomicBool,
    destroyed: AtomicBool,
    batch_size: AtomicU32,
    default_batch_size: u32,
    shutdown: broadcast::Sender<()>,
}

impl Collector {
    pub fn new(db: Arc<BlockchainDb>, node: Arc<dyn NodeApi>) -> Arc<Self> {
        Self::with_batch_size(db, node, DEFAULT_BATCH_SIZE)
    }

    pub fn with_batch_size(
        db: Arc<BlockchainDb>,
        node: Arc<dyn NodeApi>,
        default_batch_size: u32,
    ) -> Arc<Self> {
        let (shutdown, _) = broadcast::channel(1);
        Arc::new(Self {
            db,
            node,
            running: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
            batch_size: AtomicU32::new(default_batch_size),
            default_batch_size,
            shutdown,
        })
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size.load(Ordering::Relaxed)
    }

    /// Prepare the mirror and register the tickers. A destroyed
    /// collector cannot be restarted.
    pub async fn init(self: &Arc<Self>) -> Result<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(Error::Internal(
                "collector instance was destroyed".to_string(),
            ));
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(Error::Internal("collector already running".to_string()));
        }

        self.db.init().await?;
        self.db.repair_consistency().await?;

        if !self.db.have_genesis().await? {
            self.bootstrap_genesis().await?;
        }

        self.spawn_ticker(TickKind::Info);
        self.spawn_ticker(TickKind::Pool);
        self.spawn_ticker(TickKind::Sync);
        info!("collector started");
        Ok(())
    }

    /// Fetch and persist block zero: raw block first, then its output
    /// indexes, then its header, so both foreign keys are satisfied.
    async fn bootstrap_genesis(&self) -> Result<()> {
        info!("no genesis block found, bootstrapping from upstream");
        let raw = self.node.raw_block("0").await?;
        let block = codec::decode_block(&RawBlockData {
            block: raw.block,
            transactions: raw.transactions,
        })?;
        self.db.save_raw_blocks(std::slice::from_ref(&block)).await?;

        let indexes = self.node.indexes(0, 0).await?;
        self.db.save_output_global_indexes(&indexes).await?;

        let header = self.node.block("0").await?;
        self.db.save_blocks_meta(std::slice::from_ref(&header)).await?;
        Ok(())
    }

    fn spawn_ticker(self: &Arc<Self>, kind: TickKind) {
        let collector = Arc::clone(self);
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            let mut ticker = interval(TICKER_PERIOD);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.recv() => break,
                    _ = ticker.tick() => match kind {
                        TickKind::Info => collector.info_once().await,
                        TickKind::Pool => collector.pool_once().await,
                        TickKind::Sync => collector.sync_once().await,
                    },
                }
            }
        });
    }

    /// Destroy the tickers and close the storage layer.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(());
        self.destroyed.store(true, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.db.close().await;
        info!("collector stopped");
    }

    /// One info tick: mirror /info and /peers. Failures wait for the
    /// next tick.
    pub async fn info_once(&self) {
        if let Err(e) = self.try_info().await {
            warn!("info tick failed: {}", e);
        }
    }

    async fn try_info(&self) -> Result<()> {
        let info = self.node.info().await?;
        self.db.save_information(&info).await?;
        let peers = self.node.peers().await?;
        self.db.save_peers(&peers).await?;
        Ok(())
    }

    /// One pool tick: snapshot-replace the mirrored mempool.
    pub async fn pool_once(&self) {
        if let Err(e) = self.try_pool().await {
            warn!("pool tick failed: {}", e);
        }
    }

    async fn try_pool(&self) -> Result<()> {
        let blobs = self.node.raw_transaction_pool().await?;
        let mut decoded = Vec::with_capacity(blobs.len());
        for blob in &blobs {
            decoded.push(codec::decode_transaction(blob)?);
        }
        self.db.save_transaction_pool(&decoded).await?;
        Ok(())
    }

    /// One sync tick. Any failure rewinds to the last safe height and
    /// shrinks the batch; nothing propagates.
    pub async fn sync_once(&self) {
        let mut floor = 0u64;
        match self.try_sync(&mut floor).await {
            Ok(()) => {
                let next = grow_batch(self.batch_size(), self.default_batch_size);
                self.batch_size.store(next, Ordering::Relaxed);
            }
            Err(e) => {
                warn!("sync tick failed, rewinding to {}: {}", floor, e);
                if let Err(rewind_err) = self.db.rewind(floor).await {
                    warn!("rewind to {} failed: {}", floor, rewind_err);
                }
                let next = shrink_batch(self.batch_size());
                self.batch_size.store(next, Ordering::Relaxed);
            }
        }
    }

    async fn try_sync(&self, floor: &mut u64) -> Result<()> {
        let started = Instant::now();

        self.db.repair_consistency().await?;

        let checkpoints = self.db.hashes_for_sync().await?;
        for checkpoint in &checkpoints {
            if let Some(height) = self.db.height_from_hash(checkpoint).await? {
                *floor = height;
                break;
            }
        }

        let request = RawSyncRequest {
            checkpoints,
            height: 0,
            timestamp: 0,
            skip_coinbase_only: false,
            count: self.batch_size(),
        };
        let response = self.node.raw_sync(&request).await?;

        let mut decoded = Vec::with_capacity(response.blocks.len());
        for raw in response.blocks {
            decoded.push(codec::decode_block(&RawBlockData {
                block: raw.block,
                transactions: raw.transactions,
            })?);
        }
        let expected_tx_count: usize = decoded.iter().map(|b| b.transactions.len()).sum();

        let (heights, hashes) = self.db.save_raw_blocks(&decoded).await?;
        if heights.is_empty() {
            debug!("nothing to sync");
            return Ok(());
        }
        *floor = heights[0];
        let (min_height, max_height) = (heights[0], *heights.last().unwrap());

        let indexes = self
            .fetch_indexes(min_height, max_height, expected_tx_count)
            .await?;
        self.db.save_output_global_indexes(&indexes).await?;

        let headers = self.fetch_headers(min_height, max_height).await?;
        let persisted: HashSet<&str> = hashes.iter().map(String::as_str).collect();
        let headers: Vec<BlockHeader> = headers
            .into_iter()
            .filter(|h| persisted.contains(h.hash.as_str()))
            .collect();
        self.db.save_blocks_meta(&headers).await?;

        info!(
            "synced blocks {}..{} ({} blocks) in {:?}",
            min_height,
            max_height,
            heights.len(),
            started.elapsed()
        );
        Ok(())
    }

    /// Fetch the global output indexes for a height range. One full-range
    /// attempt; on a count mismatch or error, walk the range in chunks of
    /// eleven with unbounded retries. A mismatch after the chunked walk
    /// fails the tick.
    async fn fetch_indexes(
        &self,
        min_height: u64,
        max_height: u64,
        expected: usize,
    ) -> Result<Vec<TransactionIndexes>> {
        match self.node.indexes(min_height, max_height).await {
            Ok(entries) if entries.len() == expected => return Ok(entries),
            Ok(entries) => warn!(
                "index count mismatch ({} of {}), falling back to chunked fetch",
                entries.len(),
                expected
            ),
            Err(e) => warn!("index fetch failed, falling back to chunked fetch: {}", e),
        }

        let mut out = Vec::new();
        let mut start = min_height;
        while start <= max_height {
            let end = max_height.min(start + INDEX_CHUNK_SPAN - 1);
            loop {
                match self.node.indexes(start, end).await {
                    Ok(chunk) => {
                        out.extend(chunk);
                        break;
                    }
                    Err(e) => {
                        warn!("index chunk {}..{} failed, retrying: {}", start, end, e);
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
            start = end + 1;
        }

        if out.len() != expected {
            return Err(Error::IndexCountMismatch {
                expected,
                actual: out.len(),
            });
        }
        Ok(out)
    }

    /// Fetch headers for a height range in bulk steps of thirty,
    /// concurrently across steps. Each step retries the bulk call a few
    /// times, then falls back to per-height fetches with unbounded
    /// retries.
    async fn fetch_headers(&self, min_height: u64, max_height: u64) -> Result<Vec<BlockHeader>> {
        let mut cursors = Vec::new();
        let mut cursor = max_height;
        loop {
            cursors.push(cursor);
            if cursor.saturating_sub(HEADER_BULK_SPAN - 1) <= min_height {
                break;
            }
            cursor -= HEADER_BULK_SPAN;
        }

        let chunks = join_all(
            cursors
                .into_iter()
                .map(|cursor| self.fetch_header_chunk(cursor)),
        )
        .await;

        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(chunk?);
        }
        Ok(out)
    }

    async fn fetch_header_chunk(&self, cursor: u64) -> Result<Vec<BlockHeader>> {
        let mut fetched = Vec::new();
        for attempt in 1..=HEADER_RETRIES {
            match self.node.block_headers(cursor).await {
                Ok(headers) => {
                    fetched = headers;
                    break;
                }
                Err(e) => {
                    warn!(
                        "bulk header fetch at {} failed (attempt {}): {}",
                        cursor, attempt, e
                    );
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
        if !fetched.is_empty() {
            return Ok(fetched);
        }

        let mut out = Vec::new();
        for height in cursor.saturating_sub(HEADER_BULK_SPAN - 1)..=cursor {
            loop {
                match self.node.block(&height.to_string()).await {
                    Ok(header) => {
                        out.push(header);
                        break;
                    }
                    Err(e) => {
                        warn!("header fetch at {} failed, retrying: {}", height, e);
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_grows_by_quarters_to_the_default() {
        let mut size = 6;
        let expected = [8, 10, 13, 17, 22, 28, 35, 44, 55, 69, 87, 100, 100];
        for want in expected {
            size = grow_batch(size, DEFAULT_BATCH_SIZE);
            assert_eq!(size, want);
        }
    }

    #[test]
    fn batch_shrinks_by_halves_to_two() {
        let mut size = DEFAULT_BATCH_SIZE;
        let expected = [50, 25, 13, 7, 4, 2, 2];
        for want in expected {
            size = shrink_batch(size);
            assert_eq!(size, want);
        }
    }

    #[test]
    fn grow_saturates_at_default() {
        assert_eq!(grow_batch(100, 100), 100);
        assert_eq!(grow_batch(250, 100), 100);
    }
}
