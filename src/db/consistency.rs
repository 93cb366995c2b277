//! Consistency detection and repair.
//!
//! A block row without a matching block_meta row marks the chain suffix
//! as suspect; repair rewinds to the lowest affected height and re-checks
//! until the join comes back clean.

use super::row::get_string;
use super::BlockchainDb;
use crate::error::Result;
use tracing::{info, warn};

impl BlockchainDb {
    /// Hashes of blocks whose header row is missing. Empty means the
    /// mirror is consistent.
    pub async fn check_consistency(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT blocks.hash AS hash FROM blocks \
             LEFT JOIN block_meta ON block_meta.hash = blocks.hash \
             WHERE block_meta.size IS NULL",
        )
        .fetch_all(self.pool())
        .await?;
        rows.iter().map(|r| get_string(r, "hash")).collect()
    }

    /// Rewind away inconsistent suffixes until the check passes.
    pub async fn repair_consistency(&self) -> Result<()> {
        loop {
            let inconsistent = self.check_consistency().await?;
            if inconsistent.is_empty() {
                return Ok(());
            }
            warn!("{} inconsistent blocks detected", inconsistent.len());

            let mut lowest: Option<u64> = None;
            let mut orphaned: Vec<String> = Vec::new();
            for hash in &inconsistent {
                match self.height_from_hash(hash).await? {
                    Some(height) => {
                        lowest = Some(lowest.map_or(height, |l| l.min(height)));
                    }
                    None => orphaned.push(hash.clone()),
                }
            }

            if let Some(height) = lowest {
                info!("rewinding to height {} to repair consistency", height);
                self.rewind(height).await?;
            } else {
                // No chain entry to anchor a rewind on; drop the rows
                // directly and let the cascades clean up.
                let sql = format!(
                    "DELETE FROM blocks WHERE hash = {}",
                    self.backend().placeholder(1)
                );
                for hash in orphaned {
                    sqlx::query(&sql)
                        .bind(hash)
                        .execute(self.pool())
                        .await?;
                }
            }
        }
    }
}
