//! Offload worker: per-block persistence driven by a request/reply
//! queue.
//!
//! Workers take one job at a time. A processed job is answered on its
//! reply list; a failed job is pushed back onto the request queue for
//! redelivery.

use crate::codec::{self, RawBlockData};
use crate::db::BlockchainDb;
use crate::error::Result;
use crate::models::{BlockJob, BlockJobReply};
use async_trait::async_trait;
use redis::AsyncCommands;
use std::sync::Arc;
use tracing::{info, warn};

#[async_trait]
pub trait JobQueue: Send {
    /// Block until a job is available.
    async fn next_job(&mut self) -> Result<BlockJob>;
    async fn reply(&mut self, job: &BlockJob, reply: &BlockJobReply) -> Result<()>;
    /// Hand a failed job back for redelivery.
    async fn requeue(&mut self, job: BlockJob) -> Result<()>;
}

pub struct RedisJobQueue {
    connection: redis::aio::MultiplexedConnection,
    queue_name: String,
}

impl RedisJobQueue {
    pub async fn connect(url: &str, queue_name: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let connection = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            connection,
            queue_name: queue_name.to_string(),
        })
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn next_job(&mut self) -> Result<BlockJob> {
        let (_, payload): (String, String) =
            self.connection.brpop(&self.queue_name, 0.0).await?;
        Ok(serde_json::from_str(&payload)?)
    }

    async fn reply(&mut self, job: &BlockJob, reply: &BlockJobReply) -> Result<()> {
        let payload = serde_json::to_string(reply)?;
        let _: () = self.connection.lpush(&job.reply_to, payload).await?;
        Ok(())
    }

    async fn requeue(&mut self, job: BlockJob) -> Result<()> {
        let payload = serde_json::to_string(&job)?;
        let _: () = self.connection.rpush(&self.queue_name, payload).await?;
        Ok(())
    }
}

pub struct Worker<Q: JobQueue> {
    db: Arc<BlockchainDb>,
    queue: Q,
}

impl<Q: JobQueue> Worker<Q> {
    pub fn new(db: Arc<BlockchainDb>, queue: Q) -> Self {
        Self { db, queue }
    }

    /// Consume jobs until the queue fails.
    pub async fn run(&mut self) -> Result<()> {
        info!("worker started");
        loop {
            let job = self.queue.next_job().await?;
            match self.process(&job).await {
                Ok(reply) => self.queue.reply(&job, &reply).await?,
                Err(e) => {
                    warn!("block job failed, requeueing: {}", e);
                    self.queue.requeue(job).await?;
                }
            }
        }
    }

    async fn process(&self, job: &BlockJob) -> Result<BlockJobReply> {
        let block = codec::decode_block(&RawBlockData {
            block: job.raw.block.clone(),
            transactions: job.raw.transactions.clone(),
        })?;

        // Redelivered jobs short-circuit on an already-mirrored block.
        if let Some((height, tx_count)) = self.db.block_summary(&block.hash).await? {
            return Ok(BlockJobReply {
                hash: block.hash,
                height,
                transactions_count: tx_count,
            });
        }

        let transactions_count = block.transactions.len() as u64;
        self.db.save_raw_block(&block).await?;
        Ok(BlockJobReply {
            hash: block.hash,
            height: block.height,
            transactions_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_block, encode_transaction, TxInput, TxOutput};
    use crate::models::RawBlockPayload;

    fn hex32(byte: u8) -> String {
        hex::encode([byte; 32])
    }

    fn genesis_payload() -> RawBlockPayload {
        let miner = encode_transaction(
            60,
            &[TxInput::Coinbase { block_index: 0 }],
            &[TxOutput::Key {
                amount: 1_000_000,
                key: hex32(0x01),
            }],
            Some(&hex32(0x02)),
            None,
        )
        .unwrap();
        let block = encode_block(1, 0, 0, 1000, &hex32(0x00), 0, &miner, &[]).unwrap();
        RawBlockPayload {
            block,
            transactions: vec![],
        }
    }

    async fn open_db() -> Arc<BlockchainDb> {
        let db = BlockchainDb::open("sqlite::memory:").await.unwrap();
        db.init().await.unwrap();
        Arc::new(db)
    }

    struct NullQueue;

    #[async_trait]
    impl JobQueue for NullQueue {
        async fn next_job(&mut self) -> Result<BlockJob> {
            Err(crate::error::Error::Internal("empty".to_string()))
        }

        async fn reply(&mut self, _job: &BlockJob, _reply: &BlockJobReply) -> Result<()> {
            Ok(())
        }

        async fn requeue(&mut self, _job: BlockJob) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn processing_a_block_twice_short_circuits() {
        let db = open_db().await;
        let worker = Worker::new(db.clone(), NullQueue);
        let job = BlockJob {
            raw: genesis_payload(),
            reply_to: "replies".to_string(),
        };

        let first = worker.process(&job).await.unwrap();
        assert_eq!(first.height, 0);
        assert_eq!(first.transactions_count, 1);

        // Same job again: answered from the mirror, no double insert.
        let second = worker.process(&job).await.unwrap();
        assert_eq!(second.hash, first.hash);
        assert_eq!(second.height, 0);
        assert_eq!(second.transactions_count, 1);
    }
}
