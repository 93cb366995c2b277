//! Storage-layer integration tests on in-memory SQLite.

mod common;

use chaincache::codec;
use chaincache::error::Error;
use chaincache::models::RawSyncRequest;
use chaincache::BlockchainDb;
use common::{build_chain, global_indexes, h32, TestChain};
use std::sync::Arc;

async fn open_db() -> Arc<BlockchainDb> {
    let db = BlockchainDb::open("sqlite::memory:").await.unwrap();
    db.init().await.unwrap();
    Arc::new(db)
}

async fn count(db: &BlockchainDb, sql: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(sql)
        .fetch_one(db.pool())
        .await
        .unwrap()
}

/// Ingest the whole chain the way a sync tick would: raw blocks, then
/// output indexes, then headers.
async fn ingest(db: &BlockchainDb, chain: &TestChain) {
    let (heights, _) = db.save_raw_blocks(&chain.blocks).await.unwrap();
    let indexes = global_indexes(&chain.blocks, heights[0], *heights.last().unwrap());
    db.save_output_global_indexes(&indexes).await.unwrap();
    db.save_blocks_meta(&chain.headers).await.unwrap();
}

#[tokio::test]
async fn schema_init_is_idempotent() {
    let db = open_db().await;
    db.init().await.unwrap();
    db.init().await.unwrap();
    assert_eq!(count(&db, "SELECT COUNT(*) FROM blocks").await, 0);
}

#[tokio::test]
async fn reingesting_the_same_batch_is_idempotent() {
    let db = open_db().await;
    let chain = build_chain(8);

    db.save_raw_blocks(&chain.blocks).await.unwrap();
    let before = count(&db, "SELECT COUNT(*) FROM transactions").await;

    let (heights, hashes) = db.save_raw_blocks(&chain.blocks).await.unwrap();
    assert_eq!(heights, (0..8).collect::<Vec<u64>>());
    assert_eq!(hashes.len(), 8);

    assert_eq!(count(&db, "SELECT COUNT(*) FROM blocks").await, 8);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM blockchain").await, 8);
    assert_eq!(
        count(&db, "SELECT COUNT(*) FROM transactions").await,
        before
    );
}

#[tokio::test]
async fn rewind_cascades_and_reingest_restores_data() {
    let db = open_db().await;
    let chain = build_chain(10);
    ingest(&db, &chain).await;

    db.rewind(5).await.unwrap();
    assert_eq!(count(&db, "SELECT COUNT(*) FROM blocks").await, 5);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM blockchain").await, 5);
    // Cascades removed the dependent rows of the deleted suffix.
    let orphan_txs = count(
        &db,
        "SELECT COUNT(*) FROM transactions WHERE block_hash NOT IN (SELECT hash FROM blocks)",
    )
    .await;
    assert_eq!(orphan_txs, 0);
    let orphan_meta = count(
        &db,
        "SELECT COUNT(*) FROM transaction_meta WHERE hash NOT IN (SELECT hash FROM transactions)",
    )
    .await;
    assert_eq!(orphan_meta, 0);

    // Re-ingest the suffix and compare the stored blobs bit for bit.
    db.save_raw_blocks(&chain.blocks[5..]).await.unwrap();
    for block in &chain.blocks[5..] {
        let raw = db.raw_block(&block.hash).await.unwrap();
        assert_eq!(raw.block, block.blob);
    }
    assert_eq!(count(&db, "SELECT COUNT(*) FROM blocks").await, 10);
}

#[tokio::test]
async fn ingest_satisfies_relational_invariants() {
    let db = open_db().await;
    let chain = build_chain(12);
    ingest(&db, &chain).await;

    let blocks = count(&db, "SELECT COUNT(*) FROM blocks").await;
    assert_eq!(blocks, 12);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM blockchain").await, blocks);
    assert_eq!(count(&db, "SELECT COUNT(*) FROM block_meta").await, blocks);

    // Heights are dense over [0, top].
    let top = count(&db, "SELECT MAX(height) FROM blockchain").await;
    assert_eq!(top + 1, blocks);
    let distinct = count(&db, "SELECT COUNT(DISTINCT height) FROM blockchain").await;
    assert_eq!(distinct, blocks);

    // Every transaction has exactly one meta row and a live block.
    let missing_meta = count(
        &db,
        "SELECT COUNT(*) FROM transactions LEFT JOIN transaction_meta \
         ON transaction_meta.hash = transactions.hash WHERE transaction_meta.size IS NULL",
    )
    .await;
    assert_eq!(missing_meta, 0);

    // Every key output got its global index within the ingest.
    let unindexed = count(
        &db,
        "SELECT COUNT(*) FROM transaction_outputs WHERE globalIdx IS NULL",
    )
    .await;
    assert_eq!(unindexed, 0);

    assert!(db.check_consistency().await.unwrap().is_empty());
}

#[tokio::test]
async fn hashes_for_sync_has_dense_prefix_and_halving_tail() {
    let db = open_db().await;
    assert!(db.hashes_for_sync().await.unwrap().is_empty());

    let chain = build_chain(21);
    db.save_raw_blocks(&chain.blocks[..1]).await.unwrap();
    // Height zero alone: just the genesis hash.
    assert_eq!(
        db.hashes_for_sync().await.unwrap(),
        vec![chain.blocks[0].hash.clone()]
    );

    db.save_raw_blocks(&chain.blocks).await.unwrap();
    let checkpoints = db.hashes_for_sync().await.unwrap();

    // Top eleven consecutive, then offsets doubling downward, then
    // genesis; strictly descending.
    let mut expected_heights: Vec<u64> = (10..=20).rev().collect();
    expected_heights.extend([8, 4, 0]);
    let expected: Vec<String> = expected_heights
        .iter()
        .map(|&h| chain.blocks[h as usize].hash.clone())
        .collect();
    assert_eq!(checkpoints, expected);
}

#[tokio::test]
async fn sync_height_takes_the_highest_candidate() {
    let db = open_db().await;
    let chain = build_chain(10);
    ingest(&db, &chain).await;

    // Newest matching checkpoint wins.
    let checkpoints = vec![h32(0xff, 1), chain.blocks[7].hash.clone()];
    assert_eq!(db.get_sync_height(&checkpoints, 0, 0).await.unwrap(), 8);

    // A timestamp cutoff resumes after the newest block at or before it.
    let ts = chain.blocks[4].timestamp;
    assert_eq!(db.get_sync_height(&[], 0, ts).await.unwrap(), 5);

    // The explicit height argument can outrank both.
    assert_eq!(db.get_sync_height(&checkpoints, 9, ts).await.unwrap(), 9);

    // Nothing applies: start from scratch.
    assert_eq!(db.get_sync_height(&[], 0, 0).await.unwrap(), 0);
}

#[tokio::test]
async fn raw_sync_pages_ascending_and_reports_synced_when_empty() {
    let db = open_db().await;
    let chain = build_chain(10);
    ingest(&db, &chain).await;

    let request = RawSyncRequest {
        checkpoints: vec![chain.blocks[5].hash.clone()],
        height: 0,
        timestamp: 0,
        skip_coinbase_only: false,
        count: 3,
    };
    let page = db.raw_sync(&request).await.unwrap();
    assert!(!page.synced);
    assert!(page.top_block.is_none());
    assert_eq!(page.blocks.len(), 3);
    assert_eq!(page.blocks[0].block, chain.blocks[6].blob);
    // Non-coinbase bodies ride along with each block.
    assert_eq!(page.blocks[1].transactions.len(), 1);

    let request = RawSyncRequest {
        checkpoints: vec![chain.blocks[9].hash.clone()],
        height: 0,
        timestamp: 0,
        skip_coinbase_only: false,
        count: 100,
    };
    let page = db.raw_sync(&request).await.unwrap();
    assert!(page.synced);
    assert!(page.blocks.is_empty());
    let top = page.top_block.unwrap();
    assert_eq!(top.height, 9);
    assert_eq!(top.hash, chain.blocks[9].hash);
}

#[tokio::test]
async fn raw_sync_serves_blocks_whose_headers_are_still_pending() {
    let db = open_db().await;
    let chain = build_chain(6);
    // Mid-tick state: all raw blocks landed, headers only for the
    // first four.
    db.save_raw_blocks(&chain.blocks).await.unwrap();
    db.save_blocks_meta(&chain.headers[..4]).await.unwrap();

    let request = RawSyncRequest {
        checkpoints: vec![chain.blocks[3].hash.clone()],
        height: 0,
        timestamp: 0,
        skip_coinbase_only: false,
        count: 100,
    };
    let page = db.raw_sync(&request).await.unwrap();
    // The headerless tip still pages out; the caller is not told it is
    // synced.
    assert!(!page.synced);
    assert!(page.top_block.is_none());
    assert_eq!(page.blocks.len(), 2);
    assert_eq!(page.blocks[0].block, chain.blocks[4].blob);
    assert_eq!(page.blocks[1].block, chain.blocks[5].blob);
}

#[tokio::test]
async fn raw_sync_can_skip_coinbase_only_blocks() {
    let db = open_db().await;
    let chain = build_chain(10);
    ingest(&db, &chain).await;

    let request = RawSyncRequest {
        checkpoints: Vec::new(),
        height: 0,
        timestamp: 0,
        skip_coinbase_only: true,
        count: 100,
    };
    let page = db.raw_sync(&request).await.unwrap();
    // Only odd heights carry a user transaction.
    assert_eq!(page.blocks.len(), 5);
    assert!(page.blocks.iter().all(|b| !b.transactions.is_empty()));
}

#[tokio::test]
async fn decoded_sync_matches_raw_sync() {
    let db = open_db().await;
    let chain = build_chain(6);
    ingest(&db, &chain).await;

    let request = RawSyncRequest {
        checkpoints: Vec::new(),
        height: 0,
        timestamp: 0,
        skip_coinbase_only: false,
        count: 100,
    };
    let decoded = db.sync(&request).await.unwrap();
    assert_eq!(decoded.blocks.len(), 6);
    assert_eq!(decoded.blocks[3].height, 3);
    assert_eq!(decoded.blocks[3].hash, chain.blocks[3].hash);
    assert!(decoded.blocks[3].transactions[0].coinbase);
}

#[tokio::test]
async fn random_indexes_bounds_and_order() {
    let db = open_db().await;
    // 30 blocks -> 15 user transactions -> 15 outputs of 600k.
    let chain = build_chain(30);
    ingest(&db, &chain).await;

    let result = db.random_indexes(&[600_000], 5).await.unwrap();
    assert_eq!(result.len(), 1);
    let outputs = &result[0].outputs;
    assert_eq!(outputs.len(), 5);
    let mut sorted = outputs.clone();
    sorted.sort_by_key(|o| o.global_index);
    assert_eq!(
        outputs.iter().map(|o| o.global_index).collect::<Vec<_>>(),
        sorted.iter().map(|o| o.global_index).collect::<Vec<_>>()
    );
    let distinct: std::collections::HashSet<u64> =
        outputs.iter().map(|o| o.global_index).collect();
    assert_eq!(distinct.len(), 5);

    // Asking for at least as many as the maximum index fails.
    assert!(matches!(
        db.random_indexes(&[600_000], 14).await,
        Err(Error::OutOfRange(_))
    ));
    // Unknown amounts fail the same way.
    assert!(matches!(
        db.random_indexes(&[42], 1).await,
        Err(Error::OutOfRange(_))
    ));
}

#[tokio::test]
async fn pool_is_snapshot_replaced() {
    let db = open_db().await;
    let chain = build_chain(4);
    ingest(&db, &chain).await;

    let make_pool_tx = |n: u64| {
        let blob = codec::encode_transaction(
            0,
            &[codec::TxInput::Key {
                amount: 500_000,
                key_image: h32(0x70, n),
                key_offsets: vec![1, 2, 3],
            }],
            &[codec::TxOutput::Key {
                amount: 400_000,
                key: h32(0x71, n),
            }],
            Some(&h32(0x72, n)),
            None,
        )
        .unwrap();
        codec::decode_transaction(&blob).unwrap()
    };

    let a = make_pool_tx(1);
    let b = make_pool_tx(2);
    let c = make_pool_tx(3);
    let d = make_pool_tx(4);

    db.save_transaction_pool(&[a.clone(), b.clone(), c.clone()])
        .await
        .unwrap();
    assert_eq!(count(&db, "SELECT COUNT(*) FROM transaction_pool").await, 3);

    // Re-ingesting an identical snapshot is idempotent.
    db.save_transaction_pool(&[a.clone(), b.clone(), c.clone()])
        .await
        .unwrap();
    assert_eq!(count(&db, "SELECT COUNT(*) FROM transaction_pool").await, 3);

    db.save_transaction_pool(&[b.clone(), c.clone(), d.clone()])
        .await
        .unwrap();
    let pool = db.transaction_pool().await.unwrap();
    let hashes: std::collections::HashSet<String> =
        pool.iter().map(|t| t.hash.clone()).collect();
    assert_eq!(hashes.len(), 3);
    assert!(hashes.contains(&b.hash));
    assert!(hashes.contains(&c.hash));
    assert!(hashes.contains(&d.hash));
    assert!(!hashes.contains(&a.hash));

    // Of the hashes the caller knows, B is still pooled, A is gone.
    let top_hash = chain.blocks[3].hash.clone();
    let changes = db
        .transaction_pool_changes(&top_hash, &[a.hash.clone(), b.hash.clone()])
        .await
        .unwrap();
    assert_eq!(changes.added.len(), 1);
    assert_eq!(changes.added[0].hash, b.hash);
    assert_eq!(changes.deleted, vec![a.hash.clone()]);
    assert!(changes.synced);

    let status = db
        .transactions_status(&[b.hash.clone(), chain.blocks[1].transactions[0].hash.clone(), h32(0xee, 9)])
        .await
        .unwrap();
    assert_eq!(status.in_pool, vec![b.hash.clone()]);
    assert_eq!(status.in_block.len(), 1);
    assert_eq!(status.not_found, vec![h32(0xee, 9)]);
}

#[tokio::test]
async fn consistency_check_flags_missing_headers_and_repair_rewinds() {
    let db = open_db().await;
    let chain = build_chain(12);
    ingest(&db, &chain).await;
    assert!(db.check_consistency().await.unwrap().is_empty());

    // Knock out one header row mid-chain.
    sqlx::query("DELETE FROM block_meta WHERE hash = ?")
        .bind(chain.blocks[9].hash.clone())
        .execute(db.pool())
        .await
        .unwrap();

    let bad = db.check_consistency().await.unwrap();
    assert_eq!(bad, vec![chain.blocks[9].hash.clone()]);

    db.repair_consistency().await.unwrap();
    assert!(db.check_consistency().await.unwrap().is_empty());
    // The suffix from the damaged height is gone.
    assert_eq!(count(&db, "SELECT COUNT(*) FROM blockchain").await, 9);

    // Re-ingesting the suffix restores the row.
    db.save_raw_blocks(&chain.blocks[9..]).await.unwrap();
    db.save_blocks_meta(&chain.headers[9..]).await.unwrap();
    assert!(db.check_consistency().await.unwrap().is_empty());
    assert_eq!(count(&db, "SELECT COUNT(*) FROM blockchain").await, 12);
}

#[tokio::test]
async fn header_reads_cover_hash_height_and_ranges() {
    let db = open_db().await;
    let chain = build_chain(40);
    ingest(&db, &chain).await;

    let by_height = db.block_header("17").await.unwrap();
    assert_eq!(by_height.hash, chain.blocks[17].hash);
    assert_eq!(by_height.depth, 39 - 17);

    let by_hash = db.block_header(&chain.blocks[17].hash).await.unwrap();
    assert_eq!(by_hash.height, 17);

    let top = db.last_block_header().await.unwrap();
    assert_eq!(top.height, 39);
    assert_eq!(top.depth, 0);

    let headers = db.block_headers(39).await.unwrap();
    assert_eq!(headers.len(), 30);
    assert_eq!(headers[0].height, 39);
    assert_eq!(headers[29].height, 10);

    assert!(matches!(
        db.block_header(&h32(0xab, 1)).await,
        Err(Error::NotFound(_))
    ));
    assert!(matches!(db.block_header("999").await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn transaction_reads_and_indexes_ranges() {
    let db = open_db().await;
    let chain = build_chain(8);
    ingest(&db, &chain).await;

    let user_tx = &chain.blocks[3].transactions[1];
    let detail = db.transaction(&user_tx.hash).await.unwrap();
    assert_eq!(detail.block_height, 3);
    assert!(!detail.coinbase);
    assert_eq!(detail.fee, 100_000);
    assert_eq!(detail.inputs.len(), 1);
    assert_eq!(detail.outputs.len(), 2);
    assert!(detail.outputs.iter().all(|o| o.global_index.is_some()));

    let blob = db.raw_transaction(&user_tx.hash).await.unwrap();
    assert_eq!(blob, user_tx.blob);
    assert_eq!(codec::hash_blob(&blob), user_tx.hash);

    let ranges = db.indexes(2, 4).await.unwrap();
    let expected = global_indexes(&chain.blocks, 2, 4);
    assert_eq!(ranges.len(), expected.len());
    for (got, want) in ranges.iter().zip(expected.iter()) {
        assert_eq!(got.hash, want.hash);
        assert_eq!(got.indexes, want.indexes);
    }

    assert!(matches!(
        db.raw_transaction(&h32(0x99, 7)).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn mirrored_info_overwrites_cache_fields() {
    let db = open_db().await;
    let chain = build_chain(10);
    ingest(&db, &chain).await;

    db.save_information(&serde_json::json!({
        "networkHeight": 10,
        "incomingConnections": 8,
        "version": "1.2.3",
    }))
    .await
    .unwrap();
    db.save_peers(&serde_json::json!({ "peers": ["10.0.0.1:11897"] }))
        .await
        .unwrap();

    let info = db.mirrored_info().await.unwrap();
    assert_eq!(info["isCacheApi"], serde_json::json!(true));
    assert_eq!(info["height"], serde_json::json!(9));
    assert_eq!(info["networkHeight"], serde_json::json!(9));
    assert_eq!(info["synced"], serde_json::json!(true));
    assert_eq!(info["difficulty"], serde_json::json!(109));
    assert_eq!(info["hashrate"], serde_json::json!(4));
    assert_eq!(info["lastBlockIndex"], serde_json::json!(9));
    // Untouched upstream fields survive.
    assert_eq!(info["version"], serde_json::json!("1.2.3"));
    assert_eq!(info["transactionsSize"], serde_json::json!(5));

    // The height summary reports the stored network height as-is.
    let summary = db.height_summary().await.unwrap();
    assert_eq!(summary.height, 9);
    assert_eq!(summary.network_height, 10);

    let peers = db.stored_peers().await.unwrap();
    assert_eq!(peers["peers"][0], serde_json::json!("10.0.0.1:11897"));
}

#[tokio::test]
async fn reset_truncates_everything() {
    let db = open_db().await;
    let chain = build_chain(6);
    ingest(&db, &chain).await;
    db.save_information(&serde_json::json!({"height": 6}))
        .await
        .unwrap();

    db.reset().await.unwrap();
    for table in [
        "blocks",
        "blockchain",
        "block_meta",
        "transactions",
        "transaction_meta",
        "transaction_inputs",
        "transaction_outputs",
        "transaction_paymentids",
        "transaction_pool",
        "information",
    ] {
        assert_eq!(
            count(&db, &format!("SELECT COUNT(*) FROM {}", table)).await,
            0,
            "{} not empty",
            table
        );
    }
}
