#![allow(dead_code)]

//! Chain-building fixtures shared by the integration tests.

use chaincache::codec::{
    self, encode_block, encode_transaction, DecodedBlock, RawBlockData, TxInput, TxOutput,
};
use chaincache::models::{BlockHeader, RawBlockPayload, TransactionIndexes};
use std::collections::HashMap;

pub const MINER_REWARD: u64 = 2_000_000;

/// A deterministic 32-byte hex value derived from a tag and a counter.
pub fn h32(tag: u8, n: u64) -> String {
    let mut bytes = [0u8; 32];
    bytes[0] = tag;
    bytes[1..9].copy_from_slice(&n.to_le_bytes());
    hex::encode(bytes)
}

pub struct TestChain {
    pub raw: Vec<RawBlockPayload>,
    pub blocks: Vec<DecodedBlock>,
    pub headers: Vec<BlockHeader>,
}

impl TestChain {
    pub fn top_height(&self) -> u64 {
        self.blocks.len() as u64 - 1
    }

    pub fn find_by_hash(&self, hash: &str) -> Option<&DecodedBlock> {
        self.blocks.iter().find(|b| b.hash == hash)
    }
}

fn make_block(
    height: u64,
    prev_hash: &str,
    salt: u8,
) -> (RawBlockPayload, DecodedBlock, BlockHeader) {
    let miner = encode_transaction(
        height + 60,
        &[TxInput::Coinbase {
            block_index: height,
        }],
        &[TxOutput::Key {
            amount: MINER_REWARD,
            key: h32(0xa0 ^ salt, height),
        }],
        Some(&h32(0xb0 ^ salt, height)),
        None,
    )
    .unwrap();

    // Odd heights carry one user transaction paying a 100k fee.
    let mut user_blobs = Vec::new();
    let mut user_hashes = Vec::new();
    if height % 2 == 1 {
        let tx = encode_transaction(
            0,
            &[TxInput::Key {
                amount: 1_000_000,
                key_image: h32(0x10 ^ salt, height),
                key_offsets: vec![1, 2, 3],
            }],
            &[
                TxOutput::Key {
                    amount: 600_000,
                    key: h32(0x20 ^ salt, height),
                },
                TxOutput::Key {
                    amount: 300_000,
                    key: h32(0x21 ^ salt, height),
                },
            ],
            Some(&h32(0xc0 ^ salt, height)),
            Some(&h32(0xd0 ^ salt, height)),
        )
        .unwrap();
        user_hashes.push(codec::hash_blob(&tx));
        user_blobs.push(tx);
    }

    let blob = encode_block(
        4,
        0,
        height,
        1_600_000_000 + height * 30,
        prev_hash,
        (height as u32) * 7 + 1 + salt as u32,
        &miner,
        &user_hashes,
    )
    .unwrap();

    let payload = RawBlockPayload {
        block: blob.clone(),
        transactions: user_blobs.clone(),
    };
    let decoded = codec::decode_block(&RawBlockData {
        block: blob,
        transactions: user_blobs,
    })
    .unwrap();
    let header = header_for(&decoded);
    (payload, decoded, header)
}

pub fn header_for(block: &DecodedBlock) -> BlockHeader {
    let total_fees: u64 = block.transactions.iter().map(|tx| tx.fee).sum();
    let tx_sizes: u64 = block.transactions.iter().map(|tx| tx.size).sum();
    BlockHeader {
        hash: block.hash.clone(),
        prev_hash: block.prev_hash.clone(),
        height: block.height,
        timestamp: block.timestamp,
        base_reward: MINER_REWARD,
        difficulty: 100 + block.height,
        major_version: block.major_version as u32,
        minor_version: block.minor_version as u32,
        nonce: block.nonce as u64,
        size: block.blob.len() as u64,
        already_generated_coins: MINER_REWARD * (block.height + 1),
        already_generated_transactions: block.height + 1,
        reward: MINER_REWARD + total_fees,
        size_median: 300,
        total_fee_amount: total_fees,
        transactions_cumulative_size: tx_sizes,
        transactions_count: block.transactions.len() as u64,
        orphan: false,
        penalty: 0.0,
        depth: 0,
    }
}

pub fn build_chain(len: usize) -> TestChain {
    build_chain_salted(len, 0)
}

fn build_chain_salted(len: usize, salt: u8) -> TestChain {
    let mut chain = TestChain {
        raw: Vec::with_capacity(len),
        blocks: Vec::with_capacity(len),
        headers: Vec::with_capacity(len),
    };
    let mut prev = hex::encode([0u8; 32]);
    for height in 0..len as u64 {
        let (payload, decoded, header) = make_block(height, &prev, salt);
        prev = decoded.hash.clone();
        chain.raw.push(payload);
        chain.blocks.push(decoded);
        chain.headers.push(header);
    }
    chain
}

/// A chain sharing `base`'s prefix below `fork_height` with a diverging
/// suffix of the same length.
pub fn build_fork(base: &TestChain, fork_height: u64, salt: u8) -> TestChain {
    let mut chain = TestChain {
        raw: base.raw[..fork_height as usize].to_vec(),
        blocks: base.blocks[..fork_height as usize].to_vec(),
        headers: base.headers[..fork_height as usize].to_vec(),
    };
    let mut prev = chain
        .blocks
        .last()
        .map(|b| b.hash.clone())
        .unwrap_or_else(|| hex::encode([0u8; 32]));
    for height in fork_height..base.blocks.len() as u64 {
        let (payload, decoded, header) = make_block(height, &prev, salt);
        prev = decoded.hash.clone();
        chain.raw.push(payload);
        chain.blocks.push(decoded);
        chain.headers.push(header);
    }
    chain
}

/// Chain-wide per-amount global output indexes for every transaction in
/// the height range, in output order.
pub fn global_indexes(
    blocks: &[DecodedBlock],
    start: u64,
    end: u64,
) -> Vec<TransactionIndexes> {
    let mut counters: HashMap<u64, u64> = HashMap::new();
    let mut out = Vec::new();
    for block in blocks {
        for tx in &block.transactions {
            let mut indexes = Vec::with_capacity(tx.outputs.len());
            for output in &tx.outputs {
                let counter = counters.entry(output.amount()).or_insert(0);
                indexes.push(*counter);
                *counter += 1;
            }
            if block.height >= start && block.height <= end {
                out.push(TransactionIndexes {
                    hash: tx.hash.clone(),
                    indexes,
                });
            }
        }
    }
    out
}
