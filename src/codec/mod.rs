//! Decoding of raw block and transaction blobs into the tabular model.
//!
//! The upstream ships blocks as opaque binary envelopes: a block blob with
//! the miner transaction inline plus the hashes of its user transactions,
//! whose bodies travel as separate blobs. Hashes are double-SHA-256 of the
//! full blob, computed once at decode time and carried on the decoded value.

mod reader;

pub use reader::{Reader, Writer};

use crate::error::{Error, Result};
use sha2::{Digest, Sha256};

const INPUT_TAG_COINBASE: u8 = 0x00;
const INPUT_TAG_KEY: u8 = 0x02;
const OUTPUT_TAG_KEY: u8 = 0x02;
const EXTRA_TAG_PUBKEY: u8 = 0x01;
const EXTRA_TAG_NONCE: u8 = 0x02;
const EXTRA_NONCE_PAYMENT_ID: u8 = 0x00;

/// A raw block as delivered by the upstream: the block blob plus the
/// bodies of its user transactions.
#[derive(Debug, Clone, Default)]
pub struct RawBlockData {
    pub block: Vec<u8>,
    pub transactions: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxInput {
    Coinbase {
        block_index: u64,
    },
    Key {
        amount: u64,
        key_image: String,
        key_offsets: Vec<u64>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutput {
    Key { amount: u64, key: String },
}

impl TxOutput {
    pub fn amount(&self) -> u64 {
        match self {
            TxOutput::Key { amount, .. } => *amount,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecodedTransaction {
    pub hash: String,
    pub blob: Vec<u8>,
    pub coinbase: bool,
    pub fee: u64,
    pub amount: u64,
    pub size: u64,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub payment_id: Option<String>,
    pub public_key: Option<String>,
    pub unlock_time: u64,
}

#[derive(Debug, Clone)]
pub struct DecodedBlock {
    pub hash: String,
    pub height: u64,
    pub timestamp: u64,
    pub major_version: u8,
    pub minor_version: u8,
    pub nonce: u32,
    pub prev_hash: String,
    pub blob: Vec<u8>,
    /// Miner transaction first, user transactions in upstream order.
    pub transactions: Vec<DecodedTransaction>,
}

pub fn hash_blob(blob: &[u8]) -> String {
    let first = Sha256::digest(blob);
    let second = Sha256::digest(first);
    hex::encode(second)
}

struct ParsedTx {
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
    payment_id: Option<String>,
    public_key: Option<String>,
    unlock_time: u64,
}

fn parse_tx(reader: &mut Reader<'_>) -> Result<ParsedTx> {
    let _version = reader.read_u8()?;
    let unlock_time = reader.read_varint()?;

    let input_count = reader.read_varint()? as usize;
    let mut inputs = Vec::with_capacity(input_count);
    for _ in 0..input_count {
        let tag = reader.read_u8()?;
        match tag {
            INPUT_TAG_COINBASE => inputs.push(TxInput::Coinbase {
                block_index: reader.read_varint()?,
            }),
            INPUT_TAG_KEY => {
                let amount = reader.read_varint()?;
                let offset_count = reader.read_varint()? as usize;
                let mut key_offsets = Vec::with_capacity(offset_count);
                for _ in 0..offset_count {
                    key_offsets.push(reader.read_varint()?);
                }
                let key_image = hex::encode(reader.read_hash()?);
                inputs.push(TxInput::Key {
                    amount,
                    key_image,
                    key_offsets,
                });
            }
            other => {
                return Err(Error::Codec(format!("unknown input tag 0x{:02x}", other)));
            }
        }
    }

    let output_count = reader.read_varint()? as usize;
    let mut outputs = Vec::with_capacity(output_count);
    for _ in 0..output_count {
        let tag = reader.read_u8()?;
        match tag {
            OUTPUT_TAG_KEY => {
                let amount = reader.read_varint()?;
                let key = hex::encode(reader.read_hash()?);
                outputs.push(TxOutput::Key { amount, key });
            }
            other => {
                return Err(Error::Codec(format!("unknown output tag 0x{:02x}", other)));
            }
        }
    }

    let extra_len = reader.read_varint()? as usize;
    let extra = reader.read_bytes(extra_len)?;
    let mut extra_reader = Reader::new(&extra);
    let mut payment_id = None;
    let mut public_key = None;
    while !extra_reader.is_empty() {
        let tag = extra_reader.read_u8()?;
        match tag {
            EXTRA_TAG_PUBKEY => {
                public_key = Some(hex::encode(extra_reader.read_hash()?));
            }
            EXTRA_TAG_NONCE => {
                let len = extra_reader.read_varint()? as usize;
                let nonce = extra_reader.read_bytes(len)?;
                let mut nonce_reader = Reader::new(&nonce);
                if !nonce_reader.is_empty()
                    && nonce_reader.read_u8()? == EXTRA_NONCE_PAYMENT_ID
                {
                    payment_id = Some(hex::encode(nonce_reader.read_hash()?));
                }
            }
            other => {
                return Err(Error::Codec(format!("unknown extra tag 0x{:02x}", other)));
            }
        }
    }

    Ok(ParsedTx {
        inputs,
        outputs,
        payment_id,
        public_key,
        unlock_time,
    })
}

fn finish_tx(blob: Vec<u8>, parsed: ParsedTx) -> DecodedTransaction {
    let coinbase = matches!(parsed.inputs.first(), Some(TxInput::Coinbase { .. }));
    let amount: u64 = parsed.outputs.iter().map(TxOutput::amount).sum();
    let fee = if coinbase {
        0
    } else {
        let input_total: u64 = parsed
            .inputs
            .iter()
            .map(|input| match input {
                TxInput::Key { amount, .. } => *amount,
                TxInput::Coinbase { .. } => 0,
            })
            .sum();
        input_total.saturating_sub(amount)
    };

    DecodedTransaction {
        hash: hash_blob(&blob),
        size: blob.len() as u64,
        blob,
        coinbase,
        fee,
        amount,
        inputs: parsed.inputs,
        outputs: parsed.outputs,
        payment_id: parsed.payment_id,
        public_key: parsed.public_key,
        unlock_time: parsed.unlock_time,
    }
}

/// Decode a standalone transaction blob.
pub fn decode_transaction(blob: &[u8]) -> Result<DecodedTransaction> {
    let mut reader = Reader::new(blob);
    let parsed = parse_tx(&mut reader)?;
    if !reader.is_empty() {
        return Err(Error::Codec("trailing bytes after transaction".to_string()));
    }
    Ok(finish_tx(blob.to_vec(), parsed))
}

/// Decode a raw block payload. Any failing transaction fails the whole
/// block load.
pub fn decode_block(raw: &RawBlockData) -> Result<DecodedBlock> {
    let mut reader = Reader::new(&raw.block);

    let major_version = reader.read_u8()?;
    let minor_version = reader.read_u8()?;
    let height = reader.read_varint()?;
    let timestamp = reader.read_varint()?;
    let prev_hash = hex::encode(reader.read_hash()?);
    let nonce = reader.read_u32_le()?;

    let miner_start = reader.position();
    let miner_parsed = parse_tx(&mut reader)?;
    let miner_blob = raw.block[miner_start..reader.position()].to_vec();
    let miner = finish_tx(miner_blob, miner_parsed);

    let user_count = reader.read_varint()? as usize;
    let mut user_hashes = Vec::with_capacity(user_count);
    for _ in 0..user_count {
        user_hashes.push(hex::encode(reader.read_hash()?));
    }
    if !reader.is_empty() {
        return Err(Error::Codec("trailing bytes after block".to_string()));
    }
    if user_count != raw.transactions.len() {
        return Err(Error::Codec(format!(
            "block lists {} transactions but {} blobs were supplied",
            user_count,
            raw.transactions.len()
        )));
    }

    // The supplied blobs may arrive in any order; match them to the
    // block's listing by hash.
    let mut decoded = std::collections::HashMap::with_capacity(user_count);
    for (position, blob) in raw.transactions.iter().enumerate() {
        let tx = decode_transaction(blob).map_err(|e| {
            Error::Codec(format!("transaction {} failed to decode: {}", position, e))
        })?;
        decoded.insert(tx.hash.clone(), tx);
    }

    let mut transactions = Vec::with_capacity(user_count + 1);
    transactions.push(miner);
    for hash in &user_hashes {
        let tx = decoded.remove(hash).ok_or_else(|| {
            Error::Codec(format!("block lists transaction {} but no blob matches", hash))
        })?;
        transactions.push(tx);
    }

    Ok(DecodedBlock {
        hash: hash_blob(&raw.block),
        height,
        timestamp,
        major_version,
        minor_version,
        nonce,
        prev_hash,
        blob: raw.block.clone(),
        transactions,
    })
}

fn hash_from_hex(value: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(value).map_err(|e| Error::Codec(format!("bad hash hex: {}", e)))?;
    bytes
        .try_into()
        .map_err(|_| Error::Codec("hash must be 32 bytes".to_string()))
}

/// Serialize a transaction body. The inverse of [`decode_transaction`];
/// used by tooling and tests to construct envelopes.
pub fn encode_transaction(
    unlock_time: u64,
    inputs: &[TxInput],
    outputs: &[TxOutput],
    public_key: Option<&str>,
    payment_id: Option<&str>,
) -> Result<Vec<u8>> {
    let mut w = Writer::new();
    w.write_u8(1); // version
    w.write_varint(unlock_time);

    w.write_varint(inputs.len() as u64);
    for input in inputs {
        match input {
            TxInput::Coinbase { block_index } => {
                w.write_u8(INPUT_TAG_COINBASE);
                w.write_varint(*block_index);
            }
            TxInput::Key {
                amount,
                key_image,
                key_offsets,
            } => {
                w.write_u8(INPUT_TAG_KEY);
                w.write_varint(*amount);
                w.write_varint(key_offsets.len() as u64);
                for offset in key_offsets {
                    w.write_varint(*offset);
                }
                w.write_hash(&hash_from_hex(key_image)?);
            }
        }
    }

    w.write_varint(outputs.len() as u64);
    for output in outputs {
        match output {
            TxOutput::Key { amount, key } => {
                w.write_u8(OUTPUT_TAG_KEY);
                w.write_varint(*amount);
                w.write_hash(&hash_from_hex(key)?);
            }
        }
    }

    let mut extra = Writer::new();
    if let Some(key) = public_key {
        extra.write_u8(EXTRA_TAG_PUBKEY);
        extra.write_hash(&hash_from_hex(key)?);
    }
    if let Some(id) = payment_id {
        extra.write_u8(EXTRA_TAG_NONCE);
        extra.write_varint(33);
        extra.write_u8(EXTRA_NONCE_PAYMENT_ID);
        extra.write_hash(&hash_from_hex(id)?);
    }
    let extra = extra.into_inner();
    w.write_varint(extra.len() as u64);
    w.write_bytes(&extra);

    Ok(w.into_inner())
}

/// Serialize a block blob around an already-encoded miner transaction.
pub fn encode_block(
    major_version: u8,
    minor_version: u8,
    height: u64,
    timestamp: u64,
    prev_hash: &str,
    nonce: u32,
    miner_blob: &[u8],
    user_tx_hashes: &[String],
) -> Result<Vec<u8>> {
    let mut w = Writer::new();
    w.write_u8(major_version);
    w.write_u8(minor_version);
    w.write_varint(height);
    w.write_varint(timestamp);
    w.write_hash(&hash_from_hex(prev_hash)?);
    w.write_u32_le(nonce);
    w.write_bytes(miner_blob);
    w.write_varint(user_tx_hashes.len() as u64);
    for hash in user_tx_hashes {
        w.write_hash(&hash_from_hex(hash)?);
    }
    Ok(w.into_inner())
}
