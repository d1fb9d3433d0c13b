//! Block model, proof-of-work, and the handful of single-block checks
//! (Merkle root, proof-of-work threshold) that don't need chain context.
//! Chain linkage and fork resolution live in `ledger.rs`.

use serde::{Deserialize, Serialize};

use crate::crypto::{canonical_json, double_sha256, merkle_root};
use crate::error::ErrorKind;
use crate::transaction::{format_timestamp, Transaction, TxHash};

/// Either a genuine previous-block hash, or the genesis marker, serialized
/// as the literal JSON integer `0` for the chain's first block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum PrevBlockHash {
    Genesis(u8),
    Hash(TxHash),
}

impl PrevBlockHash {
    pub fn genesis() -> Self {
        PrevBlockHash::Genesis(0)
    }

    pub fn of(hash: TxHash) -> Self {
        PrevBlockHash::Hash(hash)
    }

    /// The textual form used inside the proof-of-work and block-hash
    /// preimages: `"0"` for genesis, the hash itself otherwise.
    pub fn as_preimage_str(&self) -> String {
        match self {
            PrevBlockHash::Genesis(_) => "0".to_string(),
            PrevBlockHash::Hash(hash) => hash.clone(),
        }
    }

    pub fn as_hash(&self) -> Option<&str> {
        match self {
            PrevBlockHash::Hash(hash) => Some(hash),
            PrevBlockHash::Genesis(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlockHeader {
    pub timestamp: String,
    pub hash_prev_block: PrevBlockHash,
    pub hash_merkle_root: TxHash,
    pub nonce: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Block {
    pub header: BlockHeader,
    pub tx: Vec<Transaction>,
}

/// Computes the Merkle root over a block's ordered transaction hashes.
pub fn compute_merkle_root(transactions: &[Transaction]) -> TxHash {
    let hashes: Vec<TxHash> = transactions.iter().map(|t| t.hash.clone()).collect();
    merkle_root(&hashes)
}

/// Double-SHA-256 over the canonical serialization of a whole block
/// (header + tx). This is what the *next* block's `hash_prev_block` points at.
pub fn hash_block(block: &Block) -> Result<TxHash, ErrorKind> {
    Ok(double_sha256(&canonical_json(block)?))
}

/// Does `header`'s digest begin with `prefix` (a run of hex zero characters)?
/// `double_sha256(str(timestamp) ++ hash_prev_block ++ hash_merkle_root ++ str(nonce))`.
pub fn valid_proof(header: &BlockHeader, prefix: &str) -> bool {
    let preimage = format!(
        "{}{}{}{}",
        header.timestamp,
        header.hash_prev_block.as_preimage_str(),
        header.hash_merkle_root,
        header.nonce
    );
    double_sha256(&preimage).starts_with(prefix)
}

/// Searches for a nonce satisfying the proof-of-work threshold and returns
/// the assembled block. `timestamp` and `hash_merkle_root` are fixed before
/// the search begins, matching the reference mining loop (nonce is the only
/// field that varies across iterations).
pub fn mine_block(
    hash_prev_block: PrevBlockHash,
    timestamp: String,
    transactions: Vec<Transaction>,
    pow_prefix: &str,
) -> Block {
    let hash_merkle_root = compute_merkle_root(&transactions);
    let mut header = BlockHeader {
        timestamp,
        hash_prev_block,
        hash_merkle_root,
        nonce: 0,
    };

    while !valid_proof(&header, pow_prefix) {
        header.nonce += 1;
    }

    Block {
        header,
        tx: transactions,
    }
}

/// Checks the parts of block validity that don't require chain context:
/// the Merkle root matches the transaction list, and proof-of-work holds.
/// Prev-block linkage and genesis trust are the caller's (`ledger.rs`)
/// responsibility, since they depend on the local tip.
pub fn verify_block_header(block: &Block, pow_prefix: &str) -> Result<(), ErrorKind> {
    if !valid_proof(&block.header, pow_prefix) {
        return Err(ErrorKind::InvalidProofOfWork);
    }

    let recomputed_root = compute_merkle_root(&block.tx);
    if recomputed_root != block.header.hash_merkle_root {
        return Err(ErrorKind::MerkleMismatch);
    }

    Ok(())
}

/// Builds the chain's genesis block: a single coinbase transaction paying
/// `reward` units to `miner_address`, mined against the genesis marker.
pub fn genesis_block(
    miner_address: String,
    reward: u64,
    timestamp_secs: f64,
    pow_prefix: &str,
) -> Result<Block, ErrorKind> {
    let coinbase = Transaction::new(
        format_timestamp(timestamp_secs),
        vec![],
        vec![crate::transaction::TransactionOutput {
            n: 0,
            recipient: miner_address,
            value: reward,
        }],
    )?;

    Ok(mine_block(
        PrevBlockHash::genesis(),
        format_timestamp(timestamp_secs),
        vec![coinbase],
        pow_prefix,
    ))
}
