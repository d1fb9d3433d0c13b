use std::error::{self, Error as StdError};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::transaction::{OutputIndex, TxHash};

pub type Result<T> = std::result::Result<T, LedgerError>;

pub type LedgerError = Box<ErrorKind>;

/// The flat error taxonomy the ledger core must distinguish. Every public fallible
/// operation returns one of these instead of panicking or throwing across the crate
/// boundary; the offending block/tx/chain is always discarded and local state left
/// untouched by the caller.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    InvalidProofOfWork,
    PrevBlockMismatch,
    ChainLinkBroken(usize),
    MerkleMismatch,
    TxHashMismatch(TxHash),
    CoinbaseOverReward(u64),
    CoinbaseHasInputs,
    SignatureInvalid(TxHash, usize),
    OwnershipMismatch(TxHash, usize),
    InsufficientInputs(u64, u64),
    InsufficientBalance(u64, u64),
    NonPositiveAmount(i64),
    UnknownGenesis,
    ShorterChain,
    UnknownUtxo(TxHash, OutputIndex),
    Serialization(String),
    MessageTooLarge(usize, usize),
}

impl StdError for ErrorKind {
    fn cause(&self) -> Option<&dyn error::Error> {
        None
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::InvalidProofOfWork => write!(f, "header digest does not meet the proof-of-work threshold"),
            ErrorKind::PrevBlockMismatch => write!(f, "block's hash_prev_block does not match the local tip"),
            ErrorKind::ChainLinkBroken(idx) => write!(f, "chain link broken at index {}", idx),
            ErrorKind::MerkleMismatch => write!(f, "recomputed merkle root does not match the header"),
            ErrorKind::TxHashMismatch(hash) => write!(f, "transaction hash mismatch: {}", hash),
            ErrorKind::CoinbaseOverReward(amount) => write!(f, "coinbase pays {} units, more than the 20-unit reward", amount),
            ErrorKind::CoinbaseHasInputs => write!(f, "coinbase transaction carries one or more inputs"),
            ErrorKind::SignatureInvalid(hash, n) => write!(f, "signature invalid for input {} of transaction {}", n, hash),
            ErrorKind::OwnershipMismatch(hash, n) => write!(f, "public key does not derive the recipient address of output {} of {}", n, hash),
            ErrorKind::InsufficientInputs(input_sum, output_sum) => write!(f, "inputs sum to {}, less than outputs summing to {}", input_sum, output_sum),
            ErrorKind::InsufficientBalance(available, requested) => write!(f, "balance {} is less than requested transfer of {}", available, requested),
            ErrorKind::NonPositiveAmount(amount) => write!(f, "transfer amount {} is not positive", amount),
            ErrorKind::UnknownGenesis => write!(f, "candidate chain's genesis block differs from the local genesis"),
            ErrorKind::ShorterChain => write!(f, "candidate chain is not strictly longer than the local chain"),
            ErrorKind::UnknownUtxo(hash, n) => write!(f, "no unspent output {} of transaction {}", n, hash),
            ErrorKind::Serialization(msg) => write!(f, "canonical serialization failed: {}", msg),
            ErrorKind::MessageTooLarge(size, max) => write!(f, "message of {} bytes exceeds the {}-byte transport limit", size, max),
        }
    }
}

impl From<serde_json::Error> for ErrorKind {
    fn from(err: serde_json::Error) -> Self {
        ErrorKind::Serialization(err.to_string())
    }
}
