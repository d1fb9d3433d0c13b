//! Transaction model and the canonical hash/sign preimages that tie it
//! together. A `Transaction` is an immutable value once constructed: its
//! `hash` field is computed once at construction time and carried
//! alongside it rather than recomputed from scratch by every reader.

use serde::{Deserialize, Serialize};

use crate::crypto::{canonical_json, double_sha256};
use crate::error::ErrorKind;

/// Hex-encoded double-SHA-256 digest identifying a transaction or a block.
pub type TxHash = String;

/// 0-based position of an output within its owning transaction's output list.
pub type OutputIndex = usize;

/// Base58 address, or the coinbase marker distinguishing "no spender".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Sender {
    /// The coinbase marker; always serialized as the JSON integer `0`.
    Coinbase(u8),
    Address(String),
}

impl Sender {
    pub fn coinbase() -> Self {
        Sender::Coinbase(0)
    }

    pub fn address(address: String) -> Self {
        Sender::Address(address)
    }

    pub fn as_address(&self) -> Option<&str> {
        match self {
            Sender::Address(addr) => Some(addr),
            Sender::Coinbase(_) => None,
        }
    }
}

/// Reference to a previously produced output, as consumed by an input.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PrevOut {
    pub hash: TxHash,
    pub n: OutputIndex,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionInput {
    pub prev_out: PrevOut,
    /// Hex encoding of the spender's public key, in this crate's
    /// point-without-format-byte representation (see `crypto::encode_public_key`).
    pub public_key: String,
    /// Hex ECDSA signature over `canonical_json(prev_out)`.
    pub sig: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionOutput {
    pub n: OutputIndex,
    pub recipient: String,
    pub value: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub hash: TxHash,
    /// Seconds since epoch. Stored as the exact string used in the hash
    /// preimage, since a parsed-then-reformatted float can drift from the
    /// bits that were actually hashed.
    pub timestamp: String,
    #[serde(rename = "in")]
    pub inputs: Vec<TransactionInput>,
    #[serde(rename = "out")]
    pub outputs: Vec<TransactionOutput>,
}

/// Formats a Unix timestamp (seconds) the way this crate's hash preimages
/// expect: a decimal point is always present, matching the textual shape
/// of a floating-point seconds-since-epoch value.
pub fn format_timestamp(seconds: f64) -> String {
    let rendered = format!("{}", seconds);
    if rendered.contains('.') || rendered.contains('e') || rendered.contains('E') {
        rendered
    } else {
        format!("{}.0", rendered)
    }
}

/// Computes `double_sha256(str(timestamp) ++ canonical_json(inputs) ++ canonical_json(outputs))`.
pub fn hash_transaction(
    timestamp: &str,
    inputs: &[TransactionInput],
    outputs: &[TransactionOutput],
) -> Result<TxHash, ErrorKind> {
    let preimage = format!(
        "{}{}{}",
        timestamp,
        canonical_json(inputs)?,
        canonical_json(outputs)?
    );
    Ok(double_sha256(&preimage))
}

impl Transaction {
    /// Builds a transaction from its constituent fields, computing `hash`
    /// from the exact `timestamp`/`inputs`/`outputs` passed in.
    pub fn new(
        timestamp: String,
        inputs: Vec<TransactionInput>,
        outputs: Vec<TransactionOutput>,
    ) -> Result<Self, ErrorKind> {
        let hash = hash_transaction(&timestamp, &inputs, &outputs)?;
        Ok(Transaction {
            hash,
            timestamp,
            inputs,
            outputs,
        })
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Recomputes the hash from this transaction's own fields and compares
    /// it to the stored `hash`, catching any tampering in transit.
    pub fn verify_hash(&self) -> Result<(), ErrorKind> {
        let recomputed = hash_transaction(&self.timestamp, &self.inputs, &self.outputs)?;
        if recomputed == self.hash {
            Ok(())
        } else {
            Err(ErrorKind::TxHashMismatch(self.hash.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_timestamp_always_has_a_decimal_point() {
        assert_eq!(format_timestamp(1700000000.0), "1700000000.0");
        assert_eq!(format_timestamp(1700000000.5), "1700000000.5");
    }

    #[test]
    fn coinbase_has_no_inputs() {
        let tx = Transaction::new(
            format_timestamp(1.0),
            vec![],
            vec![TransactionOutput {
                n: 0,
                recipient: "miner-address".to_string(),
                value: 20,
            }],
        )
        .unwrap();
        assert!(tx.is_coinbase());
        assert!(tx.verify_hash().is_ok());
    }

    #[test]
    fn tampering_with_fields_breaks_hash_verification() {
        let mut tx = Transaction::new(
            format_timestamp(1.0),
            vec![],
            vec![TransactionOutput {
                n: 0,
                recipient: "miner-address".to_string(),
                value: 20,
            }],
        )
        .unwrap();
        tx.outputs[0].value = 21;
        assert!(tx.verify_hash().is_err());
    }

    #[test]
    fn sender_coinbase_serializes_as_integer_zero() {
        let json = serde_json::to_string(&Sender::coinbase()).unwrap();
        assert_eq!(json, "0");

        let json = serde_json::to_string(&Sender::address("addr".to_string())).unwrap();
        assert_eq!(json, "\"addr\"");
    }
}
