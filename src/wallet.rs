//! Account/Wallet: holds a single signing key, derives its address, and
//! builds signed, hashed transactions against a UTXO snapshot handed to
//! it by the caller. The wallet never touches the ledger directly.

use k256::ecdsa::SigningKey;
use rand_core::OsRng;

use crate::crypto::{address_from_public_key_hex, canonical_json, decode_public_key, encode_public_key, sign};
use crate::error::ErrorKind;
use crate::transaction::{format_timestamp, PrevOut, Transaction, TransactionInput, TransactionOutput};
use crate::utxo::UtxoIndex;

pub struct Wallet {
    signing_key: SigningKey,
    public_key_hex: String,
    address: String,
}

impl Wallet {
    /// Generates a fresh secp256k1 keypair and derives its address.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut OsRng);
        Self::from_signing_key(signing_key)
    }

    /// Restores a wallet from previously generated key material. The
    /// ledger never reads or writes private keys; persisting them is the
    /// collaborator's responsibility.
    pub fn from_private_key_hex(private_key_hex: &str) -> Result<Self, ErrorKind> {
        let bytes = hex::decode(private_key_hex).map_err(|e| ErrorKind::Serialization(e.to_string()))?;
        let signing_key =
            SigningKey::from_slice(&bytes).map_err(|e| ErrorKind::Serialization(e.to_string()))?;
        Ok(Self::from_signing_key(signing_key))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = *signing_key.verifying_key();
        let public_key_hex = encode_public_key(&verifying_key);
        let address = address_from_public_key_hex(&public_key_hex);
        Wallet {
            signing_key,
            public_key_hex,
            address,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn public_key_hex(&self) -> &str {
        &self.public_key_hex
    }

    pub fn private_key_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// Total value of, and the individual `(tx_hash, n, value)` records
    /// behind, every unspent output addressed to this wallet.
    pub fn balance_and_records(&self, utxo: &UtxoIndex) -> (u64, Vec<(String, usize, u64)>) {
        let records = utxo.records_for(&self.address);
        let total = records.iter().map(|(_, _, value)| value).sum();
        (total, records)
    }

    /// Builds a signed transaction paying `amount` to `destination` out of
    /// this wallet's unspent outputs, with change returned to itself.
    /// Greedily consumes records in order until the accumulated value
    /// covers `amount`.
    pub fn transfer(&self, destination: &str, amount: u64, utxo: &UtxoIndex) -> Result<Transaction, ErrorKind> {
        if amount == 0 {
            return Err(ErrorKind::NonPositiveAmount(0));
        }

        let (total, records) = self.balance_and_records(utxo);
        if total < amount {
            return Err(ErrorKind::InsufficientBalance(total, amount));
        }

        let mut accumulated = 0u64;
        let mut chosen = Vec::new();
        for record in records {
            if accumulated >= amount {
                break;
            }
            accumulated += record.2;
            chosen.push(record);
        }

        let inputs = chosen
            .iter()
            .map(|(hash, n, _value)| self.sign_input(hash.clone(), *n))
            .collect();

        let mut outputs = vec![TransactionOutput {
            n: 0,
            recipient: destination.to_string(),
            value: amount,
        }];

        if accumulated > amount {
            outputs.push(TransactionOutput {
                n: 1,
                recipient: self.address.clone(),
                value: accumulated - amount,
            });
        }

        Transaction::new(format_timestamp(current_timestamp_secs()), inputs, outputs)
    }

    fn sign_input(&self, tx_hash: String, n: usize) -> TransactionInput {
        let prev_out = PrevOut { hash: tx_hash, n };
        let preimage = canonical_json(&prev_out).expect("PrevOut always serializes");
        let sig = sign(&self.signing_key, &preimage);
        TransactionInput {
            prev_out,
            public_key: self.public_key_hex.clone(),
            sig,
        }
    }
}

/// Confirms `public_key_hex` parses as a point on the curve this crate uses.
pub fn is_valid_public_key(public_key_hex: &str) -> bool {
    decode_public_key(public_key_hex).is_some()
}

fn current_timestamp_secs() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the Unix epoch")
        .as_secs_f64()
}
