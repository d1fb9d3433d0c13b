//! The UTXO index: a derived view mapping transaction hash to its
//! still-unspent outputs. Entries are plain value records, never
//! references back into a `Transaction` (committed chain state is
//! treated as immutable once appended).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::transaction::{OutputIndex, PrevOut, Sender, TxHash};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnspentOutput {
    pub n: OutputIndex,
    pub from: Sender,
    pub to: String,
    pub value: u64,
}

/// `TxHash -> [UnspentOutput]`. No key ever maps to an empty list; the
/// key is removed the moment its last output is spent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct UtxoIndex {
    entries: HashMap<TxHash, Vec<UnspentOutput>>,
}

impl UtxoIndex {
    pub fn new() -> Self {
        UtxoIndex {
            entries: HashMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Inserts a freshly produced transaction's outputs under its hash.
    /// Called only once per committed transaction, so an existing key
    /// would indicate a hash collision or a double-insert bug upstream.
    pub fn insert(&mut self, tx_hash: TxHash, outputs: Vec<UnspentOutput>) {
        if outputs.is_empty() {
            return;
        }
        self.entries.insert(tx_hash, outputs);
    }

    /// Removes the single unspent output referenced by `prev_out`,
    /// dropping the tx-hash key entirely once its list is empty.
    /// Unlike a remove-while-iterating loop, this locates the matching
    /// index first and removes it directly, so there is nothing to
    /// invalidate.
    pub fn remove(&mut self, prev_out: &PrevOut) -> Result<UnspentOutput, ErrorKind> {
        let outputs = self
            .entries
            .get_mut(&prev_out.hash)
            .ok_or_else(|| ErrorKind::UnknownUtxo(prev_out.hash.clone(), prev_out.n))?;

        let position = outputs
            .iter()
            .position(|out| out.n == prev_out.n)
            .ok_or_else(|| ErrorKind::UnknownUtxo(prev_out.hash.clone(), prev_out.n))?;

        let removed = outputs.remove(position);

        if outputs.is_empty() {
            self.entries.remove(&prev_out.hash);
        }

        Ok(removed)
    }

    pub fn get(&self, tx_hash: &str, n: OutputIndex) -> Option<&UnspentOutput> {
        self.entries
            .get(tx_hash)
            .and_then(|outputs| outputs.iter().find(|out| out.n == n))
    }

    /// Iterates every unspent output addressed to `address`, in index
    /// iteration order (not ordering-stable across process runs, per the
    /// "implementations MAY define any stable order" clause — wallet
    /// selection only needs a deterministic order given the same index,
    /// which `resolve_conflicts`'s full-replay determinism provides).
    pub fn records_for(&self, address: &str) -> Vec<(TxHash, OutputIndex, u64)> {
        let mut records: Vec<(TxHash, OutputIndex, u64)> = self
            .entries
            .iter()
            .flat_map(|(hash, outputs)| {
                outputs
                    .iter()
                    .filter(|out| out.to == address)
                    .map(move |out| (hash.clone(), out.n, out.value))
            })
            .collect();
        records.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        records
    }

    pub fn balance_of(&self, address: &str) -> u64 {
        self.records_for(address).iter().map(|(_, _, v)| v).sum()
    }

    /// All entries, for full-chain verification and persistence-free
    /// rebuilds from a replayed chain.
    pub fn iter(&self) -> impl Iterator<Item = (&TxHash, &Vec<UnspentOutput>)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removing_last_output_drops_the_key() {
        let mut index = UtxoIndex::new();
        index.insert(
            "tx1".to_string(),
            vec![UnspentOutput {
                n: 0,
                from: Sender::coinbase(),
                to: "addr".to_string(),
                value: 20,
            }],
        );

        assert_eq!(index.len(), 1);
        index
            .remove(&PrevOut {
                hash: "tx1".to_string(),
                n: 0,
            })
            .unwrap();

        assert!(index.is_empty());
        assert!(index.get("tx1", 0).is_none());
    }

    #[test]
    fn removing_unknown_output_is_an_error() {
        let mut index = UtxoIndex::new();
        let err = index
            .remove(&PrevOut {
                hash: "missing".to_string(),
                n: 0,
            })
            .unwrap_err();
        assert_eq!(err, ErrorKind::UnknownUtxo("missing".to_string(), 0));
    }

    #[test]
    fn balance_of_sums_only_matching_address() {
        let mut index = UtxoIndex::new();
        index.insert(
            "tx1".to_string(),
            vec![
                UnspentOutput {
                    n: 0,
                    from: Sender::coinbase(),
                    to: "alice".to_string(),
                    value: 20,
                },
                UnspentOutput {
                    n: 1,
                    from: Sender::coinbase(),
                    to: "bob".to_string(),
                    value: 5,
                },
            ],
        );
        assert_eq!(index.balance_of("alice"), 20);
        assert_eq!(index.balance_of("bob"), 5);
        assert_eq!(index.balance_of("carol"), 0);
    }
}
