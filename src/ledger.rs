//! The ledger engine: chain, UTXO index, and mempool, plus block
//! assembly, validation, and fork resolution. A `Ledger` owns all three
//! and keeps them mutually consistent; callers needing concurrent access
//! wrap it in `node::Node`.

use tracing::{debug, warn};

use crate::block::{compute_merkle_root, hash_block, valid_proof, Block, PrevBlockHash};
use crate::config::Config;
use crate::crypto::{address_from_public_key_hex, canonical_json, verify};
use crate::error::ErrorKind;
use crate::transaction::{Sender, Transaction, TxHash};
use crate::utxo::{UnspentOutput, UtxoIndex};

#[derive(Debug, Clone)]
pub struct Ledger {
    chain: Vec<Block>,
    utxo: UtxoIndex,
    mempool: Vec<Transaction>,
    config: Config,
}

impl Ledger {
    pub fn new(config: Config) -> Self {
        Ledger {
            chain: Vec::new(),
            utxo: UtxoIndex::new(),
            mempool: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn chain(&self) -> &[Block] {
        &self.chain
    }

    pub fn utxo_snapshot(&self) -> UtxoIndex {
        self.utxo.clone()
    }

    pub fn mempool_snapshot(&self) -> Vec<Transaction> {
        self.mempool.clone()
    }

    pub fn tip_hash(&self) -> Result<PrevBlockHash, ErrorKind> {
        match self.chain.last() {
            Some(block) => Ok(PrevBlockHash::of(hash_block(block)?)),
            None => Ok(PrevBlockHash::genesis()),
        }
    }

    /// Accepts a transaction into the mempool. Structural hash validity is
    /// checked here; ownership/signature/availability against the
    /// committed chain is deferred to UTXO update at block-assembly time,
    /// matching the reference's lazy validation (a later double-spend is
    /// caught when the block including it is built, not at submission).
    pub fn apply_inbound_tx(&mut self, tx: Transaction) -> Result<(), ErrorKind> {
        if let Err(err) = tx.verify_hash() {
            warn!(hash = %tx.hash, error = %err, "rejected transaction with mismatched hash");
            return Err(err);
        }
        debug!(hash = %tx.hash, "accepted transaction into mempool");
        self.mempool.push(tx);
        Ok(())
    }

    /// Snapshot of what the miner needs: the hash the new block's header
    /// must point at, and the transaction list to mine over. Does not
    /// mutate the ledger; the nonce search happens outside any lock the
    /// caller holds.
    ///
    /// The mempool is filtered against the current UTXO before assembly:
    /// a transaction that no longer has a matching unspent output (e.g.
    /// the loser of a double-spend pair already consumed by an earlier
    /// mempool transaction in this same pass) is left out of the block
    /// entirely rather than poisoning the whole batch. This has to happen
    /// here, before the block's Merkle root is fixed — once a block is
    /// assembled and broadcast, `receive_block` validates its transaction
    /// list atomically and rejects the whole block on any single failure,
    /// since silently dropping a transaction after the fact would no
    /// longer match the committed Merkle root.
    pub fn mining_snapshot(&self, miner_address: &str) -> Result<(PrevBlockHash, Vec<Transaction>), ErrorKind> {
        let prev_hash = self.tip_hash()?;
        let coinbase = Transaction::new(
            crate::transaction::format_timestamp(current_timestamp_secs()),
            vec![],
            vec![crate::transaction::TransactionOutput {
                n: 0,
                recipient: miner_address.to_string(),
                value: self.config.coinbase_reward,
            }],
        )?;

        let mut scratch_utxo = self.utxo.clone();
        apply_coinbase(&mut scratch_utxo, &coinbase, self.config.coinbase_reward)?;

        let mut transactions = Vec::with_capacity(self.mempool.len() + 1);
        transactions.push(coinbase);

        for tx in &self.mempool {
            match apply_spend(&mut scratch_utxo, tx) {
                Ok(()) => transactions.push(tx.clone()),
                Err(err) => {
                    debug!(hash = %tx.hash, error = %err, "excluding mempool transaction from mined block");
                }
            }
        }

        Ok((prev_hash, transactions))
    }

    /// Installs a block produced from a [mining_snapshot] result. Rejects
    /// it if the tip moved since the snapshot was taken, so a concurrent
    /// `receive_block` can't be silently overwritten by a stale mine.
    pub fn install_mined_block(&mut self, block: Block, expected_prev: &PrevBlockHash) -> Result<(), ErrorKind> {
        let current_tip = self.tip_hash()?;
        if &current_tip != expected_prev {
            return Err(ErrorKind::PrevBlockMismatch);
        }
        self.receive_block(block)
    }

    /// Accepts an inbound block: validates proof-of-work, chain linkage,
    /// Merkle root, and every transaction in it, then commits atomically.
    /// On any failure the ledger is left exactly as it was.
    pub fn receive_block(&mut self, block: Block) -> Result<(), ErrorKind> {
        if !valid_proof(&block.header, &self.config.pow_prefix) {
            warn!("rejected block: proof-of-work invalid");
            return Err(ErrorKind::InvalidProofOfWork);
        }

        let recomputed_root = compute_merkle_root(&block.tx);
        if recomputed_root != block.header.hash_merkle_root {
            warn!("rejected block: merkle root mismatch");
            return Err(ErrorKind::MerkleMismatch);
        }

        if !self.chain.is_empty() {
            let expected_prev = self.tip_hash()?;
            if block.header.hash_prev_block != expected_prev {
                warn!("rejected block: hash_prev_block does not match local tip");
                return Err(ErrorKind::PrevBlockMismatch);
            }
        }

        let mut candidate_utxo = self.utxo.clone();
        if let Err(err) = apply_tx_list(&mut candidate_utxo, &block.tx, self.config.coinbase_reward) {
            warn!(error = %err, "rejected block: transaction list invalid");
            return Err(err);
        }

        let included_hashes: Vec<&TxHash> = block.tx.iter().map(|tx| &tx.hash).collect();
        self.mempool
            .retain(|pending| !included_hashes.contains(&&pending.hash));

        self.utxo = candidate_utxo;
        self.chain.push(block);
        Ok(())
    }

    /// Structural validation of a candidate chain, independent of the
    /// locally held one: prev-hash linkage, Merkle roots, and
    /// proof-of-work for every block at index ≥ 1. The genesis block is
    /// never checked by this routine; it is trusted as the network's
    /// shared root.
    pub fn valid_chain(chain: &[Block], pow_prefix: &str) -> bool {
        for i in 1..chain.len() {
            let block = &chain[i];
            let prev_hash = match hash_block(&chain[i - 1]) {
                Ok(hash) => hash,
                Err(_) => return false,
            };

            if block.header.hash_prev_block.as_hash() != Some(prev_hash.as_str()) {
                return false;
            }

            if compute_merkle_root(&block.tx) != block.header.hash_merkle_root {
                return false;
            }

            if !valid_proof(&block.header, pow_prefix) {
                return false;
            }
        }
        true
    }

    /// Replaces the local chain with `candidate` iff it is longer, passes
    /// [valid_chain], shares the same genesis as the local chain (when
    /// non-empty), and every one of its transaction lists replays cleanly
    /// into a fresh UTXO index. Returns whether the replacement happened.
    ///
    /// `valid_chain` never checks block 0 (§9's design note), so whatever
    /// genesis a fork candidate carries is trusted outright unless the
    /// local chain already has one to compare against. When the local
    /// chain is empty, `Config::trust_first_seen_genesis` decides whether
    /// that trust extends to fork resolution too: left at its default
    /// (`true`), the first candidate's genesis is adopted as-is, matching
    /// the network's historical behavior; set to `false`, a node with no
    /// committed genesis of its own refuses to adopt one via fork
    /// resolution at all — it must first learn a genesis through
    /// `receive_block`/`mine`, which don't go through this genesis check.
    pub fn resolve_conflicts(&mut self, candidate: Vec<Block>) -> Result<bool, ErrorKind> {
        if candidate.len() <= self.chain.len() {
            return Ok(false);
        }

        if !Self::valid_chain(&candidate, &self.config.pow_prefix) {
            return Ok(false);
        }

        match self.chain.first() {
            Some(local_genesis) => {
                if Some(local_genesis) != candidate.first() {
                    return Err(ErrorKind::UnknownGenesis);
                }
            }
            None if !self.config.trust_first_seen_genesis => {
                return Err(ErrorKind::UnknownGenesis);
            }
            None => {}
        }

        let mut replayed_utxo = UtxoIndex::new();
        for block in &candidate {
            apply_tx_list(&mut replayed_utxo, &block.tx, self.config.coinbase_reward)?;
        }

        debug!(new_len = candidate.len(), old_len = self.chain.len(), "replacing chain after fork resolution");
        self.chain = candidate;
        self.utxo = replayed_utxo;
        Ok(true)
    }
}

/// Validates a block's transaction list against `utxo` and mutates it in
/// place to reflect the spends/creations, following `valid_tx_list` +
/// "UTXO update" from the design notes. `utxo` is caller-owned so a
/// failed validation never touches the ledger's real index: callers pass
/// a clone and only commit it once this returns `Ok`. Atomic across the
/// whole list: a block's Merkle root is already fixed by the time this
/// runs, so a single invalid transaction invalidates the entire block
/// rather than being silently dropped (contrast with [Ledger::mining_snapshot],
/// which filters the mempool before the block is assembled).
fn apply_tx_list(utxo: &mut UtxoIndex, transactions: &[Transaction], coinbase_reward: u64) -> Result<(), ErrorKind> {
    for (index, tx) in transactions.iter().enumerate() {
        if index == 0 {
            apply_coinbase(utxo, tx, coinbase_reward)?;
        } else {
            apply_spend(utxo, tx)?;
        }
    }

    Ok(())
}

/// Validates and applies a coinbase transaction (list index 0): hash
/// matches recomputation, no inputs, reward within `coinbase_reward`.
fn apply_coinbase(utxo: &mut UtxoIndex, tx: &Transaction, coinbase_reward: u64) -> Result<(), ErrorKind> {
    tx.verify_hash()?;

    if !tx.inputs.is_empty() {
        return Err(ErrorKind::CoinbaseHasInputs);
    }
    let total: u64 = tx.outputs.iter().map(|o| o.value).sum();
    if total > coinbase_reward {
        return Err(ErrorKind::CoinbaseOverReward(total));
    }

    insert_outputs(utxo, tx, Sender::coinbase());
    Ok(())
}

/// Validates and applies a non-coinbase transaction: hash matches
/// recomputation, every input's referenced output still exists in `utxo`
/// and is owned by the input's public key, every input's signature
/// verifies over `canonical_json(prev_out)`, and inputs cover outputs.
fn apply_spend(utxo: &mut UtxoIndex, tx: &Transaction) -> Result<(), ErrorKind> {
    tx.verify_hash()?;

    let mut input_sum: u64 = 0;

    for (n, input) in tx.inputs.iter().enumerate() {
        let referenced = utxo
            .get(&input.prev_out.hash, input.prev_out.n)
            .cloned()
            .ok_or_else(|| ErrorKind::UnknownUtxo(input.prev_out.hash.clone(), input.prev_out.n))?;

        let derived_address = address_from_public_key_hex(&input.public_key);
        if derived_address != referenced.to {
            return Err(ErrorKind::OwnershipMismatch(tx.hash.clone(), n));
        }

        let preimage = canonical_json(&input.prev_out)?;
        if !verify(&input.public_key, &preimage, &input.sig) {
            return Err(ErrorKind::SignatureInvalid(tx.hash.clone(), n));
        }

        input_sum += referenced.value;
    }

    let output_sum: u64 = tx.outputs.iter().map(|o| o.value).sum();
    if input_sum < output_sum {
        return Err(ErrorKind::InsufficientInputs(input_sum, output_sum));
    }

    for input in &tx.inputs {
        utxo.remove(&input.prev_out)?;
    }

    insert_outputs(utxo, tx, Sender::address(address_from_public_key_hex(&tx.inputs[0].public_key)));
    Ok(())
}

fn insert_outputs(utxo: &mut UtxoIndex, tx: &Transaction, from: Sender) {
    let new_outputs: Vec<UnspentOutput> = tx
        .outputs
        .iter()
        .map(|output| UnspentOutput {
            n: output.n,
            from: from.clone(),
            to: output.recipient.clone(),
            value: output.value,
        })
        .collect();

    utxo.insert(tx.hash.clone(), new_outputs);
}

/// Current wall-clock time in fractional seconds since epoch. Kept as a
/// thin seam so tests can fix the clock; production callers get real time.
fn current_timestamp_secs() -> f64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the Unix epoch")
        .as_secs_f64()
}
