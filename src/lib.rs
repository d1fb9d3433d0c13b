//! Core of a peer-to-peer cryptocurrency node: a replicated append-only
//! ledger of transactions secured by ECDSA signatures and proof-of-work,
//! maintained across a flat set of gossiping peers that resolve forks by
//! longest-chain.
//!
//! This crate is the ledger engine only. It accepts peer messages
//! ([`protocol::Message`]) and local operator commands ([`wallet::Wallet`],
//! [`node::Node`]) and maintains a consistent chain + UTXO view; it opens
//! no sockets, reads no key material from disk, and prints nothing.
//! Wiring it to an actual transport and an interactive shell is a
//! collaborator's job — see `bin/node.rs` for the thinnest possible one.

pub mod block;
pub mod config;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod node;
pub mod protocol;
pub mod transaction;
pub mod utxo;
pub mod wallet;

pub use error::{ErrorKind, LedgerError, Result};
pub use ledger::Ledger;
pub use node::Node;
