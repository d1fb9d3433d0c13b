//! Ledger tunables, loaded from TOML the way `zebrad` loads its own
//! configuration, with a `Default` matching the spec's literal constants
//! so the engine runs with zero configuration.

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Leading hex characters a block header's digest must match.
    pub pow_prefix: String,
    /// Units paid to a miner by a coinbase transaction, and the ceiling
    /// enforced on any coinbase's first output.
    pub coinbase_reward: u64,
    /// Largest wire message this node will decode; see `protocol::decode_message`.
    pub max_message_size: usize,
    /// Whether `Ledger::resolve_conflicts` may adopt a fork candidate's
    /// genesis outright when this node has no chain of its own yet,
    /// rather than refusing to fork-resolve until a genesis is
    /// established locally (via `receive_block`/`mine`).
    pub trust_first_seen_genesis: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            pow_prefix: "0000".to_string(),
            coinbase_reward: 20,
            max_message_size: 4096,
            trust_first_seen_genesis: true,
        }
    }
}

impl Config {
    /// Parses a TOML document, filling in defaults for any field it omits.
    pub fn from_toml_str(contents: &str) -> Result<Self, ErrorKind> {
        toml::from_str(contents).map_err(|e| ErrorKind::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_the_spec_literal_constants() {
        let config = Config::default();
        assert_eq!(config.pow_prefix, "0000");
        assert_eq!(config.coinbase_reward, 20);
        assert_eq!(config.max_message_size, 4096);
        assert!(config.trust_first_seen_genesis);
    }

    #[test]
    fn partial_toml_fills_remaining_fields_from_default() {
        let config = Config::from_toml_str("coinbase_reward = 50\n").unwrap();
        assert_eq!(config.coinbase_reward, 50);
        assert_eq!(config.pow_prefix, "0000");
    }
}
