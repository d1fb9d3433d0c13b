//! Property-based check that the UTXO index's total value only ever
//! grows by exactly one coinbase reward per mined block, no matter what
//! sequence of transfers is interleaved between minings — the ledger
//! never mints or destroys value on a committed transaction.

use proptest::prelude::*;

use flatchain_core::config::Config;
use flatchain_core::ledger::Ledger;
use flatchain_core::node::Node;
use flatchain_core::wallet::Wallet;

fn total_utxo_value(node: &Node) -> u64 {
    node.utxo_snapshot()
        .iter()
        .flat_map(|(_, outputs)| outputs.iter())
        .map(|output| output.value)
        .sum()
}

proptest! {
    #[test]
    fn utxo_total_value_tracks_blocks_mined(transfer_fractions in proptest::collection::vec(1u64..=9, 0..8)) {
        let node = Node::new(Ledger::new(Config::default()));
        let alice = Wallet::generate();
        let bob = Wallet::generate();
        let reward = Config::default().coinbase_reward;
        let mut blocks_mined = 0u64;

        node.mine(&alice).unwrap();
        blocks_mined += 1;

        for fraction in transfer_fractions {
            let utxo = node.utxo_snapshot();
            let (alice_balance, _) = alice.balance_and_records(&utxo);

            if alice_balance > 0 {
                let amount = ((alice_balance * fraction) / 10).clamp(1, alice_balance);
                if let Ok(tx) = alice.transfer(bob.address(), amount, &utxo) {
                    node.apply_inbound_tx(tx).unwrap();
                }
            }

            node.mine(&alice).unwrap();
            blocks_mined += 1;
        }

        prop_assert_eq!(total_utxo_value(&node), reward * blocks_mined);
    }
}
