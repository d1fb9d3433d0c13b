//! End-to-end scenarios from the ledger's testable-properties list,
//! exercised through the public `Node`/`Ledger`/`Wallet`/`protocol` API
//! rather than any one module's internals.

use flatchain_core::block::compute_merkle_root;
use flatchain_core::config::Config;
use flatchain_core::crypto::sign;
use flatchain_core::ledger::Ledger;
use flatchain_core::node::Node;
use flatchain_core::protocol::Message;
use flatchain_core::transaction::{format_timestamp, PrevOut, Transaction, TransactionInput, TransactionOutput};
use flatchain_core::wallet::Wallet;
use k256::ecdsa::SigningKey;

#[test]
fn single_node_mine_and_spend() {
    let node = Node::new(Ledger::new(Config::default()));
    let alice = Wallet::generate();
    let bob = Wallet::generate();

    node.mine(&alice).unwrap();
    assert_eq!(node.utxo_snapshot().balance_of(alice.address()), 20);

    let tx = alice.transfer(bob.address(), 7, &node.utxo_snapshot()).unwrap();
    node.apply_inbound_tx(tx).unwrap();
    node.mine(&alice).unwrap();

    let utxo = node.utxo_snapshot();
    // 13 change + 20 new reward = 33 for Alice, 7 for Bob.
    assert_eq!(utxo.balance_of(alice.address()), 33);
    assert_eq!(utxo.balance_of(bob.address()), 7);
    assert_eq!(utxo.len(), 3);
}

#[test]
fn double_spend_in_mempool_only_the_first_consumer_survives() {
    let node = Node::new(Ledger::new(Config::default()));
    let alice = Wallet::generate();
    let bob = Wallet::generate();
    let carol = Wallet::generate();

    node.mine(&alice).unwrap();
    let utxo = node.utxo_snapshot();

    let to_bob = alice.transfer(bob.address(), 20, &utxo).unwrap();
    let to_carol = alice.transfer(carol.address(), 20, &utxo).unwrap();

    node.apply_inbound_tx(to_bob).unwrap();
    node.apply_inbound_tx(to_carol).unwrap();
    node.mine(&alice).unwrap();

    let utxo = node.utxo_snapshot();
    assert_eq!(utxo.balance_of(bob.address()), 20);
    assert_eq!(utxo.balance_of(carol.address()), 0);
}

#[test]
fn fork_resolution_adopts_a_strictly_longer_valid_chain_sharing_genesis() {
    let node_x = Node::new(Ledger::new(Config::default()));
    let node_y = Node::new(Ledger::new(Config::default()));
    let miner = Wallet::generate();

    // Shared genesis.
    let genesis = node_x.mine(&miner).unwrap().unwrap();
    node_y.apply_inbound_block(genesis).unwrap();

    // X grows to length 3, Y grows to length 4.
    node_x.mine(&miner).unwrap();
    node_x.mine(&miner).unwrap();

    node_y.mine(&miner).unwrap();
    node_y.mine(&miner).unwrap();
    node_y.mine(&miner).unwrap();

    assert_eq!(node_x.chain_snapshot().len(), 3);
    assert_eq!(node_y.chain_snapshot().len(), 4);

    let outbound = node_x.dispatch(Message::ResponseChain {
        content: node_y.chain_snapshot(),
    });
    assert!(outbound.is_empty());

    assert_eq!(node_x.chain_snapshot(), node_y.chain_snapshot());
    assert_eq!(node_x.utxo_snapshot(), node_y.utxo_snapshot());
}

#[test]
fn shorter_or_equal_candidate_chain_is_rejected() {
    let node_x = Node::new(Ledger::new(Config::default()));
    let miner = Wallet::generate();

    node_x.mine(&miner).unwrap();
    node_x.mine(&miner).unwrap();
    node_x.mine(&miner).unwrap();
    let original = node_x.chain_snapshot();

    let replaced = node_x.replace_chain(original[..2].to_vec()).unwrap();
    assert!(!replaced);
    assert_eq!(node_x.chain_snapshot(), original);
}

#[test]
fn transaction_with_a_signature_over_the_wrong_message_is_rejected() {
    let node = Node::new(Ledger::new(Config::default()));
    let alice = Wallet::generate();
    let bob = Wallet::generate();

    node.mine(&alice).unwrap();
    let utxo = node.utxo_snapshot();
    let (_, records) = alice.balance_and_records(&utxo);
    let (hash, n, value) = records[0].clone();

    // Sign a message that is not `canonical_json(prev_out)`, using Alice's
    // real key (reconstructed from her exported private key hex) so the
    // forged transaction's ownership check still passes and only the
    // signature check can catch it.
    let signing_key = SigningKey::from_slice(&hex::decode(alice.private_key_hex()).unwrap()).unwrap();
    let wrong_sig = sign(&signing_key, "not the prev_out preimage");
    let forged = Transaction::new(
        format_timestamp(2.0),
        vec![TransactionInput {
            prev_out: PrevOut { hash, n },
            public_key: alice.public_key_hex().to_string(),
            sig: wrong_sig,
        }],
        vec![TransactionOutput {
            n: 0,
            recipient: bob.address().to_string(),
            value,
        }],
    )
    .unwrap();

    node.apply_inbound_tx(forged).unwrap(); // hash is internally consistent, so mempool admits it
    let mined = node.mine(&alice).unwrap();
    assert!(mined.is_some());

    // The forged transaction must not have been able to move Alice's funds.
    let utxo = node.utxo_snapshot();
    assert_eq!(utxo.balance_of(bob.address()), 0);
}

#[test]
fn tampering_with_a_transaction_inside_a_block_breaks_merkle_validation() {
    let node = Node::new(Ledger::new(Config::default()));
    let miner = Wallet::generate();

    let genesis = node.mine(&miner).unwrap().unwrap();
    let second = node.mine(&miner).unwrap().unwrap();

    let mut tampered_second = second.clone();
    tampered_second.tx[0].outputs[0].value = 1;
    assert_ne!(
        compute_merkle_root(&tampered_second.tx),
        tampered_second.header.hash_merkle_root
    );

    let pow_prefix = Config::default().pow_prefix;
    assert!(Ledger::valid_chain(&[genesis.clone(), second], &pow_prefix));
    assert!(!Ledger::valid_chain(&[genesis, tampered_second], &pow_prefix));
}

#[test]
fn dispatch_replies_with_a_chain_snapshot_when_a_peer_reports_being_behind() {
    let node = Node::new(Ledger::new(Config::default()));
    let miner = Wallet::generate();

    node.mine(&miner).unwrap();
    node.mine(&miner).unwrap();

    let outbound = node.dispatch(Message::BroadcastBlock {
        content: node.chain_snapshot()[0].clone(),
        index: 0,
    });

    assert_eq!(outbound.len(), 1);
    match &outbound[0] {
        flatchain_core::protocol::OutboundAction::Unicast(Message::ResponseChain { content }) => {
            assert_eq!(content.len(), 2);
        }
        other => panic!("expected a unicast ResponseChain, got {:?}", other),
    }
}

#[test]
fn chain_snapshot_for_a_behind_peer_is_the_full_chain_not_just_its_tail() {
    // A sender broadcasting `index = n` has a chain of length `n` — it has
    // no block at all past position `n - 1`. The reply must therefore
    // carry the whole local chain (including the shared genesis) so the
    // sender's own `resolve_conflicts` can match genesis against genesis,
    // not a tail slice's first element against the sender's true genesis.
    let node = Node::new(Ledger::new(Config::default()));
    let miner = Wallet::generate();

    node.mine(&miner).unwrap();
    node.mine(&miner).unwrap();
    node.mine(&miner).unwrap();
    let local_chain = node.chain_snapshot();
    assert_eq!(local_chain.len(), 3);

    let outbound = node.dispatch(Message::BroadcastBlock {
        content: local_chain[1].clone(),
        index: 1,
    });

    assert_eq!(outbound.len(), 1);
    match &outbound[0] {
        flatchain_core::protocol::OutboundAction::Unicast(Message::ResponseChain { content }) => {
            assert_eq!(content.len(), 3);
            assert_eq!(content[0], local_chain[0]);
        }
        other => panic!("expected a unicast ResponseChain, got {:?}", other),
    }

    // And the sender, starting from its own length-1 chain sharing that
    // genesis, must be able to adopt this reply via `resolve_conflicts`.
    let mut behind_peer = Ledger::new(Config::default());
    behind_peer.receive_block(local_chain[0].clone()).unwrap();
    assert!(behind_peer.resolve_conflicts(local_chain.clone()).unwrap());
    assert_eq!(behind_peer.chain(), local_chain.as_slice());
}

#[test]
fn dispatch_requests_the_chain_when_a_peer_reports_being_ahead() {
    let node = Node::new(Ledger::new(Config::default()));
    let miner = Wallet::generate();
    node.mine(&miner).unwrap();

    let far_future_block = node.chain_snapshot().last().unwrap().clone();
    let outbound = node.dispatch(Message::BroadcastBlock {
        content: far_future_block,
        index: 5,
    });

    assert_eq!(outbound.len(), 1);
    assert!(matches!(
        &outbound[0],
        flatchain_core::protocol::OutboundAction::Broadcast(Message::RequestChain { content: 1 })
    ));
}

