//! Minimal demonstration binary wiring `flatchain_core` to stdin/stdout.
//!
//! This is deliberately not the operator CLI / interactive menu the spec
//! calls out as an external collaborator — there is no account
//! persistence, no peer list, no pretty-printed chain dumps. It exists so
//! the engine can be exercised by hand: a wallet lives only for the
//! process lifetime, transfers and mining operate on one in-memory
//! `Node`, and every line of output is a `tracing` event rather than
//! formatted state.

use std::io::{self, BufRead, Write};

use flatchain_core::config::Config;
use flatchain_core::ledger::Ledger;
use flatchain_core::node::Node;
use flatchain_core::wallet::Wallet;

fn main() {
    tracing_subscriber::fmt::init();

    let node = Node::new(Ledger::new(Config::default()));
    let wallet = Wallet::generate();

    println!("generated wallet with address {}", wallet.address());
    println!("commands: balance | mine | transfer <address> <amount> | chain | mempool | exit");

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        let words: Vec<&str> = line.split_whitespace().collect();

        match words.as_slice() {
            ["balance"] => {
                let (total, records) = wallet.balance_and_records(&node.utxo_snapshot());
                println!("balance: {}", total);
                for (hash, n, value) in records {
                    println!("  {}:{} -> {}", hash, n, value);
                }
            }
            ["mine"] => match node.mine(&wallet) {
                Ok(Some(block)) => println!("mined block with {} transactions", block.tx.len()),
                Ok(None) => println!("mining lost the race to a concurrent block; retry"),
                Err(err) => println!("mining failed: {}", err),
            },
            ["transfer", destination, amount] => {
                let amount: u64 = match amount.parse() {
                    Ok(value) => value,
                    Err(_) => {
                        println!("amount must be a non-negative integer");
                        continue;
                    }
                };
                match wallet.transfer(destination, amount, &node.utxo_snapshot()) {
                    Ok(tx) => match node.apply_inbound_tx(tx.clone()) {
                        Ok(()) => println!("queued transaction {}", tx.hash),
                        Err(err) => println!("rejected: {}", err),
                    },
                    Err(err) => println!("could not build transaction: {}", err),
                }
            }
            ["chain"] => println!("chain height: {}", node.chain_snapshot().len()),
            ["mempool"] => println!("pending transactions: {}", node.mempool_snapshot().len()),
            #[cfg(feature = "debug")]
            ["utxo"] => {
                for (hash, outputs) in node.utxo_snapshot().iter() {
                    println!("{}: {:?}", hash, outputs);
                }
            }
            ["exit"] => break,
            [] => {}
            _ => println!("unrecognized command"),
        }

        print!("> ");
        io::stdout().flush().ok();
    }
}
