//! Shared helpers for the integration tests.

use lumen_chain::core::{Blockchain, Transaction};
use lumen_chain::storage::UTXOSet;
use lumen_chain::wallet::{hash_pub_key, Wallet};
use std::path::Path;

/// A fresh chain in `dir` whose genesis coinbase pays `wallet`.
pub fn create_chain(dir: &Path, wallet: &Wallet) -> Blockchain {
    Blockchain::create_blockchain_with_path(&wallet.get_address(), &dir.join("chain")).unwrap()
}

pub fn coinbase(address: &str, reward: u64) -> Transaction {
    Transaction::new_coinbase_tx(address, vec![], reward).unwrap()
}

pub fn balance(utxo_set: &UTXOSet, wallet: &Wallet) -> u64 {
    utxo_set
        .find_utxo(&hash_pub_key(wallet.get_public_key()))
        .unwrap()
        .iter()
        .map(|out| out.get_value())
        .sum()
}
