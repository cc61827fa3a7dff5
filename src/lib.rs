//! lumen-chain: a pedagogical UTXO blockchain.
//!
//! A persistent hash-linked block store with a tip pointer, digitally
//! signed UTXO transactions, a derived index of unspent outputs,
//! proof-of-work mining and a small fixed-command TCP peer protocol
//! bootstrapped from a hard-coded seed node.
//!
//! The crate is organized as:
//! - `core`: blocks, transactions, the chain store, Merkle trees and
//!   the nonce search
//! - `wallet`: ECDSA P-256 key pairs and base58 addresses
//! - `storage`: the UTXO index, the transaction pool and the block
//!   download queue
//! - `network`: wire framing and the node server
//! - `utils`: hashing, encodings and the single serialization codec
//! - `cli` / `config`: the command surface and process configuration

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod network;
pub mod storage;
pub mod utils;
pub mod wallet;

pub use crate::cli::{Command, Opt};
pub use crate::config::{Config, GLOBAL_CONFIG};
pub use crate::core::{
    Block, Blockchain, BlockchainIterator, MerkleTree, ProofOfWork, TXInput, TXOutput, Transaction,
    UnspentOutput,
};
pub use crate::error::{ChainError, Result};
pub use crate::network::{send_tx, NodeState, Server, CENTRAL_NODE, TX_POOL_MINING_THRESHOLD};
pub use crate::storage::{BlockInTransit, MemoryPool, UTXOSet};
pub use crate::wallet::{hash_pub_key, validate_address, Wallet, Wallets};
