//! The chain itself: blocks, transactions, mining and storage.

pub mod block;
pub mod blockchain;
pub mod merkle;
pub mod monetary;
pub mod proof_of_work;
pub mod transaction;

pub use block::Block;
pub use blockchain::{Blockchain, BlockchainIterator, UnspentOutput, GENESIS_COINBASE_DATA};
pub use merkle::MerkleTree;
pub use monetary::{reward_after, INITIAL_BLOCK_REWARD, REWARD_DECAY_INTERVAL, UNITS_PER_COIN};
pub use proof_of_work::{ProofOfWork, TARGET_BITS};
pub use transaction::{TXInput, TXOutput, Transaction};
