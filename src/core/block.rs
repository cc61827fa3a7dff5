use crate::core::{MerkleTree, ProofOfWork, Transaction};
use crate::error::{ChainError, Result};
use crate::utils::{current_timestamp, deserialize, serialize, sha256_digest};
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};

/// A block: header fields plus the transaction list. The hash is fixed
/// by the nonce search and never recomputed afterwards; genesis carries
/// an empty `prev_block_hash`.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Block {
    timestamp: i64,
    prev_block_hash: Vec<u8>,
    hash: Vec<u8>,
    nonce: i64,
    height: usize,
    transactions: Vec<Transaction>,
}

impl Block {
    /// Assembles a block at `height`, stamps the current Unix time and
    /// runs the nonce search.
    pub fn new_block(
        transactions: &[Transaction],
        prev_block_hash: Vec<u8>,
        height: usize,
    ) -> Result<Block> {
        if transactions.is_empty() {
            return Err(ChainError::InvalidTx(
                "a block needs at least the coinbase transaction".to_string(),
            ));
        }

        let mut block = Block {
            timestamp: current_timestamp()?,
            prev_block_hash,
            hash: vec![],
            nonce: 0,
            height,
            transactions: transactions.to_vec(),
        };

        let pow = ProofOfWork::new_proof_of_work(block.clone())?;
        let (nonce, hash) = pow.run();
        block.nonce = nonce;
        block.hash = hash;
        Ok(block)
    }

    /// The very first block: height 0, empty previous hash, a single
    /// coinbase transaction.
    pub fn generate_genesis_block(coinbase: &Transaction) -> Result<Block> {
        Block::new_block(&[coinbase.clone()], vec![], 0)
    }

    /// Merkle root over the serialized transactions; consumed by the
    /// proof-of-work pre-image.
    pub fn hash_transactions(&self) -> Result<Vec<u8>> {
        let mut leaves = Vec::with_capacity(self.transactions.len());
        for tx in &self.transactions {
            leaves.push(sha256_digest(&tx.serialize()?));
        }
        MerkleTree::root_from_leaves(&leaves)
    }

    pub fn get_transactions(&self) -> &[Transaction] {
        self.transactions.as_slice()
    }

    pub fn get_prev_block_hash(&self) -> &[u8] {
        self.prev_block_hash.as_slice()
    }

    pub fn get_hash(&self) -> &[u8] {
        self.hash.as_slice()
    }

    pub fn get_hash_hex(&self) -> String {
        HEXLOWER.encode(&self.hash)
    }

    pub fn get_timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn get_height(&self) -> usize {
        self.height
    }

    pub fn get_nonce(&self) -> i64 {
        self.nonce
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Block> {
        deserialize(bytes)
    }

    #[cfg(test)]
    pub fn set_nonce_for_test(&mut self, nonce: i64) {
        self.nonce = nonce;
    }
}
