use crate::core::Transaction;
use data_encoding::HEXLOWER;
use std::collections::HashMap;
use std::sync::RwLock;

/// Transactions received but not yet confirmed, keyed by hex id.
/// Shared across connection handler threads.
pub struct MemoryPool {
    inner: RwLock<HashMap<String, Transaction>>,
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPool {
    pub fn new() -> MemoryPool {
        MemoryPool {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn add(&self, tx: Transaction) {
        let mut pool = self.inner.write().expect("memory pool lock poisoned");
        pool.insert(HEXLOWER.encode(tx.get_id()), tx);
    }

    pub fn get(&self, txid_hex: &str) -> Option<Transaction> {
        let pool = self.inner.read().expect("memory pool lock poisoned");
        pool.get(txid_hex).cloned()
    }

    pub fn contains(&self, txid_hex: &str) -> bool {
        let pool = self.inner.read().expect("memory pool lock poisoned");
        pool.contains_key(txid_hex)
    }

    pub fn remove(&self, txid_hex: &str) {
        let mut pool = self.inner.write().expect("memory pool lock poisoned");
        pool.remove(txid_hex);
    }

    pub fn get_all(&self) -> Vec<Transaction> {
        let pool = self.inner.read().expect("memory pool lock poisoned");
        pool.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        let pool = self.inner.read().expect("memory pool lock poisoned");
        pool.len()
    }

    pub fn is_empty(&self) -> bool {
        let pool = self.inner.read().expect("memory pool lock poisoned");
        pool.is_empty()
    }
}

/// Block hashes advertised by a peer and not yet downloaded. Written by
/// the `inv` handler, drained by the `block` handler.
pub struct BlockInTransit {
    inner: RwLock<Vec<Vec<u8>>>,
}

impl Default for BlockInTransit {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockInTransit {
    pub fn new() -> BlockInTransit {
        BlockInTransit {
            inner: RwLock::new(vec![]),
        }
    }

    pub fn add_blocks(&self, hashes: &[Vec<u8>]) {
        let mut inner = self.inner.write().expect("blocks-in-transit lock poisoned");
        for hash in hashes {
            inner.push(hash.clone());
        }
    }

    pub fn first(&self) -> Option<Vec<u8>> {
        let inner = self.inner.read().expect("blocks-in-transit lock poisoned");
        inner.first().cloned()
    }

    pub fn remove(&self, hash: &[u8]) {
        let mut inner = self.inner.write().expect("blocks-in-transit lock poisoned");
        if let Some(idx) = inner.iter().position(|h| h == hash) {
            inner.remove(idx);
        }
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read().expect("blocks-in-transit lock poisoned");
        inner.len()
    }

    pub fn is_empty(&self) -> bool {
        let inner = self.inner.read().expect("blocks-in-transit lock poisoned");
        inner.is_empty()
    }
}
