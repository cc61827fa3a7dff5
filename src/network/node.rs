use std::sync::RwLock;

/// The known-peer list. Seeded with the central node and grown whenever
/// a `version` message arrives from a new sender; peers that refuse a
/// dial are evicted. Shared across handler threads.
pub struct Nodes {
    inner: RwLock<Vec<String>>,
}

impl Default for Nodes {
    fn default() -> Self {
        Self::new()
    }
}

impl Nodes {
    pub fn new() -> Nodes {
        Nodes {
            inner: RwLock::new(vec![]),
        }
    }

    pub fn add_node(&self, addr: String) {
        let mut inner = self.inner.write().expect("known-nodes lock poisoned");
        if !inner.iter().any(|known| known == &addr) {
            inner.push(addr);
        }
    }

    pub fn evict_node(&self, addr: &str) {
        let mut inner = self.inner.write().expect("known-nodes lock poisoned");
        if let Some(idx) = inner.iter().position(|known| known == addr) {
            inner.remove(idx);
        }
    }

    pub fn node_is_known(&self, addr: &str) -> bool {
        let inner = self.inner.read().expect("known-nodes lock poisoned");
        inner.iter().any(|known| known == addr)
    }

    pub fn get_nodes(&self) -> Vec<String> {
        let inner = self.inner.read().expect("known-nodes lock poisoned");
        inner.clone()
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read().expect("known-nodes lock poisoned");
        inner.len()
    }

    pub fn is_empty(&self) -> bool {
        let inner = self.inner.read().expect("known-nodes lock poisoned");
        inner.is_empty()
    }
}
