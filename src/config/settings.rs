use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::env;
use std::sync::RwLock;

pub static GLOBAL_CONFIG: Lazy<Config> = Lazy::new(Config::new);

/// The central node doubles as the default address when NODE_ID is unset.
static DEFAULT_NODE_ADDR: &str = "127.0.0.1:2001";

const NODE_ADDRESS_KEY: &str = "NODE_ADDRESS";
const MINING_ADDRESS_KEY: &str = "MINING_ADDRESS";
const NODE_ID_KEY: &str = "NODE_ID";

/// Process-wide configuration. `NODE_ID` selects the listening port
/// (`127.0.0.1:<NODE_ID>`) and the per-node database and wallet file
/// suffixes; the mining address is set at `startnode` time.
pub struct Config {
    inner: RwLock<HashMap<String, String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Config {
        let mut map = HashMap::new();

        if let Ok(node_id) = env::var(NODE_ID_KEY) {
            map.insert(
                String::from(NODE_ADDRESS_KEY),
                format!("127.0.0.1:{node_id}"),
            );
            map.insert(String::from(NODE_ID_KEY), node_id);
        } else {
            map.insert(
                String::from(NODE_ADDRESS_KEY),
                String::from(DEFAULT_NODE_ADDR),
            );
        }

        Config {
            inner: RwLock::new(map),
        }
    }

    pub fn get_node_addr(&self) -> String {
        let inner = self
            .inner
            .read()
            .expect("config lock poisoned");
        inner
            .get(NODE_ADDRESS_KEY)
            .expect("node address is always present in config")
            .clone()
    }

    pub fn get_node_id(&self) -> Option<String> {
        let inner = self
            .inner
            .read()
            .expect("config lock poisoned");
        inner.get(NODE_ID_KEY).cloned()
    }

    pub fn set_mining_addr(&self, addr: String) {
        let mut inner = self
            .inner
            .write()
            .expect("config lock poisoned");
        inner.insert(String::from(MINING_ADDRESS_KEY), addr);
    }

    pub fn get_mining_addr(&self) -> Option<String> {
        let inner = self
            .inner
            .read()
            .expect("config lock poisoned");
        inner.get(MINING_ADDRESS_KEY).cloned()
    }

    pub fn is_miner(&self) -> bool {
        let inner = self
            .inner
            .read()
            .expect("config lock poisoned");
        inner.contains_key(MINING_ADDRESS_KEY)
    }
}
