use crate::error::{ChainError, Result};
use crate::utils::{deserialize, serialize};
use crate::wallet::Wallet;
use std::collections::HashMap;
use std::env::current_dir;
use std::fs;
use std::path::PathBuf;

/// The on-disk wallet collection, one file per node.
pub struct Wallets {
    wallets: HashMap<String, Wallet>,
    file_path: PathBuf,
}

impl Wallets {
    /// Loads the wallet file for `node_id`, or starts empty when the
    /// node has no wallets yet.
    pub fn new(node_id: &str) -> Result<Wallets> {
        let file_path = current_dir()?.join(format!("wallet_{node_id}.dat"));
        Self::with_path(file_path)
    }

    pub fn with_path(file_path: PathBuf) -> Result<Wallets> {
        let mut wallets = Wallets {
            wallets: HashMap::new(),
            file_path,
        };
        wallets.load_from_file()?;
        Ok(wallets)
    }

    /// Generates a key pair, stores it under its address and saves the
    /// whole collection.
    pub fn create_wallet(&mut self) -> Result<String> {
        let wallet = Wallet::new()?;
        let address = wallet.get_address();
        self.wallets.insert(address.clone(), wallet);
        self.save_to_file()?;
        Ok(address)
    }

    pub fn get_addresses(&self) -> Vec<String> {
        self.wallets.keys().cloned().collect()
    }

    pub fn get_wallet(&self, address: &str) -> Option<&Wallet> {
        self.wallets.get(address)
    }

    fn load_from_file(&mut self) -> Result<()> {
        if !self.file_path.exists() {
            return Ok(());
        }
        let bytes = fs::read(&self.file_path)
            .map_err(|e| ChainError::Wallet(format!("failed to read wallet file: {e}")))?;
        self.wallets = deserialize(&bytes)?;
        Ok(())
    }

    fn save_to_file(&self) -> Result<()> {
        let bytes = serialize(&self.wallets)?;
        fs::write(&self.file_path, bytes)
            .map_err(|e| ChainError::Wallet(format!("failed to write wallet file: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("wallet_test.dat");

        let mut wallets = Wallets::with_path(path.clone()).unwrap();
        let addr_a = wallets.create_wallet().unwrap();
        let addr_b = wallets.create_wallet().unwrap();
        assert_ne!(addr_a, addr_b);

        let reloaded = Wallets::with_path(path).unwrap();
        let mut addresses = reloaded.get_addresses();
        addresses.sort();
        let mut expected = vec![addr_a.clone(), addr_b];
        expected.sort();
        assert_eq!(addresses, expected);

        // the public key point survives the codec round trip
        let original = wallets.get_wallet(&addr_a).unwrap();
        let restored = reloaded.get_wallet(&addr_a).unwrap();
        assert_eq!(original.get_public_key(), restored.get_public_key());
        assert_eq!(restored.get_address(), addr_a);
    }

    #[test]
    fn test_missing_file_starts_empty() {
        let dir = tempdir().unwrap();
        let wallets = Wallets::with_path(dir.path().join("nope.dat")).unwrap();
        assert!(wallets.get_addresses().is_empty());
    }
}
