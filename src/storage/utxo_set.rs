use crate::core::{Block, Blockchain, TXOutput, UnspentOutput};
use crate::error::{ChainError, Result};
use crate::utils::{deserialize, serialize};
use data_encoding::HEXLOWER;
use sled::Tree;
use std::collections::HashMap;

const UTXO_TREE: &str = "chainstate";

/// Secondary index of unspent outputs, keyed by the id of the
/// transaction that created them. Derived state: a full rebuild from
/// the chain must always reproduce the current content.
pub struct UTXOSet {
    blockchain: Blockchain,
}

impl UTXOSet {
    pub fn new(blockchain: Blockchain) -> UTXOSet {
        UTXOSet { blockchain }
    }

    pub fn get_blockchain(&self) -> &Blockchain {
        &self.blockchain
    }

    fn utxo_tree(&self) -> Result<Tree> {
        Ok(self.blockchain.get_db().open_tree(UTXO_TREE)?)
    }

    /// Greedy coin selection: scans the index and accumulates outputs
    /// locked to `pub_key_hash` until the requested amount is covered
    /// or the index is exhausted. Returns the accumulated value and the
    /// selected output indices grouped by transaction id.
    pub fn find_spendable_outputs(
        &self,
        pub_key_hash: &[u8],
        amount: u64,
    ) -> Result<(u64, HashMap<String, Vec<usize>>)> {
        let mut selected: HashMap<String, Vec<usize>> = HashMap::new();
        let mut accumulated = 0;
        let utxo_tree = self.utxo_tree()?;

        for item in utxo_tree.iter() {
            let (key, value) = item?;
            let txid_hex = HEXLOWER.encode(key.as_ref());
            let outs: Vec<UnspentOutput> = deserialize(value.as_ref())?;

            for unspent in &outs {
                if unspent.output.is_locked_with_key(pub_key_hash) && accumulated < amount {
                    accumulated += unspent.output.get_value();
                    selected
                        .entry(txid_hex.clone())
                        .or_default()
                        .push(unspent.index);
                }
            }
        }
        Ok((accumulated, selected))
    }

    /// Every unspent output locked to `pub_key_hash`; the balance query.
    pub fn find_utxo(&self, pub_key_hash: &[u8]) -> Result<Vec<TXOutput>> {
        let utxo_tree = self.utxo_tree()?;
        let mut utxos = vec![];

        for item in utxo_tree.iter() {
            let (_, value) = item?;
            let outs: Vec<UnspentOutput> = deserialize(value.as_ref())?;
            for unspent in outs {
                if unspent.output.is_locked_with_key(pub_key_hash) {
                    utxos.push(unspent.output);
                }
            }
        }
        Ok(utxos)
    }

    /// Number of transactions with at least one unspent output.
    pub fn count_transactions(&self) -> Result<u64> {
        let utxo_tree = self.utxo_tree()?;
        let mut counter = 0;
        for item in utxo_tree.iter() {
            item?;
            counter += 1;
        }
        Ok(counter)
    }

    /// Drops the index and rebuilds it from a full chain scan.
    pub fn reindex(&self) -> Result<()> {
        let utxo_tree = self.utxo_tree()?;
        utxo_tree.clear()?;

        for (txid_hex, outs) in self.blockchain.find_utxo() {
            let txid = HEXLOWER
                .decode(txid_hex.as_bytes())
                .map_err(|e| ChainError::Serialization(format!("invalid transaction id: {e}")))?;
            utxo_tree.insert(txid, serialize(&outs)?)?;
        }
        Ok(())
    }

    /// Applies a newly adopted tip block: inputs consume entries from
    /// the referenced transactions (dropping entries that empty out),
    /// and every transaction's outputs enter the index as unspent.
    pub fn update(&self, block: &Block) -> Result<()> {
        let utxo_tree = self.utxo_tree()?;

        for tx in block.get_transactions() {
            if !tx.is_coinbase() {
                for vin in tx.get_vin() {
                    let outs_bytes = utxo_tree.get(vin.get_txid())?.ok_or_else(|| {
                        ChainError::Storage(format!(
                            "no unspent entry for spent input {}",
                            HEXLOWER.encode(vin.get_txid())
                        ))
                    })?;
                    let outs: Vec<UnspentOutput> = deserialize(outs_bytes.as_ref())?;

                    let remaining: Vec<UnspentOutput> = outs
                        .into_iter()
                        .filter(|unspent| unspent.index as i64 != vin.get_vout())
                        .collect();

                    if remaining.is_empty() {
                        utxo_tree.remove(vin.get_txid())?;
                    } else {
                        utxo_tree.insert(vin.get_txid(), serialize(&remaining)?)?;
                    }
                }
            }

            let fresh: Vec<UnspentOutput> = tx
                .get_vout()
                .iter()
                .enumerate()
                .map(|(index, output)| UnspentOutput {
                    index,
                    output: output.clone(),
                })
                .collect();
            utxo_tree.insert(tx.get_id(), serialize(&fresh)?)?;
        }
        Ok(())
    }
}
