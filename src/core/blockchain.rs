use crate::core::monetary::{reward_after, INITIAL_BLOCK_REWARD};
use crate::core::{Block, Transaction};
use crate::error::{ChainError, Result};
use data_encoding::HEXLOWER;
use log::info;
use sled::{Db, Tree};
use std::collections::HashMap;
use std::env::current_dir;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// Distinguished key holding the hash of the preferred tip.
const TIP_KEY: &str = "l";
const BLOCKS_TREE: &str = "blocks";

/// Data carried by the genesis coinbase input.
pub const GENESIS_COINBASE_DATA: &str = "The genesis block of lumen-chain";

/// The persistent block store: a sled database holding serialized
/// blocks keyed by hash, a tip pointer under [`TIP_KEY`], and the UTXO
/// tree owned by [`crate::storage::UTXOSet`]. Following `prev_block_hash`
/// from the tip reaches the genesis block in exactly `tip.height + 1`
/// steps.
#[derive(Clone)]
pub struct Blockchain {
    tip_hash: Arc<RwLock<Vec<u8>>>,
    db: Db,
    current_reward: u64,
}

impl Blockchain {
    /// Creates the chain for `node_id` and mines the genesis block,
    /// paying the initial reward to `genesis_address`. Fails when the
    /// node already has a database.
    pub fn create_blockchain(genesis_address: &str, node_id: &str) -> Result<Blockchain> {
        Self::create_blockchain_with_path(genesis_address, &Self::node_db_path(node_id)?)
    }

    /// Opens the existing chain for `node_id`; fails when none exists.
    pub fn open_blockchain(node_id: &str) -> Result<Blockchain> {
        Self::open_blockchain_with_path(&Self::node_db_path(node_id)?)
    }

    fn node_db_path(node_id: &str) -> Result<PathBuf> {
        Ok(current_dir()?.join("data").join(format!("node_{node_id}")))
    }

    pub fn create_blockchain_with_path(
        genesis_address: &str,
        db_path: &Path,
    ) -> Result<Blockchain> {
        if db_path.exists() {
            return Err(ChainError::ChainExists(db_path.display().to_string()));
        }

        let db = sled::open(db_path)?;
        let blocks_tree = db.open_tree(BLOCKS_TREE)?;

        info!("creating genesis block for address {genesis_address}");
        let coinbase_tx = Transaction::new_coinbase_tx(
            genesis_address,
            GENESIS_COINBASE_DATA.as_bytes().to_vec(),
            INITIAL_BLOCK_REWARD,
        )?;
        let genesis = Block::generate_genesis_block(&coinbase_tx)?;
        Self::update_blocks_tree(&blocks_tree, &genesis)?;

        Ok(Blockchain {
            tip_hash: Arc::new(RwLock::new(genesis.get_hash().to_vec())),
            db,
            current_reward: INITIAL_BLOCK_REWARD,
        })
    }

    pub fn open_blockchain_with_path(db_path: &Path) -> Result<Blockchain> {
        if !db_path.exists() {
            return Err(ChainError::ChainMissing(db_path.display().to_string()));
        }

        let db = sled::open(db_path)?;
        let blocks_tree = db.open_tree(BLOCKS_TREE)?;
        let tip_hash = blocks_tree
            .get(TIP_KEY)?
            .ok_or_else(|| ChainError::ChainMissing(db_path.display().to_string()))?
            .to_vec();

        let mut chain = Blockchain {
            tip_hash: Arc::new(RwLock::new(tip_hash)),
            db,
            current_reward: INITIAL_BLOCK_REWARD,
        };
        chain.current_reward = reward_after(chain.get_block_count());
        Ok(chain)
    }

    /// Writes a block and repoints the tip in one storage transaction.
    fn update_blocks_tree(blocks_tree: &Tree, block: &Block) -> Result<()> {
        let block_data = block.serialize()?;
        blocks_tree
            .transaction(|tx_db| {
                tx_db.insert(block.get_hash(), block_data.as_slice())?;
                tx_db.insert(TIP_KEY, block.get_hash())?;
                Ok(())
            })
            .map_err(|e: sled::transaction::TransactionError| {
                ChainError::Storage(format!("failed to store block: {e}"))
            })?;
        Ok(())
    }

    /// The reward a coinbase minted now should carry, derived from the
    /// chain length at open time.
    pub fn current_reward(&self) -> u64 {
        self.current_reward
    }

    pub fn get_db(&self) -> &Db {
        &self.db
    }

    pub fn get_tip_hash(&self) -> Vec<u8> {
        self.tip_hash
            .read()
            .expect("tip hash lock poisoned")
            .clone()
    }

    fn set_tip_hash(&self, new_tip_hash: &[u8]) {
        let mut tip_hash = self.tip_hash.write().expect("tip hash lock poisoned");
        *tip_hash = new_tip_hash.to_vec();
    }

    /// Verifies every transaction, mines a block on the current tip and
    /// advances it.
    pub fn mine_block(&self, transactions: &[Transaction]) -> Result<Block> {
        for transaction in transactions {
            if !self.verify_tx(transaction)? {
                return Err(ChainError::InvalidTx(format!(
                    "transaction {} failed verification",
                    HEXLOWER.encode(transaction.get_id())
                )));
            }
        }

        let best_height = self.get_best_height()?;
        let block = Block::new_block(transactions, self.get_tip_hash(), best_height + 1)?;

        let blocks_tree = self.db.open_tree(BLOCKS_TREE)?;
        Self::update_blocks_tree(&blocks_tree, &block)?;
        self.set_tip_hash(block.get_hash());

        info!(
            "mined block {} at height {}",
            block.get_hash_hex(),
            block.get_height()
        );
        Ok(block)
    }

    /// Stores a block received from a peer. Idempotent; the tip only
    /// advances when the block's height exceeds the current tip's.
    /// Performs no validation; callers accepting network blocks decide
    /// their own policy.
    pub fn add_block(&self, block: &Block) -> Result<()> {
        let blocks_tree = self.db.open_tree(BLOCKS_TREE)?;
        if blocks_tree.get(block.get_hash())?.is_some() {
            return Ok(());
        }

        let block_data = block.serialize()?;
        let tip_hash = self.get_tip_hash();

        blocks_tree
            .transaction(|tx_db| {
                tx_db.insert(block.get_hash(), block_data.as_slice())?;

                let tip_bytes = tx_db.get(tip_hash.as_slice())?.ok_or_else(|| {
                    sled::Error::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        "tip block not found",
                    ))
                })?;
                let tip_block = Block::deserialize(tip_bytes.as_ref()).map_err(|_| {
                    sled::Error::Io(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "corrupt tip block",
                    ))
                })?;

                if block.get_height() > tip_block.get_height() {
                    tx_db.insert(TIP_KEY, block.get_hash())?;
                }
                Ok(())
            })
            .map_err(|e: sled::transaction::TransactionError| {
                ChainError::Storage(format!("failed to add block: {e}"))
            })?;

        let blocks_tree = self.db.open_tree(BLOCKS_TREE)?;
        let stored_tip = blocks_tree
            .get(TIP_KEY)?
            .ok_or_else(|| ChainError::Storage("tip pointer missing".to_string()))?;
        self.set_tip_hash(stored_tip.as_ref());
        Ok(())
    }

    pub fn iterator(&self) -> BlockchainIterator {
        BlockchainIterator::new(self.get_tip_hash(), self.db.clone())
    }

    /// Scans the whole chain and groups every unspent output by the id
    /// of the transaction that created it. Feeds the UTXO reindex.
    pub fn find_utxo(&self) -> HashMap<String, Vec<UnspentOutput>> {
        let mut utxo: HashMap<String, Vec<UnspentOutput>> = HashMap::new();
        let mut spent_txos: HashMap<String, Vec<i64>> = HashMap::new();

        let mut iterator = self.iterator();
        while let Some(block) = iterator.next() {
            for tx in block.get_transactions() {
                let txid_hex = HEXLOWER.encode(tx.get_id());

                'outputs: for (idx, out) in tx.get_vout().iter().enumerate() {
                    if let Some(spent) = spent_txos.get(&txid_hex) {
                        if spent.contains(&(idx as i64)) {
                            continue 'outputs;
                        }
                    }
                    utxo.entry(txid_hex.clone())
                        .or_default()
                        .push(UnspentOutput {
                            index: idx,
                            output: out.clone(),
                        });
                }

                if tx.is_coinbase() {
                    continue;
                }
                for txin in tx.get_vin() {
                    spent_txos
                        .entry(HEXLOWER.encode(txin.get_txid()))
                        .or_default()
                        .push(txin.get_vout());
                }
            }
        }
        utxo
    }

    /// Reverse scan for the transaction with the given id.
    pub fn find_transaction(&self, txid: &[u8]) -> Option<Transaction> {
        let mut iterator = self.iterator();
        while let Some(block) = iterator.next() {
            for transaction in block.get_transactions() {
                if txid.eq(transaction.get_id()) {
                    return Some(transaction.clone());
                }
            }
        }
        None
    }

    /// The map of previous transactions referenced by `tx`'s inputs.
    fn get_prev_txs(&self, tx: &Transaction) -> Result<HashMap<String, Transaction>> {
        let mut prev_txs = HashMap::new();
        for vin in tx.get_vin() {
            let prev_tx = self.find_transaction(vin.get_txid()).ok_or_else(|| {
                ChainError::UnknownPrevTx(HEXLOWER.encode(vin.get_txid()))
            })?;
            prev_txs.insert(HEXLOWER.encode(prev_tx.get_id()), prev_tx);
        }
        Ok(prev_txs)
    }

    pub fn sign_tx(&self, tx: &mut Transaction, pkcs8: &[u8]) -> Result<()> {
        if tx.is_coinbase() {
            return Ok(());
        }
        let prev_txs = self.get_prev_txs(tx)?;
        tx.sign(pkcs8, &prev_txs)
    }

    pub fn verify_tx(&self, tx: &Transaction) -> Result<bool> {
        if tx.is_coinbase() {
            return Ok(true);
        }
        let prev_txs = self.get_prev_txs(tx)?;
        tx.verify(&prev_txs)
    }

    /// Height of the tip block.
    pub fn get_best_height(&self) -> Result<usize> {
        let blocks_tree = self.db.open_tree(BLOCKS_TREE)?;
        let tip_hash = self.get_tip_hash();
        let tip_bytes = blocks_tree
            .get(&tip_hash)?
            .ok_or_else(|| ChainError::BlockNotFound(HEXLOWER.encode(&tip_hash)))?;
        Ok(Block::deserialize(tip_bytes.as_ref())?.get_height())
    }

    /// Number of blocks from tip to genesis.
    pub fn get_block_count(&self) -> u64 {
        let mut iterator = self.iterator();
        let mut count = 0;
        while iterator.next().is_some() {
            count += 1;
        }
        count
    }

    pub fn get_block(&self, block_hash: &[u8]) -> Result<Block> {
        let blocks_tree = self.db.open_tree(BLOCKS_TREE)?;
        let block_bytes = blocks_tree
            .get(block_hash)?
            .ok_or_else(|| ChainError::BlockNotFound(HEXLOWER.encode(block_hash)))?;
        Block::deserialize(block_bytes.as_ref())
    }

    /// All block hashes, tip first.
    pub fn get_block_hashes(&self) -> Vec<Vec<u8>> {
        let mut iterator = self.iterator();
        let mut hashes = vec![];
        while let Some(block) = iterator.next() {
            hashes.push(block.get_hash().to_vec());
        }
        hashes
    }

    /// The `tx_idx`-th transaction of the `block_idx`-th block counted
    /// from the tip (both zero-based).
    pub fn get_tx(&self, block_idx: u64, tx_idx: usize) -> Result<Transaction> {
        let mut iterator = self.iterator();
        let mut current_idx = 0;
        while let Some(block) = iterator.next() {
            if current_idx == block_idx {
                return block
                    .get_transactions()
                    .get(tx_idx)
                    .cloned()
                    .ok_or_else(|| {
                        ChainError::TxNotFound(format!(
                            "block {block_idx} has no transaction {tx_idx}"
                        ))
                    });
            }
            current_idx += 1;
        }
        Err(ChainError::TxNotFound(format!(
            "no block at index {block_idx} from the tip"
        )))
    }
}

/// An unspent output paired with its index inside the originating
/// transaction's output list. The index must survive into the UTXO
/// store: inputs built from coin selection reference positions in the
/// original output list, which signing and verification replay.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, bincode::Encode, bincode::Decode)]
pub struct UnspentOutput {
    pub index: usize,
    pub output: crate::core::TXOutput,
}

/// Walks the chain tip to genesis; ends after yielding the block whose
/// `prev_block_hash` is empty. Single pass, not restartable.
pub struct BlockchainIterator {
    db: Db,
    current_hash: Vec<u8>,
}

impl BlockchainIterator {
    fn new(tip_hash: Vec<u8>, db: Db) -> BlockchainIterator {
        BlockchainIterator {
            current_hash: tip_hash,
            db,
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<Block> {
        if self.current_hash.is_empty() {
            return None;
        }
        let blocks_tree = self.db.open_tree(BLOCKS_TREE).ok()?;
        let data = blocks_tree.get(&self.current_hash).ok()??;
        let block = Block::deserialize(data.as_ref()).ok()?;
        self.current_hash = block.get_prev_block_hash().to_vec();
        Some(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ProofOfWork;
    use crate::wallet::Wallet;
    use tempfile::tempdir;

    fn test_chain(dir: &Path) -> (Blockchain, Wallet) {
        let wallet = Wallet::new().unwrap();
        let chain =
            Blockchain::create_blockchain_with_path(&wallet.get_address(), &dir.join("chain"))
                .unwrap();
        (chain, wallet)
    }

    fn coinbase(address: &str, reward: u64) -> Transaction {
        Transaction::new_coinbase_tx(address, vec![], reward).unwrap()
    }

    #[test]
    fn test_create_mines_valid_genesis() {
        let dir = tempdir().unwrap();
        let (chain, _) = test_chain(dir.path());

        assert_eq!(chain.get_best_height().unwrap(), 0);
        assert_eq!(chain.get_block_count(), 1);
        let genesis = chain.get_block(&chain.get_tip_hash()).unwrap();
        assert!(genesis.get_prev_block_hash().is_empty());
        assert!(ProofOfWork::validate(&genesis));
    }

    #[test]
    fn test_create_twice_fails() {
        let dir = tempdir().unwrap();
        let (_, wallet) = test_chain(dir.path());

        let result =
            Blockchain::create_blockchain_with_path(&wallet.get_address(), &dir.path().join("chain"));
        assert!(matches!(result, Err(ChainError::ChainExists(_))));
    }

    #[test]
    fn test_open_missing_fails() {
        let dir = tempdir().unwrap();
        let result = Blockchain::open_blockchain_with_path(&dir.path().join("absent"));
        assert!(matches!(result, Err(ChainError::ChainMissing(_))));
    }

    #[test]
    fn test_reopen_restores_tip_and_reward() {
        let dir = tempdir().unwrap();
        let tip = {
            let (chain, wallet) = test_chain(dir.path());
            chain
                .mine_block(&[coinbase(&wallet.get_address(), chain.current_reward())])
                .unwrap();
            chain.get_tip_hash()
        };

        let reopened = Blockchain::open_blockchain_with_path(&dir.path().join("chain")).unwrap();
        assert_eq!(reopened.get_tip_hash(), tip);
        assert_eq!(reopened.get_best_height().unwrap(), 1);
        assert_eq!(reopened.current_reward(), INITIAL_BLOCK_REWARD);
    }

    #[test]
    fn test_mine_block_links_to_tip() {
        let dir = tempdir().unwrap();
        let (chain, wallet) = test_chain(dir.path());
        let genesis_hash = chain.get_tip_hash();

        let block = chain
            .mine_block(&[coinbase(&wallet.get_address(), chain.current_reward())])
            .unwrap();

        assert_eq!(block.get_height(), 1);
        assert_eq!(block.get_prev_block_hash(), genesis_hash.as_slice());
        assert_eq!(chain.get_tip_hash(), block.get_hash());
    }

    #[test]
    fn test_add_block_is_idempotent() {
        let dir = tempdir().unwrap();
        let (chain, wallet) = test_chain(dir.path());

        let block = Block::new_block(
            &[coinbase(&wallet.get_address(), 1)],
            chain.get_tip_hash(),
            1,
        )
        .unwrap();

        chain.add_block(&block).unwrap();
        chain.add_block(&block).unwrap();
        assert_eq!(chain.get_block_count(), 2);
        assert_eq!(chain.get_tip_hash(), block.get_hash());
    }

    #[test]
    fn test_add_block_only_advances_on_higher_height() {
        let dir = tempdir().unwrap();
        let (chain, wallet) = test_chain(dir.path());
        let genesis_hash = chain.get_tip_hash();

        let first = chain
            .mine_block(&[coinbase(&wallet.get_address(), 1)])
            .unwrap();

        // a competing block at the same height is stored but not adopted
        let rival = Block::new_block(&[coinbase(&wallet.get_address(), 1)], genesis_hash, 1).unwrap();
        chain.add_block(&rival).unwrap();

        assert_eq!(chain.get_tip_hash(), first.get_hash());
        assert!(chain.get_block(rival.get_hash()).is_ok());

        // a higher block on top of the rival is adopted
        let higher =
            Block::new_block(&[coinbase(&wallet.get_address(), 1)], rival.get_hash().to_vec(), 2)
                .unwrap();
        chain.add_block(&higher).unwrap();
        assert_eq!(chain.get_tip_hash(), higher.get_hash());
    }

    #[test]
    fn test_iterator_walks_to_genesis() {
        let dir = tempdir().unwrap();
        let (chain, wallet) = test_chain(dir.path());
        for _ in 0..3 {
            chain
                .mine_block(&[coinbase(&wallet.get_address(), 1)])
                .unwrap();
        }

        let mut iterator = chain.iterator();
        let mut heights = vec![];
        while let Some(block) = iterator.next() {
            heights.push(block.get_height());
        }
        assert_eq!(heights, vec![3, 2, 1, 0]);
        assert!(iterator.next().is_none());
    }

    #[test]
    fn test_find_transaction_and_get_tx() {
        let dir = tempdir().unwrap();
        let (chain, wallet) = test_chain(dir.path());
        let cb = coinbase(&wallet.get_address(), 7);
        chain.mine_block(&[cb.clone()]).unwrap();

        let found = chain.find_transaction(cb.get_id()).unwrap();
        assert_eq!(found.get_id(), cb.get_id());

        let by_index = chain.get_tx(0, 0).unwrap();
        assert_eq!(by_index.get_id(), cb.get_id());

        assert!(chain.find_transaction(&[0u8; 32]).is_none());
        assert!(matches!(
            chain.get_tx(9, 0),
            Err(ChainError::TxNotFound(_))
        ));
    }
}
