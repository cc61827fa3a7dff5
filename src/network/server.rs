use crate::config::GLOBAL_CONFIG;
use crate::core::{Block, Blockchain, ProofOfWork, Transaction};
use crate::error::{ChainError, Result};
use crate::network::node::Nodes;
use crate::network::protocol::{
    frame, split_frame, AddrPayload, BlockPayload, GetBlocksPayload, GetDataPayload, InvPayload,
    OpType, TxPayload, VersionPayload, CMD_ADDR, CMD_BLOCK, CMD_GET_BLOCKS, CMD_GET_DATA, CMD_INV,
    CMD_TX, CMD_VERSION, NODE_VERSION,
};
use crate::storage::{BlockInTransit, MemoryPool, UTXOSet};
use crate::utils::{deserialize, serialize};
use data_encoding::HEXLOWER;
use log::{error, info, warn};
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// The hard-coded seed peer every new node bootstraps from.
pub const CENTRAL_NODE: &str = "127.0.0.1:2001";

/// Pool size at which a miner node starts packing a block.
pub const TX_POOL_MINING_THRESHOLD: usize = 2;

const DIAL_TIMEOUT_MS: u64 = 5_000;
const READ_TIMEOUT_SECS: u64 = 60;

/// Mutable node-wide state threaded through the connection handlers:
/// the known-peer list, the transaction pool and the block download
/// queue, each guarding itself with its own lock. Never hold two at
/// once; take what is needed, copy it out, drop the guard.
pub struct NodeState {
    known_nodes: Nodes,
    mem_pool: MemoryPool,
    blocks_in_transit: BlockInTransit,
    node_addr: String,
    mining_addr: Option<String>,
    validate_incoming_blocks: bool,
}

impl NodeState {
    pub fn known_nodes(&self) -> &Nodes {
        &self.known_nodes
    }

    pub fn mem_pool(&self) -> &MemoryPool {
        &self.mem_pool
    }

    pub fn blocks_in_transit(&self) -> &BlockInTransit {
        &self.blocks_in_transit
    }

    pub fn node_addr(&self) -> &str {
        &self.node_addr
    }

    pub fn mining_addr(&self) -> Option<&str> {
        self.mining_addr.as_deref()
    }
}

/// The TCP listener plus the chain it serves. One handler thread per
/// accepted connection; a connection carries exactly one framed message.
pub struct Server {
    blockchain: Blockchain,
    state: Arc<NodeState>,
}

impl Server {
    pub fn new(blockchain: Blockchain, node_addr: String, mining_addr: Option<String>) -> Server {
        let known_nodes = Nodes::new();
        known_nodes.add_node(CENTRAL_NODE.to_string());

        Server {
            blockchain,
            state: Arc::new(NodeState {
                known_nodes,
                mem_pool: MemoryPool::new(),
                blocks_in_transit: BlockInTransit::new(),
                node_addr,
                mining_addr,
                validate_incoming_blocks: false,
            }),
        }
    }

    /// Opt-in hook: check proof-of-work on received blocks before
    /// storing them. Off by default to mirror the trusting baseline
    /// behavior.
    pub fn with_block_validation(mut self) -> Server {
        let state = Arc::get_mut(&mut self.state)
            .expect("validation hook must be configured before the server starts");
        state.validate_incoming_blocks = true;
        self
    }

    pub fn state(&self) -> Arc<NodeState> {
        Arc::clone(&self.state)
    }

    /// Binds the listener and serves until the process exits. A
    /// non-central node first announces its height to the seed peer.
    pub fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.state.node_addr).map_err(|e| {
            ChainError::Protocol(format!("failed to bind {}: {e}", self.state.node_addr))
        })?;
        info!("node listening on {}", self.state.node_addr);

        if self.state.node_addr != CENTRAL_NODE {
            let height = self.blockchain.get_best_height()?;
            Self::send_version(&self.state, CENTRAL_NODE, height);
        }

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    let blockchain = self.blockchain.clone();
                    let state = Arc::clone(&self.state);
                    thread::spawn(move || {
                        if let Err(e) = Self::handle_connection(blockchain, state, stream) {
                            error!("connection handler failed: {e}");
                        }
                    });
                }
                Err(e) => error!("failed to accept connection: {e}"),
            }
        }
        Ok(())
    }

    fn handle_connection(
        blockchain: Blockchain,
        state: Arc<NodeState>,
        mut stream: TcpStream,
    ) -> Result<()> {
        stream
            .set_read_timeout(Some(Duration::from_secs(READ_TIMEOUT_SECS)))
            .map_err(|e| ChainError::Protocol(format!("failed to set read timeout: {e}")))?;

        let mut request = vec![];
        stream
            .read_to_end(&mut request)
            .map_err(|e| ChainError::Protocol(format!("truncated read: {e}")))?;
        let (command, payload) = split_frame(&request)?;
        info!("received {command} command");

        match command.as_str() {
            CMD_VERSION => Self::handle_version(&blockchain, &state, payload),
            CMD_ADDR => Self::handle_addr(&state, payload),
            CMD_GET_BLOCKS => Self::handle_get_blocks(&blockchain, &state, payload),
            CMD_INV => Self::handle_inv(&state, payload),
            CMD_GET_DATA => Self::handle_get_data(&blockchain, &state, payload),
            CMD_BLOCK => Self::handle_block(&blockchain, &state, payload),
            CMD_TX => Self::handle_tx(&blockchain, &state, payload),
            unknown => {
                warn!("unknown command: {unknown}");
                Ok(())
            }
        }
    }

    /// Height comparison drives the sync: a shorter node asks for the
    /// peer's block list, a taller one prompts the peer to ask instead.
    /// Either way the sender becomes a known peer.
    fn handle_version(
        blockchain: &Blockchain,
        state: &NodeState,
        payload: &[u8],
    ) -> Result<()> {
        let payload: VersionPayload = deserialize(payload)?;
        let local_height = blockchain.get_best_height()?;
        info!(
            "version from {}: remote height {}, local height {local_height}",
            payload.addr_from, payload.height
        );

        if local_height < payload.height {
            Self::send_get_blocks(state, &payload.addr_from)?;
        } else if local_height > payload.height {
            Self::send_version(state, &payload.addr_from, local_height);
        }

        state.known_nodes.add_node(payload.addr_from);
        Ok(())
    }

    fn handle_addr(state: &NodeState, payload: &[u8]) -> Result<()> {
        let payload: AddrPayload = deserialize(payload)?;
        for addr in payload.addr_list {
            state.known_nodes.add_node(addr);
        }
        info!("known peers: {}", state.known_nodes.len());
        Ok(())
    }

    fn handle_get_blocks(
        blockchain: &Blockchain,
        state: &NodeState,
        payload: &[u8],
    ) -> Result<()> {
        let payload: GetBlocksPayload = deserialize(payload)?;
        let hashes = blockchain.get_block_hashes();
        Self::send_inv(state, &payload.addr_from, OpType::Block, hashes)
    }

    fn handle_inv(state: &NodeState, payload: &[u8]) -> Result<()> {
        let payload: InvPayload = deserialize(payload)?;
        info!(
            "inventory from {}: {} {:?} item(s)",
            payload.addr_from,
            payload.items.len(),
            payload.op_type
        );

        match payload.op_type {
            OpType::Block => {
                state.blocks_in_transit.add_blocks(&payload.items);
                if let Some(first) = payload.items.first() {
                    Self::send_get_data(state, &payload.addr_from, OpType::Block, first.clone())?;
                    state.blocks_in_transit.remove(first);
                }
            }
            OpType::Tx => {
                if let Some(txid) = payload.items.first() {
                    if !state.mem_pool.contains(&HEXLOWER.encode(txid)) {
                        Self::send_get_data(state, &payload.addr_from, OpType::Tx, txid.clone())?;
                    }
                }
            }
        }
        Ok(())
    }

    fn handle_get_data(
        blockchain: &Blockchain,
        state: &NodeState,
        payload: &[u8],
    ) -> Result<()> {
        let payload: GetDataPayload = deserialize(payload)?;
        match payload.op_type {
            OpType::Block => {
                // a miss surfaces as BlockNotFound to the handler's logger
                let block = blockchain.get_block(&payload.id)?;
                Self::send_block(state, &payload.addr_from, &block)?;
            }
            OpType::Tx => {
                let txid_hex = HEXLOWER.encode(&payload.id);
                match state.mem_pool.get(&txid_hex) {
                    Some(tx) => Self::send_tx_to(state, &payload.addr_from, &tx)?,
                    None => warn!("requested transaction {txid_hex} is not in the pool"),
                }
            }
        }
        Ok(())
    }

    fn handle_block(blockchain: &Blockchain, state: &NodeState, payload: &[u8]) -> Result<()> {
        let payload: BlockPayload = deserialize(payload)?;
        let block = Block::deserialize(&payload.block)?;

        if state.validate_incoming_blocks && !ProofOfWork::validate(&block) {
            warn!(
                "rejecting block {} with invalid proof-of-work",
                block.get_hash_hex()
            );
            return Ok(());
        }

        blockchain.add_block(&block)?;
        info!("added block {}", block.get_hash_hex());

        if !state.blocks_in_transit.is_empty() {
            if let Some(next) = state.blocks_in_transit.first() {
                Self::send_get_data(state, &payload.addr_from, OpType::Block, next.clone())?;
                state.blocks_in_transit.remove(&next);
            }
        } else {
            UTXOSet::new(blockchain.clone()).reindex()?;
            info!("block download drained; UTXO index rebuilt");
        }
        Ok(())
    }

    /// Pools the transaction. The central node only relays the id to
    /// the other peers; a miner node packs a block once the pool
    /// reaches the threshold.
    fn handle_tx(blockchain: &Blockchain, state: &NodeState, payload: &[u8]) -> Result<()> {
        let payload: TxPayload = deserialize(payload)?;
        let tx = Transaction::deserialize(&payload.transaction)?;
        let txid = tx.get_id().to_vec();
        state.mem_pool.add(tx);
        info!(
            "pooled transaction {} ({} pending)",
            HEXLOWER.encode(&txid),
            state.mem_pool.len()
        );

        if state.node_addr == CENTRAL_NODE {
            for node in state.known_nodes.get_nodes() {
                if node != state.node_addr && node != payload.addr_from {
                    Self::send_inv(state, &node, OpType::Tx, vec![txid.clone()])?;
                }
            }
        } else if state.mem_pool.len() >= TX_POOL_MINING_THRESHOLD && state.mining_addr.is_some() {
            Self::mine_pooled_transactions(blockchain, state, &payload.addr_from)?;
        }
        Ok(())
    }

    /// The miner's packing loop: filter the pool down to verified
    /// transactions, append a coinbase for the miner, mine, rebuild the
    /// index, drop the packed entries and announce the new block.
    /// Repeats while the pool still has entries.
    fn mine_pooled_transactions(
        blockchain: &Blockchain,
        state: &NodeState,
        last_sender: &str,
    ) -> Result<()> {
        let mining_addr = match &state.mining_addr {
            Some(addr) => addr.clone(),
            None => return Ok(()),
        };

        loop {
            let mut verified = vec![];
            for tx in state.mem_pool.get_all() {
                match blockchain.verify_tx(&tx) {
                    Ok(true) => verified.push(tx),
                    Ok(false) => warn!(
                        "skipping transaction {} with a bad signature",
                        HEXLOWER.encode(tx.get_id())
                    ),
                    Err(e) => warn!(
                        "skipping unverifiable transaction {}: {e}",
                        HEXLOWER.encode(tx.get_id())
                    ),
                }
            }

            if verified.is_empty() {
                info!("no valid transaction in the pool; waiting for more");
                return Ok(());
            }

            let coinbase =
                Transaction::new_coinbase_tx(&mining_addr, vec![], blockchain.current_reward())?;
            verified.push(coinbase);

            let new_block = blockchain.mine_block(&verified)?;
            UTXOSet::new(blockchain.clone()).reindex()?;
            info!("mined block {} from the pool", new_block.get_hash_hex());

            for tx in &verified {
                state.mem_pool.remove(&HEXLOWER.encode(tx.get_id()));
            }

            for node in state.known_nodes.get_nodes() {
                if node != state.node_addr && node != last_sender {
                    Self::send_inv(
                        state,
                        &node,
                        OpType::Block,
                        vec![new_block.get_hash().to_vec()],
                    )?;
                }
            }

            if state.mem_pool.is_empty() {
                return Ok(());
            }
        }
    }

    fn send_version(state: &NodeState, addr: &str, height: usize) {
        let payload = VersionPayload {
            version: NODE_VERSION,
            height,
            addr_from: state.node_addr.clone(),
        };
        match Self::build_frame(CMD_VERSION, &payload) {
            Ok(request) => Self::send_frame(state, addr, &request),
            Err(e) => error!("failed to build version message: {e}"),
        }
    }

    fn send_get_blocks(state: &NodeState, addr: &str) -> Result<()> {
        let payload = GetBlocksPayload {
            addr_from: state.node_addr.clone(),
        };
        let request = Self::build_frame(CMD_GET_BLOCKS, &payload)?;
        Self::send_frame(state, addr, &request);
        Ok(())
    }

    fn send_get_data(state: &NodeState, addr: &str, op_type: OpType, id: Vec<u8>) -> Result<()> {
        let payload = GetDataPayload {
            addr_from: state.node_addr.clone(),
            op_type,
            id,
        };
        let request = Self::build_frame(CMD_GET_DATA, &payload)?;
        Self::send_frame(state, addr, &request);
        Ok(())
    }

    fn send_inv(state: &NodeState, addr: &str, op_type: OpType, items: Vec<Vec<u8>>) -> Result<()> {
        let payload = InvPayload {
            addr_from: state.node_addr.clone(),
            op_type,
            items,
        };
        let request = Self::build_frame(CMD_INV, &payload)?;
        Self::send_frame(state, addr, &request);
        Ok(())
    }

    fn send_block(state: &NodeState, addr: &str, block: &Block) -> Result<()> {
        let payload = BlockPayload {
            addr_from: state.node_addr.clone(),
            block: block.serialize()?,
        };
        let request = Self::build_frame(CMD_BLOCK, &payload)?;
        Self::send_frame(state, addr, &request);
        Ok(())
    }

    fn send_tx_to(state: &NodeState, addr: &str, tx: &Transaction) -> Result<()> {
        let payload = TxPayload {
            addr_from: state.node_addr.clone(),
            transaction: tx.serialize()?,
        };
        let request = Self::build_frame(CMD_TX, &payload)?;
        Self::send_frame(state, addr, &request);
        Ok(())
    }

    fn build_frame<T: serde::Serialize + bincode::Encode>(
        command: &str,
        payload: &T,
    ) -> Result<Vec<u8>> {
        frame(command, &serialize(payload)?)
    }

    /// One-shot dial and write. A peer that refuses the dial is dropped
    /// from the known list; send failures never propagate.
    fn send_frame(state: &NodeState, addr: &str, data: &[u8]) {
        let socket_addr: SocketAddr = match addr.parse() {
            Ok(socket_addr) => socket_addr,
            Err(e) => {
                error!("cannot parse peer address {addr}: {e}");
                return;
            }
        };

        match TcpStream::connect_timeout(&socket_addr, Duration::from_millis(DIAL_TIMEOUT_MS)) {
            Ok(mut stream) => {
                if let Err(e) = stream
                    .set_write_timeout(Some(Duration::from_millis(DIAL_TIMEOUT_MS)))
                    .and_then(|_| stream.write_all(data))
                    .and_then(|_| stream.flush())
                {
                    error!("failed to send to {addr}: {e}");
                }
            }
            Err(e) => {
                warn!("peer {addr} is unreachable, dropping it: {e}");
                state.known_nodes.evict_node(addr);
            }
        }
    }
}

/// Pushes a signed transaction to a node; the CLI's `send` without
/// `--mine` uses this against the central node.
pub fn send_tx(addr: &str, tx: &Transaction) -> Result<()> {
    let payload = TxPayload {
        addr_from: GLOBAL_CONFIG.get_node_addr(),
        transaction: tx.serialize()?,
    };
    let request = frame(CMD_TX, &serialize(&payload)?)?;

    let socket_addr: SocketAddr = addr
        .parse()
        .map_err(|e| ChainError::Protocol(format!("invalid peer address {addr}: {e}")))?;
    let mut stream = TcpStream::connect_timeout(&socket_addr, Duration::from_millis(DIAL_TIMEOUT_MS))
        .map_err(|e| ChainError::Protocol(format!("failed to reach {addr}: {e}")))?;
    stream.set_write_timeout(Some(Duration::from_millis(DIAL_TIMEOUT_MS)))?;
    stream.write_all(&request)?;
    stream.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::Wallet;
    use tempfile::tempdir;

    #[test]
    fn test_new_server_seeds_central_node() {
        let dir = tempdir().unwrap();
        let wallet = Wallet::new().unwrap();
        let blockchain = Blockchain::create_blockchain_with_path(
            &wallet.get_address(),
            &dir.path().join("chain"),
        )
        .unwrap();

        let server = Server::new(blockchain, "127.0.0.1:2002".to_string(), None);
        let state = server.state();
        assert!(state.known_nodes().node_is_known(CENTRAL_NODE));
        assert_eq!(state.node_addr(), "127.0.0.1:2002");
        assert!(state.mining_addr().is_none());
        assert!(state.mem_pool().is_empty());
        assert!(state.blocks_in_transit().is_empty());
    }

    #[test]
    fn test_block_validation_hook_rejects_forged_block() {
        let dir = tempdir().unwrap();
        let wallet = Wallet::new().unwrap();
        let blockchain = Blockchain::create_blockchain_with_path(
            &wallet.get_address(),
            &dir.path().join("chain"),
        )
        .unwrap();
        let genesis_hash = blockchain.get_tip_hash();

        let server = Server::new(blockchain.clone(), "127.0.0.1:2003".to_string(), None)
            .with_block_validation();
        let state = server.state();

        // a block whose nonce was altered after mining fails the hook
        let coinbase = Transaction::new_coinbase_tx(&wallet.get_address(), vec![], 1).unwrap();
        let mut forged = Block::new_block(&[coinbase], genesis_hash, 1).unwrap();
        forged.set_nonce_for_test(forged.get_nonce() + 1);

        let payload = BlockPayload {
            addr_from: "127.0.0.1:1".to_string(),
            block: forged.serialize().unwrap(),
        };
        Server::handle_block(&blockchain, &state, &serialize(&payload).unwrap()).unwrap();

        assert_eq!(blockchain.get_block_count(), 1);
        assert!(blockchain.get_block(forged.get_hash()).is_err());
    }
}
