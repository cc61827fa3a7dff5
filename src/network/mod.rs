//! The peer protocol: framing, known-peer bookkeeping and the node
//! server.

pub mod node;
pub mod protocol;
pub mod server;

pub use node::Nodes;
pub use protocol::OpType;
pub use server::{send_tx, NodeState, Server, CENTRAL_NODE, TX_POOL_MINING_THRESHOLD};
