//! Wire format of the peer protocol.
//!
//! Every message is a 12-byte ASCII command, zero-padded on the right,
//! followed by the codec-serialized payload. Connections carry exactly
//! one message; the receiver reads to EOF.

use crate::error::{ChainError, Result};
use serde::{Deserialize, Serialize};

pub const CMD_LEN: usize = 12;
pub const NODE_VERSION: usize = 1;

pub const CMD_VERSION: &str = "version";
pub const CMD_ADDR: &str = "addr";
pub const CMD_INV: &str = "inv";
pub const CMD_GET_BLOCKS: &str = "getblocks";
pub const CMD_GET_DATA: &str = "getdata";
pub const CMD_BLOCK: &str = "block";
pub const CMD_TX: &str = "tx";

/// What an inventory or data request refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub enum OpType {
    Block,
    Tx,
}

/// Announces the sender's chain height; opens every sync conversation.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct VersionPayload {
    pub version: usize,
    pub height: usize,
    pub addr_from: String,
}

/// Advertises peer addresses.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct AddrPayload {
    pub addr_list: Vec<String>,
}

/// Advertises object ids the sender holds.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct InvPayload {
    pub addr_from: String,
    pub op_type: OpType,
    pub items: Vec<Vec<u8>>,
}

/// Asks the receiver to list its block hashes.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct GetBlocksPayload {
    pub addr_from: String,
}

/// Asks for one block or pooled transaction by id.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct GetDataPayload {
    pub addr_from: String,
    pub op_type: OpType,
    pub id: Vec<u8>,
}

/// Pushes one serialized block.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct BlockPayload {
    pub addr_from: String,
    pub block: Vec<u8>,
}

/// Pushes one serialized transaction.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TxPayload {
    pub addr_from: String,
    pub transaction: Vec<u8>,
}

/// Prefixes `payload` with the padded command.
pub fn frame(command: &str, payload: &[u8]) -> Result<Vec<u8>> {
    if command.len() > CMD_LEN || !command.is_ascii() {
        return Err(ChainError::Protocol(format!(
            "command does not fit the {CMD_LEN}-byte prefix: {command}"
        )));
    }

    let mut request = vec![0u8; CMD_LEN];
    request[..command.len()].copy_from_slice(command.as_bytes());
    request.extend_from_slice(payload);
    Ok(request)
}

/// Splits a received message into its command and payload bytes.
pub fn split_frame(request: &[u8]) -> Result<(String, &[u8])> {
    if request.len() < CMD_LEN {
        return Err(ChainError::Protocol(format!(
            "frame of {} bytes is shorter than the command prefix",
            request.len()
        )));
    }

    let prefix = &request[..CMD_LEN];
    let end = prefix.iter().position(|&b| b == 0).unwrap_or(CMD_LEN);
    let command = std::str::from_utf8(&prefix[..end])
        .map_err(|e| ChainError::Protocol(format!("non-UTF-8 command prefix: {e}")))?
        .to_string();
    Ok((command, &request[CMD_LEN..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::{deserialize, serialize};

    #[test]
    fn test_frame_round_trip() {
        let payload = VersionPayload {
            version: NODE_VERSION,
            height: 7,
            addr_from: "127.0.0.1:2001".to_string(),
        };
        let request = frame(CMD_VERSION, &serialize(&payload).unwrap()).unwrap();

        let (command, payload_bytes) = split_frame(&request).unwrap();
        assert_eq!(command, CMD_VERSION);
        let decoded: VersionPayload = deserialize(payload_bytes).unwrap();
        assert_eq!(decoded.height, 7);
        assert_eq!(decoded.addr_from, "127.0.0.1:2001");
    }

    #[test]
    fn test_command_prefix_is_zero_padded() {
        let request = frame(CMD_TX, b"payload").unwrap();
        assert_eq!(&request[..2], b"tx");
        assert!(request[2..CMD_LEN].iter().all(|&b| b == 0));
        assert_eq!(&request[CMD_LEN..], b"payload");
    }

    #[test]
    fn test_truncated_frame_rejected() {
        assert!(split_frame(b"short").is_err());
    }

    #[test]
    fn test_oversized_command_rejected() {
        assert!(frame("averylongcommandname", &[]).is_err());
    }

    #[test]
    fn test_empty_payload_is_legal() {
        let request = frame(CMD_GET_BLOCKS, &[]).unwrap();
        let (command, payload) = split_frame(&request).unwrap();
        assert_eq!(command, CMD_GET_BLOCKS);
        assert!(payload.is_empty());
    }
}
