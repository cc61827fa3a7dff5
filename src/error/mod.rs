//! Crate-wide error types.
//!
//! Expected domain failures (bad address, insufficient funds, lookup
//! misses) are returned to the caller; only the CLI entry point decides
//! to terminate the process.

use std::fmt;

/// Result type alias for chain operations
pub type Result<T> = std::result::Result<T, ChainError>;

#[derive(Debug, Clone)]
pub enum ChainError {
    /// Base58 decode failure, wrong length or checksum mismatch
    InvalidAddress(String),
    /// Signature verification failed or the transaction shape is malformed
    InvalidTx(String),
    /// Coin selection could not cover the requested amount
    InsufficientFunds { required: u64, available: u64 },
    /// A signing/verification input references a transaction not on chain
    UnknownPrevTx(String),
    /// `createchain` on a node that already has a database
    ChainExists(String),
    /// Any other command on a node that has no database yet
    ChainMissing(String),
    /// Block lookup miss
    BlockNotFound(String),
    /// Transaction lookup miss
    TxNotFound(String),
    /// Propagated from the key-value store
    Storage(String),
    /// Malformed frame, truncated read or payload decode failure
    Protocol(String),
    /// Key generation or signing failure
    Crypto(String),
    /// Codec encode/decode failure
    Serialization(String),
    /// Wallet file or wallet lookup failure
    Wallet(String),
    /// File I/O failure
    Io(String),
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainError::InvalidAddress(addr) => write!(f, "invalid address: {addr}"),
            ChainError::InvalidTx(msg) => write!(f, "invalid transaction: {msg}"),
            ChainError::InsufficientFunds {
                required,
                available,
            } => {
                write!(
                    f,
                    "insufficient funds: required {required}, available {available}"
                )
            }
            ChainError::UnknownPrevTx(txid) => {
                write!(f, "referenced previous transaction not found: {txid}")
            }
            ChainError::ChainExists(path) => {
                write!(f, "chain already exists at {path}; do not create it again")
            }
            ChainError::ChainMissing(path) => {
                write!(f, "no chain found at {path}; create one first")
            }
            ChainError::BlockNotFound(hash) => write!(f, "block not found: {hash}"),
            ChainError::TxNotFound(msg) => write!(f, "transaction not found: {msg}"),
            ChainError::Storage(msg) => write!(f, "storage error: {msg}"),
            ChainError::Protocol(msg) => write!(f, "protocol error: {msg}"),
            ChainError::Crypto(msg) => write!(f, "cryptographic error: {msg}"),
            ChainError::Serialization(msg) => write!(f, "serialization error: {msg}"),
            ChainError::Wallet(msg) => write!(f, "wallet error: {msg}"),
            ChainError::Io(msg) => write!(f, "i/o error: {msg}"),
        }
    }
}

impl std::error::Error for ChainError {}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::Io(err.to_string())
    }
}

impl From<sled::Error> for ChainError {
    fn from(err: sled::Error) -> Self {
        ChainError::Storage(err.to_string())
    }
}

impl From<bincode::error::EncodeError> for ChainError {
    fn from(err: bincode::error::EncodeError) -> Self {
        ChainError::Serialization(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for ChainError {
    fn from(err: bincode::error::DecodeError) -> Self {
        ChainError::Serialization(err.to_string())
    }
}
