//! The one codec used across the crate.
//!
//! Serialized bytes feed hash pre-images (transaction ids, block
//! hashes), land in sled and cross the wire, so every producer and
//! consumer must go through this pair of functions.

use crate::error::Result;
use serde::{Deserialize, Serialize};

pub fn serialize<T: Serialize + bincode::Encode>(data: &T) -> Result<Vec<u8>> {
    let bytes = bincode::encode_to_vec(data, bincode::config::standard())?;
    Ok(bytes)
}

pub fn deserialize<T>(bytes: &[u8]) -> Result<T>
where
    T: for<'de> Deserialize<'de> + bincode::Decode<()>,
{
    let (data, _) = bincode::decode_from_slice(bytes, bincode::config::standard())?;
    Ok(data)
}
