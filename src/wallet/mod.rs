//! Key management and address derivation.

pub mod wallet;
pub mod wallets;

pub use wallet::{
    hash_pub_key, pub_key_hash_from_address, validate_address, Wallet, ADDRESS_CHECK_SUM_LEN,
    PUB_KEY_HASH_LEN,
};
pub use wallets::Wallets;
