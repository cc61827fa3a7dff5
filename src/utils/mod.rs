//! Cryptographic primitives, encodings and the crate codec.

pub mod crypto;
pub mod serialization;

pub use crypto::{
    base58_decode, base58_encode, current_timestamp, ecdsa_p256_sha256_sign_digest,
    ecdsa_p256_sha256_verify, new_key_pair, random_bytes, ripemd160_digest, sha256_digest,
};

pub use serialization::{deserialize, serialize};
