use crate::error::{ChainError, Result};
use crate::utils::{
    base58_decode, base58_encode, new_key_pair, ripemd160_digest, sha256_digest,
};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use serde::{Deserialize, Serialize};

const VERSION: u8 = 0x00;
pub const ADDRESS_CHECK_SUM_LEN: usize = 4;
pub const PUB_KEY_HASH_LEN: usize = 20;

/// An ECDSA P-256 key pair. `public_key` holds the raw `X || Y`
/// coordinates (each padded to 32 bytes); `pkcs8` is the signing key
/// document the key was generated into.
#[derive(Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Wallet {
    pkcs8: Vec<u8>,
    public_key: Vec<u8>,
}

impl Wallet {
    pub fn new() -> Result<Wallet> {
        let pkcs8 = new_key_pair()?;
        let rng = SystemRandom::new();
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &rng)
                .map_err(|e| {
                    ChainError::Crypto(format!("failed to load key pair from PKCS#8: {e}"))
                })?;
        // ring hands back the uncompressed point 0x04 || X || Y; only the
        // coordinates are kept.
        let public_key = key_pair.public_key().as_ref()[1..].to_vec();
        Ok(Wallet { pkcs8, public_key })
    }

    /// Base58 address: version byte, RIPEMD-160(SHA-256(public key)),
    /// then a 4-byte double-SHA-256 checksum.
    pub fn get_address(&self) -> String {
        let pub_key_hash = hash_pub_key(self.public_key.as_slice());
        let mut payload: Vec<u8> = vec![VERSION];
        payload.extend(pub_key_hash.as_slice());
        let checksum = checksum(payload.as_slice());
        payload.extend(checksum.as_slice());
        base58_encode(payload.as_slice())
    }

    pub fn get_public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }

    pub fn get_pkcs8(&self) -> &[u8] {
        self.pkcs8.as_slice()
    }
}

/// RIPEMD-160 over SHA-256, the canonical owner identity inside outputs.
pub fn hash_pub_key(pub_key: &[u8]) -> Vec<u8> {
    let pub_key_sha256 = sha256_digest(pub_key);
    ripemd160_digest(pub_key_sha256.as_slice())
}

fn checksum(payload: &[u8]) -> Vec<u8> {
    let first_sha = sha256_digest(payload);
    let second_sha = sha256_digest(first_sha.as_slice());
    second_sha[0..ADDRESS_CHECK_SUM_LEN].to_vec()
}

/// Checks structure and checksum; any tampered address is rejected.
pub fn validate_address(address: &str) -> bool {
    let payload = match base58_decode(address) {
        Ok(payload) => payload,
        Err(_) => return false,
    };

    if payload.len() < 1 + PUB_KEY_HASH_LEN + ADDRESS_CHECK_SUM_LEN {
        return false;
    }

    let actual_checksum = &payload[payload.len() - ADDRESS_CHECK_SUM_LEN..];
    let versioned_payload = &payload[..payload.len() - ADDRESS_CHECK_SUM_LEN];
    let target_checksum = checksum(versioned_payload);
    actual_checksum.eq(target_checksum.as_slice())
}

/// Extracts the 20-byte pubkey hash out of a validated address.
pub fn pub_key_hash_from_address(address: &str) -> Result<Vec<u8>> {
    if !validate_address(address) {
        return Err(ChainError::InvalidAddress(address.to_string()));
    }
    let payload = base58_decode(address)?;
    Ok(payload[1..payload.len() - ADDRESS_CHECK_SUM_LEN].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_wallet_public_key_is_xy_form() {
        let wallet = Wallet::new().unwrap();
        assert_eq!(wallet.get_public_key().len(), 64);
    }

    #[test]
    fn test_address_round_trip() {
        let wallet = Wallet::new().unwrap();
        let address = wallet.get_address();
        assert!(validate_address(&address));

        let payload = base58_decode(&address).unwrap();
        assert_eq!(payload[0], VERSION);
        assert_eq!(payload.len(), 1 + PUB_KEY_HASH_LEN + ADDRESS_CHECK_SUM_LEN);
    }

    #[test]
    fn test_tampered_address_is_rejected() {
        let wallet = Wallet::new().unwrap();
        let address = wallet.get_address();

        // flip every character position in turn; each mutation must fail
        let bytes = address.as_bytes();
        for pos in 0..bytes.len() {
            let mut tampered = bytes.to_vec();
            tampered[pos] = if tampered[pos] == b'2' { b'3' } else { b'2' };
            let tampered = String::from_utf8(tampered).unwrap();
            if tampered == address {
                continue;
            }
            assert!(
                !validate_address(&tampered),
                "tampered address accepted at position {pos}"
            );
        }
    }

    #[test]
    fn test_too_short_address_is_rejected() {
        assert!(!validate_address("1abc"));
        assert!(!validate_address(""));
    }

    #[test]
    fn test_hash_pub_key_len() {
        let wallet = Wallet::new().unwrap();
        assert_eq!(hash_pub_key(wallet.get_public_key()).len(), PUB_KEY_HASH_LEN);
    }

    #[test]
    fn test_pub_key_hash_from_address_matches_wallet() {
        let wallet = Wallet::new().unwrap();
        let extracted = pub_key_hash_from_address(&wallet.get_address()).unwrap();
        assert_eq!(extracted, hash_pub_key(wallet.get_public_key()));
    }
}
