use crate::core::Block;
use crate::error::Result;
use crate::utils::sha256_digest;
use data_encoding::HEXLOWER;
use log::info;
use num_bigint::{BigInt, Sign};

/// Difficulty of the nonce search: the number of leading zero bits a
/// block hash must carry. Process-wide and deliberately low so mining
/// stays cheap.
pub const TARGET_BITS: u32 = 12;

const MAX_NONCE: i64 = i64::MAX;

/// The nonce search for one block. The target is `1 << (256 -
/// TARGET_BITS)`; a hash interpreted as a big-endian unsigned integer
/// must fall strictly below it.
pub struct ProofOfWork {
    block: Block,
    target: BigInt,
    tx_root: Vec<u8>,
}

impl ProofOfWork {
    pub fn new_proof_of_work(block: Block) -> Result<ProofOfWork> {
        let target = BigInt::from(1) << (256usize - TARGET_BITS as usize);
        let tx_root = block.hash_transactions()?;
        Ok(ProofOfWork {
            block,
            target,
            tx_root,
        })
    }

    /// The hash pre-image for a candidate nonce.
    fn prepare_data(&self, nonce: i64) -> Vec<u8> {
        let mut data = vec![];
        data.extend(self.block.get_prev_block_hash());
        data.extend(&self.tx_root);
        data.extend(self.block.get_timestamp().to_be_bytes());
        data.extend((TARGET_BITS as i64).to_be_bytes());
        data.extend(nonce.to_be_bytes());
        data
    }

    /// Scans nonces from zero until a hash below the target appears.
    pub fn run(&self) -> (i64, Vec<u8>) {
        let mut nonce = 0;
        let mut hash = vec![];

        info!(
            "mining block at height {} with {TARGET_BITS} target bits",
            self.block.get_height()
        );
        while nonce < MAX_NONCE {
            let data = self.prepare_data(nonce);
            hash = sha256_digest(&data);
            let hash_int = BigInt::from_bytes_be(Sign::Plus, &hash);

            if hash_int < self.target {
                info!("found hash {}", HEXLOWER.encode(&hash));
                break;
            }
            nonce += 1;
        }
        (nonce, hash)
    }

    /// Recomputes the hash with the stored nonce and compares against
    /// the target. Side-effect free.
    pub fn validate(block: &Block) -> bool {
        let pow = match ProofOfWork::new_proof_of_work(block.clone()) {
            Ok(pow) => pow,
            Err(_) => return false,
        };
        let hash = sha256_digest(&pow.prepare_data(block.get_nonce()));
        let hash_int = BigInt::from_bytes_be(Sign::Plus, &hash);
        hash_int < pow.target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::monetary::INITIAL_BLOCK_REWARD;
    use crate::core::Transaction;
    use crate::wallet::Wallet;

    fn mined_block() -> Block {
        let wallet = Wallet::new().unwrap();
        let coinbase =
            Transaction::new_coinbase_tx(&wallet.get_address(), vec![], INITIAL_BLOCK_REWARD)
                .unwrap();
        Block::generate_genesis_block(&coinbase).unwrap()
    }

    #[test]
    fn test_mined_block_hash_is_below_target() {
        let block = mined_block();
        let target = BigInt::from(1) << (256usize - TARGET_BITS as usize);
        let hash_int = BigInt::from_bytes_be(Sign::Plus, block.get_hash());
        assert!(hash_int < target);
    }

    #[test]
    fn test_validate_accepts_mined_block() {
        assert!(ProofOfWork::validate(&mined_block()));
    }

    #[test]
    fn test_validate_rejects_tampered_nonce() {
        let mut block = mined_block();
        block.set_nonce_for_test(block.get_nonce() + 1);
        assert!(!ProofOfWork::validate(&block));
    }

    #[test]
    fn test_prepare_data_is_deterministic() {
        let pow = ProofOfWork::new_proof_of_work(mined_block()).unwrap();
        assert_eq!(pow.prepare_data(7), pow.prepare_data(7));
        assert_ne!(pow.prepare_data(7), pow.prepare_data(8));
    }
}
