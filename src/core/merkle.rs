use crate::error::{ChainError, Result};
use crate::utils::sha256_digest;

/// Binary hash tree over transaction serializations.
///
/// Leaves are SHA-256 digests of serialized transactions; a level of
/// odd width (above one) duplicates its last node; parents hash the
/// concatenation of their children. The root feeds the block hash
/// pre-image.
pub struct MerkleTree {
    root: Vec<u8>,
    leaf_count: usize,
}

impl MerkleTree {
    pub fn from_leaves(leaves: &[Vec<u8>]) -> Result<MerkleTree> {
        if leaves.is_empty() {
            return Err(ChainError::InvalidTx(
                "cannot build a Merkle tree without transactions".to_string(),
            ));
        }

        let mut level = leaves.to_vec();
        while level.len() > 1 {
            if level.len() % 2 != 0 {
                level.push(level[level.len() - 1].clone());
            }

            let mut parents = Vec::with_capacity(level.len() / 2);
            for pair in level.chunks(2) {
                parents.push(Self::hash_pair(&pair[0], &pair[1]));
            }
            level = parents;
        }

        Ok(MerkleTree {
            root: level.remove(0),
            leaf_count: leaves.len(),
        })
    }

    /// Convenience for callers that only need the root hash.
    pub fn root_from_leaves(leaves: &[Vec<u8>]) -> Result<Vec<u8>> {
        Ok(Self::from_leaves(leaves)?.root)
    }

    pub fn root_hash(&self) -> &[u8] {
        &self.root
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    fn hash_pair(left: &[u8], right: &[u8]) -> Vec<u8> {
        let mut combined = Vec::with_capacity(left.len() + right.len());
        combined.extend_from_slice(left);
        combined.extend_from_slice(right);
        sha256_digest(&combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(byte: u8) -> Vec<u8> {
        sha256_digest(&[byte])
    }

    #[test]
    fn test_empty_leaves_rejected() {
        assert!(MerkleTree::from_leaves(&[]).is_err());
    }

    #[test]
    fn test_single_leaf_is_the_root() {
        let l = leaf(1);
        let root = MerkleTree::root_from_leaves(&[l.clone()]).unwrap();
        assert_eq!(root, l);
    }

    #[test]
    fn test_two_leaves_hash_pairwise() {
        let (a, b) = (leaf(1), leaf(2));
        let root = MerkleTree::root_from_leaves(&[a.clone(), b.clone()]).unwrap();
        assert_eq!(root, MerkleTree::hash_pair(&a, &b));
    }

    #[test]
    fn test_odd_level_duplicates_last_leaf() {
        let (a, b, c) = (leaf(1), leaf(2), leaf(3));
        let odd = MerkleTree::root_from_leaves(&[a.clone(), b.clone(), c.clone()]).unwrap();
        let padded = MerkleTree::root_from_leaves(&[a, b, c.clone(), c]).unwrap();
        assert_eq!(odd, padded);
    }

    #[test]
    fn test_root_depends_on_leaf_order() {
        let (a, b) = (leaf(1), leaf(2));
        let forward = MerkleTree::root_from_leaves(&[a.clone(), b.clone()]).unwrap();
        let backward = MerkleTree::root_from_leaves(&[b, a]).unwrap();
        assert_ne!(forward, backward);
    }

    #[test]
    fn test_leaf_count_tracked() {
        let tree = MerkleTree::from_leaves(&[leaf(1), leaf(2), leaf(3)]).unwrap();
        assert_eq!(tree.leaf_count(), 3);
        assert_eq!(tree.root_hash().len(), 32);
    }
}
