//! RFC 6962 Merkle tree hash over evidence entry hashes.
//!
//! Leaf hash is `SHA256(0x00 || leaf)`, interior hash is
//! `SHA256(0x01 || left || right)`, and the left subtree of an n-leaf tree
//! covers the largest power of two strictly less than n.

use sha2::{Digest, Sha256};

/// Tree hash of an empty input list.
fn empty_hash() -> [u8; 32] {
    Sha256::digest(b"").into()
}

fn leaf_hash(leaf: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([0x00]);
    hasher.update(leaf);
    hasher.finalize().into()
}

fn node_hash(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([0x01]);
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

/// Largest power of two strictly less than `n`. Caller guarantees `n >= 2`.
fn split_point(n: usize) -> usize {
    let mut k = 1usize;
    while k.saturating_mul(2) < n {
        k = k.saturating_mul(2);
    }
    k
}

/// Compute the RFC 6962 tree hash over a list of leaves.
pub fn merkle_root(leaves: &[Vec<u8>]) -> [u8; 32] {
    match leaves.len() {
        0 => empty_hash(),
        1 => leaf_hash(&leaves[0]),
        n => {
            let k = split_point(n);
            let left = merkle_root(&leaves[..k]);
            let right = merkle_root(&leaves[k..]);
            node_hash(&left, &right)
        }
    }
}

/// Hex-encoded convenience wrapper over [`merkle_root`].
pub fn merkle_root_hex(leaves: &[Vec<u8>]) -> String {
    hex::encode(merkle_root(leaves))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tree_is_sha256_of_nothing() {
        assert_eq!(
            merkle_root_hex(&[]),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    // Known-answer values from RFC 6962 section 2.1.1 test vectors.
    #[test]
    fn test_single_empty_leaf() {
        assert_eq!(
            merkle_root_hex(&[vec![]]),
            "6e340b9cffb37a989ca544e6bb780a2c78901d3fb33738768511a30617afa01d"
        );
    }

    #[test]
    fn test_deterministic() {
        let leaves: Vec<Vec<u8>> = (0u8..7).map(|i| vec![i; 4]).collect();
        assert_eq!(merkle_root(&leaves), merkle_root(&leaves));
    }

    #[test]
    fn test_order_sensitivity() {
        let a = vec![b"one".to_vec(), b"two".to_vec()];
        let b = vec![b"two".to_vec(), b"one".to_vec()];
        assert_ne!(merkle_root(&a), merkle_root(&b));
    }

    #[test]
    fn test_split_point() {
        assert_eq!(split_point(2), 1);
        assert_eq!(split_point(3), 2);
        assert_eq!(split_point(4), 2);
        assert_eq!(split_point(5), 4);
        assert_eq!(split_point(8), 4);
        assert_eq!(split_point(9), 8);
    }

    #[test]
    fn test_two_leaves_matches_manual_computation() {
        let leaves = vec![b"a".to_vec(), b"b".to_vec()];
        let manual = node_hash(&leaf_hash(b"a"), &leaf_hash(b"b"));
        assert_eq!(merkle_root(&leaves), manual);
    }
}
