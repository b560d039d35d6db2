//! Binary Merkle roots over transaction and result hashes.

use crate::Hash;

/// Hash two nodes into their parent.
fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    Hash::from_parts(&[left.as_bytes(), right.as_bytes()])
}

/// Compute the Merkle root of `leaves`.
///
/// An empty list yields [`Hash::ZERO`] and a single leaf is its own root.
/// An odd node at any level is paired with itself.
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return Hash::ZERO;
    }

    let mut level: Vec<Hash> = leaves.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let left = &pair[0];
                let right = pair.get(1).unwrap_or(left);
                hash_pair(left, right)
            })
            .collect();
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_root_is_zero() {
        assert_eq!(merkle_root(&[]), Hash::ZERO);
    }

    #[test]
    fn test_single_leaf() {
        let leaf = Hash::from_bytes(b"single leaf");
        assert_eq!(merkle_root(&[leaf]), leaf);
    }

    #[test]
    fn test_two_leaves() {
        let leaf0 = Hash::from_bytes(b"leaf 0");
        let leaf1 = Hash::from_bytes(b"leaf 1");
        assert_eq!(merkle_root(&[leaf0, leaf1]), hash_pair(&leaf0, &leaf1));
    }

    #[test]
    fn test_odd_leaf_is_paired_with_itself() {
        let leaves: Vec<Hash> = (0..3u8).map(|i| Hash::from_bytes(&[i])).collect();
        let expected = hash_pair(
            &hash_pair(&leaves[0], &leaves[1]),
            &hash_pair(&leaves[2], &leaves[2]),
        );
        assert_eq!(merkle_root(&leaves), expected);
    }

    #[test]
    fn test_order_matters() {
        let a = Hash::from_bytes(b"a");
        let b = Hash::from_bytes(b"b");
        assert_ne!(merkle_root(&[a, b]), merkle_root(&[b, a]));
    }
}
