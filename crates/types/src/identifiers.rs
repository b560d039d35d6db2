//! Identifier newtypes.

use crate::{Hash, PublicKey};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Account address: the first 20 bytes of the Blake3 hash of a public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const BYTES: usize = 20;

    pub fn from_public_key(public_key: &PublicKey) -> Self {
        let digest = Hash::from_bytes(public_key.as_bytes());
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest.as_bytes()[..20]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", &self.to_hex()[..12])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

/// Transport-level identity of a connected peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Peer({})", self.0)
    }
}

/// Number of matching votes needed out of `validator_count`: `ceil(2n/3)`.
///
/// An empty validator set still requires one vote so that nothing can be
/// finalized without evidence.
pub fn quorum_threshold(validator_count: usize) -> usize {
    (validator_count * 2).div_ceil(3).max(1)
}

/// Primary (proposer) of round `(height, view)`.
///
/// `validators` must be sorted so every node picks the same primary.
/// Rotates through the list as `(height + view) % n`.
pub fn primary_for(validators: &[Address], height: u64, view: u32) -> Option<Address> {
    if validators.is_empty() {
        return None;
    }
    let index = (height.wrapping_add(view as u64)) % validators.len() as u64;
    validators.get(index as usize).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KeyPair;

    #[test]
    fn test_quorum_threshold() {
        assert_eq!(quorum_threshold(0), 1);
        assert_eq!(quorum_threshold(1), 1);
        assert_eq!(quorum_threshold(2), 2);
        assert_eq!(quorum_threshold(3), 2);
        assert_eq!(quorum_threshold(4), 3);
        assert_eq!(quorum_threshold(5), 4);
        assert_eq!(quorum_threshold(6), 4);
        assert_eq!(quorum_threshold(7), 5);
        assert_eq!(quorum_threshold(100), 67);
    }

    #[test]
    fn test_primary_rotation() {
        let validators: Vec<Address> = (0..4u8).map(|i| Address([i; 20])).collect();

        assert_eq!(primary_for(&validators, 0, 0), Some(validators[0]));
        assert_eq!(primary_for(&validators, 5, 0), Some(validators[1]));
        assert_eq!(primary_for(&validators, 5, 1), Some(validators[2]));
        assert_eq!(primary_for(&validators, 5, 3), Some(validators[0]));
        assert_eq!(primary_for(&[], 5, 0), None);
    }

    #[test]
    fn test_address_is_stable_per_key() {
        let key = KeyPair::from_seed(&[7u8; 32]);
        let other = KeyPair::from_seed(&[8u8; 32]);
        assert_eq!(key.address(), Address::from_public_key(&key.public_key()));
        assert_ne!(key.address(), other.address());
        assert_eq!(key.address().to_string().len(), 2 + 40);
    }
}
