//! Ed25519 key pairs and signatures.
//!
//! A [`Signature`] carries the signer's public key alongside the signature
//! bytes, so a vote or block signature identifies its signer's [`Address`]
//! without any side lookup.

use crate::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A signing key pair.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: ed25519_dalek::SigningKey,
}

impl KeyPair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let mut csprng = rand::rngs::OsRng;
        Self {
            signing_key: ed25519_dalek::SigningKey::generate(&mut csprng),
        }
    }

    /// Deterministic keypair from a seed (for testing/simulation).
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::from_bytes(seed),
        }
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        use ed25519_dalek::Signer;
        let sig = self.signing_key.sign(message);
        Signature {
            public_key: self.public_key(),
            bytes: sig.to_bytes().to_vec(),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.signing_key.verifying_key().to_bytes())
    }

    pub fn address(&self) -> Address {
        Address::from_public_key(&self.public_key())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// An Ed25519 public key (32 bytes).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Verify raw signature bytes over `message`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        use ed25519_dalek::Verifier;
        let pk = match ed25519_dalek::VerifyingKey::from_bytes(&self.0) {
            Ok(pk) => pk,
            Err(_) => return false,
        };
        let sig_array: [u8; 64] = match signature.try_into() {
            Ok(arr) => arr,
            Err(_) => return false,
        };
        let sig = ed25519_dalek::Signature::from_bytes(&sig_array);
        pk.verify(message, &sig).is_ok()
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.0))
    }
}

/// A signature bundled with the public key that produced it.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub public_key: PublicKey,
    /// Raw Ed25519 signature (64 bytes).
    pub bytes: Vec<u8>,
}

impl Signature {
    /// Placeholder signature that never verifies.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn zero() -> Self {
        Self {
            public_key: PublicKey([0u8; 32]),
            bytes: vec![0u8; 64],
        }
    }

    /// Address of the signer.
    pub fn address(&self) -> Address {
        Address::from_public_key(&self.public_key)
    }

    pub fn verify(&self, message: &[u8]) -> bool {
        self.public_key.verify(message, &self.bytes)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = hex::encode(&self.bytes);
        write!(
            f,
            "Signature({:?}, {}..)",
            self.address(),
            &hex[..hex.len().min(16)]
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let keypair = KeyPair::generate();
        let signature = keypair.sign(b"test message");

        assert!(signature.verify(b"test message"));
        assert!(!signature.verify(b"wrong message"));
        assert_eq!(signature.address(), keypair.address());
    }

    #[test]
    fn test_keypair_from_seed() {
        let seed = [42u8; 32];
        let kp1 = KeyPair::from_seed(&seed);
        let kp2 = KeyPair::from_seed(&seed);

        assert_eq!(kp1.sign(b"test"), kp2.sign(b"test"));
        assert_eq!(kp1.public_key(), kp2.public_key());
    }

    #[test]
    fn test_foreign_public_key_does_not_verify() {
        let signer = KeyPair::from_seed(&[1u8; 32]);
        let other = KeyPair::from_seed(&[2u8; 32]);

        let mut signature = signer.sign(b"payload");
        signature.public_key = other.public_key();
        assert!(!signature.verify(b"payload"));
    }

    #[test]
    fn test_zero_signature_never_verifies() {
        assert!(!Signature::zero().verify(b""));
        let mut truncated = KeyPair::generate().sign(b"x");
        truncated.bytes.truncate(10);
        assert!(!truncated.verify(b"x"));
    }
}
