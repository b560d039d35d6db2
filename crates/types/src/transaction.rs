//! Signed transactions and their execution results.

use crate::signing::transaction_message;
use crate::{Address, Hash, KeyPair, Signature};
use serde::{Deserialize, Serialize};

/// Kind of state transition a transaction requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionType {
    /// Move `value` from the sender to `to`.
    Transfer,
    /// Register the sender as a delegate named by `data`, burning `value`.
    Delegate,
    /// Lock `value` of the sender's balance as votes for delegate `to`.
    Vote,
    /// Release `value` of the sender's votes for delegate `to`.
    Unvote,
}

impl TransactionType {
    pub fn code(self) -> u8 {
        match self {
            TransactionType::Transfer => 0,
            TransactionType::Delegate => 1,
            TransactionType::Vote => 2,
            TransactionType::Unvote => 3,
        }
    }
}

/// A signed transaction.
///
/// `hash` covers every field except the signature; the signature covers the
/// hash. Both are recomputed by [`Transaction::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub kind: TransactionType,
    pub to: Address,
    pub value: u64,
    pub fee: u64,
    pub nonce: u64,
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
    pub data: Vec<u8>,
    pub hash: Hash,
    pub signature: Signature,
}

impl Transaction {
    /// Build and sign a transaction.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        key: &KeyPair,
        kind: TransactionType,
        to: Address,
        value: u64,
        fee: u64,
        nonce: u64,
        timestamp: u64,
        data: Vec<u8>,
    ) -> Self {
        let hash = Self::compute_hash(kind, &to, value, fee, nonce, timestamp, &data);
        let signature = key.sign(&transaction_message(&hash));
        Self {
            kind,
            to,
            value,
            fee,
            nonce,
            timestamp,
            data,
            hash,
            signature,
        }
    }

    fn compute_hash(
        kind: TransactionType,
        to: &Address,
        value: u64,
        fee: u64,
        nonce: u64,
        timestamp: u64,
        data: &[u8],
    ) -> Hash {
        Hash::from_parts(&[
            &[kind.code()],
            to.as_bytes(),
            &value.to_le_bytes(),
            &fee.to_le_bytes(),
            &nonce.to_le_bytes(),
            &timestamp.to_le_bytes(),
            &(data.len() as u32).to_le_bytes(),
            data,
        ])
    }

    /// Sender address, derived from the signature.
    pub fn from(&self) -> Address {
        self.signature.address()
    }

    /// Check the data size limit, the hash, and the signature.
    pub fn validate(&self, max_data_bytes: usize) -> bool {
        self.data.len() <= max_data_bytes
            && self.hash
                == Self::compute_hash(
                    self.kind,
                    &self.to,
                    self.value,
                    self.fee,
                    self.nonce,
                    self.timestamp,
                    &self.data,
                )
            && self.signature.verify(&transaction_message(&self.hash))
    }

    /// Approximate encoded size, used for block size limits.
    pub fn size(&self) -> usize {
        1 + Address::BYTES + 8 * 4 + 4 + self.data.len() + Hash::BYTES + 32 + 64
    }
}

/// Reason a transaction failed to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum TransactionError {
    #[error("nonce does not match the sender's account")]
    InvalidNonce,

    #[error("insufficient available balance")]
    InsufficientAvailable,

    #[error("insufficient locked balance")]
    InsufficientLocked,

    #[error("fee below the minimum")]
    FeeTooLow,

    #[error("invalid delegate name")]
    InvalidDelegateName,

    #[error("sender or name is already a registered delegate")]
    AlreadyDelegate,

    #[error("target is not a registered delegate")]
    NotDelegate,

    #[error("amount overflow")]
    Overflow,
}

impl TransactionError {
    pub fn code(self) -> u8 {
        match self {
            TransactionError::InvalidNonce => 1,
            TransactionError::InsufficientAvailable => 2,
            TransactionError::InsufficientLocked => 3,
            TransactionError::FeeTooLow => 4,
            TransactionError::InvalidDelegateName => 5,
            TransactionError::AlreadyDelegate => 6,
            TransactionError::NotDelegate => 7,
            TransactionError::Overflow => 8,
        }
    }
}

/// Outcome of executing one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResult {
    pub success: bool,
    pub error: Option<TransactionError>,
}

impl TransactionResult {
    pub fn success() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failure(error: TransactionError) -> Self {
        Self {
            success: false,
            error: Some(error),
        }
    }

    /// Leaf hash used for the block's results root.
    pub fn hash(&self) -> Hash {
        let code = self.error.map(TransactionError::code).unwrap_or(0);
        Hash::from_parts(&[&[self.success as u8, code]])
    }
}
