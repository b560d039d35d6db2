//! Proposals and the proof that licenses their view.

use crate::signing::proposal_message;
use crate::{transactions_root, BlockHeader, Hash, KeyPair, Signature, Transaction, Vote};
use serde::{Deserialize, Serialize};

/// Evidence that a round may run at `view`.
///
/// For view 0 `votes` is empty. For a later view it holds the PRE_COMMIT
/// rejections cast in `view - 1` (proof-of-unlock).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    pub height: u64,
    pub view: u32,
    pub votes: Vec<Vote>,
}

impl Proof {
    pub fn new(height: u64, view: u32, votes: Vec<Vote>) -> Self {
        Self {
            height,
            view,
            votes,
        }
    }

    /// Proof for view 0 of `height`.
    pub fn initial(height: u64) -> Self {
        Self::new(height, 0, Vec::new())
    }
}

/// A block candidate signed by the primary of its round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub proof: Proof,
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    pub signature: Signature,
}

impl Proposal {
    /// Build and sign a proposal.
    pub fn new(
        key: &KeyPair,
        proof: Proof,
        header: BlockHeader,
        transactions: Vec<Transaction>,
    ) -> Self {
        let message = proposal_message(
            proof.height,
            proof.view,
            &header.hash(),
            &header.transactions_root,
        );
        let signature = key.sign(&message);
        Self {
            proof,
            header,
            transactions,
            signature,
        }
    }

    pub fn height(&self) -> u64 {
        self.proof.height
    }

    pub fn view(&self) -> u32 {
        self.proof.view
    }

    pub fn block_hash(&self) -> Hash {
        self.header.hash()
    }

    /// Check the header height, the transaction root, and the signature.
    ///
    /// The primary check and the proof-of-unlock check need round state and
    /// are done by the consensus engine.
    pub fn validate(&self) -> bool {
        self.header.number == self.proof.height
            && self.header.transactions_root == transactions_root(&self.transactions)
            && self.signature.verify(&proposal_message(
                self.proof.height,
                self.proof.view,
                &self.header.hash(),
                &self.header.transactions_root,
            ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Address, TransactionType};

    fn header(number: u64, transactions: &[Transaction]) -> BlockHeader {
        BlockHeader {
            number,
            coinbase: Address([1u8; 20]),
            parent_hash: Hash::from_bytes(b"parent"),
            timestamp: 10,
            transactions_root: transactions_root(transactions),
            results_root: Hash::ZERO,
            state_root: Hash::ZERO,
            data: Vec::new(),
        }
    }

    #[test]
    fn test_signed_proposal_validates() {
        let key = KeyPair::from_seed(&[4u8; 32]);
        let proposal = Proposal::new(&key, Proof::initial(7), header(7, &[]), Vec::new());

        assert!(proposal.validate());
        assert_eq!(proposal.height(), 7);
        assert_eq!(proposal.view(), 0);
        assert_eq!(proposal.signature.address(), key.address());
    }

    #[test]
    fn test_height_mismatch_is_invalid() {
        let key = KeyPair::from_seed(&[4u8; 32]);
        let proposal = Proposal::new(&key, Proof::initial(7), header(8, &[]), Vec::new());
        assert!(!proposal.validate());
    }

    #[test]
    fn test_transaction_swap_is_invalid() {
        let key = KeyPair::from_seed(&[4u8; 32]);
        let tx = Transaction::new(
            &key,
            TransactionType::Transfer,
            Address([2u8; 20]),
            1,
            1,
            0,
            1,
            Vec::new(),
        );
        let mut proposal = Proposal::new(&key, Proof::initial(7), header(7, &[]), Vec::new());
        proposal.transactions.push(tx);
        assert!(!proposal.validate());
    }

    #[test]
    fn test_view_is_signed() {
        let key = KeyPair::from_seed(&[4u8; 32]);
        let mut proposal = Proposal::new(&key, Proof::initial(7), header(7, &[]), Vec::new());
        proposal.proof.view = 1;
        assert!(!proposal.validate());
    }
}
