//! Block and BlockHeader types.

use crate::{merkle_root, Address, Hash, Signature, Transaction, TransactionResult};
use serde::{Deserialize, Serialize};

/// Block header.
///
/// Validators vote on the header hash. The header commits to the transaction
/// list and their results through two Merkle roots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block height in the chain (genesis = 0).
    pub number: u64,

    /// Address credited with the block reward and fees.
    pub coinbase: Address,

    pub parent_hash: Hash,

    /// Unix timestamp (milliseconds). Strictly increasing along the chain.
    pub timestamp: u64,

    pub transactions_root: Hash,
    pub results_root: Hash,

    /// Reserved for a future state commitment. It is covered by the header
    /// hash so the wire format stays fixed, and a block carrying anything
    /// other than [`Hash::ZERO`] is rejected.
    pub state_root: Hash,

    /// Free-form proposer data.
    pub data: Vec<u8>,
}

impl BlockHeader {
    /// Compute hash of this block header.
    pub fn hash(&self) -> Hash {
        Hash::from_parts(&[
            &self.number.to_le_bytes(),
            self.coinbase.as_bytes(),
            self.parent_hash.as_bytes(),
            &self.timestamp.to_le_bytes(),
            self.transactions_root.as_bytes(),
            self.results_root.as_bytes(),
            self.state_root.as_bytes(),
            &(self.data.len() as u32).to_le_bytes(),
            &self.data,
        ])
    }

    /// Structural checks independent of chain position.
    pub fn validate(&self, max_data_bytes: usize) -> bool {
        self.data.len() <= max_data_bytes && self.state_root == Hash::ZERO
    }

    /// Check that this header extends `parent`.
    pub fn extends(&self, parent: &BlockHeader) -> bool {
        self.number == parent.number + 1
            && self.parent_hash == parent.hash()
            && self.timestamp > parent.timestamp
    }

    pub fn is_genesis(&self) -> bool {
        self.number == 0
    }

    /// Create the genesis block header.
    pub fn genesis(timestamp: u64) -> Self {
        Self {
            number: 0,
            coinbase: Address::default(),
            parent_hash: Hash::ZERO,
            timestamp,
            transactions_root: Hash::ZERO,
            results_root: Hash::ZERO,
            state_root: Hash::ZERO,
            data: Vec::new(),
        }
    }
}

/// Complete block with header, transactions, results and commit evidence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    pub results: Vec<TransactionResult>,

    /// View in which the block was agreed.
    pub view: u32,

    /// PRE_COMMIT approval signatures collected for this block.
    pub votes: Vec<Signature>,
}

impl Block {
    pub fn new(
        header: BlockHeader,
        transactions: Vec<Transaction>,
        results: Vec<TransactionResult>,
    ) -> Self {
        Self {
            header,
            transactions,
            results,
            view: 0,
            votes: Vec::new(),
        }
    }

    pub fn genesis(timestamp: u64) -> Self {
        Self::new(BlockHeader::genesis(timestamp), Vec::new(), Vec::new())
    }

    pub fn hash(&self) -> Hash {
        self.header.hash()
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }

    /// Attach the view and commit signatures once the block is agreed.
    pub fn with_votes(mut self, view: u32, votes: Vec<Signature>) -> Self {
        self.view = view;
        self.votes = votes;
        self
    }
}

/// Merkle root over transaction hashes.
pub fn transactions_root(transactions: &[Transaction]) -> Hash {
    let leaves: Vec<Hash> = transactions.iter().map(|tx| tx.hash).collect();
    merkle_root(&leaves)
}

/// Merkle root over result hashes.
pub fn results_root(results: &[TransactionResult]) -> Hash {
    let leaves: Vec<Hash> = results.iter().map(TransactionResult::hash).collect();
    merkle_root(&leaves)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child_of(parent: &BlockHeader) -> BlockHeader {
        BlockHeader {
            number: parent.number + 1,
            coinbase: Address([1u8; 20]),
            parent_hash: parent.hash(),
            timestamp: parent.timestamp + 1,
            transactions_root: Hash::ZERO,
            results_root: Hash::ZERO,
            state_root: Hash::ZERO,
            data: Vec::new(),
        }
    }

    #[test]
    fn test_genesis_header() {
        let genesis = BlockHeader::genesis(0);
        assert!(genesis.is_genesis());
        assert_eq!(genesis.parent_hash, Hash::ZERO);
        assert!(genesis.validate(32));
    }

    #[test]
    fn test_header_hash_covers_fields() {
        let header = child_of(&BlockHeader::genesis(0));
        let mut changed = header.clone();
        changed.data = b"x".to_vec();
        assert_ne!(header.hash(), changed.hash());
    }

    #[test]
    fn test_extends() {
        let genesis = BlockHeader::genesis(100);
        let child = child_of(&genesis);
        assert!(child.extends(&genesis));

        let mut stale_time = child.clone();
        stale_time.timestamp = 100;
        assert!(!stale_time.extends(&genesis));

        let mut gap = child.clone();
        gap.number = 2;
        assert!(!gap.extends(&genesis));
    }

    #[test]
    fn test_header_data_limit_and_state_root() {
        let mut header = child_of(&BlockHeader::genesis(0));
        header.data = vec![0u8; 33];
        assert!(!header.validate(32));

        header.data.clear();
        header.state_root = Hash::from_bytes(b"state");
        assert!(!header.validate(32));
    }

    #[test]
    fn test_block_hash_is_header_hash() {
        let block = Block::genesis(5).with_votes(2, vec![Signature::zero()]);
        assert_eq!(block.hash(), block.header.hash());
        assert_eq!(block.view, 2);
        assert_eq!(block.number(), 0);
    }
}
