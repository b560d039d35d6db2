//! Core types for Kestrel consensus.
//!
//! This crate provides the foundational types shared by the consensus engine,
//! the block synchronizer and the ledger:
//!
//! - **Primitives**: [`Hash`], [`Address`], [`PeerId`], [`KeyPair`], [`Signature`]
//! - **Chain data**: [`Transaction`], [`TransactionResult`], [`BlockHeader`], [`Block`]
//! - **Consensus**: [`Vote`], [`VoteType`], [`Proof`], [`Proposal`]
//! - **State**: [`Account`], [`Delegate`], [`ValidatorStats`]
//!
//! All signed objects sign a domain-separated payload built in [`signing`].

mod block;
mod crypto;
mod hash;
mod identifiers;
mod merkle;
mod proposal;
pub mod signing;
mod state;
mod transaction;
mod vote;

pub use block::{results_root, transactions_root, Block, BlockHeader};
pub use crypto::{KeyPair, PublicKey, Signature};
pub use hash::{Hash, HexError};
pub use identifiers::{primary_for, quorum_threshold, Address, PeerId};
pub use merkle::merkle_root;
pub use proposal::{Proof, Proposal};
pub use state::{Account, Delegate, ValidatorStats};
pub use transaction::{Transaction, TransactionError, TransactionResult, TransactionType};
pub use vote::{Vote, VoteType};

/// Current wall-clock time in Unix milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
