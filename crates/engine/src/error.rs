//! Error types for block import.

use kestrel_types::Hash;
use thiserror::Error;

/// Reasons a block is rejected. All of these are recoverable: the block is
/// dropped and, when it came from a peer, the peer is penalised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    #[error("header is malformed")]
    InvalidHeader,

    #[error("block {number} does not extend the chain head {head}")]
    NotNextBlock { number: u64, head: u64 },

    #[error("timestamp {timestamp} is too far ahead of local time")]
    TimestampInFuture { timestamp: u64 },

    #[error("transactions root does not match the header")]
    TransactionsRootMismatch,

    #[error("invalid transaction {0:?}")]
    InvalidTransaction(Hash),

    #[error("duplicate transaction {0:?}")]
    DuplicateTransaction(Hash),

    #[error("transactions take {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("results do not match execution")]
    ResultsMismatch,

    #[error("results root does not match the header")]
    ResultsRootMismatch,

    #[error("commit evidence has {valid} valid signatures, quorum is {quorum}")]
    InsufficientVotes { valid: usize, quorum: usize },

    #[error("commit signature from {0} is invalid or not from a validator")]
    InvalidVote(String),

    #[error("duplicate commit signature from {0}")]
    DuplicateVote(String),
}

/// Violations of the ledger's append discipline. These indicate a bug or a
/// race between writers and are not recoverable by retrying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("block {number} is not contiguous with head {head}")]
    NonContiguous { number: u64, head: u64 },

    #[error("state snapshot tracked at height {tracked} but head is {head}")]
    StaleSnapshot { tracked: u64, head: u64 },
}

/// Failure to import a block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportError {
    #[error("invalid block: {0}")]
    Block(#[from] BlockError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}
