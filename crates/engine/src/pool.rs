//! Pending transaction source for block proposals.

use kestrel_types::Transaction;

/// Pending transactions waiting to be included in a block.
pub trait TransactionPool: Send + Sync {
    /// Pending transactions in inclusion order, at most `max_bytes` in total.
    fn pending(&self, max_bytes: usize) -> Vec<Transaction>;
}
