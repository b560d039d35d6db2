//! The ledger contract shared by consensus and synchronization.

use crate::{AccountState, DelegateState, LedgerError};
use kestrel_types::{Address, Block, Hash, ValidatorStats};
use std::sync::Arc;

/// Append-only chain storage plus account and validator state.
///
/// [`commit_block`](Ledger::commit_block) is the only mutation. It holds the
/// ledger's single write lock for the whole commit-and-append sequence, so
/// the consensus engine and the synchronizer can never interleave appends.
pub trait Ledger: Send + Sync {
    fn latest_block(&self) -> Arc<Block>;

    fn latest_height(&self) -> u64 {
        self.latest_block().number()
    }

    fn get_block(&self, height: u64) -> Option<Arc<Block>>;

    fn get_block_by_hash(&self, hash: &Hash) -> Option<Arc<Block>>;

    /// Whether a transaction with this hash is already in the chain.
    fn has_transaction(&self, hash: &Hash) -> bool;

    /// Current validator set, sorted by address.
    fn validators(&self) -> Vec<Address>;

    fn validator_stats(&self, address: &Address) -> ValidatorStats;

    /// Snapshot of account state at the chain head.
    fn account_state(&self) -> AccountState;

    /// Snapshot of delegate state at the chain head.
    fn delegate_state(&self) -> DelegateState;

    /// Replace the head state with `accounts`/`delegates` and append `block`.
    ///
    /// Fails without side effects if `block` is not exactly `latest + 1` or
    /// if either snapshot was tracked from a different head.
    fn commit_block(
        &self,
        block: Block,
        accounts: AccountState,
        delegates: DelegateState,
    ) -> Result<(), LedgerError>;
}
