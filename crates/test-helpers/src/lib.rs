//! Properly signed fixtures for consensus and synchronization tests.
//!
//! Keys are deterministic, and [`validator_keys`] returns them sorted by
//! address, so index `i` in the returned list is also index `i` in
//! `Ledger::validators()` of a [`genesis_ledger`] built from them.

mod chain;
mod network;

pub use chain::{
    build_next_block, commit_signatures, extend_chain, genesis_ledger, importer, test_chain_config,
    transfer, validator_keys, TEST_BALANCE,
};
pub use network::{TestChannel, TestChannelManager, TestPool};
