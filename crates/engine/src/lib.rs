//! Ledger, state and block import for Kestrel.
//!
//! - [`Ledger`]: append-only chain plus account/delegate/validator state,
//!   with [`MemoryLedger`] as the in-memory implementation
//! - [`AccountState`] / [`DelegateState`]: copy-on-write snapshots
//! - [`TransactionExecutor`]: deterministic execution, with
//!   [`TransferExecutor`] as the reference implementation
//! - [`TransactionPool`]: pending transactions for proposals
//! - [`BlockImporter`]: validation and application shared by the consensus
//!   engine and the synchronizer

mod config;
mod error;
mod executor;
mod importer;
mod ledger;
mod memory;
mod pool;
mod state;

pub use config::ChainConfig;
pub use error::{BlockError, ImportError, LedgerError};
pub use executor::{TransactionExecutor, TransferExecutor};
pub use importer::{BlockImporter, ExecutedBlock};
pub use ledger::Ledger;
pub use memory::{Genesis, MemoryLedger};
pub use pool::TransactionPool;
pub use state::{AccountState, DelegateState};
