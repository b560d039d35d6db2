//! Block synchronization.
//!
//! When consensus notices the network is ahead, it pauses and hands a target
//! height to the [`Synchronizer`]. Two periodic tasks then share one set of
//! [`SyncQueues`]:
//!
//! - **download**: expires stale requests and asks a random idle peer for the
//!   lowest missing height
//! - **process**: applies the next block in height order through the shared
//!   `BlockImporter`, re-queueing it and dropping the peer if it is invalid
//!
//! `start` resolves once the ledger reaches `target - 1` or `stop` is called.

mod config;
mod queues;
mod synchronizer;

pub use config::SyncConfig;
pub use queues::SyncQueues;
pub use synchronizer::{SyncProgress, Synchronizer};
