//! Consensus runner for Kestrel nodes.
//!
//! Wraps the synchronous [`BftState`](kestrel_bft::BftState) in a tokio event
//! loop and performs the I/O its actions ask for:
//!
//! - [`Timer`]: one replaceable phase timeout
//! - [`Broadcaster`]: relays messages to a random subset of validators
//! - [`ConsensusRunner`]: the event loop, inbound message dispatch, pausing
//!   for synchronization, and the `start`/`stop` lifecycle
//!
//! [`NodeConfig`] loads every tunable from TOML, and [`init_logging`] sets up
//! the `tracing` subscriber.

mod broadcaster;
mod config;
mod error;
mod logging;
mod runner;
mod timer;

pub use broadcaster::Broadcaster;
pub use config::{ChainSection, ConsensusSection, NodeConfig, SyncSection};
pub use error::NodeError;
pub use logging::init_logging;
pub use runner::{ConsensusRunner, Status};
pub use timer::Timer;
