//! BFT consensus state machine.
//!
//! This crate provides a synchronous, sans-IO implementation of a
//! phase-driven BFT protocol producing one block per height.
//!
//! # Architecture
//!
//! Each height runs one or more views. A view walks through the phases
//!
//! ```text
//! NEW_HEIGHT → PROPOSE → VALIDATE → PRE_COMMIT → COMMIT → FINALIZE
//! ```
//!
//! - `Event::Timeout` → Advance to the next phase
//! - `Event::Proposal` → Accept the primary's block candidate, possibly
//!   jumping to a later view
//! - `Event::Vote` → Tally into the matching [`VoteSet`]; a COMMIT quorum
//!   finalizes immediately
//! - `Event::NewView` → Jump to a later view backed by proof-of-unlock
//! - `Event::NewHeight` → Hand over to the synchronizer when the network is
//!   ahead
//!
//! All I/O is performed by the runner via returned `Action`s.

mod config;
mod error;
mod state;
mod vote_set;

pub use config::BftConfig;
pub use error::ConsensusError;
pub use state::{BftState, Phase, ValidatorView};
pub use vote_set::VoteSet;
