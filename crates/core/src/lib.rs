//! Core types for Kestrel consensus.
//!
//! This crate provides the foundational types for the consensus architecture:
//!
//! - [`Event`]: All possible inputs to the state machine
//! - [`Action`]: All possible outputs from the state machine
//! - [`StateMachine`]: The trait the consensus engine implements
//! - [`Channel`] / [`ChannelManager`]: The peer transport the runner and the
//!   synchronizer talk through
//!
//! # Architecture
//!
//! ```text
//! Events → StateMachine::handle() → Actions
//! ```
//!
//! The state machine is synchronous and performs no network I/O. The runner
//! delivers events one at a time, then executes the returned actions
//! (broadcasts, timer changes, starting synchronization).

mod action;
mod channel;
mod event;
mod traits;

pub use action::Action;
pub use channel::{Channel, ChannelManager};
pub use event::Event;
pub use traits::StateMachine;
