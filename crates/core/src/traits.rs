//! Core traits for state machines.

use crate::{Action, Event};
use std::time::Duration;

/// A state machine that processes events.
///
/// Implementations are:
///
/// - **Synchronous**: No async, no `.await`
/// - **Deterministic**: Same state + event = same actions
/// - **Pure-ish**: Mutates self and shared ledger state, but performs no
///   network I/O
///
/// Recoverable problems (a bad vote, an invalid proposal) are handled inside
/// `handle` and never surface as `Err`. An `Err` means the machine can no
/// longer make safe progress and its runner must stop driving it.
pub trait StateMachine {
    /// Unrecoverable failure.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Process an event, returning actions to perform.
    fn handle(&mut self, event: Event) -> Result<Vec<Action>, Self::Error>;

    /// Set the current time.
    ///
    /// Called by the runner before each `handle()` call.
    fn set_time(&mut self, now: Duration);

    /// Get the current time.
    fn now(&self) -> Duration;
}
