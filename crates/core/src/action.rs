//! Action types for the consensus state machine.

use kestrel_messages::Message;
use std::time::Duration;

/// Actions the state machine wants to perform.
///
/// Actions are **commands**. The runner executes them; none of them block
/// the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    // ═══════════════════════════════════════════════════════════════════════
    // Network
    // ═══════════════════════════════════════════════════════════════════════
    /// Queue a message for the broadcaster, which relays it to a bounded
    /// random subset of connected validators.
    Broadcast { message: Message },

    /// Send a message directly to every connected validator.
    SendToValidators { message: Message },

    /// Send a message directly to every connected peer.
    SendToAll { message: Message },

    // ═══════════════════════════════════════════════════════════════════════
    // Timer
    // ═══════════════════════════════════════════════════════════════════════
    /// Replace the pending deadline with one `duration` from now.
    SetTimeout { duration: Duration },

    /// Disarm the pending deadline and drop any timeout not yet consumed.
    ClearTimeout,

    // ═══════════════════════════════════════════════════════════════════════
    // Synchronization
    // ═══════════════════════════════════════════════════════════════════════
    /// Pause consensus and download blocks up to (excluding) `target`.
    StartSync { target: u64 },
}

impl Action {
    /// Get a human-readable name for this action type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Action::Broadcast { .. } => "Broadcast",
            Action::SendToValidators { .. } => "SendToValidators",
            Action::SendToAll { .. } => "SendToAll",
            Action::SetTimeout { .. } => "SetTimeout",
            Action::ClearTimeout => "ClearTimeout",
            Action::StartSync { .. } => "StartSync",
        }
    }
}
