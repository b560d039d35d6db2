//! Event types for the consensus state machine.

use kestrel_types::{Proof, Proposal, Vote};

/// All possible events the consensus engine can receive.
///
/// Events are **passive data**: they describe something that happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // ═══════════════════════════════════════════════════════════════════════
    // Timer
    // ═══════════════════════════════════════════════════════════════════════
    /// The deadline armed for the current phase elapsed.
    Timeout,

    // ═══════════════════════════════════════════════════════════════════════
    // Network
    // ═══════════════════════════════════════════════════════════════════════
    /// A validator peer reported it entered `height`.
    NewHeight { height: u64 },

    /// A peer moved to a new view.
    NewView { proof: Proof },

    /// A proposal arrived from the network.
    Proposal { proposal: Box<Proposal> },

    /// A vote arrived from the network.
    Vote { vote: Vote },

    // ═══════════════════════════════════════════════════════════════════════
    // Lifecycle
    // ═══════════════════════════════════════════════════════════════════════
    /// Block synchronization finished; consensus resumes at the new head.
    SyncCompleted,

    /// Unblocks the event loop so it can observe shutdown.
    Stop,
}

impl Event {
    /// Get a human-readable name for this event type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::Timeout => "Timeout",
            Event::NewHeight { .. } => "NewHeight",
            Event::NewView { .. } => "NewView",
            Event::Proposal { .. } => "Proposal",
            Event::Vote { .. } => "Vote",
            Event::SyncCompleted => "SyncCompleted",
            Event::Stop => "Stop",
        }
    }
}
