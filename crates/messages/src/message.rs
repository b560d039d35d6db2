//! The wire message sum type.

use kestrel_types::{Block, Proof, Proposal, Vote};
use serde::{Deserialize, Serialize};

/// Messages exchanged between nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    // ═══════════════════════════════════════════════════════════════════════
    // Consensus
    // ═══════════════════════════════════════════════════════════════════════
    /// The sender entered `height`; it has every block below it.
    NewHeight(u64),

    /// The sender moved to a new view backed by `Proof`.
    NewView(Proof),

    /// Block candidate from the round's primary.
    Proposal(Box<Proposal>),

    /// A VALIDATE, PRE_COMMIT or COMMIT vote.
    Vote(Vote),

    // ═══════════════════════════════════════════════════════════════════════
    // Synchronization
    // ═══════════════════════════════════════════════════════════════════════
    /// Request for the block at a height.
    GetBlock(u64),

    /// Response to `GetBlock`.
    Block(Box<Block>),
}

impl Message {
    /// Get a human-readable name for this message type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::NewHeight(_) => "NEW_HEIGHT",
            Message::NewView(_) => "NEW_VIEW",
            Message::Proposal(_) => "PROPOSAL",
            Message::Vote(_) => "VOTE",
            Message::GetBlock(_) => "GET_BLOCK",
            Message::Block(_) => "BLOCK",
        }
    }

    /// Check if this message is handled by the consensus engine.
    pub fn is_consensus(&self) -> bool {
        matches!(
            self,
            Message::NewHeight(_) | Message::NewView(_) | Message::Proposal(_) | Message::Vote(_)
        )
    }

    /// Check if this message is handled by the synchronizer.
    pub fn is_sync(&self) -> bool {
        matches!(self, Message::GetBlock(_) | Message::Block(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_routing() {
        assert!(Message::NewHeight(3).is_consensus());
        assert!(!Message::NewHeight(3).is_sync());
        assert!(Message::GetBlock(3).is_sync());
        assert_eq!(Message::GetBlock(3).type_name(), "GET_BLOCK");
    }
}
