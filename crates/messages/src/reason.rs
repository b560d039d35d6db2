//! Disconnect reasons.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a peer is being disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReasonCode {
    /// The peer sent an invalid proposal or vote.
    ConsensusError,
    /// The peer served an invalid block during synchronization.
    BadPeer,
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReasonCode::ConsensusError => "consensus error",
            ReasonCode::BadPeer => "bad peer",
        };
        f.write_str(name)
    }
}
