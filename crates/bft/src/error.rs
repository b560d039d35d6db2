//! Fatal consensus errors.

use kestrel_engine::LedgerError;
use thiserror::Error;

/// Errors that end the consensus event loop.
///
/// Protocol violations by peers never surface here. They are logged and
/// dropped by the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsensusError {
    /// Local round state contradicts itself, e.g. entering COMMIT without a
    /// PRE_COMMIT quorum.
    #[error("consensus invariant violated: {0}")]
    InvariantViolation(String),

    /// The ledger refused an append that consensus agreed on.
    #[error("ledger rejected finalized block: {0}")]
    Ledger(#[from] LedgerError),
}
