//! BFT configuration.

use std::time::Duration;

/// Configuration for the consensus state machine.
#[derive(Debug, Clone)]
pub struct BftConfig {
    /// Time spent in NEW_HEIGHT before proposing.
    pub new_height_timeout: Duration,

    /// Time the primary has to get its proposal out.
    pub propose_timeout: Duration,

    pub validate_timeout: Duration,

    pub pre_commit_timeout: Duration,

    /// Upper bound on COMMIT. A COMMIT quorum ends the phase early.
    pub commit_timeout: Duration,

    /// Pause after finalizing before the next height starts.
    pub finalize_timeout: Duration,

    /// Number of validators each outbound message is relayed to.
    pub relay_redundancy: usize,

    /// Maximum age of the validator and channel snapshot before it is
    /// refreshed outside of a phase transition.
    pub validator_refresh_interval: Duration,

    /// Upper bound on the transaction bytes pulled from the pool for a
    /// proposal.
    pub max_proposal_bytes: usize,

    /// Number of validated blocks kept for FINALIZE.
    pub valid_block_cache_size: usize,
}

impl Default for BftConfig {
    fn default() -> Self {
        Self {
            new_height_timeout: Duration::from_secs(3),
            propose_timeout: Duration::from_secs(12),
            validate_timeout: Duration::from_secs(6),
            pre_commit_timeout: Duration::from_secs(6),
            commit_timeout: Duration::from_secs(3),
            finalize_timeout: Duration::from_secs(3),
            relay_redundancy: 16,
            validator_refresh_interval: Duration::from_secs(120),
            max_proposal_bytes: 1024 * 1024,
            valid_block_cache_size: 8,
        }
    }
}

impl BftConfig {
    /// Scale every phase timeout to `timeout`. Handy for tests and local
    /// networks.
    pub fn with_phase_timeouts(mut self, timeout: Duration) -> Self {
        self.new_height_timeout = timeout;
        self.propose_timeout = timeout;
        self.validate_timeout = timeout;
        self.pre_commit_timeout = timeout;
        self.commit_timeout = timeout;
        self.finalize_timeout = timeout;
        self
    }

    pub fn with_propose_timeout(mut self, timeout: Duration) -> Self {
        self.propose_timeout = timeout;
        self
    }

    pub fn with_relay_redundancy(mut self, redundancy: usize) -> Self {
        self.relay_redundancy = redundancy;
        self
    }

    pub fn with_validator_refresh_interval(mut self, interval: Duration) -> Self {
        self.validator_refresh_interval = interval;
        self
    }

    pub fn with_max_proposal_bytes(mut self, bytes: usize) -> Self {
        self.max_proposal_bytes = bytes;
        self
    }

    /// Clamped to at least one entry.
    pub fn with_valid_block_cache_size(mut self, size: usize) -> Self {
        self.valid_block_cache_size = size.max(1);
        self
    }
}
