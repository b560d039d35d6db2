//! TOML node configuration.
//!
//! Every section and field is optional; missing values take the defaults of
//! the corresponding runtime config. Durations are in milliseconds.
//!
//! ```toml
//! log_filter = "info,kestrel_bft=debug"
//!
//! [consensus]
//! propose_timeout_ms = 12000
//! relay_redundancy = 16
//!
//! [sync]
//! max_in_flight = 16
//!
//! [chain]
//! block_reward = 3000000000
//! ```

use crate::NodeError;
use kestrel_bft::BftConfig;
use kestrel_engine::ChainConfig;
use kestrel_sync::SyncConfig;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level node configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Fallback `EnvFilter` directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    #[serde(default)]
    pub consensus: ConsensusSection,

    #[serde(default)]
    pub sync: SyncSection,

    #[serde(default)]
    pub chain: ChainSection,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            consensus: ConsensusSection::default(),
            sync: SyncSection::default(),
            chain: ChainSection::default(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| NodeError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, NodeError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn bft_config(&self) -> BftConfig {
        self.consensus.to_bft_config()
    }

    pub fn sync_config(&self) -> SyncConfig {
        self.sync.to_sync_config()
    }

    pub fn chain_config(&self) -> ChainConfig {
        self.chain.to_chain_config()
    }
}

/// `[consensus]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsensusSection {
    pub new_height_timeout_ms: u64,
    pub propose_timeout_ms: u64,
    pub validate_timeout_ms: u64,
    pub pre_commit_timeout_ms: u64,
    pub commit_timeout_ms: u64,
    pub finalize_timeout_ms: u64,
    pub relay_redundancy: usize,
    pub validator_refresh_interval_ms: u64,
    pub max_proposal_bytes: usize,
    pub valid_block_cache_size: usize,
}

impl Default for ConsensusSection {
    fn default() -> Self {
        let config = BftConfig::default();
        Self {
            new_height_timeout_ms: millis(config.new_height_timeout),
            propose_timeout_ms: millis(config.propose_timeout),
            validate_timeout_ms: millis(config.validate_timeout),
            pre_commit_timeout_ms: millis(config.pre_commit_timeout),
            commit_timeout_ms: millis(config.commit_timeout),
            finalize_timeout_ms: millis(config.finalize_timeout),
            relay_redundancy: config.relay_redundancy,
            validator_refresh_interval_ms: millis(config.validator_refresh_interval),
            max_proposal_bytes: config.max_proposal_bytes,
            valid_block_cache_size: config.valid_block_cache_size,
        }
    }
}

impl ConsensusSection {
    pub fn to_bft_config(&self) -> BftConfig {
        BftConfig {
            new_height_timeout: Duration::from_millis(self.new_height_timeout_ms),
            propose_timeout: Duration::from_millis(self.propose_timeout_ms),
            validate_timeout: Duration::from_millis(self.validate_timeout_ms),
            pre_commit_timeout: Duration::from_millis(self.pre_commit_timeout_ms),
            commit_timeout: Duration::from_millis(self.commit_timeout_ms),
            finalize_timeout: Duration::from_millis(self.finalize_timeout_ms),
            relay_redundancy: self.relay_redundancy,
            validator_refresh_interval: Duration::from_millis(self.validator_refresh_interval_ms),
            max_proposal_bytes: self.max_proposal_bytes,
            valid_block_cache_size: self.valid_block_cache_size.max(1),
        }
    }
}

/// `[sync]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    pub interval_ms: u64,
    pub download_timeout_ms: u64,
    pub max_in_flight: usize,
    pub max_pending_blocks: usize,
}

impl Default for SyncSection {
    fn default() -> Self {
        let config = SyncConfig::default();
        Self {
            interval_ms: millis(config.interval),
            download_timeout_ms: millis(config.download_timeout),
            max_in_flight: config.max_in_flight,
            max_pending_blocks: config.max_pending_blocks,
        }
    }
}

impl SyncSection {
    pub fn to_sync_config(&self) -> SyncConfig {
        SyncConfig {
            interval: Duration::from_millis(self.interval_ms.max(1)),
            download_timeout: Duration::from_millis(self.download_timeout_ms),
            max_in_flight: self.max_in_flight,
            max_pending_blocks: self.max_pending_blocks,
        }
    }
}

/// `[chain]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChainSection {
    pub block_reward: u64,
    pub max_block_transactions_bytes: usize,
    pub max_transaction_data_bytes: usize,
    pub max_header_data_bytes: usize,
    pub max_block_time_drift_ms: u64,
    pub validator_update_interval: u64,
    pub max_validators: usize,
    pub min_transaction_fee: u64,
    pub delegate_burn_amount: u64,
}

impl Default for ChainSection {
    fn default() -> Self {
        let config = ChainConfig::default();
        Self {
            block_reward: config.block_reward,
            max_block_transactions_bytes: config.max_block_transactions_bytes,
            max_transaction_data_bytes: config.max_transaction_data_bytes,
            max_header_data_bytes: config.max_header_data_bytes,
            max_block_time_drift_ms: config.max_block_time_drift_ms,
            validator_update_interval: config.validator_update_interval,
            max_validators: config.max_validators,
            min_transaction_fee: config.min_transaction_fee,
            delegate_burn_amount: config.delegate_burn_amount,
        }
    }
}

impl ChainSection {
    pub fn to_chain_config(&self) -> ChainConfig {
        ChainConfig {
            block_reward: self.block_reward,
            max_block_transactions_bytes: self.max_block_transactions_bytes,
            max_transaction_data_bytes: self.max_transaction_data_bytes,
            max_header_data_bytes: self.max_header_data_bytes,
            max_block_time_drift_ms: self.max_block_time_drift_ms,
            validator_update_interval: self.validator_update_interval.max(1),
            max_validators: self.max_validators,
            min_transaction_fee: self.min_transaction_fee,
            delegate_burn_amount: self.delegate_burn_amount,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
