//! Chain parameters.

/// Chain-wide parameters used by validation, execution and the ledger.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Reward credited to the coinbase of every non-genesis block.
    pub block_reward: u64,

    /// Maximum total transaction bytes in one block.
    pub max_block_transactions_bytes: usize,

    /// Maximum `data` length of a transaction.
    pub max_transaction_data_bytes: usize,

    /// Maximum `data` length of a block header.
    pub max_header_data_bytes: usize,

    /// Maximum amount a header timestamp may run ahead of local time.
    pub max_block_time_drift_ms: u64,

    /// The validator set is recomputed every this many blocks.
    pub validator_update_interval: u64,

    /// Maximum number of validators.
    pub max_validators: usize,

    pub min_transaction_fee: u64,

    /// Exact value a DELEGATE transaction must burn.
    pub delegate_burn_amount: u64,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            block_reward: 3_000_000_000,
            max_block_transactions_bytes: 1024 * 1024,
            max_transaction_data_bytes: 128,
            max_header_data_bytes: 32,
            max_block_time_drift_ms: 30_000,
            validator_update_interval: 200,
            max_validators: 100,
            min_transaction_fee: 5_000_000,
            delegate_burn_amount: 1_000_000_000_000,
        }
    }
}

impl ChainConfig {
    pub fn with_block_reward(mut self, reward: u64) -> Self {
        self.block_reward = reward;
        self
    }

    pub fn with_max_block_transactions_bytes(mut self, bytes: usize) -> Self {
        self.max_block_transactions_bytes = bytes;
        self
    }

    pub fn with_validator_update_interval(mut self, interval: u64) -> Self {
        self.validator_update_interval = interval.max(1);
        self
    }

    pub fn with_max_validators(mut self, max: usize) -> Self {
        self.max_validators = max;
        self
    }

    pub fn with_min_transaction_fee(mut self, fee: u64) -> Self {
        self.min_transaction_fee = fee;
        self
    }

    pub fn with_delegate_burn_amount(mut self, amount: u64) -> Self {
        self.delegate_burn_amount = amount;
        self
    }
}
