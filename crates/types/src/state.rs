//! Account and delegate records held in ledger state.

use crate::Address;
use serde::{Deserialize, Serialize};

/// Balance record of one address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Spendable balance.
    pub available: u64,
    /// Balance locked as votes for delegates.
    pub locked: u64,
    /// Number of transactions sent from this address.
    pub nonce: u64,
}

/// A registered delegate. The top delegates by votes form the validator set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegate {
    pub address: Address,
    pub name: Vec<u8>,
    /// Height of the block that registered the delegate.
    pub registered_at: u64,
    /// Total value voted for this delegate.
    pub votes: u64,
}

impl Delegate {
    pub fn new(address: Address, name: Vec<u8>, registered_at: u64) -> Self {
        Self {
            address,
            name,
            registered_at,
            votes: 0,
        }
    }

    /// Delegate names are 3 to 16 characters of `[a-z0-9_]`.
    pub fn is_valid_name(name: &[u8]) -> bool {
        (3..=16).contains(&name.len())
            && name
                .iter()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == b'_')
    }
}

/// Per-validator production counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorStats {
    /// Blocks this validator was coinbase of.
    pub blocks_forged: u64,
    /// Heights where this validator was the view-0 primary and forged the block.
    pub turns_hit: u64,
    /// Heights where this validator was the view-0 primary but another
    /// validator forged the block.
    pub turns_missed: u64,
}
