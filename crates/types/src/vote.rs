//! Consensus votes.

use crate::signing::vote_message;
use crate::{Address, Hash, KeyPair, Signature};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Phase a vote is cast in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteType {
    Validate,
    Precommit,
    Commit,
}

impl VoteType {
    pub fn code(self) -> u8 {
        match self {
            VoteType::Validate => 0,
            VoteType::Precommit => 1,
            VoteType::Commit => 2,
        }
    }
}

impl fmt::Display for VoteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoteType::Validate => write!(f, "VALIDATE"),
            VoteType::Precommit => write!(f, "PRE_COMMIT"),
            VoteType::Commit => write!(f, "COMMIT"),
        }
    }
}

/// A signed vote for one (phase, height, view).
///
/// Rejections carry [`Hash::ZERO`] as `block_hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub vote_type: VoteType,
    pub height: u64,
    pub view: u32,
    pub approve: bool,
    pub block_hash: Hash,
    pub signature: Signature,
}

impl Vote {
    /// Sign an approval of `block_hash`.
    pub fn approve(
        key: &KeyPair,
        vote_type: VoteType,
        height: u64,
        view: u32,
        block_hash: Hash,
    ) -> Self {
        Self::signed(key, vote_type, height, view, true, block_hash)
    }

    /// Sign a rejection.
    pub fn reject(key: &KeyPair, vote_type: VoteType, height: u64, view: u32) -> Self {
        Self::signed(key, vote_type, height, view, false, Hash::ZERO)
    }

    fn signed(
        key: &KeyPair,
        vote_type: VoteType,
        height: u64,
        view: u32,
        approve: bool,
        block_hash: Hash,
    ) -> Self {
        let signature = key.sign(&vote_message(vote_type, height, view, approve, &block_hash));
        Self {
            vote_type,
            height,
            view,
            approve,
            block_hash,
            signature,
        }
    }

    /// The payload the signature covers.
    pub fn signing_message(&self) -> Vec<u8> {
        vote_message(
            self.vote_type,
            self.height,
            self.view,
            self.approve,
            &self.block_hash,
        )
    }

    /// Structural check plus signature verification.
    pub fn validate(&self) -> bool {
        (self.approve || self.block_hash == Hash::ZERO)
            && self.signature.verify(&self.signing_message())
    }

    pub fn voter(&self) -> Address {
        self.signature.address()
    }
}
