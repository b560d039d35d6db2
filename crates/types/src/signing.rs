//! Domain-separated signing payloads.
//!
//! Every signed object in the protocol signs a byte string that starts with
//! a domain tag, so a signature produced for one purpose can never be
//! replayed as another.
//!
//! | Tag | Purpose |
//! |-----|---------|
//! | `kestrel_vote:` | VALIDATE / PRE_COMMIT / COMMIT votes, and block commit signatures |
//! | `kestrel_proposal:` | Proposals signed by the round's primary |
//! | `kestrel_tx:` | Transactions |
//!
//! A block's attached commit signatures are plain PRE_COMMIT approval vote
//! signatures, so they are verified with [`vote_message`] as well.

use crate::{Hash, VoteType};

/// Format: `kestrel_vote:` || vote_type || approve || height || view || block_hash
pub const DOMAIN_VOTE: &[u8] = b"kestrel_vote:";

/// Format: `kestrel_proposal:` || height || view || header_hash || tx_root
pub const DOMAIN_PROPOSAL: &[u8] = b"kestrel_proposal:";

/// Format: `kestrel_tx:` || tx_hash
pub const DOMAIN_TRANSACTION: &[u8] = b"kestrel_tx:";

/// Build the signing message for a vote.
///
/// Rejections carry [`Hash::ZERO`] as the block hash.
pub fn vote_message(
    vote_type: VoteType,
    height: u64,
    view: u32,
    approve: bool,
    block_hash: &Hash,
) -> Vec<u8> {
    let mut message = Vec::with_capacity(DOMAIN_VOTE.len() + 2 + 8 + 4 + 32);
    message.extend_from_slice(DOMAIN_VOTE);
    message.push(vote_type.code());
    message.push(approve as u8);
    message.extend_from_slice(&height.to_le_bytes());
    message.extend_from_slice(&view.to_le_bytes());
    message.extend_from_slice(block_hash.as_bytes());
    message
}

/// Build the signing message for a proposal.
pub fn proposal_message(height: u64, view: u32, header_hash: &Hash, tx_root: &Hash) -> Vec<u8> {
    let mut message = Vec::with_capacity(DOMAIN_PROPOSAL.len() + 8 + 4 + 64);
    message.extend_from_slice(DOMAIN_PROPOSAL);
    message.extend_from_slice(&height.to_le_bytes());
    message.extend_from_slice(&view.to_le_bytes());
    message.extend_from_slice(header_hash.as_bytes());
    message.extend_from_slice(tx_root.as_bytes());
    message
}

/// Build the signing message for a transaction.
pub fn transaction_message(tx_hash: &Hash) -> Vec<u8> {
    let mut message = Vec::with_capacity(DOMAIN_TRANSACTION.len() + 32);
    message.extend_from_slice(DOMAIN_TRANSACTION);
    message.extend_from_slice(tx_hash.as_bytes());
    message
}
