//! Vote tallying for one consensus round and phase.

use indexmap::IndexMap;
use kestrel_types::{quorum_threshold, Address, Hash, Signature, Vote, VoteType};
use std::collections::{BTreeSet, HashMap};
use tracing::trace;

/// Votes of one phase for one (height, view), checked against the validator
/// set the round started with.
///
/// Holds at most one vote per validator. The first vote from an address is
/// kept and later ones are discarded, so re-delivery is harmless and the
/// outcome does not depend on arrival order.
#[derive(Debug, Clone)]
pub struct VoteSet {
    vote_type: VoteType,
    height: u64,
    view: u32,
    validators: BTreeSet<Address>,
    quorum: usize,

    /// Accepted votes keyed by voter, in arrival order.
    votes: IndexMap<Address, Vote>,
}

impl VoteSet {
    pub fn new(vote_type: VoteType, height: u64, view: u32, validators: &[Address]) -> Self {
        let validators: BTreeSet<Address> = validators.iter().copied().collect();
        Self {
            vote_type,
            height,
            view,
            quorum: quorum_threshold(validators.len()),
            validators,
            votes: IndexMap::new(),
        }
    }

    pub fn vote_type(&self) -> VoteType {
        self.vote_type
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn view(&self) -> u32 {
        self.view
    }

    /// Number of matching votes needed for an outcome.
    pub fn quorum(&self) -> usize {
        self.quorum
    }

    /// Add a vote. Returns `false` if it is for another round or phase, from
    /// a non-validator, badly signed, or the voter already has a vote here.
    pub fn add_vote(&mut self, vote: Vote) -> bool {
        if vote.vote_type != self.vote_type || vote.height != self.height || vote.view != self.view
        {
            trace!(
                vote_type = %vote.vote_type,
                height = vote.height,
                view = vote.view,
                "Vote does not belong to this set"
            );
            return false;
        }

        let voter = vote.voter();
        if !self.validators.contains(&voter) {
            trace!(%voter, "Vote from non-validator");
            return false;
        }
        if self.votes.contains_key(&voter) {
            return false;
        }
        if !vote.validate() {
            trace!(%voter, "Vote failed validation");
            return false;
        }

        self.votes.insert(voter, vote);
        true
    }

    /// Add several votes, returning how many were accepted.
    pub fn add_votes(&mut self, votes: impl IntoIterator<Item = Vote>) -> usize {
        votes
            .into_iter()
            .map(|vote| self.add_vote(vote))
            .filter(|added| *added)
            .count()
    }

    /// The block hash approved by a quorum, if any.
    pub fn any_approved(&self) -> Option<Hash> {
        let mut tally: HashMap<Hash, usize> = HashMap::new();
        for vote in self.votes.values().filter(|v| v.approve) {
            *tally.entry(vote.block_hash).or_default() += 1;
        }
        tally
            .into_iter()
            .find(|(_, count)| *count >= self.quorum)
            .map(|(hash, _)| hash)
    }

    /// Whether a quorum rejected.
    pub fn is_rejected(&self) -> bool {
        self.votes.values().filter(|v| !v.approve).count() >= self.quorum
    }

    /// Signatures of the approvals of `hash`, in arrival order.
    pub fn get_approvals(&self, hash: &Hash) -> Vec<Signature> {
        self.votes
            .values()
            .filter(|v| v.approve && v.block_hash == *hash)
            .map(|v| v.signature.clone())
            .collect()
    }

    /// The rejection votes, in arrival order.
    pub fn get_rejections(&self) -> Vec<Vote> {
        self.votes.values().filter(|v| !v.approve).cloned().collect()
    }

    pub fn size(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }
}
