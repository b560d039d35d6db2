//! Consensus state machine.

use crate::{BftConfig, ConsensusError, VoteSet};
use arc_swap::ArcSwap;
use indexmap::IndexMap;
use kestrel_core::{Action, Channel, ChannelManager, Event, StateMachine};
use kestrel_engine::{BlockImporter, ImportError, TransactionPool};
use kestrel_messages::Message;
use kestrel_types::{
    primary_for, quorum_threshold, Address, Block, Hash, KeyPair, Proof, Proposal, Vote, VoteType,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Phase of the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    NewHeight,
    Propose,
    Validate,
    PreCommit,
    Commit,
    Finalize,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::NewHeight => "NEW_HEIGHT",
            Phase::Propose => "PROPOSE",
            Phase::Validate => "VALIDATE",
            Phase::PreCommit => "PRE_COMMIT",
            Phase::Commit => "COMMIT",
            Phase::Finalize => "FINALIZE",
        };
        f.write_str(name)
    }
}

/// Validator set and connected validator channels as of the last refresh.
///
/// Published through an [`ArcSwap`] and replaced wholesale on refresh, so the
/// broadcaster and message handlers always read a complete snapshot.
#[derive(Clone, Default)]
pub struct ValidatorView {
    /// Sorted by address.
    pub validators: Vec<Address>,
    pub channels: Vec<Arc<dyn Channel>>,
}

impl fmt::Debug for ValidatorView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatorView")
            .field("validators", &self.validators)
            .field("channels", &self.channels.len())
            .finish()
    }
}

/// BFT consensus state machine.
///
/// Drives one block per height through
/// NEW_HEIGHT → PROPOSE → VALIDATE → PRE_COMMIT → COMMIT → FINALIZE.
/// Every phase is bounded by a timeout that the runner arms on
/// `Action::SetTimeout`; each timeout has a defined next phase, and a failed
/// PRE_COMMIT sends the round back to PROPOSE in the next view.
///
/// The state machine is synchronous and performs no network I/O. Messages
/// leave as actions; the ledger is touched only through the
/// [`BlockImporter`].
pub struct BftState {
    // ═══════════════════════════════════════════════════════════════════════
    // Identity and collaborators
    // ═══════════════════════════════════════════════════════════════════════
    key: KeyPair,
    address: Address,
    config: BftConfig,
    importer: Arc<BlockImporter>,
    pool: Arc<dyn TransactionPool>,
    channels: Arc<dyn ChannelManager>,

    // ═══════════════════════════════════════════════════════════════════════
    // Validator snapshot
    // ═══════════════════════════════════════════════════════════════════════
    /// Sorted validator set used for primary selection and new vote sets.
    validators: Vec<Address>,

    /// Snapshot shared with the broadcaster and message handlers.
    validator_view: Arc<ArcSwap<ValidatorView>>,

    /// When the snapshot was last refreshed.
    last_refresh: Duration,

    // ═══════════════════════════════════════════════════════════════════════
    // Round state
    // ═══════════════════════════════════════════════════════════════════════
    phase: Phase,
    height: u64,
    view: u32,
    proof: Proof,
    proposal: Option<Proposal>,

    validate_votes: VoteSet,
    precommit_votes: VoteSet,
    commit_votes: VoteSet,

    /// Blocks that passed VALIDATE, oldest first.
    valid_blocks: IndexMap<Hash, Block>,

    /// Consensus is paused while the synchronizer catches up.
    syncing: bool,

    now: Duration,
}

impl BftState {
    pub fn new(
        key: KeyPair,
        config: BftConfig,
        importer: Arc<BlockImporter>,
        pool: Arc<dyn TransactionPool>,
        channels: Arc<dyn ChannelManager>,
    ) -> Self {
        let address = key.address();
        let height = importer.ledger().latest_height() + 1;
        let validators = importer.ledger().validators();

        let mut state = Self {
            key,
            address,
            config,
            importer,
            pool,
            channels,
            validate_votes: VoteSet::new(VoteType::Validate, height, 0, &validators),
            precommit_votes: VoteSet::new(VoteType::Precommit, height, 0, &validators),
            commit_votes: VoteSet::new(VoteType::Commit, height, 0, &validators),
            validators,
            validator_view: Arc::new(ArcSwap::from_pointee(ValidatorView::default())),
            last_refresh: Duration::ZERO,
            phase: Phase::NewHeight,
            height,
            view: 0,
            proof: Proof::initial(height),
            proposal: None,
            valid_blocks: IndexMap::new(),
            syncing: false,
            now: Duration::ZERO,
        };
        state.refresh_validators();
        state
    }

    /// Enter the first height. Call once before feeding events.
    pub fn start(&mut self) -> Vec<Action> {
        self.syncing = false;
        self.enter_new_height()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Accessors
    // ═══════════════════════════════════════════════════════════════════════

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn config(&self) -> &BftConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    pub fn view(&self) -> u32 {
        self.view
    }

    pub fn proof(&self) -> &Proof {
        &self.proof
    }

    pub fn proposal(&self) -> Option<&Proposal> {
        self.proposal.as_ref()
    }

    pub fn validators(&self) -> &[Address] {
        &self.validators
    }

    /// Handle to the shared validator snapshot.
    pub fn validator_view(&self) -> Arc<ArcSwap<ValidatorView>> {
        Arc::clone(&self.validator_view)
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing
    }

    pub fn is_validator(&self) -> bool {
        self.validators.contains(&self.address)
    }

    /// Whether this node proposes in the current round.
    pub fn is_primary(&self) -> bool {
        self.primary(self.view) == Some(self.address)
    }

    fn primary(&self, view: u32) -> Option<Address> {
        primary_for(&self.validators, self.height, view)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Validator snapshot
    // ═══════════════════════════════════════════════════════════════════════

    fn refresh_validators(&mut self) {
        let validators = self.importer.ledger().validators();
        let channels = self.channels.active_validator_channels(&validators);
        trace!(
            validators = validators.len(),
            channels = channels.len(),
            "Refreshed validator snapshot"
        );
        self.validators = validators.clone();
        self.validator_view.store(Arc::new(ValidatorView {
            validators,
            channels,
        }));
        self.last_refresh = self.now;
    }

    fn validators_stale(&self) -> bool {
        self.now.saturating_sub(self.last_refresh) >= self.config.validator_refresh_interval
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Phase entry
    // ═══════════════════════════════════════════════════════════════════════

    fn enter_new_height(&mut self) -> Vec<Action> {
        self.phase = Phase::NewHeight;

        let latest = self.importer.ledger().latest_height();
        self.height = latest + 1;
        self.view = 0;
        self.proof = Proof::initial(self.height);
        self.proposal = None;
        self.refresh_validators();
        self.clear_votes();

        info!(
            height = self.height,
            validators = self.validators.len(),
            validator = self.is_validator(),
            "Entered NEW_HEIGHT"
        );

        let mut actions = vec![Action::ClearTimeout];
        if self.is_validator() {
            actions.push(Action::SetTimeout {
                duration: self.config.new_height_timeout,
            });
        }
        actions.push(Action::SendToAll {
            message: Message::NewHeight(self.height),
        });
        actions
    }

    fn enter_propose(&mut self) -> Vec<Action> {
        self.phase = Phase::Propose;
        let mut actions = vec![Action::SetTimeout {
            duration: self.config.propose_timeout,
        }];
        self.refresh_validators();

        if self.precommit_votes.is_rejected() {
            self.view += 1;
            self.proof = Proof::new(
                self.height,
                self.view,
                self.precommit_votes.get_rejections(),
            );
            self.proposal = None;
            self.clear_votes();
        }

        let primary = self.is_primary();
        info!(
            height = self.height,
            view = self.view,
            primary,
            "Entered PROPOSE"
        );

        if primary {
            if self.proposal.is_none() {
                self.proposal = Some(self.propose_block());
            }
            if let Some(proposal) = &self.proposal {
                debug!(
                    height = self.height,
                    view = self.view,
                    block_hash = ?proposal.block_hash(),
                    txs = proposal.transactions.len(),
                    "Broadcasting proposal"
                );
                actions.push(Action::Broadcast {
                    message: Message::Proposal(Box::new(proposal.clone())),
                });
            }
        }

        actions.push(Action::SendToValidators {
            message: Message::NewView(self.proof.clone()),
        });
        actions
    }

    fn enter_validate(&mut self) -> Vec<Action> {
        self.phase = Phase::Validate;
        let mut actions = vec![Action::SetTimeout {
            duration: self.config.validate_timeout,
        }];
        info!(height = self.height, view = self.view, "Entered VALIDATE");

        let valid = self.proposal.as_ref().and_then(|proposal| {
            match self
                .importer
                .validate_proposal(&proposal.header, &proposal.transactions)
            {
                Ok(block) => Some(block),
                Err(error) => {
                    warn!(
                        height = self.height,
                        view = self.view,
                        %error,
                        "Proposed block is invalid"
                    );
                    None
                }
            }
        });

        let vote = match valid {
            Some(block) => {
                let hash = block.hash();
                self.cache_valid_block(block);
                Vote::approve(&self.key, VoteType::Validate, self.height, self.view, hash)
            }
            None => Vote::reject(&self.key, VoteType::Validate, self.height, self.view),
        };
        actions.extend(self.cast(vote));
        actions
    }

    fn enter_pre_commit(&mut self) -> Vec<Action> {
        self.phase = Phase::PreCommit;
        let mut actions = vec![Action::SetTimeout {
            duration: self.config.pre_commit_timeout,
        }];
        info!(height = self.height, view = self.view, "Entered PRE_COMMIT");

        let vote = match self.validate_votes.any_approved() {
            Some(hash) => {
                Vote::approve(&self.key, VoteType::Precommit, self.height, self.view, hash)
            }
            None => Vote::reject(&self.key, VoteType::Precommit, self.height, self.view),
        };
        actions.extend(self.cast(vote));
        actions
    }

    fn enter_commit(&mut self) -> Result<Vec<Action>, ConsensusError> {
        let Some(hash) = self.precommit_votes.any_approved() else {
            error!(
                height = self.height,
                view = self.view,
                "Entering COMMIT without a PRE_COMMIT quorum"
            );
            return Err(ConsensusError::InvariantViolation(format!(
                "COMMIT entered without PRE_COMMIT quorum at height {} view {}",
                self.height, self.view
            )));
        };

        self.phase = Phase::Commit;
        let mut actions = vec![Action::SetTimeout {
            duration: self.config.commit_timeout,
        }];
        info!(height = self.height, view = self.view, block_hash = ?hash, "Entered COMMIT");

        let vote = Vote::approve(&self.key, VoteType::Commit, self.height, self.view, hash);
        actions.extend(self.cast(vote));
        Ok(actions)
    }

    /// Apply the agreed block, or hand over to the synchronizer if its
    /// contents are not held locally. Runs at most once per round.
    fn enter_finalize(&mut self) -> Result<Vec<Action>, ConsensusError> {
        if self.phase == Phase::Finalize {
            return Ok(Vec::new());
        }
        self.phase = Phase::Finalize;
        info!(height = self.height, view = self.view, "Entered FINALIZE");

        let agreed = self.precommit_votes.any_approved().and_then(|hash| {
            self.valid_blocks
                .get(&hash)
                .cloned()
                .map(|block| (hash, block))
        });

        let Some((hash, block)) = agreed else {
            info!(
                height = self.height,
                "Agreed block not held locally, synchronizing"
            );
            return Ok(self.start_sync(self.height + 1));
        };

        let votes = self.precommit_votes.get_approvals(&hash);
        let block = block.with_votes(self.view, votes);
        match self.importer.finalize_block(block) {
            Ok(()) => {
                info!(
                    height = self.height,
                    view = self.view,
                    block_hash = ?hash,
                    "Finalized block"
                );
                self.valid_blocks.clear();
                Ok(vec![Action::SetTimeout {
                    duration: self.config.finalize_timeout,
                }])
            }
            Err(ImportError::Ledger(error)) => {
                error!(height = self.height, %error, "Ledger rejected agreed block");
                Err(ConsensusError::Ledger(error))
            }
            Err(ImportError::Block(error)) => {
                warn!(
                    height = self.height,
                    %error,
                    "Agreed block no longer applies, synchronizing"
                );
                Ok(self.start_sync(self.height + 1))
            }
        }
    }

    /// Re-enter PROPOSE at a later view licensed by `proof`.
    fn jump_to_view(&mut self, proof: Proof, proposal: Option<Proposal>) -> Vec<Action> {
        info!(
            height = self.height,
            from = self.view,
            to = proof.view,
            "Jumping to view"
        );
        self.view = proof.view;
        self.proof = proof;
        self.proposal = proposal;
        self.clear_votes();

        let mut actions = vec![Action::ClearTimeout];
        actions.extend(self.enter_propose());
        actions
    }

    fn start_sync(&mut self, target: u64) -> Vec<Action> {
        info!(height = self.height, target, "Pausing consensus for synchronization");
        self.syncing = true;
        self.clear_votes();
        vec![Action::ClearTimeout, Action::StartSync { target }]
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Inputs
    // ═══════════════════════════════════════════════════════════════════════

    fn on_timeout(&mut self) -> Result<Vec<Action>, ConsensusError> {
        trace!(phase = %self.phase, height = self.height, view = self.view, "Phase timeout");
        match self.phase {
            Phase::NewHeight => Ok(self.enter_propose()),
            Phase::Propose => Ok(self.enter_validate()),
            Phase::Validate => Ok(self.enter_pre_commit()),
            Phase::PreCommit => {
                if self.precommit_votes.any_approved().is_some() {
                    self.enter_commit()
                } else {
                    Ok(self.enter_propose())
                }
            }
            Phase::Commit => self.enter_finalize(),
            Phase::Finalize => Ok(self.enter_new_height()),
        }
    }

    /// A peer announced `height`. Synchronize if a quorum of connected
    /// validators is ahead of the local chain.
    ///
    /// The target is capped at the highest height a quorum of validator
    /// channels reports, so a single peer cannot inflate it.
    fn on_new_height(&mut self, height: u64) -> Vec<Action> {
        if height <= self.height {
            return Vec::new();
        }

        let (backed, needed) = {
            let view = self.validator_view.load();
            if view.channels.is_empty() {
                return Vec::new();
            }
            let mut reported: Vec<u64> = view
                .channels
                .iter()
                .map(|c| c.latest_height().saturating_add(1))
                .collect();
            reported.sort_unstable_by(|a, b| b.cmp(a));
            let needed = quorum_threshold(reported.len());
            (reported.get(needed - 1).copied().unwrap_or(0), needed)
        };

        if backed > self.height {
            self.start_sync(height.min(backed))
        } else {
            trace!(height, backed, needed, "Not enough validators ahead to synchronize");
            Vec::new()
        }
    }

    fn on_new_view(&mut self, proof: Proof) -> Vec<Action> {
        if proof.height != self.height
            || proof.view <= self.view
            || matches!(self.phase, Phase::Commit | Phase::Finalize)
        {
            trace!(
                height = proof.height,
                view = proof.view,
                "Ignoring NEW_VIEW"
            );
            return Vec::new();
        }
        if !self.is_unlocked(&proof) {
            debug!(
                height = proof.height,
                view = proof.view,
                "NEW_VIEW without valid proof-of-unlock"
            );
            return Vec::new();
        }
        self.jump_to_view(proof, None)
    }

    fn on_proposal(&mut self, proposal: Proposal) -> Vec<Action> {
        if proposal.height() != self.height {
            trace!(height = proposal.height(), "Ignoring proposal for another height");
            return Vec::new();
        }

        let for_current = proposal.view() == self.view
            && self.proposal.is_none()
            && matches!(self.phase, Phase::NewHeight | Phase::Propose);
        let for_later = proposal.view() > self.view
            && !matches!(self.phase, Phase::Commit | Phase::Finalize);
        if !for_current && !for_later {
            trace!(
                height = proposal.height(),
                view = proposal.view(),
                phase = %self.phase,
                "Ignoring proposal"
            );
            return Vec::new();
        }

        let proposer = proposal.signature.address();
        if self.primary(proposal.view()) != Some(proposer) {
            debug!(
                view = proposal.view(),
                %proposer,
                "Proposal from a validator that is not the primary"
            );
            return Vec::new();
        }
        if !proposal.validate() {
            debug!(%proposer, "Malformed proposal");
            return Vec::new();
        }
        if !self.is_unlocked(&proposal.proof) {
            debug!(
                view = proposal.view(),
                %proposer,
                "Proposal without valid proof-of-unlock"
            );
            return Vec::new();
        }

        info!(
            height = self.height,
            view = proposal.view(),
            %proposer,
            block_hash = ?proposal.block_hash(),
            "Proposal accepted"
        );
        let mut actions = vec![Action::Broadcast {
            message: Message::Proposal(Box::new(proposal.clone())),
        }];
        if proposal.view() == self.view {
            self.proposal = Some(proposal);
        } else {
            let proof = proposal.proof.clone();
            actions.extend(self.jump_to_view(proof, Some(proposal)));
        }
        actions
    }

    fn on_vote(&mut self, vote: Vote) -> Result<Vec<Action>, ConsensusError> {
        if vote.height != self.height || vote.view != self.view {
            trace!(
                height = vote.height,
                view = vote.view,
                "Ignoring vote for another round"
            );
            return Ok(Vec::new());
        }

        let vote_type = vote.vote_type;
        if !self.vote_set_mut(vote_type).add_vote(vote.clone()) {
            return Ok(Vec::new());
        }
        trace!(
            vote_type = %vote_type,
            voter = %vote.voter(),
            approve = vote.approve,
            "Vote added"
        );

        let mut actions = vec![Action::Broadcast {
            message: Message::Vote(vote),
        }];
        if vote_type == VoteType::Commit && self.commit_votes.any_approved().is_some() {
            actions.extend(self.enter_finalize()?);
        }
        Ok(actions)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Helpers
    // ═══════════════════════════════════════════════════════════════════════

    fn propose_block(&self) -> Proposal {
        let candidates = self.pool.pending(self.config.max_proposal_bytes);
        let (header, transactions) =
            self.importer
                .build_block(self.address, candidates, Vec::new());
        Proposal::new(&self.key, self.proof.clone(), header, transactions)
    }

    /// View 0 needs no evidence. A later view needs the PRE_COMMIT rejections
    /// of the previous view, reaching quorum against the current validators.
    fn is_unlocked(&self, proof: &Proof) -> bool {
        if proof.height != self.height {
            return false;
        }
        if proof.view == 0 {
            return proof.votes.is_empty();
        }
        let mut set = VoteSet::new(
            VoteType::Precommit,
            proof.height,
            proof.view - 1,
            &self.validators,
        );
        set.add_votes(proof.votes.iter().cloned());
        set.is_rejected()
    }

    /// Record our own vote and broadcast it. Non-validators stay silent.
    fn cast(&mut self, vote: Vote) -> Vec<Action> {
        if !self.is_validator() {
            return Vec::new();
        }
        debug!(
            vote_type = %vote.vote_type,
            height = vote.height,
            view = vote.view,
            approve = vote.approve,
            "Casting vote"
        );
        self.vote_set_mut(vote.vote_type).add_vote(vote.clone());
        vec![Action::Broadcast {
            message: Message::Vote(vote),
        }]
    }

    fn vote_set_mut(&mut self, vote_type: VoteType) -> &mut VoteSet {
        match vote_type {
            VoteType::Validate => &mut self.validate_votes,
            VoteType::Precommit => &mut self.precommit_votes,
            VoteType::Commit => &mut self.commit_votes,
        }
    }

    fn clear_votes(&mut self) {
        self.validate_votes =
            VoteSet::new(VoteType::Validate, self.height, self.view, &self.validators);
        self.precommit_votes =
            VoteSet::new(VoteType::Precommit, self.height, self.view, &self.validators);
        self.commit_votes = VoteSet::new(VoteType::Commit, self.height, self.view, &self.validators);
    }

    fn cache_valid_block(&mut self, block: Block) {
        self.valid_blocks.insert(block.hash(), block);
        while self.valid_blocks.len() > self.config.valid_block_cache_size {
            self.valid_blocks.shift_remove_index(0);
        }
    }
}

impl StateMachine for BftState {
    type Error = ConsensusError;

    fn handle(&mut self, event: Event) -> Result<Vec<Action>, ConsensusError> {
        trace!(event = event.type_name(), phase = %self.phase, "Handling event");

        if self.syncing {
            return Ok(match event {
                Event::SyncCompleted => {
                    self.syncing = false;
                    self.enter_new_height()
                }
                _ => Vec::new(),
            });
        }

        if self.validators_stale() {
            self.refresh_validators();
        }

        match event {
            Event::Timeout => self.on_timeout(),
            Event::NewHeight { height } => Ok(self.on_new_height(height)),
            Event::NewView { proof } => Ok(self.on_new_view(proof)),
            Event::Proposal { proposal } => Ok(self.on_proposal(*proposal)),
            Event::Vote { vote } => self.on_vote(vote),
            Event::SyncCompleted => Ok(self.enter_new_height()),
            Event::Stop => Ok(Vec::new()),
        }
    }

    fn set_time(&mut self, now: Duration) {
        self.now = now;
    }

    fn now(&self) -> Duration {
        self.now
    }
}

impl fmt::Debug for BftState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BftState")
            .field("address", &self.address)
            .field("phase", &self.phase)
            .field("height", &self.height)
            .field("view", &self.view)
            .field("has_proposal", &self.proposal.is_some())
            .field("validate_votes", &self.validate_votes.size())
            .field("precommit_votes", &self.precommit_votes.size())
            .field("commit_votes", &self.commit_votes.size())
            .field("syncing", &self.syncing)
            .finish()
    }
}
