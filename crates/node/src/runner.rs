//! The consensus event loop.

use crate::{Broadcaster, NodeConfig, NodeError, Timer};
use arc_swap::ArcSwap;
use kestrel_bft::{BftState, ConsensusError, ValidatorView};
use kestrel_core::{Action, Channel, ChannelManager, Event, StateMachine};
use kestrel_engine::{BlockImporter, Ledger, TransactionPool, TransferExecutor};
use kestrel_messages::{Message, ReasonCode};
use kestrel_sync::{SyncProgress, Synchronizer};
use kestrel_types::KeyPair;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Lifecycle of the consensus runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Stopped,
    Running,
    Syncing,
}

/// Owns the consensus event loop and routes peer messages into it.
///
/// Peer handlers call [`on_message`](Self::on_message) from any task; the
/// loop consumes the resulting events one at a time, so the state machine
/// itself is never shared.
pub struct ConsensusRunner {
    status: Mutex<Status>,

    /// Height of the current round, for cheap filtering on receipt.
    height: AtomicU64,

    events: mpsc::UnboundedSender<Event>,
    synchronizer: Arc<Synchronizer>,
    channels: Arc<dyn ChannelManager>,
    validator_view: Arc<ArcSwap<ValidatorView>>,
    relay_redundancy: usize,

    /// State machine and event queue, until `start` moves them into the loop.
    pending: Mutex<Option<(BftState, mpsc::UnboundedReceiver<Event>)>>,
}

impl ConsensusRunner {
    pub fn new(
        state: BftState,
        synchronizer: Arc<Synchronizer>,
        channels: Arc<dyn ChannelManager>,
    ) -> Arc<Self> {
        let (events, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            status: Mutex::new(Status::Stopped),
            height: AtomicU64::new(state.height()),
            events,
            synchronizer,
            channels,
            validator_view: state.validator_view(),
            relay_redundancy: state.config().relay_redundancy,
            pending: Mutex::new(Some((state, rx))),
        })
    }

    /// Wire up the importer, state machine and synchronizer for `key` from
    /// `config`, using the reference transaction executor.
    pub fn assemble(
        config: &NodeConfig,
        key: KeyPair,
        ledger: Arc<dyn Ledger>,
        pool: Arc<dyn TransactionPool>,
        channels: Arc<dyn ChannelManager>,
    ) -> Arc<Self> {
        let chain = config.chain_config();
        let executor = Arc::new(TransferExecutor::new(&chain));
        let importer = Arc::new(BlockImporter::new(ledger, executor, chain));
        let state = BftState::new(
            key,
            config.bft_config(),
            Arc::clone(&importer),
            pool,
            Arc::clone(&channels),
        );
        let synchronizer = Synchronizer::new(config.sync_config(), importer, Arc::clone(&channels));
        Self::new(state, synchronizer, channels)
    }

    /// Spawn the event loop.
    ///
    /// The returned handle resolves when the loop ends: `Ok` after `stop`,
    /// or the fatal error that ended it.
    pub fn start(
        self: &Arc<Self>,
    ) -> Result<JoinHandle<Result<(), ConsensusError>>, NodeError> {
        let (state, events) = self.pending.lock().take().ok_or(NodeError::AlreadyStarted)?;
        *self.status.lock() = Status::Running;

        let (timeout_tx, timeouts) = mpsc::unbounded_channel();
        let event_loop = EventLoop {
            runner: Arc::clone(self),
            state,
            events,
            timeouts,
            timer: Timer::new(timeout_tx),
            broadcaster: Broadcaster::spawn(Arc::clone(&self.validator_view), self.relay_redundancy),
            started: Instant::now(),
        };
        Ok(tokio::spawn(event_loop.run()))
    }

    /// Ask the loop to exit and interrupt any synchronization in progress.
    pub fn stop(&self) {
        *self.status.lock() = Status::Stopped;
        self.synchronizer.stop();
        let _ = self.events.send(Event::Stop);
    }

    pub fn status(&self) -> Status {
        *self.status.lock()
    }

    /// Whether consensus is actively running rounds.
    pub fn is_running(&self) -> bool {
        self.status() == Status::Running
    }

    pub fn get_progress(&self) -> SyncProgress {
        self.synchronizer.progress()
    }

    pub fn synchronizer(&self) -> &Arc<Synchronizer> {
        &self.synchronizer
    }

    /// Route a message received from `channel`.
    ///
    /// Sync messages go to the synchronizer. Consensus messages become
    /// events; structurally invalid proposals and votes for the current
    /// height get the peer disconnected. While not running only the peer's
    /// reported height is recorded.
    pub fn on_message(&self, channel: &Arc<dyn Channel>, message: Message) {
        trace!(message = message.type_name(), peer = ?channel.id(), "Message received");

        if message.is_sync() {
            self.synchronizer.on_message(channel.as_ref(), message);
            return;
        }

        if let Message::NewHeight(height) = message {
            channel.set_latest_height(height.saturating_sub(1));
        }
        if !self.is_running() {
            return;
        }

        let height = self.height.load(Ordering::SeqCst);
        let event = match message {
            Message::NewHeight(announced) if announced > height => Event::NewHeight {
                height: announced,
            },
            Message::NewView(proof) => {
                channel.set_latest_height(proof.height.saturating_sub(1));
                if proof.height > height {
                    Event::NewHeight {
                        height: proof.height,
                    }
                } else if proof.height == height {
                    Event::NewView { proof }
                } else {
                    return;
                }
            }
            Message::Proposal(proposal) if proposal.height() == height => {
                if !proposal.validate() {
                    debug!(peer = ?channel.id(), "Invalid proposal, disconnecting");
                    channel.disconnect(ReasonCode::ConsensusError);
                    return;
                }
                Event::Proposal { proposal }
            }
            Message::Vote(vote) if vote.height == height => {
                if !vote.validate() {
                    debug!(peer = ?channel.id(), "Invalid vote, disconnecting");
                    channel.disconnect(ReasonCode::ConsensusError);
                    return;
                }
                Event::Vote { vote }
            }
            _ => return,
        };
        let _ = self.events.send(event);
    }

    fn set_status(&self, status: Status) {
        let mut current = self.status.lock();
        // A stop request wins over the loop's own transitions.
        if *current != Status::Stopped || status == Status::Stopped {
            *current = status;
        }
    }
}

/// Everything the loop task owns.
struct EventLoop {
    runner: Arc<ConsensusRunner>,
    state: BftState,
    events: mpsc::UnboundedReceiver<Event>,
    timeouts: mpsc::UnboundedReceiver<u64>,
    timer: Timer,
    broadcaster: Broadcaster,
    started: Instant,
}

impl EventLoop {
    async fn run(mut self) -> Result<(), ConsensusError> {
        info!(
            address = %self.state.address(),
            height = self.state.height(),
            "Consensus started"
        );

        let actions = self.state.start();
        let mut result = self.apply(actions).await;

        while result.is_ok() && self.runner.status() != Status::Stopped {
            let event = tokio::select! {
                biased;

                Some(generation) = self.timeouts.recv() => {
                    if !self.timer.is_current(generation) {
                        trace!(generation, "Dropping stale timeout");
                        continue;
                    }
                    Event::Timeout
                }

                event = self.events.recv() => match event {
                    Some(Event::Stop) | None => break,
                    Some(event) => event,
                },
            };
            result = self.process(event).await;
        }

        self.timer.clear();
        self.broadcaster.stop();
        self.runner.set_status(Status::Stopped);
        match &result {
            Ok(()) => info!(height = self.state.height(), "Consensus stopped"),
            Err(error) => error!(height = self.state.height(), %error, "Consensus terminated"),
        }
        result
    }

    async fn process(&mut self, event: Event) -> Result<(), ConsensusError> {
        self.state.set_time(self.started.elapsed());
        let actions = self.state.handle(event)?;
        self.apply(actions).await
    }

    /// Execute actions. A sync request pauses the loop until the
    /// synchronizer returns, then resumes consensus at the new head.
    async fn apply(&mut self, mut actions: Vec<Action>) -> Result<(), ConsensusError> {
        loop {
            let mut sync_target = None;
            for action in actions {
                trace!(action = action.type_name(), "Executing action");
                match action {
                    Action::Broadcast { message } => self.broadcaster.broadcast(message),
                    Action::SendToValidators { message } => {
                        for channel in self.runner.validator_view.load().channels.iter() {
                            channel.send(message.clone());
                        }
                    }
                    Action::SendToAll { message } => {
                        for channel in self.runner.channels.active_channels() {
                            channel.send(message.clone());
                        }
                    }
                    Action::SetTimeout { duration } => self.timer.set(duration),
                    Action::ClearTimeout => self.timer.clear(),
                    Action::StartSync { target } => sync_target = Some(target),
                }
            }
            self.runner
                .height
                .store(self.state.height(), Ordering::SeqCst);

            let Some(target) = sync_target else {
                return Ok(());
            };
            if !self.synchronize(target).await {
                return Ok(());
            }
            self.state.set_time(self.started.elapsed());
            actions = self.state.handle(Event::SyncCompleted)?;
        }
    }

    /// Run the synchronizer to `target`. Returns `false` if a stop was
    /// requested meanwhile.
    async fn synchronize(&mut self, target: u64) -> bool {
        self.runner.set_status(Status::Syncing);
        self.timer.clear();

        let synchronizer = Arc::clone(&self.runner.synchronizer);
        if synchronizer.begin(target) {
            // A stop that landed before the run was registered missed it.
            if self.runner.status() == Status::Stopped {
                synchronizer.stop();
            }
            synchronizer.run().await;
        }

        // Events queued before or during the pause belong to rounds that no
        // longer exist.
        let mut stop = false;
        while let Ok(event) = self.events.try_recv() {
            stop |= matches!(event, Event::Stop);
        }
        while self.timeouts.try_recv().is_ok() {}

        if stop || self.runner.status() == Status::Stopped {
            warn!(target, "Stopped during synchronization");
            return false;
        }
        self.runner.set_status(Status::Running);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_bft::BftConfig;
    use kestrel_engine::MemoryLedger;
    use kestrel_sync::SyncConfig;
    use kestrel_test_helpers::{
        extend_chain, genesis_ledger, importer, validator_keys, TestChannel, TestChannelManager,
        TestPool,
    };
    use kestrel_types::{BlockHeader, Hash, Proof, Proposal, Vote, VoteType};
    use std::time::Duration;
    use tracing_test::traced_test;

    fn runner_for(
        key: KeyPair,
        ledger: &Arc<MemoryLedger>,
        manager: &Arc<TestChannelManager>,
        bft: BftConfig,
    ) -> Arc<ConsensusRunner> {
        let importer = Arc::new(importer(Arc::clone(ledger)));
        let channels = Arc::clone(manager) as Arc<dyn ChannelManager>;
        let state = BftState::new(
            key,
            bft,
            Arc::clone(&importer),
            TestPool::new(Vec::new()),
            Arc::clone(&channels),
        );
        let synchronizer = Synchronizer::new(
            SyncConfig::default().with_interval(Duration::from_millis(1)),
            importer,
            Arc::clone(&channels),
        );
        ConsensusRunner::new(state, synchronizer, channels)
    }

    async fn wait_for(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[traced_test]
    #[tokio::test]
    async fn test_single_validator_produces_blocks() {
        let keys = validator_keys(1);
        let ledger = genesis_ledger(&keys);
        let manager = TestChannelManager::new();
        let runner = runner_for(
            keys[0].clone(),
            &ledger,
            &manager,
            BftConfig::default().with_phase_timeouts(Duration::from_millis(5)),
        );

        let handle = runner.start().unwrap();
        assert!(runner.is_running());
        wait_for(|| ledger.latest_height() >= 3).await;

        runner.stop();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop must exit")
            .unwrap();
        assert!(result.is_ok());
        assert_eq!(runner.status(), Status::Stopped);

        let block = ledger.get_block(3).unwrap();
        assert_eq!(block.header.coinbase, keys[0].address());
        assert_eq!(block.votes.len(), 1);
    }

    #[traced_test]
    #[tokio::test]
    async fn test_start_twice_fails() {
        let keys = validator_keys(1);
        let ledger = genesis_ledger(&keys);
        let runner = runner_for(
            keys[0].clone(),
            &ledger,
            &TestChannelManager::new(),
            BftConfig::default(),
        );

        let handle = runner.start().unwrap();
        assert!(matches!(runner.start(), Err(NodeError::AlreadyStarted)));
        runner.stop();
        handle.await.unwrap().unwrap();
    }

    #[traced_test]
    #[tokio::test]
    async fn test_dispatch_tracks_heights_and_drops_bad_peers() {
        let keys = validator_keys(4);
        let ledger = genesis_ledger(&keys);
        let manager = TestChannelManager::new();
        let peer = TestChannel::new(1, keys[1].address(), 0);
        manager.add(Arc::clone(&peer));
        let channel = Arc::clone(&peer) as Arc<dyn Channel>;
        let runner = runner_for(keys[0].clone(), &ledger, &manager, BftConfig::default());

        // Not running: only the reported height is recorded.
        runner.on_message(&channel, Message::NewHeight(8));
        assert_eq!(peer.latest_height(), 7);
        let mut bad = Vote::approve(&keys[1], VoteType::Validate, 1, 0, Hash::from_bytes(b"b"));
        bad.view = 3;
        runner.on_message(&channel, Message::Vote(bad.clone()));
        assert!(peer.disconnect_reason().is_none());

        let handle = runner.start().unwrap();
        runner.on_message(&channel, Message::Vote(bad));
        assert_eq!(peer.disconnect_reason(), Some(ReasonCode::ConsensusError));

        runner.stop();
        handle.await.unwrap().unwrap();
    }

    /// Events queued for a runner whose loop has not been spawned.
    fn queued(runner: &ConsensusRunner) -> Vec<Event> {
        let mut pending = runner.pending.lock();
        let (_, events) = pending.as_mut().expect("loop not started");
        std::iter::from_fn(|| events.try_recv().ok()).collect()
    }

    #[traced_test]
    #[test]
    fn test_new_view_dispatch_by_height() {
        let keys = validator_keys(4);
        let ledger = genesis_ledger(&keys);
        let manager = TestChannelManager::new();
        let peer = TestChannel::new(1, keys[1].address(), 0);
        manager.add(Arc::clone(&peer));
        let channel = Arc::clone(&peer) as Arc<dyn Channel>;
        let runner = runner_for(keys[0].clone(), &ledger, &manager, BftConfig::default());
        *runner.status.lock() = Status::Running;

        // A later height is handled as NEW_HEIGHT.
        runner.on_message(&channel, Message::NewView(Proof::initial(3)));
        assert_eq!(peer.latest_height(), 2);
        assert_eq!(queued(&runner), vec![Event::NewHeight { height: 3 }]);

        // The current height goes to the state machine as is.
        let current = Proof::new(1, 1, Vec::new());
        runner.on_message(&channel, Message::NewView(current.clone()));
        assert_eq!(peer.latest_height(), 0);
        assert_eq!(queued(&runner), vec![Event::NewView { proof: current }]);

        // An earlier height only updates the peer.
        runner.on_message(&channel, Message::NewView(Proof::initial(0)));
        assert!(queued(&runner).is_empty());
        assert!(peer.disconnect_reason().is_none());
    }

    #[traced_test]
    #[test]
    fn test_invalid_proposal_disconnects_peer() {
        let keys = validator_keys(4);
        let ledger = genesis_ledger(&keys);
        let manager = TestChannelManager::new();
        let peer = TestChannel::new(1, keys[1].address(), 0);
        manager.add(Arc::clone(&peer));
        let channel = Arc::clone(&peer) as Arc<dyn Channel>;
        let runner = runner_for(keys[0].clone(), &ledger, &manager, BftConfig::default());
        *runner.status.lock() = Status::Running;

        // Header height disagrees with the proof.
        let proposal = Proposal::new(
            &keys[1],
            Proof::initial(1),
            BlockHeader::genesis(0),
            Vec::new(),
        );
        assert!(!proposal.validate());
        runner.on_message(&channel, Message::Proposal(Box::new(proposal)));

        assert_eq!(peer.disconnect_reason(), Some(ReasonCode::ConsensusError));
        assert!(queued(&runner).is_empty());
    }

    #[traced_test]
    #[tokio::test]
    async fn test_stop_before_sync_registers_ends_pause() {
        let keys = validator_keys(4);
        let ledger = genesis_ledger(&keys);
        let runner = runner_for(
            keys[0].clone(),
            &ledger,
            &TestChannelManager::new(),
            BftConfig::default(),
        );
        let (state, events) = runner.pending.lock().take().expect("loop not started");
        let (timeout_tx, timeouts) = mpsc::unbounded_channel();
        let mut event_loop = EventLoop {
            runner: Arc::clone(&runner),
            state,
            events,
            timeouts,
            timer: Timer::new(timeout_tx),
            broadcaster: Broadcaster::spawn(Arc::clone(&runner.validator_view), 4),
            started: Instant::now(),
        };

        // Nobody serves blocks, so only the stop can end this run.
        runner.stop();
        let resumed = tokio::time::timeout(Duration::from_secs(5), event_loop.synchronize(10))
            .await
            .expect("stop must end the pause");

        assert!(!resumed);
        assert!(!runner.synchronizer().is_running());
        assert_eq!(runner.status(), Status::Stopped);
    }

    #[traced_test]
    #[tokio::test]
    async fn test_new_height_from_network_triggers_sync() {
        let keys = validator_keys(4);
        let source = genesis_ledger(&keys);
        extend_chain(&source, &keys, 3);
        let local = genesis_ledger(&keys);

        let manager = TestChannelManager::new();
        let peers: Vec<Arc<dyn Channel>> = (1..4)
            .map(|i| {
                let channel = TestChannel::new(i as u64, keys[i].address(), 0);
                manager.add(Arc::clone(&channel));
                channel as Arc<dyn Channel>
            })
            .collect();
        let runner = runner_for(keys[0].clone(), &local, &manager, BftConfig::default());
        let handle = runner.start().unwrap();

        // Serve GET_BLOCK requests from the peer chain.
        let responder = {
            let runner = Arc::clone(&runner);
            let manager = Arc::clone(&manager);
            let source = Arc::clone(&source);
            tokio::spawn(async move {
                loop {
                    for channel in manager.test_channels() {
                        for message in channel.take_sent() {
                            if let Message::GetBlock(height) = message {
                                if let Some(block) = source.get_block(height) {
                                    let channel = Arc::clone(&channel) as Arc<dyn Channel>;
                                    runner.on_message(
                                        &channel,
                                        Message::Block(Box::new((*block).clone())),
                                    );
                                }
                            }
                        }
                    }
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            })
        };

        for channel in &peers {
            runner.on_message(channel, Message::NewHeight(4));
        }

        wait_for(|| local.latest_height() == 3).await;
        wait_for(|| runner.is_running()).await;
        assert_eq!(local.latest_block().hash(), source.latest_block().hash());
        assert_eq!(runner.get_progress().current_height, 4);

        responder.abort();
        runner.stop();
        handle.await.unwrap().unwrap();
    }

    #[traced_test]
    #[tokio::test]
    async fn test_assemble_from_config() {
        let keys = validator_keys(1);
        let ledger = genesis_ledger(&keys);
        let mut config = NodeConfig::default();
        config.consensus.relay_redundancy = 3;

        let runner = ConsensusRunner::assemble(
            &config,
            keys[0].clone(),
            Arc::clone(&ledger) as Arc<dyn Ledger>,
            TestPool::new(Vec::new()),
            TestChannelManager::new(),
        );

        assert_eq!(runner.status(), Status::Stopped);
        assert_eq!(runner.relay_redundancy, 3);
        assert_eq!(runner.get_progress().current_height, 1);
    }
}
