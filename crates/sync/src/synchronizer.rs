//! The asynchronous synchronizer driver.

use crate::{SyncConfig, SyncQueues};
use kestrel_core::{Channel, ChannelManager};
use kestrel_engine::{BlockImporter, ImportError};
use kestrel_messages::{Message, ReasonCode};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

/// Where synchronization stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncProgress {
    /// Height the node is working on (`latest + 1`).
    pub current_height: u64,
    /// Height the last run aimed for.
    pub target_height: u64,
}

/// Downloads and applies missing blocks from peers.
pub struct Synchronizer {
    config: SyncConfig,
    importer: Arc<BlockImporter>,
    channels: Arc<dyn ChannelManager>,
    queues: Mutex<SyncQueues>,
    running: AtomicBool,
    done: Notify,
}

impl Synchronizer {
    pub fn new(
        config: SyncConfig,
        importer: Arc<BlockImporter>,
        channels: Arc<dyn ChannelManager>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            importer,
            channels,
            queues: Mutex::new(SyncQueues::new()),
            running: AtomicBool::new(false),
            done: Notify::new(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn progress(&self) -> SyncProgress {
        SyncProgress {
            current_height: self.importer.ledger().latest_height() + 1,
            target_height: self.queues.lock().target(),
        }
    }

    /// Synchronize up to `target - 1`, resolving when caught up or stopped.
    ///
    /// Does nothing if a run is already in progress. The queues are empty
    /// again when this returns.
    pub async fn start(self: &Arc<Self>, target: u64) {
        if self.begin(target) {
            self.run().await;
        }
    }

    /// Register a run towards `target`. Returns `false` if one is already in
    /// progress.
    ///
    /// Once this returns `true`, [`stop`](Self::stop) takes effect and
    /// [`run`](Self::run) must follow.
    pub fn begin(&self, target: u64) -> bool {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        let latest = self.importer.ledger().latest_height();
        info!(latest, target, "Synchronization started");
        self.queues.lock().reset(latest, target);
        true
    }

    /// Drive a run registered by [`begin`](Self::begin) until caught up or
    /// stopped.
    pub async fn run(self: &Arc<Self>) {
        let begin = Instant::now();
        let download = self.spawn_periodic(Self::download_step);
        let process = self.spawn_periodic(Self::process_step);

        loop {
            let notified = self.done.notified();
            if !self.is_running() {
                break;
            }
            notified.await;
        }

        download.abort();
        process.abort();
        // Wait for both tasks so none is mid-step once we return.
        let _ = download.await;
        let _ = process.await;
        self.queues.lock().clear();

        info!(
            height = self.importer.ledger().latest_height(),
            elapsed_ms = begin.elapsed().as_millis() as u64,
            "Synchronization finished"
        );
    }

    /// End the current run, if any.
    pub fn stop(&self) {
        if self
            .running
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.done.notify_waiters();
        }
    }

    /// Handle a synchronization message from `channel`.
    ///
    /// GET_BLOCK is always served from the ledger. BLOCK is only accepted
    /// while a run is in progress.
    pub fn on_message(&self, channel: &dyn Channel, message: Message) {
        match message {
            Message::GetBlock(height) => match self.importer.ledger().get_block(height) {
                Some(block) => {
                    trace!(height, peer = ?channel.id(), "Serving block");
                    channel.send(Message::Block(Box::new((*block).clone())));
                }
                None => trace!(height, peer = ?channel.id(), "Requested block not found"),
            },
            Message::Block(block) => {
                if !self.is_running() {
                    return;
                }
                let height = block.number();
                if self.queues.lock().on_block(*block, channel.id()) {
                    trace!(height, peer = ?channel.id(), "Block downloaded");
                }
            }
            other => trace!(message = other.type_name(), "Not a sync message"),
        }
    }

    fn spawn_periodic(self: &Arc<Self>, step: fn(&Self)) -> JoinHandle<()> {
        let sync = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sync.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !sync.is_running() {
                    break;
                }
                step(&sync);
            }
        })
    }

    /// Ask one random idle peer for the lowest missing height.
    fn download_step(&self) {
        let idle = self.channels.idle_channels();
        let Some(channel) = idle.choose(&mut rand::thread_rng()) else {
            return;
        };

        let now = Instant::now();
        let request = {
            let mut queues = self.queues.lock();
            for height in queues.expire(now, self.config.download_timeout) {
                debug!(height, "Block download expired");
            }
            queues.next_request(now, channel.latest_height(), &self.config)
        };

        if let Some(height) = request {
            debug!(height, peer = ?channel.id(), "Requesting block");
            channel.send(Message::GetBlock(height));
        }
    }

    /// Apply the next block if it has arrived.
    fn process_step(&self) {
        let latest = self.importer.ledger().latest_height();
        let target = self.queues.lock().target();
        if latest + 1 >= target {
            self.stop();
            return;
        }

        let Some((block, peer)) = self.queues.lock().next_block(latest) else {
            return;
        };
        let height = block.number();

        match self.importer.import_block(block) {
            Ok(()) => {
                info!(height, target, "Synchronized block");
                self.queues.lock().completed(height);
            }
            Err(ImportError::Block(error)) => {
                warn!(height, ?peer, %error, "Invalid block from peer");
                self.queues.lock().failed(height);
                if let Some(channel) = self.channels.channel(peer) {
                    channel.disconnect(ReasonCode::BadPeer);
                }
            }
            Err(ImportError::Ledger(error)) => {
                warn!(height, %error, "Ledger moved while synchronizing");
                self.queues.lock().failed(height);
            }
        }
    }
}
