//! In-memory peers and transaction pools.

use kestrel_core::{Channel, ChannelManager};
use kestrel_engine::TransactionPool;
use kestrel_messages::{Message, ReasonCode};
use kestrel_types::{Address, PeerId, Transaction};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// A peer that records everything sent to it.
pub struct TestChannel {
    id: PeerId,
    address: Address,
    height: AtomicU64,
    idle: AtomicBool,
    sent: Mutex<Vec<Message>>,
    disconnected: Mutex<Option<ReasonCode>>,
}

impl TestChannel {
    pub fn new(id: u64, address: Address, height: u64) -> Arc<Self> {
        Arc::new(Self {
            id: PeerId(id),
            address,
            height: AtomicU64::new(height),
            idle: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
            disconnected: Mutex::new(None),
        })
    }

    pub fn set_idle(&self, idle: bool) {
        self.idle.store(idle, Ordering::SeqCst);
    }

    /// Messages sent so far.
    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().clone()
    }

    /// Drain and return messages sent so far.
    pub fn take_sent(&self) -> Vec<Message> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn disconnect_reason(&self) -> Option<ReasonCode> {
        *self.disconnected.lock()
    }
}

impl Channel for TestChannel {
    fn id(&self) -> PeerId {
        self.id
    }

    fn remote_address(&self) -> Address {
        self.address
    }

    fn latest_height(&self) -> u64 {
        self.height.load(Ordering::SeqCst)
    }

    fn set_latest_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    fn is_idle(&self) -> bool {
        self.idle.load(Ordering::SeqCst)
    }

    fn send(&self, message: Message) {
        self.sent.lock().push(message);
    }

    fn disconnect(&self, reason: ReasonCode) {
        *self.disconnected.lock() = Some(reason);
    }
}

/// Channel manager over a mutable list of [`TestChannel`]s. Disconnected
/// channels are no longer reported as active.
#[derive(Default)]
pub struct TestChannelManager {
    channels: RwLock<Vec<Arc<TestChannel>>>,
}

impl TestChannelManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, channel: Arc<TestChannel>) {
        self.channels.write().push(channel);
    }

    pub fn test_channels(&self) -> Vec<Arc<TestChannel>> {
        self.channels.read().clone()
    }
}

impl ChannelManager for TestChannelManager {
    fn active_channels(&self) -> Vec<Arc<dyn Channel>> {
        self.channels
            .read()
            .iter()
            .filter(|c| c.disconnect_reason().is_none())
            .map(|c| Arc::clone(c) as Arc<dyn Channel>)
            .collect()
    }
}

/// A fixed list of pending transactions.
#[derive(Default)]
pub struct TestPool {
    pending: Mutex<Vec<Transaction>>,
}

impl TestPool {
    pub fn new(pending: Vec<Transaction>) -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(pending),
        })
    }

    pub fn push(&self, tx: Transaction) {
        self.pending.lock().push(tx);
    }
}

impl TransactionPool for TestPool {
    fn pending(&self, max_bytes: usize) -> Vec<Transaction> {
        let mut size = 0;
        self.pending
            .lock()
            .iter()
            .take_while(|tx| {
                size += tx.size();
                size <= max_bytes
            })
            .cloned()
            .collect()
    }
}
