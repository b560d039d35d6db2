//! Peer transport seams.
//!
//! Framing, handshakes and sockets live behind these traits. The consensus
//! runner and the synchronizer only need to know who is connected, how high
//! their chain is, and how to send to or drop them.

use kestrel_messages::{Message, ReasonCode};
use kestrel_types::{Address, PeerId};
use std::sync::Arc;

/// One connected peer.
pub trait Channel: Send + Sync {
    fn id(&self) -> PeerId;

    /// Validator address the peer authenticated as during the handshake.
    fn remote_address(&self) -> Address;

    /// Last chain height the peer reported.
    fn latest_height(&self) -> u64;

    fn set_latest_height(&self, height: u64);

    /// Whether the peer has no outstanding request from us.
    fn is_idle(&self) -> bool;

    /// Queue a message for the peer. Never blocks.
    fn send(&self, message: Message);

    fn disconnect(&self, reason: ReasonCode);
}

/// The set of connected peers.
pub trait ChannelManager: Send + Sync {
    fn active_channels(&self) -> Vec<Arc<dyn Channel>>;

    fn channel(&self, id: PeerId) -> Option<Arc<dyn Channel>> {
        self.active_channels().into_iter().find(|c| c.id() == id)
    }

    /// Connected peers whose address is in `validators`.
    fn active_validator_channels(&self, validators: &[Address]) -> Vec<Arc<dyn Channel>> {
        self.active_channels()
            .into_iter()
            .filter(|c| validators.contains(&c.remote_address()))
            .collect()
    }

    fn idle_channels(&self) -> Vec<Arc<dyn Channel>> {
        self.active_channels()
            .into_iter()
            .filter(|c| c.is_idle())
            .collect()
    }
}
