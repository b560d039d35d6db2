//! Outbound relay to a bounded random subset of validators.

use arc_swap::ArcSwap;
use kestrel_bft::ValidatorView;
use kestrel_messages::Message;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Queues messages and fans each one out to at most `redundancy` randomly
/// chosen validator channels from the current snapshot.
pub struct Broadcaster {
    tx: mpsc::UnboundedSender<Message>,
    task: JoinHandle<()>,
}

impl Broadcaster {
    /// Spawn the relay task on the current runtime.
    pub fn spawn(view: Arc<ArcSwap<ValidatorView>>, redundancy: usize) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
        let task = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let snapshot = view.load();
                let targets: Vec<_> = snapshot
                    .channels
                    .choose_multiple(&mut rand::thread_rng(), redundancy)
                    .collect();
                trace!(
                    message = message.type_name(),
                    targets = targets.len(),
                    "Relaying message"
                );
                for channel in targets {
                    channel.send(message.clone());
                }
            }
            debug!("Broadcaster stopped");
        });
        Self { tx, task }
    }

    /// Queue a message. Never blocks.
    pub fn broadcast(&self, message: Message) {
        let _ = self.tx.send(message);
    }

    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for Broadcaster {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_core::Channel;
    use kestrel_test_helpers::TestChannel;
    use kestrel_types::Address;
    use std::time::Duration;

    fn view_of(channels: &[Arc<TestChannel>]) -> Arc<ArcSwap<ValidatorView>> {
        Arc::new(ArcSwap::from_pointee(ValidatorView {
            validators: channels.iter().map(|c| c.remote_address()).collect(),
            channels: channels
                .iter()
                .map(|c| Arc::clone(c) as Arc<dyn Channel>)
                .collect(),
        }))
    }

    fn channels(n: u8) -> Vec<Arc<TestChannel>> {
        (0..n)
            .map(|i| TestChannel::new(i as u64, Address([i; 20]), 0))
            .collect()
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_relay_is_bounded_by_redundancy() {
        let channels = channels(6);
        let broadcaster = Broadcaster::spawn(view_of(&channels), 2);

        broadcaster.broadcast(Message::NewHeight(3));
        settle().await;

        let sent: usize = channels.iter().map(|c| c.sent().len()).sum();
        assert_eq!(sent, 2);
    }

    #[tokio::test]
    async fn test_small_set_receives_everything() {
        let channels = channels(3);
        let broadcaster = Broadcaster::spawn(view_of(&channels), 16);

        broadcaster.broadcast(Message::GetBlock(1));
        broadcaster.broadcast(Message::GetBlock(2));
        settle().await;

        for channel in &channels {
            assert_eq!(
                channel.sent(),
                vec![Message::GetBlock(1), Message::GetBlock(2)]
            );
        }
    }

    #[tokio::test]
    async fn test_snapshot_replacement_is_picked_up() {
        let first = channels(2);
        let view = view_of(&first);
        let broadcaster = Broadcaster::spawn(Arc::clone(&view), 16);

        let second = vec![TestChannel::new(9, Address([9; 20]), 0)];
        view.store(Arc::new(ValidatorView {
            validators: vec![Address([9; 20])],
            channels: vec![Arc::clone(&second[0]) as Arc<dyn Channel>],
        }));
        broadcaster.broadcast(Message::NewHeight(4));
        settle().await;

        assert!(first.iter().all(|c| c.sent().is_empty()));
        assert_eq!(second[0].sent(), vec![Message::NewHeight(4)]);
    }

    #[tokio::test]
    async fn test_stopped_broadcaster_drops_messages() {
        let channels = channels(2);
        let broadcaster = Broadcaster::spawn(view_of(&channels), 16);

        broadcaster.stop();
        broadcaster.broadcast(Message::NewHeight(1));
        settle().await;

        assert!(channels.iter().all(|c| c.sent().is_empty()));
    }
}
