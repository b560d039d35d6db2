//! The phase timeout.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// A single replaceable timeout, backed by a tokio task.
///
/// Each `set` or `clear` starts a new generation. A firing timer sends its
/// generation, so the event loop can drop timeouts that were already queued
/// when the phase changed.
pub struct Timer {
    tx: mpsc::UnboundedSender<u64>,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl Timer {
    pub fn new(tx: mpsc::UnboundedSender<u64>) -> Self {
        Self {
            tx,
            generation: 0,
            task: None,
        }
    }

    /// Fire once after `duration`, replacing any pending timeout.
    pub fn set(&mut self, duration: Duration) {
        self.clear();
        let generation = self.generation;
        let tx = self.tx.clone();
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            trace!(generation, "Timeout fired");
            let _ = tx.send(generation);
        }));
        trace!(generation, ?duration, "Timeout armed");
    }

    /// Disarm the pending timeout, if any.
    pub fn clear(&mut self) {
        self.generation += 1;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    /// Whether a timeout that fired with `generation` is still current.
    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    pub fn is_armed(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.clear();
    }
}
