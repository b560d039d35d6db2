//! Sync configuration.

use std::time::Duration;

/// Configuration for the block synchronizer.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Period of the download and process tasks.
    pub interval: Duration,

    /// In-flight requests older than this are returned to the download queue.
    pub download_timeout: Duration,

    /// Maximum number of outstanding block requests.
    pub max_in_flight: usize,

    /// Downloads pause while more blocks than this wait to be applied.
    pub max_pending_blocks: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(5),
            download_timeout: Duration::from_secs(10),
            max_in_flight: 16,
            max_pending_blocks: 512,
        }
    }
}

impl SyncConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max;
        self
    }

    pub fn with_max_pending_blocks(mut self, max: usize) -> Self {
        self.max_pending_blocks = max;
        self
    }
}
