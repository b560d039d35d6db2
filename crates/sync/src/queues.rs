//! Download bookkeeping for one synchronization run.

use crate::SyncConfig;
use kestrel_types::{Block, PeerId};
use std::collections::{BTreeMap, BTreeSet};
use std::time::{Duration, Instant};

/// Heights still to request, requests in flight, and downloaded blocks
/// waiting to be applied.
///
/// Heights never requested are tracked by a cursor rather than listed, so
/// the cost of a run does not depend on how far away the target is.
/// Pure bookkeeping: no I/O, and time is passed in.
#[derive(Debug, Default)]
pub struct SyncQueues {
    target: u64,

    /// Lowest height not yet requested in this run.
    next: u64,

    /// Heights below `next` that must be requested again, lowest first.
    requeued: BTreeSet<u64>,

    /// Heights requested, with the time of the request.
    to_complete: BTreeMap<u64, Instant>,

    /// Downloaded blocks by height, with the peer that sent them.
    to_process: BTreeMap<u64, (Block, PeerId)>,
}

impl SyncQueues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start over, with every height in `latest + 1 .. target` to download.
    pub fn reset(&mut self, latest: u64, target: u64) {
        self.clear();
        self.target = target;
        self.next = latest + 1;
    }

    pub fn clear(&mut self) {
        self.next = self.target;
        self.requeued.clear();
        self.to_complete.clear();
        self.to_process.clear();
    }

    pub fn target(&self) -> u64 {
        self.target
    }

    /// Return requests older than `timeout` to the download queue.
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> Vec<u64> {
        let expired: Vec<u64> = self
            .to_complete
            .iter()
            .filter(|(_, requested)| now.saturating_duration_since(**requested) > timeout)
            .map(|(height, _)| *height)
            .collect();
        for height in &expired {
            self.to_complete.remove(height);
            self.requeued.insert(*height);
        }
        expired
    }

    /// Pick the height to request from a peer at `peer_height`, marking it
    /// in flight.
    ///
    /// Returns `None` if nothing is left, too many requests are outstanding,
    /// the backlog of unapplied blocks is full, or the peer is not high
    /// enough.
    pub fn next_request(
        &mut self,
        now: Instant,
        peer_height: u64,
        config: &SyncConfig,
    ) -> Option<u64> {
        let requeued = self.requeued.first().copied();
        let task = requeued.or((self.next < self.target).then_some(self.next))?;

        if self.to_complete.len() >= config.max_in_flight {
            return None;
        }
        let lowest_pending = self.to_process.keys().next().copied();
        if self.to_process.len() >= config.max_pending_blocks
            && lowest_pending.is_some_and(|lowest| task > lowest)
        {
            return None;
        }
        if peer_height < task {
            return None;
        }

        if requeued.is_some() {
            self.requeued.remove(&task);
        } else {
            self.next += 1;
        }
        self.to_complete.insert(task, now);
        Some(task)
    }

    /// Record a downloaded block. Heights outside the run are ignored, as is
    /// a second copy of a height already waiting.
    pub fn on_block(&mut self, block: Block, peer: PeerId) -> bool {
        let height = block.number();
        if height == 0 || height >= self.target {
            return false;
        }
        self.requeued.remove(&height);
        self.to_complete.remove(&height);
        if self.to_process.contains_key(&height) {
            return false;
        }
        self.to_process.insert(height, (block, peer));
        true
    }

    /// Drop buffered blocks at or below `latest` and take `latest + 1` if it
    /// has arrived.
    pub fn next_block(&mut self, latest: u64) -> Option<(Block, PeerId)> {
        self.to_process = self.to_process.split_off(&(latest + 1));
        self.to_process.remove(&(latest + 1))
    }

    /// `height` was applied, and with it every height below.
    pub fn completed(&mut self, height: u64) {
        let above = height.saturating_add(1);
        self.requeued = self.requeued.split_off(&above);
        self.to_complete = self.to_complete.split_off(&above);
        self.next = self.next.max(above);
    }

    /// `height` was rejected and must be downloaded again.
    pub fn failed(&mut self, height: u64) {
        self.to_complete.remove(&height);
        if height < self.next {
            self.requeued.insert(height);
        }
    }

    /// Whether `height` is waiting to be requested.
    pub fn is_downloading(&self, height: u64) -> bool {
        self.requeued.contains(&height) || (self.next..self.target).contains(&height)
    }

    pub fn is_in_flight(&self, height: u64) -> bool {
        self.to_complete.contains_key(&height)
    }

    pub fn is_pending(&self, height: u64) -> bool {
        self.to_process.contains_key(&height)
    }

    pub fn in_flight(&self) -> usize {
        self.to_complete.len()
    }

    /// Whether nothing is left to request, await or apply.
    pub fn is_empty(&self) -> bool {
        self.next >= self.target
            && self.requeued.is_empty()
            && self.to_complete.is_empty()
            && self.to_process.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_test_helpers::{extend_chain, genesis_ledger, validator_keys};

    fn blocks(n: usize) -> Vec<Block> {
        let keys = validator_keys(4);
        let ledger = genesis_ledger(&keys);
        extend_chain(&ledger, &keys, n)
    }

    #[test]
    fn test_reset_queues_missing_heights() {
        let mut queues = SyncQueues::new();
        queues.reset(4, 9);

        assert_eq!(queues.target(), 9);
        assert!((5..9).all(|h| queues.is_downloading(h)));
        assert!(!queues.is_downloading(4));
        assert!(!queues.is_downloading(9));
    }

    #[test]
    fn test_request_lowest_height_peer_has() {
        let config = SyncConfig::default();
        let now = Instant::now();
        let mut queues = SyncQueues::new();
        queues.reset(0, 5);

        assert_eq!(queues.next_request(now, 0, &config), None);
        assert_eq!(queues.next_request(now, 4, &config), Some(1));
        assert_eq!(queues.next_request(now, 4, &config), Some(2));
        assert!(queues.is_in_flight(1));
        assert!(!queues.is_downloading(1));
    }

    #[test]
    fn test_in_flight_limit() {
        let config = SyncConfig::default().with_max_in_flight(2);
        let now = Instant::now();
        let mut queues = SyncQueues::new();
        queues.reset(0, 10);

        assert!(queues.next_request(now, 10, &config).is_some());
        assert!(queues.next_request(now, 10, &config).is_some());
        assert_eq!(queues.next_request(now, 10, &config), None);
        assert_eq!(queues.in_flight(), 2);
    }

    #[test]
    fn test_expired_requests_return_to_download() {
        let config = SyncConfig::default();
        let start = Instant::now();
        let mut queues = SyncQueues::new();
        queues.reset(0, 3);
        queues.next_request(start, 3, &config);

        let later = start + config.download_timeout + Duration::from_millis(1);
        assert!(queues.expire(start, config.download_timeout).is_empty());
        assert_eq!(queues.expire(later, config.download_timeout), vec![1]);
        assert!(queues.is_downloading(1));
        assert!(!queues.is_in_flight(1));
    }

    #[test]
    fn test_block_moves_from_in_flight_to_process() {
        let blocks = blocks(10);
        let config = SyncConfig::default();
        let now = Instant::now();
        let mut queues = SyncQueues::new();
        queues.reset(9, 12);
        assert_eq!(queues.next_request(now, 11, &config), Some(10));

        assert!(queues.on_block(blocks[9].clone(), PeerId(7)));

        assert!(!queues.is_downloading(10));
        assert!(!queues.is_in_flight(10));
        assert!(queues.is_pending(10));
        assert!(!queues.on_block(blocks[9].clone(), PeerId(8)));
    }

    #[test]
    fn test_block_outside_run_is_ignored() {
        let blocks = blocks(3);
        let mut queues = SyncQueues::new();
        queues.reset(0, 3);

        assert!(!queues.on_block(blocks[2].clone(), PeerId(1)));
        assert!(queues.on_block(blocks[1].clone(), PeerId(1)));
    }

    #[test]
    fn test_next_block_in_height_order() {
        let blocks = blocks(4);
        let mut queues = SyncQueues::new();
        queues.reset(0, 5);
        queues.on_block(blocks[0].clone(), PeerId(1));
        queues.on_block(blocks[2].clone(), PeerId(1));

        // Height 3 is not next while the ledger is at 1.
        assert!(queues.next_block(1).is_none());
        assert!(queues.is_pending(3));

        // Blocks at or below the head are discarded.
        let (block, peer) = queues.next_block(2).unwrap();
        assert_eq!(block.number(), 3);
        assert_eq!(peer, PeerId(1));
        assert!(!queues.is_pending(1));
    }

    #[test]
    fn test_backlog_limit_only_blocks_later_heights() {
        let blocks = blocks(4);
        let config = SyncConfig::default().with_max_pending_blocks(1);
        let now = Instant::now();
        let mut queues = SyncQueues::new();
        queues.reset(0, 5);
        queues.next_request(now, 5, &config);
        queues.next_request(now, 5, &config);
        queues.on_block(blocks[1].clone(), PeerId(1));

        // Height 1 is below the buffered block 2 and may still be fetched.
        queues.failed(1);
        assert_eq!(queues.next_request(now, 5, &config), Some(1));
        assert_eq!(queues.next_request(now, 5, &config), None);
    }

    #[test]
    fn test_distant_target_is_not_materialized() {
        let config = SyncConfig::default();
        let now = Instant::now();
        let mut queues = SyncQueues::new();
        queues.reset(4, u64::MAX / 2);

        assert!(queues.is_downloading(u64::MAX / 2 - 1));
        assert_eq!(queues.next_request(now, 100, &config), Some(5));
        assert_eq!(queues.next_request(now, 100, &config), Some(6));
        assert!(!queues.is_empty());
    }

    #[test]
    fn test_requeued_heights_come_before_new_ones() {
        let config = SyncConfig::default();
        let now = Instant::now();
        let mut queues = SyncQueues::new();
        queues.reset(0, 10);
        queues.next_request(now, 10, &config);
        queues.next_request(now, 10, &config);

        queues.failed(2);
        assert_eq!(queues.next_request(now, 10, &config), Some(2));
        assert_eq!(queues.next_request(now, 10, &config), Some(3));
    }

    #[test]
    fn test_failed_height_is_requeued() {
        let mut queues = SyncQueues::new();
        queues.reset(0, 3);
        queues.next_request(Instant::now(), 3, &SyncConfig::default());

        queues.failed(1);
        assert!(queues.is_downloading(1));
        assert!(!queues.is_in_flight(1));

        queues.completed(1);
        queues.completed(2);
        assert!(queues.is_empty());
    }
}
