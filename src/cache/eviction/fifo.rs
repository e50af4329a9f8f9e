//! FIFO (first-in-first-out) eviction.

use std::collections::{HashSet, VecDeque};

use crate::cache::eviction::EvictionPolicy;
use crate::common::BlockId;

/// Evicts blocks in the order they were first touched, skipping blocks that
/// are not currently evictable.
#[derive(Debug, Default)]
pub struct FifoPolicy {
    /// Front = oldest.
    queue: VecDeque<BlockId>,
    in_queue: HashSet<BlockId>,
    evictable: HashSet<BlockId>,
}

impl FifoPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EvictionPolicy for FifoPolicy {
    fn record_access(&mut self, block_id: BlockId) {
        if self.in_queue.insert(block_id) {
            self.queue.push_back(block_id);
        }
    }

    fn set_evictable(&mut self, block_id: BlockId, evictable: bool) {
        if evictable {
            self.record_access(block_id);
            self.evictable.insert(block_id);
        } else {
            self.evictable.remove(&block_id);
        }
    }

    fn evict(&mut self) -> Option<BlockId> {
        let mut skipped = Vec::new();
        let mut victim = None;
        while let Some(block_id) = self.queue.pop_front() {
            if !self.in_queue.contains(&block_id) {
                // Removed earlier; drop the stale slot.
                continue;
            }
            if self.evictable.remove(&block_id) {
                self.in_queue.remove(&block_id);
                victim = Some(block_id);
                break;
            }
            skipped.push(block_id);
        }
        // Busy blocks keep their place at the front.
        for block_id in skipped.into_iter().rev() {
            self.queue.push_front(block_id);
        }
        victim
    }

    fn remove(&mut self, block_id: BlockId) {
        // The queue slot is skipped lazily by `evict`.
        self.in_queue.remove(&block_id);
        self.evictable.remove(&block_id);
    }

    fn size(&self) -> usize {
        self.evictable.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(n: u64) -> BlockId {
        BlockId::new(n)
    }

    #[test]
    fn test_fifo_basic() {
        let mut policy = FifoPolicy::new();
        for i in 0..3 {
            policy.record_access(b(i));
            policy.set_evictable(b(i), true);
        }
        assert_eq!(policy.size(), 3);

        assert_eq!(policy.evict(), Some(b(0)));
        assert_eq!(policy.evict(), Some(b(1)));
        assert_eq!(policy.evict(), Some(b(2)));
        assert_eq!(policy.evict(), None);
    }

    #[test]
    fn test_fifo_skips_busy_blocks() {
        let mut policy = FifoPolicy::new();
        for i in 0..3 {
            policy.record_access(b(i));
        }
        policy.set_evictable(b(1), true);

        assert_eq!(policy.evict(), Some(b(1)));
        assert_eq!(policy.evict(), None);

        // Block 0 kept its position.
        policy.set_evictable(b(2), true);
        policy.set_evictable(b(0), true);
        assert_eq!(policy.evict(), Some(b(0)));
        assert_eq!(policy.evict(), Some(b(2)));
    }

    #[test]
    fn test_fifo_remove() {
        let mut policy = FifoPolicy::new();
        policy.set_evictable(b(0), true);
        policy.set_evictable(b(1), true);

        policy.remove(b(0));
        assert_eq!(policy.size(), 1);
        assert_eq!(policy.evict(), Some(b(1)));
    }

    #[test]
    fn test_fifo_reaccess_no_reorder() {
        let mut policy = FifoPolicy::new();
        policy.record_access(b(0));
        policy.record_access(b(1));
        policy.record_access(b(0));
        policy.set_evictable(b(0), true);
        policy.set_evictable(b(1), true);

        assert_eq!(policy.evict(), Some(b(0)));
        assert_eq!(policy.evict(), Some(b(1)));
    }
}
