//! Eviction policies.
//!
//! A policy only ranks candidates. The cache decides what is evictable
//! (idle, clean, no live reader snapshot) and re-checks that under the entry
//! lock before dropping anything, so a stale choice is harmless.
//!
//! Currently implements:
//! - [`FifoPolicy`] - evicts in order of first access

mod fifo;

pub use fifo::FifoPolicy;

use crate::common::BlockId;

/// Victim selection for resident directory entries.
pub trait EvictionPolicy: Send {
    /// Record that a block was touched.
    fn record_access(&mut self, block_id: BlockId);

    /// Mark a block as a candidate (or not).
    fn set_evictable(&mut self, block_id: BlockId, evictable: bool);

    /// Pick and forget a victim.
    fn evict(&mut self) -> Option<BlockId>;

    /// Forget a block entirely.
    fn remove(&mut self, block_id: BlockId);

    /// Number of candidates.
    fn size(&self) -> usize;
}
