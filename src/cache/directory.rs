//! Current-page directory: `BlockId` → entry, sharded by block.
//!
//! Each shard is a `Mutex<HashMap>`; the entries themselves carry their own
//! lock. A shard lock is only held for lookup, insertion and removal, never
//! while granting, so transactions on unrelated blocks do not serialize.
//!
//! # Lock order
//! transaction table → shard → entry. Code holding an entry lock never
//! takes a shard or the transaction table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::cache::current_page::CurrentPage;
use crate::common::BlockId;

type Shard = Mutex<HashMap<BlockId, Arc<CurrentPage>>>;

pub(crate) struct Directory {
    shards: Box<[Shard]>,
    resident: AtomicUsize,
}

impl Directory {
    /// # Panics
    /// Panics if `shard_count` is 0.
    pub(crate) fn new(shard_count: usize) -> Self {
        assert!(shard_count > 0, "shard_count must be > 0");
        Self {
            shards: (0..shard_count).map(|_| Mutex::new(HashMap::new())).collect(),
            resident: AtomicUsize::new(0),
        }
    }

    #[inline]
    fn shard(&self, block_id: BlockId) -> &Shard {
        &self.shards[(block_id.0 % self.shards.len() as u64) as usize]
    }

    pub(crate) fn get(&self, block_id: BlockId) -> Option<Arc<CurrentPage>> {
        self.shard(block_id).lock().get(&block_id).cloned()
    }

    /// Return the entry for `block_id`, creating it with `create` if absent.
    pub(crate) fn touch(
        &self,
        block_id: BlockId,
        create: impl FnOnce() -> CurrentPage,
    ) -> Arc<CurrentPage> {
        let mut shard = self.shard(block_id).lock();
        if let Some(entry) = shard.get(&block_id) {
            return Arc::clone(entry);
        }
        let entry = Arc::new(create());
        shard.insert(block_id, Arc::clone(&entry));
        self.resident.fetch_add(1, Ordering::Relaxed);
        entry
    }

    /// Remove the entry for `block_id` if `retire` agrees.
    pub(crate) fn remove_if(&self, block_id: BlockId, retire: impl FnOnce(&CurrentPage) -> bool) -> bool {
        let mut shard = self.shard(block_id).lock();
        let retired = match shard.get(&block_id) {
            Some(entry) => retire(entry),
            None => return false,
        };
        if retired {
            shard.remove(&block_id);
            self.resident.fetch_sub(1, Ordering::Relaxed);
        }
        retired
    }

    /// Number of resident entries.
    pub(crate) fn len(&self) -> usize {
        self.resident.load(Ordering::Relaxed)
    }

    pub(crate) fn block_ids(&self) -> Vec<BlockId> {
        self.shards
            .iter()
            .flat_map(|shard| shard.lock().keys().copied().collect::<Vec<_>>())
            .collect()
    }
}
