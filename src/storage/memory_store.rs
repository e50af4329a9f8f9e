//! In-memory block store.
//!
//! Nothing survives the process. Used by tests and by embedders that want a
//! page cache without durability; supports fault injection so I/O failure
//! paths can be driven deterministically.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::common::config::DEFAULT_BLOCK_SIZE;
use crate::common::{BlockId, Error, Result};
use crate::storage::BlockStore;

/// Settings for a [`MemoryBlockStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryStoreConfig {
    /// Block size in bytes.
    pub block_size: usize,
    /// Maximum number of identifiers the store will hand out.
    pub max_blocks: Option<u64>,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            max_blocks: None,
        }
    }
}

#[derive(Default)]
struct MemoryState {
    blocks: HashMap<BlockId, Box<[u8]>>,
    next_id: u64,
    write_log: Vec<BlockId>,
    failing_reads: HashSet<BlockId>,
    failing_writes: HashSet<BlockId>,
}

/// A [`BlockStore`] that keeps every block in a `HashMap`.
///
/// # Example
/// ```
/// use pagetxn::storage::{BlockStore, MemoryBlockStore};
///
/// let store = MemoryBlockStore::new();
/// let id = store.allocate_block_id().unwrap();
/// assert_eq!(store.read_block(id).unwrap().len(), store.block_size());
/// ```
pub struct MemoryBlockStore {
    config: MemoryStoreConfig,
    state: Mutex<MemoryState>,
    attached: AtomicBool,
}

impl MemoryBlockStore {
    /// Create an empty store with the default configuration.
    pub fn new() -> Self {
        Self::with_config(MemoryStoreConfig::default())
    }

    /// Create an empty store.
    ///
    /// # Panics
    /// Panics if `block_size` is 0.
    pub fn with_config(config: MemoryStoreConfig) -> Self {
        assert!(config.block_size > 0, "block_size must be > 0");
        Self {
            config,
            state: Mutex::new(MemoryState::default()),
            attached: AtomicBool::new(false),
        }
    }

    /// Make every read of `block_id` fail with an I/O error.
    pub fn fail_reads(&self, block_id: BlockId) {
        self.state.lock().failing_reads.insert(block_id);
    }

    /// Make every write of `block_id` fail with an I/O error.
    pub fn fail_writes(&self, block_id: BlockId) {
        self.state.lock().failing_writes.insert(block_id);
    }

    /// Remove all injected faults for `block_id`.
    pub fn heal(&self, block_id: BlockId) {
        let mut state = self.state.lock();
        state.failing_reads.remove(&block_id);
        state.failing_writes.remove(&block_id);
    }

    /// Blocks in the order their writes completed.
    pub fn write_log(&self) -> Vec<BlockId> {
        self.state.lock().write_log.clone()
    }

    /// Copy of the stored bytes of a block, if it was allocated.
    pub fn block(&self, block_id: BlockId) -> Option<Vec<u8>> {
        self.state.lock().blocks.get(&block_id).map(|b| b.to_vec())
    }

    /// Number of allocated blocks.
    pub fn block_count(&self) -> usize {
        self.state.lock().blocks.len()
    }
}

impl Default for MemoryBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

fn injected_fault(block_id: BlockId, op: &str) -> Error {
    io::Error::new(io::ErrorKind::Other, format!("injected {} fault on {}", op, block_id)).into()
}

impl BlockStore for MemoryBlockStore {
    fn block_size(&self) -> usize {
        self.config.block_size
    }

    fn allocate_block_id(&self) -> Result<BlockId> {
        let mut state = self.state.lock();
        let limit = self.config.max_blocks.unwrap_or(BlockId::NULL.0);
        if state.next_id >= limit {
            return Err(Error::OutOfBlockIds);
        }

        let block_id = BlockId::new(state.next_id);
        state.next_id += 1;
        state
            .blocks
            .insert(block_id, vec![0u8; self.config.block_size].into_boxed_slice());
        Ok(block_id)
    }

    fn read_block(&self, block_id: BlockId) -> Result<Box<[u8]>> {
        let state = self.state.lock();
        if state.failing_reads.contains(&block_id) {
            return Err(injected_fault(block_id, "read"));
        }
        state
            .blocks
            .get(&block_id)
            .cloned()
            .ok_or(Error::BlockNotFound(block_id))
    }

    fn write_block(&self, block_id: BlockId, data: &[u8]) -> Result<()> {
        if data.len() != self.config.block_size {
            return Err(Error::BlockSizeMismatch {
                block_id,
                expected: self.config.block_size,
                actual: data.len(),
            });
        }

        let mut state = self.state.lock();
        if state.failing_writes.contains(&block_id) {
            return Err(injected_fault(block_id, "write"));
        }
        match state.blocks.get_mut(&block_id) {
            Some(block) => block.copy_from_slice(data),
            None => return Err(Error::BlockNotFound(block_id)),
        }
        state.write_log.push(block_id);
        Ok(())
    }

    fn try_attach(&self) -> bool {
        self.attached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn detach(&self) {
        self.attached.store(false, Ordering::Release);
    }
}
