//! Storage layer - the durable block store boundary.
//!
//! The page cache never interprets block contents. It talks to storage
//! only through the [`BlockStore`] trait:
//! - [`FileBlockStore`] - Single-file store with per-block CRC32 trailers
//! - [`MemoryBlockStore`] - In-memory store with fault injection, for tests

mod file_store;
mod memory_store;

pub use file_store::{FileBlockStore, FileStoreConfig};
pub use memory_store::{MemoryBlockStore, MemoryStoreConfig};

use crate::common::{BlockId, Result};

/// A durable key → bytes store keyed by [`BlockId`].
///
/// # Thread Safety
/// Implementations are shared between the cache and its blocking I/O
/// threads, so every method takes `&self` and implementations serialize
/// access internally.
///
/// # Blocking
/// All methods may block on I/O. Loads and flushes run on `spawn_blocking`
/// threads; `allocate_block_id` is called inline by
/// [`Transaction::acquire_new`](crate::Transaction::acquire_new) and should
/// be cheap.
pub trait BlockStore: Send + Sync + 'static {
    /// Size in bytes of every block in this store.
    fn block_size(&self) -> usize;

    /// Allocate a fresh block identifier.
    ///
    /// The returned id is distinct from every id this store has ever handed
    /// out. Fails with [`Error::OutOfBlockIds`](crate::Error::OutOfBlockIds)
    /// when no identifiers remain.
    fn allocate_block_id(&self) -> Result<BlockId>;

    /// Read the bytes of a block.
    fn read_block(&self, block_id: BlockId) -> Result<Box<[u8]>>;

    /// Durably write the bytes of a block. Returns once the write is durable.
    fn write_block(&self, block_id: BlockId, data: &[u8]) -> Result<()>;

    /// Mark the store as attached to a page cache.
    ///
    /// Returns `false` if it is already attached to another one.
    fn try_attach(&self) -> bool;

    /// Release the attachment taken by [`try_attach`](Self::try_attach).
    fn detach(&self);
}
