//! pagetxn - a transactional page cache for block storage.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            pagetxn                              │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │                 Page Cache (cache/)                      │   │
//! │  │    Transaction ──▶ Acquisition ──▶ directory entry       │   │
//! │  │        │                             │  FIFO R/W queue   │   │
//! │  │        ▼                             ▼  newest Page      │   │
//! │  │   dependency graph ──▶ flush scheduler (batches)         │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │             Block Store (storage/)                       │   │
//! │  │       FileBlockStore (CRC32)  |  MemoryBlockStore        │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (BlockId, TxnId, Error, config)
//! - [`cache`] - Page cache, transactions, acquisitions, eviction
//! - [`storage`] - The block store boundary and its implementations
//!
//! # Quick Start
//! ```no_run
//! # #[tokio::main]
//! # async fn main() -> pagetxn::Result<()> {
//! use std::sync::Arc;
//! use pagetxn::{FileBlockStore, FileStoreConfig, PageCache};
//!
//! let store = FileBlockStore::open_or_create(FileStoreConfig::new("blocks.db"))?;
//! let cache = PageCache::open(Arc::new(store))?;
//!
//! let first = cache.begin_transaction();
//! let mut acq = first.acquire_new()?;
//! acq.wait_granted().await?;
//! acq.data_mut()[..5].copy_from_slice(b"hello");
//! let block_id = acq.block_id();
//! drop(acq);
//! let flushed = first.commit();
//!
//! // Reading first's write orders this transaction's flush after it.
//! let second = cache.begin_transaction();
//! let mut acq = second.acquire_read(block_id)?;
//! acq.wait_granted().await?;
//! assert_eq!(&acq.data()[..5], b"hello");
//! drop(acq);
//! second.commit();
//!
//! flushed.wait().await?;
//! cache.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod common;
pub mod storage;

pub use cache::{
    AccessMode, Acquisition, AcquisitionState, CacheStats, FlushHandle, FlushStatus, Page,
    PageCache, PageState, StatsSnapshot, Transaction,
};
pub use common::config::{PageCacheConfig, DEFAULT_BLOCK_SIZE, DEFAULT_SHARD_COUNT};
pub use common::{BlockId, Error, Result, TxnId};
pub use storage::{BlockStore, FileBlockStore, FileStoreConfig, MemoryBlockStore, MemoryStoreConfig};
