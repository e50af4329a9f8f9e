//! Transactional page cache.
//!
//! The cache mediates all in-memory access to blocks of a
//! [`BlockStore`](crate::storage::BlockStore): per-block reader/writer
//! locking, copy-on-write page versions, and dependency-ordered flushing.
//!
//! # Components
//! - [`PageCache`] - Entry point; owns the directory and live transactions
//! - [`Transaction`] / [`FlushHandle`] - Grouping and durability tracking
//! - [`Acquisition`] - One transaction's claim on one block
//! - [`Page`] - One immutable version of a block's bytes
//! - [`CacheStats`] - Counters
//! - [`eviction`] - Eviction policies

mod acquisition;
mod arena;
mod current_page;
mod directory;
mod drain;
pub mod eviction;
mod page;
mod page_cache;
mod stats;
mod transaction;
mod txn_table;

pub use acquisition::{Acquisition, AcquisitionState};
pub use current_page::AccessMode;
pub use page::{Page, PageState};
pub use page_cache::PageCache;
pub use stats::{CacheStats, StatsSnapshot};
pub use transaction::{FlushHandle, Transaction};
pub use txn_table::FlushStatus;
