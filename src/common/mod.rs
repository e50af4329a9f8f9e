//! Common types shared across the crate.
//!
//! This module contains fundamental primitives used throughout the codebase:
//! - Configuration constants and [`PageCacheConfig`](config::PageCacheConfig)
//! - Error types
//! - Identifiers (BlockId, TxnId)

mod block_id;
pub mod config;
pub mod error;
mod txn_id;

pub use block_id::BlockId;
pub use error::{Error, Result};
pub use txn_id::TxnId;
