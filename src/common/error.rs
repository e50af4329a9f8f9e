//! Error types for the page cache.

use std::sync::Arc;

use thiserror::Error;

use crate::common::{BlockId, TxnId};

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// All recoverable errors surfaced by the page cache and block stores.
///
/// `Error` is `Clone`: a single failed load or flush is delivered to every
/// acquisition or transaction that was waiting on it.
///
/// Caller bugs (acquiring the same block twice in one transaction, touching
/// a buffer before its grant) are not represented here. Those panic.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// I/O error from the underlying device.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// The block has never been allocated in the store.
    #[error("{0} not found")]
    BlockNotFound(BlockId),

    /// Stored bytes failed checksum verification.
    #[error("checksum mismatch reading {0}")]
    Corruption(BlockId),

    /// A buffer handed to the store has the wrong length.
    #[error("{block_id}: buffer has {actual} bytes, block size is {expected}")]
    BlockSizeMismatch {
        block_id: BlockId,
        expected: usize,
        actual: usize,
    },

    /// The block store is already attached to another page cache.
    #[error("block store is already in use by another page cache")]
    StoreInUse,

    /// The page cache was opened outside of a tokio runtime.
    #[error("page cache requires a tokio runtime")]
    NoRuntime,

    /// The store has no identifiers left to allocate.
    #[error("block identifiers exhausted")]
    OutOfBlockIds,

    /// The sentinel or an otherwise unusable id was passed in.
    #[error("invalid block id: {0}")]
    InvalidBlockId(BlockId),

    /// The grant channel was torn down before the acquisition was granted.
    #[error("acquisition on {0} was cancelled before it was granted")]
    Cancelled(BlockId),

    /// A transaction this one depends on could not be flushed.
    #[error("{0} cannot be flushed: a transaction it depends on failed to flush")]
    DependencyFailed(TxnId),

    /// The cache went away before the transaction's flush completed.
    #[error("{0} was abandoned before it was flushed")]
    Abandoned(TxnId),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::BlockNotFound(BlockId::new(42));
        assert_eq!(format!("{}", err), "Block(42) not found");

        let err = Error::StoreInUse;
        assert_eq!(
            format!("{}", err),
            "block store is already in use by another page cache"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();

        match err {
            Error::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_error_clone_shares_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "device gone");
        let err: Error = io_err.into();
        let cloned = err.clone();

        match (err, cloned) {
            (Error::Io(a), Error::Io(b)) => assert!(Arc::ptr_eq(&a, &b)),
            _ => panic!("Expected Io errors"),
        }
    }
}
