//! Block identifier type.

use std::fmt;

/// Identifies a durable block in a block store.
///
/// Using `u64` so a store never runs out of identifiers in practice; the
/// stores still report [`Error::OutOfBlockIds`](crate::Error::OutOfBlockIds)
/// when a configured limit is reached.
///
/// # Example
/// ```
/// use pagetxn::BlockId;
///
/// let block_id = BlockId::new(42);
/// assert!(block_id.is_valid());
/// assert!(!BlockId::NULL.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u64);

impl BlockId {
    /// Sentinel for "not yet allocated".
    pub const NULL: BlockId = BlockId(u64::MAX);

    /// Create a new BlockId.
    #[inline]
    pub fn new(id: u64) -> Self {
        BlockId(id)
    }

    /// Check if this block ID is a real identifier (not the sentinel).
    #[inline]
    pub fn is_valid(&self) -> bool {
        *self != Self::NULL
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::NULL {
            write!(f, "Block(NULL)")
        } else {
            write!(f, "Block({})", self.0)
        }
    }
}
