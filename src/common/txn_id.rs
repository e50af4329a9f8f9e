//! Transaction identifier type.

use std::fmt;

/// Identifies a live transaction inside one page cache.
///
/// A `TxnId` is a generation-checked handle into the cache's transaction
/// arena: once the transaction is retired its slot may be reused, but the
/// generation changes, so stale ids never resolve to the new occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxnId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl TxnId {
    #[inline]
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        TxnId { index, generation }
    }

    /// Slot index in the arena.
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Generation of the slot when this id was issued.
    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Txn({}v{})", self.index, self.generation)
    }
}
