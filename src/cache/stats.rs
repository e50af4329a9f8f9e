//! Page cache statistics tracking.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by the page cache.
///
/// All fields are atomic so acquisitions and background I/O tasks on any
/// thread can bump them without a lock.
///
/// # Memory Ordering
/// Every operation is `Ordering::Relaxed`: counters are independent of
/// each other and of the data they describe, so only atomicity matters.
///
/// # Example
/// ```
/// use pagetxn::CacheStats;
/// use std::sync::atomic::Ordering;
///
/// let stats = CacheStats::new();
/// stats.grants.fetch_add(1, Ordering::Relaxed);
/// assert_eq!(stats.snapshot().grants, 1);
/// ```
#[derive(Debug)]
pub struct CacheStats {
    /// Block reads issued to the store.
    pub loads: AtomicU64,

    /// Block reads that failed.
    pub load_failures: AtomicU64,

    /// Fresh block ids handed out.
    pub allocations: AtomicU64,

    /// Acquisitions granted.
    pub grants: AtomicU64,

    /// Acquisitions that had to queue behind an incompatible request.
    pub waits: AtomicU64,

    /// Pages written to the store.
    pub pages_flushed: AtomicU64,

    /// Flush batches started.
    pub flush_batches: AtomicU64,

    /// Flush batches that failed.
    pub flush_failures: AtomicU64,

    /// Directory entries dropped.
    pub evictions: AtomicU64,
}

impl CacheStats {
    pub fn new() -> Self {
        Self {
            loads: AtomicU64::new(0),
            load_failures: AtomicU64::new(0),
            allocations: AtomicU64::new(0),
            grants: AtomicU64::new(0),
            waits: AtomicU64::new(0),
            pages_flushed: AtomicU64::new(0),
            flush_batches: AtomicU64::new(0),
            flush_failures: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn bump(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Fraction of grants that were immediate (0.0 to 1.0).
    pub fn immediate_grant_rate(&self) -> f64 {
        self.snapshot().immediate_grant_rate()
    }

    /// Non-atomic copy for display and assertions.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            loads: self.loads.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            allocations: self.allocations.load(Ordering::Relaxed),
            grants: self.grants.load(Ordering::Relaxed),
            waits: self.waits.load(Ordering::Relaxed),
            pages_flushed: self.pages_flushed.load(Ordering::Relaxed),
            flush_batches: self.flush_batches.load(Ordering::Relaxed),
            flush_failures: self.flush_failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters to zero.
    pub fn reset(&self) {
        for counter in [
            &self.loads,
            &self.load_failures,
            &self.allocations,
            &self.grants,
            &self.waits,
            &self.pages_flushed,
            &self.flush_batches,
            &self.flush_failures,
            &self.evictions,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for CacheStats {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub loads: u64,
    pub load_failures: u64,
    pub allocations: u64,
    pub grants: u64,
    pub waits: u64,
    pub pages_flushed: u64,
    pub flush_batches: u64,
    pub flush_failures: u64,
    pub evictions: u64,
}

impl StatsSnapshot {
    pub fn immediate_grant_rate(&self) -> f64 {
        if self.grants == 0 {
            0.0
        } else {
            self.grants.saturating_sub(self.waits) as f64 / self.grants as f64
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stats {{ loads: {} ({} failed), allocations: {}, grants: {} ({} waited), \
             flushed: {} pages in {} batches ({} failed), evictions: {} }}",
            self.loads,
            self.load_failures,
            self.allocations,
            self.grants,
            self.waits,
            self.pages_flushed,
            self.flush_batches,
            self.flush_failures,
            self.evictions,
        )
    }
}
