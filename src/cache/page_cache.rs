//! Page Cache - the top-level owner of the directory and the live
//! transactions.
//!
//! The [`PageCache`] provides:
//! - Transactions and per-block read/write acquisitions
//! - Lazy, shared loading of blocks from the store
//! - Dependency-ordered background flushing
//! - Optional bounded residency with a pluggable eviction policy

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, error, trace, warn};

use crate::cache::current_page::{AcqId, CurrentPage, Grant, Release};
use crate::cache::directory::Directory;
use crate::cache::drain::Drainer;
use crate::cache::eviction::{EvictionPolicy, FifoPolicy};
use crate::cache::page::{LoadCompleter, Page};
use crate::cache::stats::CacheStats;
use crate::cache::transaction::{FlushHandle, Transaction};
use crate::cache::txn_table::{FlushBatch, TxnMark, TxnTable};
use crate::common::config::PageCacheConfig;
use crate::common::{BlockId, Error, Result, TxnId};
use crate::storage::BlockStore;

/// Transactional page cache over a [`BlockStore`].
///
/// # Architecture
/// ```text
/// ┌──────────────────────────────────────────────────────────────┐
/// │                          PageCache                           │
/// │  ┌───────────────────┐        ┌───────────────────────────┐  │
/// │  │ directory (shards)│        │ txn table (arena)         │  │
/// │  │ BlockId → entry   │        │ TxnId → deps, dirty pages │  │
/// │  │  entry: queue +   │ edges  │ flush scheduler           │  │
/// │  │  newest Page      │──────▶ │                           │  │
/// │  └───────────────────┘        └───────────────────────────┘  │
/// │  ┌──────────────┐  ┌──────────────┐  ┌───────────────────┐   │
/// │  │ block store  │  │ drainer      │  │ eviction policy   │   │
/// │  │ (blocking)   │  │ in-flight I/O│  │ (when bounded)    │   │
/// │  └──────────────┘  └──────────────┘  └───────────────────┘   │
/// └──────────────────────────────────────────────────────────────┘
/// ```
///
/// # Thread Safety
/// - directory shards: `Mutex` each, held only for lookup/insert/remove
/// - directory entries: `Mutex` each, held while deciding grants
/// - txn table: `Mutex`, never taken while an entry lock is held
/// - eviction policy: `Mutex`, only present when residency is bounded
/// - `stats`: no lock, all atomic counters
///
/// # Lifetime
/// Transactions borrow the cache, so it cannot be dropped while one is
/// alive. [`shutdown`](Self::shutdown) additionally waits for every
/// background load and flush to settle.
///
/// # Usage
/// ```no_run
/// # async fn demo() -> pagetxn::Result<()> {
/// use std::sync::Arc;
/// use pagetxn::{MemoryBlockStore, PageCache};
///
/// let cache = PageCache::open(Arc::new(MemoryBlockStore::new()))?;
///
/// let txn = cache.begin_transaction();
/// let mut acq = txn.acquire_new()?;
/// acq.wait_granted().await?;
/// acq.data_mut()[0] = 0xAB;
/// drop(acq);
///
/// txn.commit().wait().await?;
/// cache.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct PageCache {
    inner: Arc<CacheInner>,
}

/// State shared with background load and flush tasks.
pub(crate) struct CacheInner {
    pub(crate) store: Arc<dyn BlockStore>,
    directory: Directory,
    txns: Mutex<TxnTable>,
    /// Present only when `max_resident_pages` is set.
    policy: Option<Mutex<Box<dyn EvictionPolicy>>>,
    max_resident: Option<usize>,
    pub(crate) stats: CacheStats,
    drainer: Drainer,
    runtime: Handle,
    next_acq: AtomicU64,
    next_version: AtomicU64,
}

impl PageCache {
    /// Open a cache over `store` with the default configuration.
    ///
    /// # Errors
    /// - `Error::StoreInUse` if another cache is attached to the store
    /// - `Error::NoRuntime` if called outside a tokio runtime
    pub fn open(store: Arc<dyn BlockStore>) -> Result<Self> {
        Self::with_config(store, PageCacheConfig::default())
    }

    /// Open a cache with an explicit configuration and the FIFO policy.
    pub fn with_config(store: Arc<dyn BlockStore>, config: PageCacheConfig) -> Result<Self> {
        Self::with_policy(store, config, Box::new(FifoPolicy::new()))
    }

    /// Open a cache with a custom eviction policy. The policy is only
    /// consulted when `config.max_resident_pages` is set.
    pub fn with_policy(
        store: Arc<dyn BlockStore>,
        config: PageCacheConfig,
        policy: Box<dyn EvictionPolicy>,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        if !store.try_attach() {
            return Err(Error::StoreInUse);
        }

        debug!(
            shards = config.shard_count,
            max_resident = ?config.max_resident_pages,
            block_size = store.block_size(),
            "page cache opened"
        );

        let inner = CacheInner {
            store,
            directory: Directory::new(config.shard_count),
            txns: Mutex::new(TxnTable::new()),
            policy: config.max_resident_pages.map(|_| Mutex::new(policy)),
            max_resident: config.max_resident_pages,
            stats: CacheStats::new(),
            drainer: Drainer::new(),
            runtime,
            next_acq: AtomicU64::new(0),
            next_version: AtomicU64::new(1),
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    // ========================================================================
    // Public API: Transactions
    // ========================================================================

    /// Start a transaction with no explicit ordering.
    pub fn begin_transaction(&self) -> Transaction<'_> {
        self.begin(None)
    }

    /// Start a transaction whose flush is ordered after `predecessor`'s,
    /// whether or not the two touch a common block.
    ///
    /// If the predecessor's flush already failed, the new transaction fails
    /// with `Error::DependencyFailed` when it is flushed.
    pub fn begin_transaction_after(&self, predecessor: &FlushHandle) -> Transaction<'_> {
        self.begin(Some(predecessor.mark()))
    }

    fn begin(&self, predecessor: Option<&Arc<TxnMark>>) -> Transaction<'_> {
        let (mark, status) = self.inner.txns.lock().begin(predecessor);
        trace!(
            txn = %mark.id(),
            predecessor = ?predecessor.map(|p| p.id()),
            "transaction started"
        );
        Transaction::new(self, mark, status)
    }

    /// Whether `txn` is committed and everything it depends on is durable.
    /// Transactions that already went through their flush report `true`.
    pub fn is_flush_eligible(&self, txn: TxnId) -> bool {
        self.inner.txns.lock().is_flush_eligible(txn)
    }

    /// Number of transactions that have not finished flushing.
    pub fn live_transactions(&self) -> usize {
        self.inner.txns.lock().len()
    }

    // ========================================================================
    // Public API: Residency
    // ========================================================================

    /// Drop the entry for `block_id` if it is idle, clean and no live
    /// transaction needs its ordering information.
    pub fn evict(&self, block_id: BlockId) -> bool {
        self.inner.try_evict(block_id)
    }

    /// Drop every entry that can be dropped. Returns how many were.
    pub fn evict_idle(&self) -> usize {
        self.inner
            .directory
            .block_ids()
            .into_iter()
            .filter(|&block_id| self.inner.try_evict(block_id))
            .count()
    }

    /// Newest version of `block_id`, if it has a directory entry.
    ///
    /// The returned page keeps its entry from being evicted until dropped.
    pub fn current_page(&self, block_id: BlockId) -> Option<Arc<Page>> {
        self.inner.directory.get(block_id).map(|entry| entry.page())
    }

    /// Acquisitions queued or granted on `block_id`.
    pub fn queue_len(&self, block_id: BlockId) -> usize {
        self.inner
            .directory
            .get(block_id)
            .map_or(0, |entry| entry.queue_len())
    }

    /// Number of blocks with a directory entry.
    pub fn resident_count(&self) -> usize {
        self.inner.directory.len()
    }

    pub fn block_size(&self) -> usize {
        self.inner.store.block_size()
    }

    pub fn stats(&self) -> &CacheStats {
        &self.inner.stats
    }

    // ========================================================================
    // Public API: Draining
    // ========================================================================

    /// Wait until no background load or flush is in flight.
    pub async fn wait_idle(&self) {
        self.inner.drainer.wait_idle().await;
    }

    /// Wait for in-flight I/O to settle, then close the cache and detach
    /// the store.
    pub async fn shutdown(self) {
        self.inner.drainer.wait_idle().await;
        let live = self.live_transactions();
        if live > 0 {
            warn!(live, "page cache shut down with unflushed transactions");
        }
        debug!(stats = %self.inner.stats.snapshot(), "page cache shut down");
    }

    pub(crate) fn inner(&self) -> &Arc<CacheInner> {
        &self.inner
    }
}

impl CacheInner {
    pub(crate) fn next_acq_id(&self) -> AcqId {
        self.next_acq.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn next_version(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn txn_dependencies(&self, txn: TxnId) -> Vec<TxnId> {
        self.txns.lock().dependencies(txn)
    }

    /// Entry for `block_id`, created around `fresh` (or an unloaded page)
    /// if absent.
    pub(crate) fn touch(&self, block_id: BlockId, fresh: Option<&Arc<Page>>) -> Arc<CurrentPage> {
        let entry = self.directory.touch(block_id, || {
            let page = match fresh {
                Some(page) => Arc::clone(page),
                None => Arc::new(Page::unloaded(block_id, 0)),
            };
            CurrentPage::new(page)
        });
        if let Some(policy) = &self.policy {
            let mut policy = policy.lock();
            policy.record_access(block_id);
            policy.set_evictable(block_id, false);
        }
        entry
    }

    // ========================================================================
    // Grants
    // ========================================================================

    /// Record the flush-ordering edges of `grants`, then wake the grantees.
    ///
    /// Edges go in first so a grantee can never commit (and be scheduled)
    /// before its dependencies are known.
    pub(crate) fn deliver(&self, grants: Vec<Grant>) {
        if grants.is_empty() {
            return;
        }
        {
            let mut txns = self.txns.lock();
            for grant in &grants {
                txns.record_grant(grant.txn, grant.block_id(), &grant.depends_on);
            }
        }
        CacheStats::bump(&self.stats.grants, grants.len() as u64);
        for grant in grants {
            grant.fire();
        }
    }

    /// Bookkeeping after an acquisition left its block's queue.
    pub(crate) fn after_release(&self, txn: TxnId, block_id: BlockId, release: Release) {
        if let Some(page) = release.installed {
            trace!(%txn, block = %block_id, version = page.version(), "installed new version");
            self.txns.lock().record_write(txn, page);
        }
        self.deliver(release.grants);

        if release.idle {
            if let Some(policy) = &self.policy {
                policy.lock().set_evictable(block_id, true);
            }
            self.enforce_capacity();
        }
    }

    // ========================================================================
    // Background I/O
    // ========================================================================

    /// Read `page` from the store on a blocking thread. The load runs to
    /// completion even if the acquisition that started it goes away, so
    /// other waiters are never stranded.
    pub(crate) fn spawn_load(self: &Arc<Self>, page: Arc<Page>, completer: LoadCompleter) {
        let lock = self.drainer.lock();
        let store = Arc::clone(&self.store);
        let inner = Arc::clone(self);
        CacheStats::bump(&self.stats.loads, 1);

        self.runtime.spawn(async move {
            let _lock = lock;
            let block_id = page.block_id();
            trace!(block = %block_id, "loading block");

            let result = tokio::task::spawn_blocking(move || store.read_block(block_id))
                .await
                .unwrap_or_else(|err| Err(join_error(err)));
            let result = result.and_then(|buf| {
                let expected = inner.store.block_size();
                if buf.len() == expected {
                    Ok(buf)
                } else {
                    Err(Error::BlockSizeMismatch {
                        block_id,
                        expected,
                        actual: buf.len(),
                    })
                }
            });

            if let Err(err) = &result {
                warn!(block = %block_id, error = %err, "block load failed");
                CacheStats::bump(&inner.stats.load_failures, 1);
            }
            page.complete_load(completer, result);
            drop(inner);
        });
    }

    /// Commit `txn` and start whatever flushes became possible.
    pub(crate) fn commit(self: &Arc<Self>, txn: TxnId) {
        self.txns.lock().commit(txn);
        self.schedule_flushes();
    }

    pub(crate) fn schedule_flushes(self: &Arc<Self>) {
        let (batches, settled) = {
            let mut txns = self.txns.lock();
            let batches = txns.take_ready();
            (batches, self.roll_back(&mut txns))
        };
        self.mark_evictable(&settled);
        for batch in batches {
            self.spawn_flush(batch);
        }
    }

    fn spawn_flush(self: &Arc<Self>, batch: FlushBatch) {
        let lock = self.drainer.lock();
        let inner = Arc::clone(self);
        CacheStats::bump(&self.stats.flush_batches, 1);

        self.runtime.spawn(async move {
            let _lock = lock;
            let FlushBatch { members, pages } = batch;
            debug!(txns = members.len(), pages = pages.len(), "flushing batch");

            let store = Arc::clone(&inner.store);
            let to_write = pages.clone();
            let result = tokio::task::spawn_blocking(move || -> Result<usize> {
                for page in &to_write {
                    if let Some(bytes) = page.bytes() {
                        store.write_block(page.block_id(), bytes)?;
                    }
                }
                Ok(to_write.len())
            })
            .await
            .unwrap_or_else(|err| Err(join_error(err)));

            match &result {
                Ok(written) => {
                    CacheStats::bump(&inner.stats.pages_flushed, *written as u64);
                    debug!(txns = members.len(), pages = written, "flush batch durable");
                }
                Err(err) => {
                    CacheStats::bump(&inner.stats.flush_failures, 1);
                    error!(txns = members.len(), error = %err, "flush batch failed");
                }
            }
            let settled = {
                let mut txns = inner.txns.lock();
                txns.finish(&members, result.map(|_| ()));
                inner.roll_back(&mut txns)
            };
            let blocks: Vec<BlockId> = pages.iter().map(|page| page.block_id()).collect();
            drop(pages);
            inner.mark_evictable(&blocks);
            inner.mark_evictable(&settled);
            inner.enforce_capacity();
            inner.schedule_flushes();
            drop(inner);
        });
    }

    /// Scrub failed transactions from the entries they touched. A version
    /// only a failed transaction wrote is dropped, so later grants read what
    /// the store holds and record no edge to the failure.
    ///
    /// Runs under the txn table lock: once a failure is published, no new
    /// transaction can begin until its blocks are clean. Returns the blocks
    /// whose entries were scrubbed.
    fn roll_back(&self, txns: &mut TxnTable) -> Vec<BlockId> {
        let failed = txns.take_rollback();
        let mut settled = Vec::with_capacity(failed.len());
        for (block_id, txn) in failed {
            let Some(entry) = self.directory.get(block_id) else {
                continue;
            };
            if entry.roll_back(txn, self.next_version()) {
                debug!(block = %block_id, %txn, "dropped unflushed version of failed transaction");
            }
            settled.push(block_id);
        }
        settled
    }

    /// Offer idle entries among `block_ids` to the eviction policy.
    fn mark_evictable(&self, block_ids: &[BlockId]) {
        let Some(policy) = &self.policy else {
            return;
        };
        let idle: Vec<BlockId> = block_ids
            .iter()
            .copied()
            .filter(|&block_id| {
                self.directory
                    .get(block_id)
                    .map_or(false, |entry| entry.queue_len() == 0)
            })
            .collect();
        let mut policy = policy.lock();
        for block_id in idle {
            policy.set_evictable(block_id, true);
        }
    }

    // ========================================================================
    // Eviction
    // ========================================================================

    pub(crate) fn try_evict(&self, block_id: BlockId) -> bool {
        let removed = {
            let txns = self.txns.lock();
            self.directory
                .remove_if(block_id, |entry| entry.try_retire(|t| txns.is_live(t)))
        };
        if removed {
            if let Some(policy) = &self.policy {
                policy.lock().remove(block_id);
            }
            CacheStats::bump(&self.stats.evictions, 1);
            trace!(block = %block_id, "evicted");
        }
        removed
    }

    /// Evict policy victims until residency is back under the bound.
    fn enforce_capacity(&self) {
        let (Some(max), Some(policy)) = (self.max_resident, &self.policy) else {
            return;
        };
        while self.directory.len() > max {
            let victim = policy.lock().evict();
            let Some(block_id) = victim else {
                return;
            };
            // A victim that turned busy or dirty in the meantime is skipped;
            // it becomes a candidate again on its next idle release or flush.
            self.try_evict(block_id);
        }
    }
}

impl Drop for CacheInner {
    fn drop(&mut self) {
        self.store.detach();
    }
}

fn join_error(err: tokio::task::JoinError) -> Error {
    Error::from(io::Error::new(io::ErrorKind::Other, err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::current_page::AccessMode;
    use crate::storage::MemoryBlockStore;

    fn store() -> Arc<MemoryBlockStore> {
        Arc::new(MemoryBlockStore::new())
    }

    #[tokio::test]
    async fn test_open_and_shutdown() {
        let store = store();
        let cache = PageCache::open(store.clone()).unwrap();
        assert_eq!(cache.resident_count(), 0);
        assert_eq!(cache.live_transactions(), 0);
        cache.shutdown().await;

        // Detached on shutdown: a second cache may attach.
        let cache = PageCache::open(store).unwrap();
        cache.shutdown().await;
    }

    #[tokio::test]
    async fn test_store_in_use() {
        let store = store();
        let _cache = PageCache::open(store.clone()).unwrap();
        assert!(matches!(PageCache::open(store), Err(Error::StoreInUse)));
    }

    #[test]
    fn test_open_outside_runtime() {
        assert!(matches!(PageCache::open(store()), Err(Error::NoRuntime)));
    }

    #[tokio::test]
    async fn test_invalid_config() {
        let config = PageCacheConfig {
            shard_count: 0,
            ..PageCacheConfig::default()
        };
        let store = store();
        assert!(matches!(
            PageCache::with_config(store.clone(), config),
            Err(Error::Config(_))
        ));
        // A rejected config does not leave the store attached.
        PageCache::open(store).unwrap();
    }

    #[tokio::test]
    async fn test_empty_transaction_is_flushed_immediately() {
        let cache = PageCache::open(store()).unwrap();
        let txn = cache.begin_transaction();
        let id = txn.id();
        let handle = txn.commit();

        assert!(handle.is_flushed());
        assert!(cache.is_flush_eligible(id));
        assert_eq!(cache.live_transactions(), 0);
    }

    #[tokio::test]
    async fn test_bounded_residency_evicts_clean_pages() {
        let store = store();
        let config = PageCacheConfig {
            max_resident_pages: Some(2),
            ..PageCacheConfig::default()
        };
        let cache = PageCache::with_config(store.clone(), config).unwrap();

        let mut ids = Vec::new();
        {
            let txn = cache.begin_transaction();
            for _ in 0..4 {
                let mut acq = txn.acquire_new().unwrap();
                acq.wait_granted().await.unwrap();
                acq.data_mut()[0] = 1;
                ids.push(acq.block_id());
            }
            txn.commit().wait().await.unwrap();
        }
        cache.wait_idle().await;
        assert!(cache.resident_count() <= 2);

        // Evicted blocks reload from the store.
        let txn = cache.begin_transaction();
        for id in ids {
            let mut acq = txn.acquire(id, AccessMode::Read).unwrap();
            acq.wait_granted().await.unwrap();
            assert_eq!(acq.data()[0], 1);
        }
    }
}
