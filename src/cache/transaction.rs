//! Transactions and their flush handles.
//!
//! A [`Transaction`] groups acquisitions. The cache records a
//! flush-ordering edge whenever one of its acquisitions is granted on data
//! another transaction wrote (or, for a write, read), and when it is begun
//! with an explicit predecessor. Dropping or committing it lets the cache
//! flush its writes once everything it depends on is durable.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::cache::acquisition::Acquisition;
use crate::cache::current_page::{AccessMode, AcqId, CurrentPage};
use crate::cache::page::Page;
use crate::cache::page_cache::PageCache;
use crate::cache::stats::CacheStats;
use crate::cache::txn_table::{FlushStatus, TxnMark};
use crate::common::{BlockId, Error, Result, TxnId};

/// A group of acquisitions whose writes are flushed together, in
/// dependency order with respect to other transactions.
///
/// # Thread Safety
/// `Transaction` is `Sync`: acquisitions borrow it, and several tasks may
/// hold acquisitions of the same transaction as long as each block is
/// acquired at most once at a time.
///
/// # Panics
/// Acquiring a block the transaction already holds is a caller bug and
/// panics.
pub struct Transaction<'c> {
    cache: &'c PageCache,
    id: TxnId,
    mark: Arc<TxnMark>,
    status: watch::Receiver<FlushStatus>,
    /// Blocks with an unreleased acquisition.
    held: Mutex<HashMap<BlockId, (AcqId, Arc<CurrentPage>)>>,
}

impl<'c> Transaction<'c> {
    pub(crate) fn new(cache: &'c PageCache, mark: Arc<TxnMark>, status: watch::Receiver<FlushStatus>) -> Self {
        Self {
            cache,
            id: mark.id(),
            mark,
            status,
            held: Mutex::new(HashMap::new()),
        }
    }

    #[inline]
    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn cache(&self) -> &'c PageCache {
        self.cache
    }

    /// Transactions this one currently has to flush after.
    pub fn dependencies(&self) -> Vec<TxnId> {
        self.cache.inner().txn_dependencies(self.id)
    }

    // ========================================================================
    // Acquisitions
    // ========================================================================

    /// Queue a claim on an existing block.
    ///
    /// Returns immediately; await [`Acquisition::wait_granted`] before
    /// touching the data.
    ///
    /// # Errors
    /// - `Error::InvalidBlockId` for the NULL sentinel
    ///
    /// # Panics
    /// Panics if this transaction already holds an acquisition on `block_id`.
    pub fn acquire(&self, block_id: BlockId, mode: AccessMode) -> Result<Acquisition<'_>> {
        if !block_id.is_valid() {
            return Err(Error::InvalidBlockId(block_id));
        }
        Ok(self.enqueue(block_id, mode, None))
    }

    pub fn acquire_read(&self, block_id: BlockId) -> Result<Acquisition<'_>> {
        self.acquire(block_id, AccessMode::Read)
    }

    pub fn acquire_write(&self, block_id: BlockId) -> Result<Acquisition<'_>> {
        self.acquire(block_id, AccessMode::Write)
    }

    /// Allocate a fresh block and claim it for writing.
    ///
    /// The block id is known as soon as this returns. The new page starts
    /// zeroed and needs no read from the store.
    ///
    /// # Errors
    /// - `Error::OutOfBlockIds` when the store has no identifiers left
    /// - I/O errors from the store's allocation
    pub fn acquire_new(&self) -> Result<Acquisition<'_>> {
        let inner = self.cache.inner();
        let block_id = inner.store.allocate_block_id()?;
        CacheStats::bump(&inner.stats.allocations, 1);
        debug!(txn = %self.id, block = %block_id, "allocated block");

        let zeroed = vec![0u8; inner.store.block_size()].into_boxed_slice();
        let fresh = Arc::new(Page::loaded(block_id, inner.next_version(), zeroed, false));
        Ok(self.enqueue(block_id, AccessMode::Write, Some(fresh)))
    }

    fn enqueue(&self, block_id: BlockId, mode: AccessMode, fresh: Option<Arc<Page>>) -> Acquisition<'_> {
        let inner = self.cache.inner();
        let acq_id = inner.next_acq_id();

        let (entry, enqueued) = {
            let mut held = self.held.lock();
            assert!(
                !held.contains_key(&block_id),
                "{}: {} is already acquired by this transaction",
                self.id,
                block_id
            );
            let (entry, enqueued) = loop {
                let entry = inner.touch(block_id, fresh.as_ref());
                // A retired entry was just evicted; look again.
                if let Some(enqueued) = entry.enqueue(acq_id, &self.mark, mode) {
                    break (entry, enqueued);
                }
            };
            held.insert(block_id, (acq_id, Arc::clone(&entry)));
            (entry, enqueued)
        };

        if enqueued.queued {
            CacheStats::bump(&inner.stats.waits, 1);
            trace!(txn = %self.id, block = %block_id, ?mode, "acquisition queued");
        }
        inner.deliver(enqueued.grants);

        let write_buf = fresh.and_then(|page| page.bytes().map(Box::from));
        Acquisition::new(self, block_id, mode, acq_id, entry, enqueued.signal, write_buf)
    }

    /// Called by an acquisition once it left its block's queue.
    pub(crate) fn forget(&self, block_id: BlockId) {
        self.held.lock().remove(&block_id);
    }

    // ========================================================================
    // Completion
    // ========================================================================

    /// Handle to observe this transaction's durability.
    pub fn flush_handle(&self) -> FlushHandle {
        FlushHandle {
            mark: Arc::clone(&self.mark),
            status: self.status.clone(),
        }
    }

    /// Finish the transaction. Its writes are flushed once everything it
    /// depends on is durable.
    pub fn commit(self) -> FlushHandle {
        self.flush_handle()
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        let leaked: Vec<_> = self.held.get_mut().drain().collect();
        for (block_id, (acq_id, entry)) in leaked {
            warn!(txn = %self.id, block = %block_id, "releasing acquisition leaked past its transaction");
            let release = entry.release(acq_id, None);
            self.cache.inner().after_release(self.id, block_id, release);
        }
        self.cache.inner().commit(self.id);
    }
}

impl fmt::Debug for Transaction<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("held", &self.held.lock().len())
            .finish()
    }
}

/// Observes whether a transaction's writes are durable.
///
/// Cloneable and independent of the transaction's lifetime. Also names
/// the transaction as a predecessor in
/// [`PageCache::begin_transaction_after`].
#[derive(Debug, Clone)]
pub struct FlushHandle {
    mark: Arc<TxnMark>,
    status: watch::Receiver<FlushStatus>,
}

impl FlushHandle {
    #[inline]
    pub fn txn_id(&self) -> TxnId {
        self.mark.id()
    }

    pub(crate) fn mark(&self) -> &Arc<TxnMark> {
        &self.mark
    }

    pub fn status(&self) -> FlushStatus {
        self.status.borrow().clone()
    }

    pub fn is_flushed(&self) -> bool {
        matches!(*self.status.borrow(), FlushStatus::Flushed)
    }

    /// Wait until the transaction is durable or its flush failed.
    ///
    /// # Errors
    /// - the store error, if a batch containing this transaction failed
    /// - `Error::DependencyFailed` if a transaction it depends on failed
    /// - `Error::Abandoned` if the cache went away first
    pub async fn wait(mut self) -> Result<()> {
        let txn = self.mark.id();
        let status = self
            .status
            .wait_for(|status| !matches!(status, FlushStatus::Pending))
            .await
            .map_err(|_| Error::Abandoned(txn))?;
        match &*status {
            FlushStatus::Failed(err) => Err(err.clone()),
            _ => Ok(()),
        }
    }
}
