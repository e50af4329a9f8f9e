//! Current-page directory entry - lock manager and version holder for one block.
//!
//! # Grant discipline
//! Requests are served strictly in arrival order:
//! - A Write is granted only when it is at the front of the queue.
//! - A Read is granted when every request ahead of it is a Read.
//!
//! ```text
//!   queue: [R granted] [R granted] [W pending] [R pending]
//!                                    ▲
//!                     blocked until both reads release;
//!                     the trailing R waits behind the W
//! ```
//!
//! Granted requests stay in the queue until released, which is what keeps
//! later incompatible requests blocked.
//!
//! # Dependencies
//! Each grant reports the transactions whose data it observes: the last
//! writer of the block, plus (for a Write) every transaction that read the
//! current version. The cache turns these into flush-ordering edges before
//! waking the grantee.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::cache::page::Page;
use crate::cache::txn_table::TxnMark;
use crate::common::{BlockId, TxnId};

/// Access mode of an acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    Read,
    Write,
}

/// Cache-wide unique acquisition number.
pub(crate) type AcqId = u64;

struct Waiter {
    acq_id: AcqId,
    txn: Arc<TxnMark>,
    mode: AccessMode,
    granted: bool,
    signal: Option<oneshot::Sender<Arc<Page>>>,
}

/// A grant decided under the entry lock, delivered after it is dropped.
pub(crate) struct Grant {
    pub(crate) txn: TxnId,
    pub(crate) depends_on: Vec<Arc<TxnMark>>,
    page: Arc<Page>,
    signal: oneshot::Sender<Arc<Page>>,
}

impl Grant {
    #[inline]
    pub(crate) fn block_id(&self) -> BlockId {
        self.page.block_id()
    }

    /// Wake the acquisition. A receiver that is already gone is ignored;
    /// its release will remove the waiter.
    pub(crate) fn fire(self) {
        let _ = self.signal.send(self.page);
    }
}

pub(crate) struct Enqueued {
    pub(crate) signal: oneshot::Receiver<Arc<Page>>,
    pub(crate) grants: Vec<Grant>,
    /// The request could not be granted on arrival.
    pub(crate) queued: bool,
}

pub(crate) struct Release {
    /// New version installed by a dirty write.
    pub(crate) installed: Option<Arc<Page>>,
    pub(crate) grants: Vec<Grant>,
    /// No acquisitions remain on the block.
    pub(crate) idle: bool,
}

struct EntryState {
    /// Newest version.
    page: Arc<Page>,
    waiters: VecDeque<Waiter>,
    last_writer: Option<Arc<TxnMark>>,
    /// Transactions that read `page` since it was installed.
    readers: Vec<Arc<TxnMark>>,
    /// Removed from the directory; new requests must re-touch.
    retired: bool,
}

/// Directory entry for one block.
pub(crate) struct CurrentPage {
    block_id: BlockId,
    state: Mutex<EntryState>,
}

impl CurrentPage {
    pub(crate) fn new(page: Arc<Page>) -> Self {
        Self {
            block_id: page.block_id(),
            state: Mutex::new(EntryState {
                page,
                waiters: VecDeque::new(),
                last_writer: None,
                readers: Vec::new(),
                retired: false,
            }),
        }
    }

    /// Newest page version.
    pub(crate) fn page(&self) -> Arc<Page> {
        Arc::clone(&self.state.lock().page)
    }

    pub(crate) fn queue_len(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Append a request. Returns `None` if the entry was retired, in which
    /// case the caller must look the block up again.
    pub(crate) fn enqueue(&self, acq_id: AcqId, txn: &Arc<TxnMark>, mode: AccessMode) -> Option<Enqueued> {
        let mut state = self.state.lock();
        if state.retired {
            return None;
        }

        let (tx, rx) = oneshot::channel();
        state.waiters.push_back(Waiter {
            acq_id,
            txn: Arc::clone(txn),
            mode,
            granted: false,
            signal: Some(tx),
        });

        let grants = grant_ready(&mut state);
        let queued = !state
            .waiters
            .iter()
            .any(|w| w.acq_id == acq_id && w.granted);

        Some(Enqueued {
            signal: rx,
            grants,
            queued,
        })
    }

    /// Remove a request, granted or not, and grant whatever it unblocks.
    ///
    /// `install` carries the new version of a dirty write.
    ///
    /// # Panics
    /// Panics if the acquisition is not queued on this block (double
    /// release), or if a buffer is installed for a request that is not a
    /// granted write.
    pub(crate) fn release(&self, acq_id: AcqId, install: Option<(u64, Box<[u8]>)>) -> Release {
        let mut state = self.state.lock();
        let pos = state
            .waiters
            .iter()
            .position(|w| w.acq_id == acq_id)
            .unwrap_or_else(|| {
                panic!(
                    "{}: acquisition {} released twice or never enqueued",
                    self.block_id, acq_id
                )
            });
        let waiter = state.waiters.remove(pos).expect("position is in range");

        let installed = install.map(|(version, buf)| {
            assert!(
                waiter.granted && waiter.mode == AccessMode::Write,
                "{}: only a granted write may install a new version",
                self.block_id
            );
            let page = Arc::new(Page::loaded(self.block_id, version, buf, true));
            state.page = Arc::clone(&page);
            state.last_writer = Some(Arc::clone(&waiter.txn));
            state.readers.clear();
            page
        });

        let grants = grant_ready(&mut state);
        Release {
            installed,
            grants,
            idle: state.waiters.is_empty(),
        }
    }

    /// Mark the entry retired if nothing needs it anymore.
    ///
    /// `is_live` reports whether a transaction still awaits its flush; an
    /// entry whose last writer or readers are live keeps the ordering
    /// information they need.
    pub(crate) fn try_retire(&self, is_live: impl Fn(TxnId) -> bool) -> bool {
        let mut state = self.state.lock();
        if state.retired {
            return true;
        }
        if !state.waiters.is_empty() || state.page.is_dirty() || Arc::strong_count(&state.page) > 1 {
            return false;
        }
        let writer_live = state.last_writer.as_ref().map_or(false, |w| is_live(w.id()));
        if writer_live || state.readers.iter().any(|r| is_live(r.id())) {
            return false;
        }
        state.retired = true;
        true
    }

    /// Forget `txn`, whose flush failed. If it wrote the newest version,
    /// that version is dropped for an unloaded page numbered `version`, so
    /// the next grant reads what the store holds. Returns whether a version
    /// was dropped.
    pub(crate) fn roll_back(&self, txn: TxnId, version: u64) -> bool {
        let mut state = self.state.lock();
        if state.retired {
            return false;
        }
        state.readers.retain(|r| r.id() != txn);
        if state.last_writer.as_ref().map_or(true, |w| w.id() != txn) {
            return false;
        }
        state.page = Arc::new(Page::unloaded(self.block_id, version));
        state.last_writer = None;
        state.readers.clear();
        true
    }
}

/// Grant every request the discipline allows, front to back.
fn grant_ready(state: &mut EntryState) -> Vec<Grant> {
    let EntryState {
        page,
        waiters,
        last_writer,
        readers,
        ..
    } = state;

    let mut grants = Vec::new();
    for (i, waiter) in waiters.iter_mut().enumerate() {
        if waiter.mode == AccessMode::Write && i > 0 {
            break;
        }
        if !waiter.granted {
            waiter.granted = true;

            let txn = waiter.txn.id();
            let writer = last_writer.as_ref().map(|w| w.id());
            let mut depends_on = Vec::new();
            if let Some(w) = last_writer.as_ref().filter(|w| w.id() != txn) {
                depends_on.push(Arc::clone(w));
            }
            match waiter.mode {
                AccessMode::Read => {
                    if !readers.iter().any(|r| r.id() == txn) {
                        readers.push(Arc::clone(&waiter.txn));
                    }
                }
                AccessMode::Write => {
                    depends_on.extend(
                        readers
                            .iter()
                            .filter(|r| r.id() != txn && Some(r.id()) != writer)
                            .cloned(),
                    );
                }
            }

            let signal = waiter.signal.take().expect("ungranted waiter has a signal");
            grants.push(Grant {
                txn,
                depends_on,
                page: Arc::clone(page),
                signal,
            });
        }
        if waiter.mode == AccessMode::Write {
            break;
        }
    }
    grants
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::page::PageState;

    fn entry() -> CurrentPage {
        let page = Page::loaded(BlockId::new(9), 0, vec![0u8; 8].into_boxed_slice(), false);
        CurrentPage::new(Arc::new(page))
    }

    fn id(n: u32) -> TxnId {
        TxnId::new(n, 0)
    }

    fn txn(n: u32) -> Arc<TxnMark> {
        Arc::new(TxnMark::new(id(n)))
    }

    fn dep_ids(grant: &Grant) -> Vec<TxnId> {
        grant.depends_on.iter().map(|d| d.id()).collect()
    }

    fn granted_txns(grants: &[Grant]) -> Vec<TxnId> {
        grants.iter().map(|g| g.txn).collect()
    }

    #[test]
    fn test_adjacent_reads_granted_together() {
        let e = entry();
        let r1 = e.enqueue(1, &txn(1), AccessMode::Read).unwrap();
        let r2 = e.enqueue(2, &txn(2), AccessMode::Read).unwrap();

        assert!(!r1.queued);
        assert!(!r2.queued);
        assert_eq!(granted_txns(&r1.grants), vec![id(1)]);
        assert_eq!(granted_txns(&r2.grants), vec![id(2)]);
    }

    #[test]
    fn test_write_waits_for_earlier_reads() {
        let e = entry();
        e.enqueue(1, &txn(1), AccessMode::Read).unwrap();
        e.enqueue(2, &txn(2), AccessMode::Read).unwrap();
        let w = e.enqueue(3, &txn(3), AccessMode::Write).unwrap();
        assert!(w.queued);
        assert!(w.grants.is_empty());

        let rel = e.release(1, None);
        assert!(rel.grants.is_empty());
        assert!(!rel.idle);

        let rel = e.release(2, None);
        assert_eq!(granted_txns(&rel.grants), vec![id(3)]);
        // The writer overwrites what both readers saw.
        assert_eq!(dep_ids(&rel.grants[0]), vec![id(1), id(2)]);
    }

    #[test]
    fn test_read_behind_pending_write_waits() {
        let e = entry();
        e.enqueue(1, &txn(1), AccessMode::Write).unwrap();
        e.enqueue(2, &txn(2), AccessMode::Write).unwrap();
        let r = e.enqueue(3, &txn(3), AccessMode::Read).unwrap();
        assert!(r.queued);

        let rel = e.release(1, Some((1, vec![1u8; 8].into_boxed_slice())));
        assert_eq!(granted_txns(&rel.grants), vec![id(2)]);
        assert_eq!(dep_ids(&rel.grants[0]), vec![id(1)]);
        assert_eq!(rel.installed.as_ref().unwrap().version(), 1);

        let rel = e.release(2, None);
        assert_eq!(granted_txns(&rel.grants), vec![id(3)]);
        // Txn 2 never dirtied the block, so txn 1 is still the last writer.
        assert_eq!(dep_ids(&rel.grants[0]), vec![id(1)]);
    }

    #[test]
    fn test_cancel_pending_keeps_fifo_order() {
        let e = entry();
        e.enqueue(1, &txn(1), AccessMode::Write).unwrap();
        e.enqueue(2, &txn(2), AccessMode::Write).unwrap();
        e.enqueue(3, &txn(3), AccessMode::Write).unwrap();

        // Cancel the middle waiter before it is granted.
        let rel = e.release(2, None);
        assert!(rel.grants.is_empty());
        assert_eq!(e.queue_len(), 2);

        let rel = e.release(1, None);
        assert_eq!(granted_txns(&rel.grants), vec![id(3)]);

        let rel = e.release(3, None);
        assert!(rel.idle);
    }

    #[test]
    fn test_install_replaces_version_and_keeps_old_valid() {
        let e = entry();
        let old = e.page();
        e.enqueue(1, &txn(1), AccessMode::Write).unwrap();

        let rel = e.release(1, Some((4, vec![0xAB; 8].into_boxed_slice())));
        let new = rel.installed.unwrap();

        assert_eq!(old.bytes().unwrap()[0], 0);
        assert_eq!(new.bytes().unwrap()[0], 0xAB);
        assert!(new.is_dirty());
        assert_eq!(e.page().version(), 4);
    }

    #[test]
    #[should_panic(expected = "released twice")]
    fn test_double_release_panics() {
        let e = entry();
        e.enqueue(1, &txn(1), AccessMode::Read).unwrap();
        e.release(1, None);
        e.release(1, None);
    }

    #[test]
    fn test_retire_rules() {
        let e = entry();
        e.enqueue(1, &txn(1), AccessMode::Write).unwrap();
        assert!(!e.try_retire(|_| false));

        e.release(1, Some((1, vec![0u8; 8].into_boxed_slice())));
        // Dirty page stays.
        assert!(!e.try_retire(|_| false));

        e.page().mark_clean();
        // Writer still awaiting flush.
        assert!(!e.try_retire(|t| t == id(1)));
        assert!(e.try_retire(|_| false));

        // Retired entries refuse new requests.
        assert!(e.enqueue(2, &txn(2), AccessMode::Read).is_none());
    }

    #[test]
    fn test_roll_back_drops_version_of_failed_writer() {
        let e = entry();
        e.enqueue(1, &txn(1), AccessMode::Write).unwrap();
        let rel = e.release(1, Some((1, vec![0xEE; 8].into_boxed_slice())));
        let failed = rel.installed.unwrap();

        e.enqueue(2, &txn(2), AccessMode::Read).unwrap();
        e.release(2, None);

        // Only the writer of the newest version drops it.
        assert!(!e.roll_back(id(2), 5));
        assert!(e.roll_back(id(1), 5));
        assert_eq!(e.page().version(), 5);
        assert_eq!(e.page().state(), PageState::Unloaded);
        assert_eq!(failed.bytes().unwrap()[0], 0xEE);

        // Nobody is remembered, so a new writer depends on nothing.
        let w = e.enqueue(3, &txn(3), AccessMode::Write).unwrap();
        assert!(dep_ids(&w.grants[0]).is_empty());
    }

    #[test]
    fn test_roll_back_forgets_failed_reader() {
        let e = entry();
        e.enqueue(1, &txn(1), AccessMode::Read).unwrap();
        e.enqueue(2, &txn(2), AccessMode::Read).unwrap();
        e.release(1, None);
        e.release(2, None);

        assert!(!e.roll_back(id(1), 7));
        let w = e.enqueue(3, &txn(3), AccessMode::Write).unwrap();
        assert_eq!(dep_ids(&w.grants[0]), vec![id(2)]);
        assert_eq!(e.page().version(), 0);
    }
}
