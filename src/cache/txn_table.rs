//! Live-transaction table and flush-ordering dependency graph.
//!
//! Every transaction that has not yet been flushed has a record here. An
//! edge `A → B` ("A depends on B") means B's writes must be durable no later
//! than A's. Edges come from two places:
//! - a grant on a block whose data B last wrote (or, for a write, read)
//! - an explicit predecessor passed when A began
//!
//! # Scheduling
//! A committed transaction is ready when every transaction it transitively
//! depends on is either already flushed or also committed and idle. The
//! whole set is then flushed as one batch. For an acyclic graph this is
//! plain dependency order; when overlapping writes in opposite orders form
//! a cycle, the members of the cycle end up in the same batch, which is the
//! only way to honor "no later than" in both directions.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::cache::arena::Arena;
use crate::cache::page::Page;
use crate::common::{BlockId, Error, Result, TxnId};

/// Durability state of a transaction, as seen by its [`FlushHandle`](crate::FlushHandle).
#[derive(Debug, Clone)]
pub enum FlushStatus {
    /// Not yet durable.
    Pending,
    /// Every page the transaction wrote is durable.
    Flushed,
    /// The flush failed; the pages are not known to be durable.
    Failed(Error),
}

/// A transaction as remembered by directory entries, grants in flight and
/// flush handles.
///
/// The mark outlives the transaction's record, so an edge recorded after
/// the record is gone can still tell a failed dependency from a durable
/// one. Nothing else about a retired transaction is kept.
#[derive(Debug)]
pub(crate) struct TxnMark {
    id: TxnId,
    failed: AtomicBool,
}

impl TxnMark {
    pub(crate) fn new(id: TxnId) -> Self {
        Self {
            id,
            failed: AtomicBool::new(false),
        }
    }

    #[inline]
    pub(crate) fn id(&self) -> TxnId {
        self.id
    }

    pub(crate) fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Still issuing acquisitions.
    Active,
    /// Handle dropped; waiting for dependencies.
    Committed,
    /// Part of an in-flight batch.
    Flushing,
}

struct TxnRecord {
    /// Creation order.
    seq: u64,
    phase: Phase,
    depends_on: HashSet<TxnId>,
    dependents: HashSet<TxnId>,
    /// Page versions this transaction installed.
    dirty: Vec<Arc<Page>>,
    /// Blocks whose entries may remember this transaction.
    touched: HashSet<BlockId>,
    /// The failed transaction this one depends on, if any.
    poisoned_by: Option<TxnId>,
    mark: Arc<TxnMark>,
    status: watch::Sender<FlushStatus>,
}

/// A set of transactions flushed together.
pub(crate) struct FlushBatch {
    /// Dependency order (dependencies first).
    pub(crate) members: Vec<TxnId>,
    /// Newest version of each block written by the batch, in write order.
    pub(crate) pages: Vec<Arc<Page>>,
}

pub(crate) struct TxnTable {
    arena: Arena<TxnRecord>,
    next_seq: u64,
    /// Blocks to scrub of transactions that failed since the last
    /// [`take_rollback`](Self::take_rollback).
    rollback: Vec<(BlockId, TxnId)>,
}

impl TxnTable {
    pub(crate) fn new() -> Self {
        Self {
            arena: Arena::new(),
            next_seq: 0,
            rollback: Vec::new(),
        }
    }

    /// Register a new transaction, optionally ordered after `predecessor`.
    pub(crate) fn begin(
        &mut self,
        predecessor: Option<&Arc<TxnMark>>,
    ) -> (Arc<TxnMark>, watch::Receiver<FlushStatus>) {
        let (status, rx) = watch::channel(FlushStatus::Pending);
        let seq = self.next_seq;
        self.next_seq += 1;

        let (id, rec) = self.arena.insert_with(|id| TxnRecord {
            seq,
            phase: Phase::Active,
            depends_on: HashSet::new(),
            dependents: HashSet::new(),
            dirty: Vec::new(),
            touched: HashSet::new(),
            poisoned_by: None,
            mark: Arc::new(TxnMark::new(id)),
            status,
        });
        let mark = Arc::clone(&rec.mark);
        if let Some(pred) = predecessor {
            debug_assert!(self.arena.get(pred.id()).map_or(true, |p| p.seq < seq));
            self.add_dependencies(id, std::slice::from_ref(pred));
        }
        (mark, rx)
    }

    /// Record a grant of `block_id` to `txn` and the transactions whose
    /// data it observes.
    pub(crate) fn record_grant(&mut self, txn: TxnId, block_id: BlockId, deps: &[Arc<TxnMark>]) {
        if let Some(rec) = self.arena.get_mut(txn) {
            rec.touched.insert(block_id);
        }
        self.add_dependencies(txn, deps);
    }

    /// Record that `txn` observed data of each transaction in `deps`.
    ///
    /// Edges to transactions that already flushed are dropped: their data is
    /// durable. Edges to transactions whose flush failed poison `txn`.
    pub(crate) fn add_dependencies(&mut self, txn: TxnId, deps: &[Arc<TxnMark>]) {
        for dep in deps {
            let dep_id = dep.id();
            if dep_id == txn {
                continue;
            }
            if dep.has_failed() {
                self.poison(txn, dep_id);
                continue;
            }
            let Some(dep_rec) = self.arena.get(dep_id) else {
                continue;
            };
            let inherited = dep_rec.poisoned_by;

            let Some(rec) = self.arena.get_mut(txn) else {
                return;
            };
            if rec.phase == Phase::Flushing {
                return;
            }
            if rec.poisoned_by.is_none() {
                rec.poisoned_by = inherited;
            }
            if rec.depends_on.insert(dep_id) {
                if let Some(dep_rec) = self.arena.get_mut(dep_id) {
                    dep_rec.dependents.insert(txn);
                }
            }
        }
    }

    fn poison(&mut self, txn: TxnId, cause: TxnId) {
        if let Some(rec) = self.arena.get_mut(txn) {
            rec.poisoned_by.get_or_insert(cause);
        }
    }

    /// Remember a page version `txn` must flush.
    pub(crate) fn record_write(&mut self, txn: TxnId, page: Arc<Page>) {
        match self.arena.get_mut(txn) {
            Some(rec) => {
                rec.touched.insert(page.block_id());
                rec.dirty.push(page);
            }
            None => warn!(%txn, block = %page.block_id(), "write recorded for retired transaction"),
        }
    }

    /// The transaction will issue no more acquisitions.
    pub(crate) fn commit(&mut self, txn: TxnId) {
        if let Some(rec) = self.arena.get_mut(txn) {
            if rec.phase == Phase::Active {
                rec.phase = Phase::Committed;
            }
        }
    }

    /// The transaction has not been flushed (or failed) yet.
    pub(crate) fn is_live(&self, txn: TxnId) -> bool {
        self.arena.contains(txn)
    }

    /// Committed and every dependency durable. Retired transactions, which
    /// already went through their flush, report `true`.
    pub(crate) fn is_flush_eligible(&self, txn: TxnId) -> bool {
        match self.arena.get(txn) {
            None => true,
            Some(rec) => match rec.phase {
                Phase::Active => false,
                Phase::Flushing => true,
                Phase::Committed => rec.depends_on.iter().all(|&d| !self.arena.contains(d)),
            },
        }
    }

    pub(crate) fn dependencies(&self, txn: TxnId) -> Vec<TxnId> {
        self.arena
            .get(txn)
            .map(|rec| rec.depends_on.iter().copied().collect())
            .unwrap_or_default()
    }

    pub(crate) fn len(&self) -> usize {
        self.arena.len()
    }

    /// Collect every batch that can be flushed now and mark its members
    /// Flushing. Members that depend on a failed transaction are failed
    /// without I/O; the rest of their batch is flushed normally. Batches
    /// that need no I/O finish immediately.
    pub(crate) fn take_ready(&mut self) -> Vec<FlushBatch> {
        let mut batches = Vec::new();
        loop {
            let mut progress = false;

            let mut candidates: Vec<(u64, TxnId)> = self
                .arena
                .iter()
                .filter(|(_, rec)| rec.phase == Phase::Committed)
                .map(|(id, rec)| (rec.seq, id))
                .collect();
            candidates.sort_unstable_by_key(|&(seq, _)| seq);

            for (_, id) in candidates {
                let still_committed = self
                    .arena
                    .get(id)
                    .map_or(false, |rec| rec.phase == Phase::Committed);
                if !still_committed {
                    continue;
                }
                let Some(closure) = self.ready_closure(id) else {
                    continue;
                };
                progress = true;

                let (doomed, members) = self.split_poisoned(self.dependency_order(closure));
                if members.is_empty() {
                    for (txn, cause) in doomed {
                        warn!(%txn, %cause, "dropping writes of transaction with a failed dependency");
                        self.finish(&[txn], Err(Error::DependencyFailed(cause)));
                    }
                    continue;
                }
                // Doomed members wait for the healthy part to land. Failing one
                // drops its page versions, and a reload must not miss writes
                // still in flight.
                if members.len() > 1 {
                    debug!(txns = members.len(), "flushing dependent transactions as one batch");
                }

                let pages = self.batch_pages(&members);
                if pages.is_empty() {
                    self.finish(&members, Ok(()));
                    continue;
                }
                for &m in &members {
                    if let Some(rec) = self.arena.get_mut(m) {
                        rec.phase = Phase::Flushing;
                    }
                }
                batches.push(FlushBatch { members, pages });
            }

            if !progress {
                return batches;
            }
        }
    }

    /// `txn` plus everything it transitively depends on that is not yet
    /// flushed, or `None` if any of those is still active or flushing.
    fn ready_closure(&self, txn: TxnId) -> Option<Vec<TxnId>> {
        let mut seen: HashSet<TxnId> = HashSet::from([txn]);
        let mut closure = vec![txn];
        let mut stack = vec![txn];

        while let Some(t) = stack.pop() {
            let rec = self.arena.get(t)?;
            for &dep in &rec.depends_on {
                let Some(dep_rec) = self.arena.get(dep) else {
                    continue;
                };
                if dep_rec.phase != Phase::Committed {
                    return None;
                }
                if seen.insert(dep) {
                    closure.push(dep);
                    stack.push(dep);
                }
            }
        }
        Some(closure)
    }

    /// Order `members` so dependencies come first. Cycles are broken by
    /// creation order.
    fn dependency_order(&self, mut remaining: Vec<TxnId>) -> Vec<TxnId> {
        remaining.sort_unstable_by_key(|&id| self.arena.get(id).map_or(u64::MAX, |rec| rec.seq));
        let mut ordered = Vec::with_capacity(remaining.len());

        while !remaining.is_empty() {
            let next = remaining
                .iter()
                .position(|&id| {
                    self.arena.get(id).map_or(true, |rec| {
                        rec.depends_on.iter().all(|dep| !remaining.contains(dep))
                    })
                })
                .unwrap_or(0);
            ordered.push(remaining.remove(next));
        }
        ordered
    }

    /// Separate the poisoned members, and every member that depends on one,
    /// from the members that can still be flushed. Each doomed member is
    /// paired with the failed transaction it is reported against.
    ///
    /// The healthy part keeps its order and depends on nothing doomed.
    fn split_poisoned(&self, members: Vec<TxnId>) -> (Vec<(TxnId, TxnId)>, Vec<TxnId>) {
        let mut causes: HashMap<TxnId, TxnId> = members
            .iter()
            .filter_map(|&m| Some((m, self.arena.get(m)?.poisoned_by?)))
            .collect();
        if causes.is_empty() {
            return (Vec::new(), members);
        }

        loop {
            let mut changed = false;
            for &m in &members {
                if causes.contains_key(&m) {
                    continue;
                }
                let inherited = self
                    .arena
                    .get(m)
                    .and_then(|rec| rec.depends_on.iter().find_map(|d| causes.get(d).copied()));
                if let Some(cause) = inherited {
                    causes.insert(m, cause);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        let (doomed, healthy): (Vec<TxnId>, Vec<TxnId>) =
            members.into_iter().partition(|m| causes.contains_key(m));
        let doomed = doomed.into_iter().map(|m| (m, causes[&m])).collect();
        (doomed, healthy)
    }

    fn batch_pages(&self, members: &[TxnId]) -> Vec<Arc<Page>> {
        let mut newest: HashMap<BlockId, u64> = HashMap::new();
        for &m in members {
            if let Some(rec) = self.arena.get(m) {
                for page in &rec.dirty {
                    let v = newest.entry(page.block_id()).or_insert(page.version());
                    *v = (*v).max(page.version());
                }
            }
        }

        let mut pages = Vec::new();
        for &m in members {
            if let Some(rec) = self.arena.get(m) {
                for page in &rec.dirty {
                    if newest.get(&page.block_id()) == Some(&page.version()) {
                        newest.remove(&page.block_id());
                        pages.push(Arc::clone(page));
                    }
                }
            }
        }
        pages
    }

    /// Retire the members of a batch and publish the outcome.
    ///
    /// On failure the members' marks are flagged, their dependents are
    /// poisoned and the blocks they touched are queued for
    /// [`take_rollback`](Self::take_rollback).
    pub(crate) fn finish(&mut self, members: &[TxnId], result: Result<()>) {
        let mut records = Vec::with_capacity(members.len());
        for &m in members {
            if let Some(rec) = self.arena.remove(m) {
                records.push((m, rec));
            }
        }

        for (id, rec) in records {
            // Dependents are reported against the transaction that failed first.
            let cause = match &result {
                Ok(()) => None,
                Err(Error::DependencyFailed(root)) => Some(*root),
                Err(_) => Some(id),
            };
            for dep in &rec.depends_on {
                if let Some(dep_rec) = self.arena.get_mut(*dep) {
                    dep_rec.dependents.remove(&id);
                }
            }
            for dependent in &rec.dependents {
                if let Some(d) = self.arena.get_mut(*dependent) {
                    d.depends_on.remove(&id);
                    if let Some(cause) = cause {
                        d.poisoned_by.get_or_insert(cause);
                    }
                }
            }

            let status = match &result {
                Ok(()) => {
                    for page in &rec.dirty {
                        page.mark_clean();
                    }
                    FlushStatus::Flushed
                }
                Err(err) => {
                    rec.mark.failed.store(true, Ordering::Release);
                    self.rollback.extend(rec.touched.iter().map(|&block_id| (block_id, id)));
                    FlushStatus::Failed(err.clone())
                }
            };
            rec.status.send_replace(status);
        }
    }

    /// Blocks whose directory entries still remember a failed transaction.
    pub(crate) fn take_rollback(&mut self) -> Vec<(BlockId, TxnId)> {
        std::mem::take(&mut self.rollback)
    }
}

impl Default for TxnTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dirty_page(block: u64, version: u64) -> Arc<Page> {
        Arc::new(Page::loaded(
            BlockId::new(block),
            version,
            vec![0u8; 4].into_boxed_slice(),
            true,
        ))
    }

    fn block_order(batch: &FlushBatch) -> Vec<u64> {
        batch.pages.iter().map(|p| p.block_id().0).collect()
    }

    /// Run `txn` through a failed flush of its own.
    fn fail_flush(table: &mut TxnTable, txn: &Arc<TxnMark>) {
        table.commit(txn.id());
        let batches = table.take_ready();
        assert_eq!(batches[0].members, vec![txn.id()]);
        table.finish(&batches[0].members, Err(Error::BlockNotFound(BlockId::new(0))));
    }

    #[test]
    fn test_reader_only_transaction_finishes_without_io() {
        let mut table = TxnTable::new();
        let (a, rx) = table.begin(None);
        table.commit(a.id());

        assert!(table.take_ready().is_empty());
        assert!(!table.is_live(a.id()));
        assert!(matches!(*rx.borrow(), FlushStatus::Flushed));
    }

    #[test]
    fn test_active_transaction_is_not_flushed() {
        let mut table = TxnTable::new();
        let (a, _rx) = table.begin(None);
        table.record_write(a.id(), dirty_page(1, 1));

        assert!(table.take_ready().is_empty());
        assert!(!table.is_flush_eligible(a.id()));
        assert!(table.is_live(a.id()));
    }

    #[test]
    fn test_dependent_waits_for_dependency() {
        let mut table = TxnTable::new();
        let (a, _) = table.begin(None);
        let (b, _) = table.begin(None);
        table.record_write(a.id(), dirty_page(1, 1));
        table.record_write(b.id(), dirty_page(1, 2));
        table.add_dependencies(b.id(), &[Arc::clone(&a)]);

        // Dependent commits first: nothing may flush.
        table.commit(b.id());
        assert!(!table.is_flush_eligible(b.id()));
        assert!(table.take_ready().is_empty());

        table.commit(a.id());
        let batches = table.take_ready();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].members, vec![a.id()]);
        assert_eq!(batches[0].pages[0].version(), 1);
        assert!(!table.is_flush_eligible(b.id()));

        table.finish(&batches[0].members, Ok(()));
        assert!(table.is_flush_eligible(b.id()));
        let batches = table.take_ready();
        assert_eq!(batches[0].members, vec![b.id()]);
        assert_eq!(batches[0].pages[0].version(), 2);
    }

    #[test]
    fn test_flushing_dependency_blocks_dependent() {
        let mut table = TxnTable::new();
        let (a, _) = table.begin(None);
        table.record_write(a.id(), dirty_page(1, 1));
        table.commit(a.id());
        let first = table.take_ready();
        assert_eq!(first[0].members, vec![a.id()]);

        let (b, _) = table.begin(None);
        table.record_write(b.id(), dirty_page(1, 2));
        table.add_dependencies(b.id(), &[Arc::clone(&a)]);
        table.commit(b.id());

        // A is in flight, so B waits.
        assert!(table.take_ready().is_empty());

        table.finish(&first[0].members, Ok(()));
        assert!(table.is_flush_eligible(b.id()));
        let second = table.take_ready();
        assert_eq!(second[0].members, vec![b.id()]);
        assert_eq!(block_order(&second[0]), vec![1]);
    }

    #[test]
    fn test_explicit_predecessor() {
        let mut table = TxnTable::new();
        let (a, _) = table.begin(None);
        let (b, _) = table.begin(Some(&a));
        assert_eq!(table.dependencies(b.id()), vec![a.id()]);

        table.record_write(b.id(), dirty_page(7, 1));
        table.commit(b.id());
        assert!(table.take_ready().is_empty());

        // A wrote nothing, so it finishes without I/O and releases B.
        table.commit(a.id());
        let batches = table.take_ready();
        assert!(!table.is_live(a.id()));
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].members, vec![b.id()]);
    }

    #[test]
    fn test_cycle_flushes_as_one_batch() {
        let mut table = TxnTable::new();
        let (a, _) = table.begin(None);
        let (b, _) = table.begin(None);
        table.record_write(a.id(), dirty_page(1, 1));
        table.record_write(b.id(), dirty_page(1, 2));
        table.add_dependencies(b.id(), &[Arc::clone(&a)]);
        table.record_write(b.id(), dirty_page(2, 3));
        table.record_write(a.id(), dirty_page(2, 4));
        table.add_dependencies(a.id(), &[Arc::clone(&b)]);

        table.commit(a.id());
        assert!(table.take_ready().is_empty());
        table.commit(b.id());

        let batches = table.take_ready();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].members.len(), 2);
        let mut versions: Vec<u64> = batches[0].pages.iter().map(|p| p.version()).collect();
        versions.sort();
        assert_eq!(versions, vec![2, 4]);
    }

    #[test]
    fn test_failure_poisons_dependents() {
        let mut table = TxnTable::new();
        let (a, a_rx) = table.begin(None);
        let (b, b_rx) = table.begin(None);
        table.record_write(a.id(), dirty_page(1, 1));
        table.record_write(b.id(), dirty_page(2, 2));
        table.add_dependencies(b.id(), &[Arc::clone(&a)]);

        fail_flush(&mut table, &a);
        assert!(matches!(*a_rx.borrow(), FlushStatus::Failed(_)));
        assert!(a.has_failed());

        table.commit(b.id());
        assert!(table.take_ready().is_empty());
        assert!(matches!(
            *b_rx.borrow(),
            FlushStatus::Failed(Error::DependencyFailed(cause)) if cause == a.id()
        ));

        // An edge recorded after A retired still sees the failure.
        let (c, c_rx) = table.begin(None);
        table.add_dependencies(c.id(), &[Arc::clone(&a)]);
        table.commit(c.id());
        table.take_ready();
        assert!(matches!(*c_rx.borrow(), FlushStatus::Failed(_)));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_failed_dependent_does_not_take_its_dependency_down() {
        let mut table = TxnTable::new();
        let (c, _) = table.begin(None);
        let (b, b_rx) = table.begin(None);
        let (a, a_rx) = table.begin(None);

        table.record_write(c.id(), dirty_page(1, 1));
        table.add_dependencies(b.id(), &[Arc::clone(&c)]);
        fail_flush(&mut table, &c);

        // B is older than A but depends on it.
        table.record_write(a.id(), dirty_page(2, 2));
        table.add_dependencies(b.id(), &[Arc::clone(&a)]);
        table.commit(b.id());
        assert!(table.take_ready().is_empty());
        table.commit(a.id());

        let batches = table.take_ready();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].members, vec![a.id()]);
        assert_eq!(block_order(&batches[0]), vec![2]);
        assert!(matches!(*a_rx.borrow(), FlushStatus::Pending));
        // B fails only once A no longer has a write in flight.
        assert!(matches!(*b_rx.borrow(), FlushStatus::Pending));

        table.finish(&batches[0].members, Ok(()));
        assert!(table.take_ready().is_empty());
        assert!(matches!(*a_rx.borrow(), FlushStatus::Flushed));
        assert!(matches!(
            *b_rx.borrow(),
            FlushStatus::Failed(Error::DependencyFailed(cause)) if cause == c.id()
        ));
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_poison_reaches_dependents_not_dependencies() {
        let mut table = TxnTable::new();
        let (c, _) = table.begin(None);
        let (b, b_rx) = table.begin(None);
        let (d, d_rx) = table.begin(None);
        let (a, a_rx) = table.begin(None);

        table.record_write(c.id(), dirty_page(1, 1));
        table.add_dependencies(b.id(), &[Arc::clone(&c)]);
        fail_flush(&mut table, &c);

        // D depends on poisoned B; both depend on the newer, healthy A.
        table.record_write(a.id(), dirty_page(2, 2));
        table.record_write(d.id(), dirty_page(3, 3));
        table.add_dependencies(b.id(), &[Arc::clone(&a)]);
        table.add_dependencies(d.id(), &[Arc::clone(&a), Arc::clone(&b)]);
        table.commit(b.id());
        table.commit(d.id());
        table.commit(a.id());

        let batches = table.take_ready();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].members, vec![a.id()]);
        assert!(matches!(*a_rx.borrow(), FlushStatus::Pending));
        assert!(matches!(*b_rx.borrow(), FlushStatus::Pending));
        assert!(matches!(*d_rx.borrow(), FlushStatus::Pending));

        table.finish(&batches[0].members, Ok(()));
        assert!(table.take_ready().is_empty());
        assert!(matches!(*a_rx.borrow(), FlushStatus::Flushed));
        for rx in [&b_rx, &d_rx] {
            assert!(matches!(
                *rx.borrow(),
                FlushStatus::Failed(Error::DependencyFailed(cause)) if cause == c.id()
            ));
        }
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_failure_queues_touched_blocks_for_rollback() {
        let mut table = TxnTable::new();
        let (a, _) = table.begin(None);
        table.record_grant(a.id(), BlockId::new(5), &[]);
        table.record_write(a.id(), dirty_page(6, 1));

        fail_flush(&mut table, &a);
        let mut rollback = table.take_rollback();
        rollback.sort_by_key(|&(block_id, _)| block_id.0);
        assert_eq!(rollback, vec![(BlockId::new(5), a.id()), (BlockId::new(6), a.id())]);
        assert!(table.take_rollback().is_empty());
    }

    #[test]
    fn test_successful_flush_marks_pages_clean() {
        let mut table = TxnTable::new();
        let (a, rx) = table.begin(None);
        let page = dirty_page(3, 1);
        table.record_write(a.id(), Arc::clone(&page));
        table.commit(a.id());

        let batches = table.take_ready();
        assert!(page.is_dirty());
        table.finish(&batches[0].members, Ok(()));
        assert!(!page.is_dirty());
        assert!(matches!(*rx.borrow(), FlushStatus::Flushed));
        assert!(!a.has_failed());
        assert!(table.take_rollback().is_empty());
        assert_eq!(table.len(), 0);
    }
}
