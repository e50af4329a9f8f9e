//! Property tests for block allocation through the page cache.

use std::collections::HashSet;
use std::sync::Arc;

use pagetxn::{BlockId, MemoryBlockStore, PageCache};
use proptest::prelude::*;

/// Run `plan` (allocations per transaction, and whether to write each block)
/// and return every allocated id in order.
fn allocate_all(plan: &[Vec<bool>]) -> Vec<BlockId> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();

    rt.block_on(async {
        let cache = PageCache::open(Arc::new(MemoryBlockStore::new())).unwrap();
        let mut ids = Vec::new();
        let mut handles = Vec::new();

        for writes in plan {
            let txn = cache.begin_transaction();
            for &write in writes {
                let mut acq = txn.acquire_new().unwrap();
                acq.wait_granted().await.unwrap();
                if write {
                    acq.data_mut()[0] = 0xA5;
                }
                ids.push(acq.block_id());
            }
            handles.push(txn.commit());
        }
        for handle in handles {
            handle.wait().await.unwrap();
        }
        cache.shutdown().await;
        ids
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_allocated_ids_are_unique(
        plan in prop::collection::vec(prop::collection::vec(any::<bool>(), 0..6), 1..8)
    ) {
        let ids = allocate_all(&plan);
        let expected: usize = plan.iter().map(Vec::len).sum();
        prop_assert_eq!(ids.len(), expected);

        let unique: HashSet<BlockId> = ids.iter().copied().collect();
        prop_assert_eq!(unique.len(), ids.len());
        prop_assert!(ids.iter().all(|id| id.is_valid()));
    }
}
