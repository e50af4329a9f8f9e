//! Cooperative drain tracking for background page I/O.
//!
//! Every spawned load or flush task holds a [`DrainLock`]. Shutdown waits
//! until no locks remain, so the cache never tears down underneath an
//! in-flight read or write.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

struct DrainState {
    active: AtomicUsize,
    idle: Notify,
}

#[derive(Clone)]
pub(crate) struct Drainer {
    state: Arc<DrainState>,
}

impl Drainer {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(DrainState {
                active: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Register one in-flight task.
    pub(crate) fn lock(&self) -> DrainLock {
        self.state.active.fetch_add(1, Ordering::AcqRel);
        DrainLock {
            state: Arc::clone(&self.state),
        }
    }

    pub(crate) fn active(&self) -> usize {
        self.state.active.load(Ordering::Acquire)
    }

    /// Wait until no [`DrainLock`] is outstanding.
    pub(crate) async fn wait_idle(&self) {
        loop {
            // Created before the check: `notify_waiters` reaches every
            // `Notified` that exists at the time of the call.
            let notified = self.state.idle.notified();
            if self.active() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Held by a background task for as long as it runs.
pub(crate) struct DrainLock {
    state: Arc<DrainState>,
}

impl Drop for DrainLock {
    fn drop(&mut self) {
        if self.state.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.state.idle.notify_waiters();
        }
    }
}
