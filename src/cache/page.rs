//! Page - one immutable version of a block's bytes in memory.
//!
//! A [`Page`] starts either Unloaded (an existing block that has not been
//! read yet) or Loaded (a version installed by a writer, or the zeroed
//! buffer of a freshly allocated block). Once loaded, the buffer never
//! changes: writers work on a private copy and install it as a *new*
//! `Page`, so readers still holding an older version keep a valid view.
//!
//! # Load state machine
//! ```text
//!   Unloaded ──begin_load──▶ Loading ──ok──▶ Loaded
//!       ▲                       │
//!       └────────error──────────┘
//! ```
//! A failed load goes back to Unloaded after the error is delivered to
//! every waiter of that attempt, so a later acquisition retries the read.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::common::{BlockId, Error, Result};

/// Observable load state of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// Bytes not in memory.
    Unloaded,
    /// A read from the block store is in flight.
    Loading,
    /// Bytes available.
    Loaded,
}

type LoadOutcome = Option<Result<()>>;

enum LoadState {
    Unloaded,
    Loading(watch::Receiver<LoadOutcome>),
    Loaded,
}

/// What a caller must do to get a page's bytes.
pub(crate) enum LoadTicket {
    /// Already loaded.
    Ready,
    /// Another caller started the read; wait for it.
    Wait(watch::Receiver<LoadOutcome>),
    /// This caller must perform the read and call [`Page::complete_load`].
    Start(LoadCompleter, watch::Receiver<LoadOutcome>),
}

/// Completion side of one load attempt.
pub(crate) struct LoadCompleter {
    tx: watch::Sender<LoadOutcome>,
}

/// An in-memory version of one block.
pub struct Page {
    block_id: BlockId,
    version: u64,
    /// Set exactly once, when the page becomes Loaded.
    buf: OnceLock<Box<[u8]>>,
    load: Mutex<LoadState>,
    /// Bytes differ from what the block store holds.
    dirty: AtomicBool,
}

impl Page {
    /// A page whose bytes still have to be read from the store.
    pub(crate) fn unloaded(block_id: BlockId, version: u64) -> Self {
        Self {
            block_id,
            version,
            buf: OnceLock::new(),
            load: Mutex::new(LoadState::Unloaded),
            dirty: AtomicBool::new(false),
        }
    }

    /// A page whose bytes are already known.
    pub(crate) fn loaded(block_id: BlockId, version: u64, buf: Box<[u8]>, dirty: bool) -> Self {
        let cell = OnceLock::new();
        let _ = cell.set(buf);
        Self {
            block_id,
            version,
            buf: cell,
            load: Mutex::new(LoadState::Loaded),
            dirty: AtomicBool::new(dirty),
        }
    }

    #[inline]
    pub fn block_id(&self) -> BlockId {
        self.block_id
    }

    /// Version number; larger means newer for the same block.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn state(&self) -> PageState {
        match &*self.load.lock() {
            LoadState::Loading(rx) if in_flight(rx) => PageState::Loading,
            LoadState::Loading(_) | LoadState::Unloaded => PageState::Unloaded,
            LoadState::Loaded => PageState::Loaded,
        }
    }

    /// The page bytes, or `None` while not loaded.
    #[inline]
    pub fn bytes(&self) -> Option<&[u8]> {
        self.buf.get().map(|b| &b[..])
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Called once the bytes of this version are durable.
    pub(crate) fn mark_clean(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    pub(crate) fn begin_load(&self) -> LoadTicket {
        let mut load = self.load.lock();
        match &*load {
            LoadState::Loaded => LoadTicket::Ready,
            LoadState::Loading(rx) if in_flight(rx) => LoadTicket::Wait(rx.clone()),
            // Never started, failed, or abandoned without completing.
            LoadState::Loading(_) | LoadState::Unloaded => {
                let (tx, rx) = watch::channel(None);
                *load = LoadState::Loading(rx.clone());
                LoadTicket::Start(LoadCompleter { tx }, rx)
            }
        }
    }

    /// Finish a load attempt and wake every waiter of that attempt.
    pub(crate) fn complete_load(&self, completer: LoadCompleter, result: Result<Box<[u8]>>) {
        let outcome = match result {
            Ok(buf) => {
                let _ = self.buf.set(buf);
                *self.load.lock() = LoadState::Loaded;
                Ok(())
            }
            Err(err) => {
                *self.load.lock() = LoadState::Unloaded;
                Err(err)
            }
        };
        completer.tx.send_replace(Some(outcome));
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("block_id", &self.block_id)
            .field("version", &self.version)
            .field("state", &self.state())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

/// The attempt behind `rx` can still complete. A completer dropped without
/// [`Page::complete_load`] (its task was cancelled) closes the channel while
/// the page is still Loading.
fn in_flight(rx: &watch::Receiver<LoadOutcome>) -> bool {
    rx.has_changed().is_ok()
}

/// Wait for the load attempt behind `rx` to finish.
pub(crate) async fn wait_loaded(
    mut rx: watch::Receiver<LoadOutcome>,
    block_id: BlockId,
) -> Result<()> {
    let outcome = rx
        .wait_for(|outcome| outcome.is_some())
        .await
        .map_err(|_| Error::Cancelled(block_id))?
        .clone();
    outcome.unwrap_or(Err(Error::Cancelled(block_id)))
}
