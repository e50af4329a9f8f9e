//! Acquisitions - one transaction's claim on one block.
//!
//! An [`Acquisition`] is queued on its block as soon as it is created.
//! [`Acquisition::wait_granted`] is the only suspension point: it waits for
//! the grant, then for the page bytes if a load is needed.
//!
//! - Read: [`data`](Acquisition::data) borrows the granted page version
//!   directly. Older versions stay valid after a writer installs a new one.
//! - Write: the holder works on a private copy. Dropping a write that was
//!   modified through [`data_mut`](Acquisition::data_mut) installs the copy
//!   as the block's new version.
//!
//! Dropping the acquisition releases it exactly once, granted or not.

use std::fmt;
use std::sync::Arc;

use tokio::sync::oneshot;

use crate::cache::current_page::{AccessMode, AcqId, CurrentPage};
use crate::cache::page::{wait_loaded, LoadTicket, Page};
use crate::cache::transaction::Transaction;
use crate::common::{BlockId, Error, Result, TxnId};

/// Lifecycle of an acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionState {
    /// Queued behind incompatible requests, or not yet awaited.
    Pending,
    /// Holds the lock.
    Granted,
    /// Left the block's queue.
    Released,
}

enum Slot {
    Pending(oneshot::Receiver<Arc<Page>>),
    Granted(Arc<Page>),
    Released,
}

/// A transaction's read or write claim on a block.
///
/// # Example
/// ```ignore
/// let mut acq = txn.acquire_write(block_id)?;
/// acq.wait_granted().await?;
/// acq.data_mut()[0] = 0xFF;
/// // acq drops here: new version installed, next waiter granted
/// ```
pub struct Acquisition<'a> {
    txn: &'a Transaction<'a>,
    block_id: BlockId,
    mode: AccessMode,
    acq_id: AcqId,
    entry: Arc<CurrentPage>,
    slot: Slot,
    /// Private copy for a write, filled once the page is loaded.
    write_buf: Option<Box<[u8]>>,
    /// Bytes are available through `data`.
    ready: bool,
    dirty: bool,
}

impl<'a> Acquisition<'a> {
    pub(crate) fn new(
        txn: &'a Transaction<'a>,
        block_id: BlockId,
        mode: AccessMode,
        acq_id: AcqId,
        entry: Arc<CurrentPage>,
        signal: oneshot::Receiver<Arc<Page>>,
        write_buf: Option<Box<[u8]>>,
    ) -> Self {
        Self {
            txn,
            block_id,
            mode,
            acq_id,
            entry,
            slot: Slot::Pending(signal),
            write_buf,
            ready: false,
            dirty: false,
        }
    }

    #[inline]
    pub fn block_id(&self) -> BlockId {
        self.block_id
    }

    #[inline]
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    #[inline]
    pub fn txn_id(&self) -> TxnId {
        self.txn.id()
    }

    pub fn state(&self) -> AcquisitionState {
        match self.slot {
            Slot::Pending(_) => AcquisitionState::Pending,
            Slot::Granted(_) => AcquisitionState::Granted,
            Slot::Released => AcquisitionState::Released,
        }
    }

    /// Granted and the bytes are available.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Version of the page this acquisition was granted on.
    pub fn page_version(&self) -> Option<u64> {
        match &self.slot {
            Slot::Granted(page) => Some(page.version()),
            _ => None,
        }
    }

    /// Wait for the grant and for the page bytes.
    ///
    /// Cancel-safe: dropping the returned future leaves the acquisition
    /// queued (or granted), and a later call picks up where it left off.
    ///
    /// # Errors
    /// - the store error if the block could not be loaded; the acquisition
    ///   is released so later waiters are not held up
    /// - `Error::Cancelled` if the grant can no longer arrive
    pub async fn wait_granted(&mut self) -> Result<()> {
        if self.ready {
            return Ok(());
        }

        let granted = match &mut self.slot {
            Slot::Pending(signal) => signal.await.ok(),
            Slot::Granted(page) => Some(Arc::clone(page)),
            Slot::Released => return Err(Error::Cancelled(self.block_id)),
        };
        let Some(page) = granted else {
            self.release_now(false);
            return Err(Error::Cancelled(self.block_id));
        };
        self.slot = Slot::Granted(Arc::clone(&page));

        let loaded = match page.begin_load() {
            LoadTicket::Ready => Ok(()),
            LoadTicket::Wait(rx) => wait_loaded(rx, self.block_id).await,
            LoadTicket::Start(completer, rx) => {
                self.txn.cache().inner().spawn_load(Arc::clone(&page), completer);
                wait_loaded(rx, self.block_id).await
            }
        };
        if let Err(err) = loaded {
            self.release_now(false);
            return Err(err);
        }

        if self.mode == AccessMode::Write && self.write_buf.is_none() {
            self.write_buf = page.bytes().map(Box::from);
        }
        self.ready = true;
        Ok(())
    }

    /// The block's bytes: the granted version for a read, the private copy
    /// for a write.
    ///
    /// # Panics
    /// Panics if [`wait_granted`](Self::wait_granted) has not succeeded.
    pub fn data(&self) -> &[u8] {
        assert!(self.ready, "{}: data accessed before the grant", self.block_id);
        match (&self.slot, &self.write_buf) {
            (_, Some(buf)) => &buf[..],
            (Slot::Granted(page), None) => page.bytes().unwrap_or_default(),
            _ => unreachable!("ready acquisition is granted"),
        }
    }

    /// Mutable access to the private copy of a write.
    ///
    /// # Panics
    /// Panics for a read, or if [`wait_granted`](Self::wait_granted) has not
    /// succeeded.
    pub fn data_mut(&mut self) -> &mut [u8] {
        assert!(
            self.mode == AccessMode::Write,
            "{}: data_mut on a read acquisition",
            self.block_id
        );
        assert!(self.ready, "{}: data accessed before the grant", self.block_id);
        self.dirty = true;
        match &mut self.write_buf {
            Some(buf) => &mut buf[..],
            None => unreachable!("ready write has a private copy"),
        }
    }

    /// Release now instead of at end of scope.
    pub fn release(mut self) {
        self.release_now(true);
    }

    fn release_now(&mut self, install: bool) {
        if matches!(self.slot, Slot::Released) {
            return;
        }
        let granted = matches!(self.slot, Slot::Granted(_));
        self.slot = Slot::Released;
        self.ready = false;

        let inner = self.txn.cache().inner();
        let install = if install && granted && self.dirty {
            self.write_buf.take().map(|buf| (inner.next_version(), buf))
        } else {
            None
        };

        let release = self.entry.release(self.acq_id, install);
        self.txn.forget(self.block_id);
        inner.after_release(self.txn.id(), self.block_id, release);
    }
}

impl Drop for Acquisition<'_> {
    fn drop(&mut self) {
        self.release_now(true);
    }
}

impl fmt::Debug for Acquisition<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acquisition")
            .field("txn", &self.txn.id())
            .field("block_id", &self.block_id)
            .field("mode", &self.mode)
            .field("state", &self.state())
            .field("dirty", &self.dirty)
            .finish()
    }
}
