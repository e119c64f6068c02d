//! Concurrent read → decrypt → write pipeline.
//!
//! [`QuickDecryptor`] moves one file at a time from a reader to a writer,
//! optionally running the bytes through AES-128-CTR on the way. Three worker
//! threads share a ring of three 16 KiB buffers:
//!
//! ```text
//!            data_read[i]          data_decrypted[i]
//!   read ──────────────────▶ decrypt ──────────────────▶ write
//!     ▲                                                    │
//!     └────────────────────── data_written[i] ◀────────────┘
//! ```
//!
//! Each slot `i` has its own three auto-reset events, and every stage walks
//! the slots in the same round-robin order (0, 1, 2, 0, ...). A slot is
//! therefore owned by exactly one stage at a time and output order always
//! equals input order. Memory stays at three buffers regardless of file
//! size.
//!
//! One instance is meant to be reused for every file of a logical transfer
//! (e.g. all contents of a title) so progress is reported against the whole
//! transfer: call [`QuickDecryptor::reset`] with the combined size once, then
//! [`QuickDecryptor::decrypt_and_write_file`] per file.
//!
//! ## Cancellation
//! [`QuickDecryptor::abort`] may be called from any thread. It stops all
//! stages at their next wait and makes the in-flight call (and any later
//! call, until the next `reset`) return [`Error::Aborted`]. A stopped
//! transfer leaves the destination partially written; deleting it is up to
//! the caller.

mod event;

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;

use crate::crypto::{Counter, CtrCipher};
use crate::keys::AesKey;
use crate::utils::read_full;
use crate::{Error, Result};

use event::Event;

/// Capacity of one pipeline buffer.
pub const BUFFER_SIZE: usize = 16 * 1024;
/// Number of buffers in the ring.
pub const SLOT_COUNT: usize = 3;

/// AES-CTR parameters for one file.
#[derive(Clone, Copy)]
pub struct CtrParams {
    pub key: AesKey,
    pub ctr: Counter,
    /// Byte offset within the file at which the keystream starts.
    pub seek_pos: u64,
}

impl CtrParams {
    /// Parameters for decrypting a file from its first byte.
    pub fn new(key: AesKey, ctr: Counter) -> Self {
        Self {
            key,
            ctr,
            seek_pos: 0,
        }
    }
}

// Key bytes stay out of debug output.
impl std::fmt::Debug for CtrParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CtrParams")
            .field("seek_pos", &self.seek_pos)
            .finish_non_exhaustive()
    }
}

/// Snapshot of a transfer's progress counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferState {
    /// Bytes expected across every file of the logical transfer.
    pub total_size: u64,
    /// Bytes expected for the file currently (or last) in flight.
    pub current_total_size: u64,
    /// Bytes written so far across the whole transfer.
    pub imported_size: u64,
}

struct Slot {
    data: Box<[u8]>,
    len: usize,
    last: bool,
}

/// Three-stage streaming decryptor. See the [module docs](self).
pub struct QuickDecryptor {
    slots: [Mutex<Slot>; SLOT_COUNT],
    data_read: [Event; SLOT_COUNT],
    data_decrypted: [Event; SLOT_COUNT],
    data_written: [Event; SLOT_COUNT],

    total_size: AtomicU64,
    current_total_size: AtomicU64,
    imported_size: AtomicU64,

    /// Stages keep going only while this is set.
    running: AtomicBool,
    /// A `decrypt_and_write_file` call is in progress.
    busy: AtomicBool,
    aborted: AtomicBool,
    failure: Mutex<Option<Error>>,
}

impl Default for QuickDecryptor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for QuickDecryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuickDecryptor")
            .field("state", &self.state())
            .field("busy", &self.busy.load(Ordering::Relaxed))
            .field("aborted", &self.aborted.load(Ordering::Relaxed))
            .finish()
    }
}

impl QuickDecryptor {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| {
                Mutex::new(Slot {
                    data: vec![0u8; BUFFER_SIZE].into_boxed_slice(),
                    len: 0,
                    last: false,
                })
            }),
            data_read: Default::default(),
            data_decrypted: Default::default(),
            data_written: Default::default(),
            total_size: AtomicU64::new(0),
            current_total_size: AtomicU64::new(0),
            imported_size: AtomicU64::new(0),
            running: AtomicBool::new(false),
            busy: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
            failure: Mutex::new(None),
        }
    }

    /// Start a new logical transfer of `total_size` bytes.
    ///
    /// Zeroes the imported counter and clears a previous [`abort`](Self::abort).
    pub fn reset(&self, total_size: u64) {
        self.total_size.store(total_size, Ordering::SeqCst);
        self.current_total_size.store(0, Ordering::SeqCst);
        self.imported_size.store(0, Ordering::SeqCst);
        self.aborted.store(false, Ordering::SeqCst);
    }

    /// Request cancellation of the current and any later transfer.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
        if self.busy.load(Ordering::SeqCst) {
            tracing::debug!("aborting in-flight transfer");
        }
        self.halt();
    }

    /// Whether [`abort`](Self::abort) was called since the last reset.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Whether a file is currently being processed.
    pub fn is_running(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// Current progress counters.
    pub fn state(&self) -> TransferState {
        TransferState {
            total_size: self.total_size.load(Ordering::SeqCst),
            current_total_size: self.current_total_size.load(Ordering::SeqCst),
            imported_size: self.imported_size.load(Ordering::SeqCst),
        }
    }

    /// Copy `size` bytes from `source` to `destination`, decrypting them with
    /// `crypto` when given.
    ///
    /// Blocks until every stage has drained (success) or stopped (failure).
    /// Progress accumulates into the counters set up by [`reset`](Self::reset)
    /// and is reported through `callback(imported_size, total_size)` from the
    /// write stage after every buffer; the callback should return quickly.
    ///
    /// Fails with:
    /// * [`Error::Aborted`] if [`abort`](Self::abort) was called.
    /// * [`Error::UnexpectedEof`] if `source` ends before `size` bytes; the
    ///   bytes that were read are still written first.
    /// * [`Error::Io`] on read or write errors.
    /// * [`Error::Busy`] if another call is already running on this instance.
    pub fn decrypt_and_write_file<R, W, F>(
        &self,
        source: &mut R,
        size: u64,
        destination: &mut W,
        mut callback: F,
        crypto: Option<CtrParams>,
    ) -> Result<()>
    where
        R: Read + Send + ?Sized,
        W: Write + Send + ?Sized,
        F: FnMut(u64, u64) + Send,
    {
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(Error::Busy);
        }
        let _busy = BusyGuard(&self.busy);

        if self.is_aborted() {
            return Err(Error::Aborted);
        }

        self.current_total_size.store(size, Ordering::SeqCst);
        *self.lock_failure() = None;
        if size == 0 {
            return Ok(());
        }

        tracing::debug!(size, decrypt = crypto.is_some(), "starting transfer");

        for i in 0..SLOT_COUNT {
            self.data_read[i].reset();
            self.data_decrypted[i].reset();
            self.data_written[i].set();
        }
        self.running.store(true, Ordering::SeqCst);
        // An abort that raced with the setup above must still stop the stages.
        if self.is_aborted() {
            self.halt();
        }

        let cipher = crypto.map(|p| CtrCipher::at(&p.key, &p.ctr, p.seek_pos));
        let callback = &mut callback;
        thread::scope(|s| {
            s.spawn(|| {
                let _halt = HaltOnUnwind(self);
                self.read_loop(source, size)
            });
            s.spawn(|| {
                let _halt = HaltOnUnwind(self);
                self.decrypt_loop(cipher)
            });
            s.spawn(|| {
                let _halt = HaltOnUnwind(self);
                self.write_loop(destination, callback)
            });
        });
        self.running.store(false, Ordering::SeqCst);

        if self.is_aborted() {
            tracing::warn!("transfer aborted");
            return Err(Error::Aborted);
        }
        match self.lock_failure().take() {
            Some(e) => {
                tracing::error!(error = %e, "transfer failed");
                Err(e)
            }
            None => {
                tracing::debug!(size, "transfer finished");
                Ok(())
            }
        }
    }

    fn read_loop<R: Read + ?Sized>(&self, source: &mut R, size: u64) {
        let mut remaining = size;
        let mut slot = 0;
        loop {
            self.data_written[slot].wait();
            if !self.keep_going() {
                return;
            }

            let want = remaining.min(BUFFER_SIZE as u64) as usize;
            let mut buf = self.lock_slot(slot);
            let filled = read_full(source, &mut buf.data[..want]);
            let got = match filled {
                Ok(n) => n,
                Err(e) => {
                    drop(buf);
                    self.fail(e.into());
                    return;
                }
            };
            remaining -= got as u64;
            buf.len = got;
            buf.last = remaining == 0 || got < want;
            let last = buf.last;
            drop(buf);

            if got < want {
                tracing::warn!(missing = remaining, "source ended early");
                // Drain what was read before reporting the failure.
                self.record(Error::UnexpectedEof);
            }
            self.data_read[slot].set();
            if last {
                return;
            }
            slot = (slot + 1) % SLOT_COUNT;
        }
    }

    fn decrypt_loop(&self, mut cipher: Option<CtrCipher>) {
        let mut slot = 0;
        loop {
            self.data_read[slot].wait();
            if !self.keep_going() {
                return;
            }

            let mut buf = self.lock_slot(slot);
            let Slot { data, len, last } = &mut *buf;
            if let Some(cipher) = cipher.as_mut() {
                cipher.apply(&mut data[..*len]);
            }
            let last = *last;
            drop(buf);

            self.data_decrypted[slot].set();
            if last {
                return;
            }
            slot = (slot + 1) % SLOT_COUNT;
        }
    }

    fn write_loop<W, F>(&self, destination: &mut W, callback: &mut F)
    where
        W: Write + ?Sized,
        F: FnMut(u64, u64),
    {
        let mut slot = 0;
        let mut over_total = false;
        loop {
            self.data_decrypted[slot].wait();
            if !self.keep_going() {
                return;
            }

            let buf = self.lock_slot(slot);
            let (len, last) = (buf.len, buf.last);
            let written = destination.write_all(&buf.data[..len]);
            drop(buf);
            if let Err(e) = written {
                self.fail(e.into());
                return;
            }

            let imported = self.imported_size.fetch_add(len as u64, Ordering::SeqCst) + len as u64;
            let declared = self.total_size.fetch_max(imported, Ordering::SeqCst);
            if declared < imported && !over_total {
                over_total = true;
                tracing::warn!(declared, imported, "transfer exceeds declared total size");
            }
            let total = declared.max(imported);
            callback(imported, total);

            self.data_written[slot].set();
            if last {
                if let Err(e) = destination.flush() {
                    self.fail(e.into());
                }
                return;
            }
            slot = (slot + 1) % SLOT_COUNT;
        }
    }

    fn keep_going(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop all stages and wake every waiter.
    fn halt(&self) {
        self.running.store(false, Ordering::SeqCst);
        for i in 0..SLOT_COUNT {
            self.data_read[i].set();
            self.data_decrypted[i].set();
            self.data_written[i].set();
        }
    }

    /// Remember the first failure of the current file.
    fn record(&self, e: Error) {
        let mut failure = self.lock_failure();
        if failure.is_none() {
            *failure = Some(e);
        }
    }

    fn fail(&self, e: Error) {
        self.record(e);
        self.halt();
    }

    fn lock_slot(&self, i: usize) -> MutexGuard<'_, Slot> {
        self.slots[i].lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_failure(&self) -> MutexGuard<'_, Option<Error>> {
        self.failure.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Wakes the other stages if a worker unwinds, so the scope can join and
/// re-raise the panic.
struct HaltOnUnwind<'a>(&'a QuickDecryptor);

impl Drop for HaltOnUnwind<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.halt();
        }
    }
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
