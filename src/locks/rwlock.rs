//! Scalable reader-writer lock backed by a partitioned reader count.
//!
//! A reader-writer lock built on one shared reader counter makes every
//! reader bounce the same cache line. [`ReaderWriterLock`] instead counts
//! readers in a [`PartitionedCounter`]: a reader touches only its own cell,
//! and only a writer pays for folding all cells together.
//!
//! # Protocol
//!
//! - A reader optimistically adds one to its cell, then checks the writer
//!   flag. If a writer holds (or is waiting for) the lock, the reader takes
//!   its increment back and waits for the flag to clear before retrying.
//! - A writer claims the flag, then repeatedly flushes the counter until the
//!   global reader count reads zero.
//!
//! All counter and flag operations are `SeqCst`, so either the reader sees
//! the flag or the writer sees the reader's increment. Everything a writer
//! did happens-before the readers admitted after its release, and everything
//! a drained reader did happens-before the writer's critical section.
//!
//! # Shard hints
//!
//! The raw API ([`read_lock`](ReaderWriterLock::read_lock) and friends)
//! takes an optional shard hint; `None` means "the current worker's id".
//! A `read_unlock` **must** use the same shard as its `read_lock`, otherwise
//! the reader count drifts and writers wait forever. Code that may migrate
//! between workers between the two calls should pass an explicit hint or
//! use the guards ([`read`](ReaderWriterLock::read)), which remember the
//! shard they locked.
//!
//! There is no reentrancy, no timeout and no deadlock detection.

use std::fmt::{self, Debug};
use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_utils::{Backoff, CachePadded};

use crate::counters::partitioned::PartitionedCounter;
use crate::error::{Error, Result};
use crate::worker::{ThreadSlots, WorkerContext};

/// Reader cells used by [`ReaderWriterLock::new`].
pub const DEFAULT_READER_SHARDS: usize = 8;

/// Flush threshold used by [`ReaderWriterLock::new`].
pub const DEFAULT_READER_THRESHOLD: i64 = 8;

/// Observable state of a [`ReaderWriterLock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LockState {
    /// Nobody holds the lock.
    Unlocked,
    /// Held in shared mode by this many readers.
    ReadLocked(usize),
    /// Held, or being drained, by a writer.
    WriteLocked,
}

/// A scalable shared/exclusive lock.
///
/// The lock protects no data by itself; pair it with the data it guards.
///
/// # Examples
///
/// ```rust
/// use ripartito::locks::rwlock::{LockState, ReaderWriterLock};
///
/// let lock = ReaderWriterLock::new().unwrap();
///
/// {
///     let _r1 = lock.read();
///     let _r2 = lock.read();
///     assert_eq!(lock.state(), LockState::ReadLocked(2));
///     assert!(lock.try_write().is_none());
/// }
///
/// let guard = lock.write();
/// assert_eq!(lock.state(), LockState::WriteLocked);
/// assert!(lock.try_read().is_none());
/// drop(guard);
///
/// assert_eq!(lock.state(), LockState::Unlocked);
/// ```
pub struct ReaderWriterLock<W = ThreadSlots> {
    readers: PartitionedCounter<W>,
    writer: CachePadded<AtomicBool>,
}

impl ReaderWriterLock<ThreadSlots> {
    /// Creates an unlocked lock with [`DEFAULT_READER_SHARDS`] reader cells.
    pub fn new() -> Result<Self> {
        Self::with_workers(ThreadSlots, DEFAULT_READER_SHARDS, DEFAULT_READER_THRESHOLD)
    }
}

impl<W: WorkerContext> ReaderWriterLock<W> {
    /// Creates an unlocked lock with a custom reader counter layout.
    ///
    /// # Errors
    ///
    /// [`Error::ZeroShards`] if `reader_shards` is zero, otherwise the errors
    /// of [`PartitionedCounter::with_workers`].
    pub fn with_workers(workers: W, reader_shards: usize, threshold: i64) -> Result<Self> {
        if reader_shards == 0 {
            return Err(Error::ZeroShards {
                what: "reader-writer lock",
            });
        }
        let readers = PartitionedCounter::with_workers(workers, reader_shards, threshold)?
            .with_name("readers");
        Ok(Self {
            readers,
            writer: CachePadded::new(AtomicBool::new(false)),
        })
    }

    #[inline]
    fn resolve(&self, hint: Option<usize>) -> usize {
        hint.unwrap_or_else(|| self.readers.workers().current_worker_id())
    }

    #[inline]
    fn claim_writer(&self) -> bool {
        self.writer
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
    }

    /// Flushes the reader count until it reads zero.
    fn drain_readers(&self) {
        let backoff = Backoff::new();
        loop {
            self.readers.sync();
            if self.readers.global() == 0 {
                return;
            }
            backoff.snooze();
        }
    }

    /// Acquires shared access, waiting while a writer holds or awaits the lock.
    pub fn read_lock(&self, hint: Option<usize>) {
        let shard = self.resolve(hint);
        let backoff = Backoff::new();
        loop {
            self.readers.add_at(1, shard);
            if !self.writer.load(Ordering::SeqCst) {
                return;
            }
            self.readers.add_at(-1, shard);
            while self.writer.load(Ordering::SeqCst) {
                backoff.snooze();
            }
        }
    }

    /// Attempts to acquire shared access once. Returns `true` on success.
    pub fn try_read_lock(&self, hint: Option<usize>) -> bool {
        let shard = self.resolve(hint);
        self.readers.add_at(1, shard);
        if !self.writer.load(Ordering::SeqCst) {
            return true;
        }
        self.readers.add_at(-1, shard);
        false
    }

    /// Releases shared access acquired with the same `hint`.
    #[inline]
    pub fn read_unlock(&self, hint: Option<usize>) {
        self.readers.add_at(-1, self.resolve(hint));
    }

    /// Acquires exclusive access: claims the writer flag, then waits for
    /// every reader to leave.
    pub fn write_lock(&self) {
        let backoff = Backoff::new();
        while !self.claim_writer() {
            while self.writer.load(Ordering::Relaxed) {
                backoff.snooze();
            }
        }
        self.drain_readers();
    }

    /// Attempts to acquire exclusive access without waiting.
    ///
    /// Claims the writer flag once and flushes the reader count once.
    /// Returns `false` if another writer holds the flag, or if readers are
    /// still present: the flag is then released again, so a caller holding
    /// a read lock on this very lock gets `false` instead of deadlocking.
    pub fn try_write_lock(&self) -> bool {
        if !self.claim_writer() {
            return false;
        }
        self.readers.sync();
        if self.readers.global() != 0 {
            self.write_unlock();
            return false;
        }
        true
    }

    /// Releases exclusive access.
    #[inline]
    pub fn write_unlock(&self) {
        self.writer.store(false, Ordering::SeqCst);
    }

    /// Converts a held read lock into a write lock.
    ///
    /// On failure (another writer holds or awaits the lock) the caller's read
    /// lock is released and `false` is returned: the caller holds nothing.
    /// On success the caller's read lock is released, the other readers are
    /// drained and `true` is returned: the caller holds the write lock.
    pub fn try_upgrade_release_on_fail(&self, hint: Option<usize>) -> bool {
        let shard = self.resolve(hint);
        if !self.claim_writer() {
            self.readers.add_at(-1, shard);
            return false;
        }
        self.readers.add_at(-1, shard);
        self.drain_readers();
        true
    }

    /// Returns a snapshot of the lock state.
    ///
    /// Racy by nature: use it for diagnostics and tests, never for
    /// synchronization. A claimed writer flag reports
    /// [`LockState::WriteLocked`] even while readers are still draining.
    pub fn state(&self) -> LockState {
        if self.writer.load(Ordering::SeqCst) {
            return LockState::WriteLocked;
        }
        match self.readers.get() {
            n if n > 0 => LockState::ReadLocked(n as usize),
            _ => LockState::Unlocked,
        }
    }

    /// The reader counter, for inspection.
    pub fn readers(&self) -> &PartitionedCounter<W> {
        &self.readers
    }

    /// Acquires shared access on the current worker's shard.
    pub fn read(&self) -> ReadGuard<'_, W> {
        self.read_at(self.resolve(None))
    }

    /// Acquires shared access on `shard`.
    pub fn read_at(&self, shard: usize) -> ReadGuard<'_, W> {
        self.read_lock(Some(shard));
        ReadGuard { lock: self, shard }
    }

    /// Attempts to acquire shared access once.
    pub fn try_read(&self) -> Option<ReadGuard<'_, W>> {
        let shard = self.resolve(None);
        self.try_read_lock(Some(shard))
            .then(|| ReadGuard { lock: self, shard })
    }

    /// Acquires exclusive access.
    pub fn write(&self) -> WriteGuard<'_, W> {
        self.write_lock();
        WriteGuard { lock: self }
    }

    /// Attempts to acquire exclusive access without waiting; see
    /// [`try_write_lock`](Self::try_write_lock).
    pub fn try_write(&self) -> Option<WriteGuard<'_, W>> {
        self.try_write_lock().then(|| WriteGuard { lock: self })
    }
}

impl<W: WorkerContext> Debug for ReaderWriterLock<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderWriterLock")
            .field("state", &self.state())
            .field("readers", &self.readers)
            .finish()
    }
}

/// RAII shared access to a [`ReaderWriterLock`]; released on drop.
///
/// The guard remembers the shard it was counted on, so the release always
/// matches the acquisition even if the thread changed worker in between.
#[must_use = "if unused the lock is released immediately"]
pub struct ReadGuard<'a, W: WorkerContext = ThreadSlots> {
    lock: &'a ReaderWriterLock<W>,
    shard: usize,
}

impl<'a, W: WorkerContext> ReadGuard<'a, W> {
    /// Reader shard this guard is counted on.
    pub fn shard(&self) -> usize {
        self.shard
    }

    /// Upgrades to exclusive access, see
    /// [`ReaderWriterLock::try_upgrade_release_on_fail`].
    ///
    /// Returns `None` if another writer got there first; shared access is
    /// released either way.
    pub fn try_upgrade(self) -> Option<WriteGuard<'a, W>> {
        let this = ManuallyDrop::new(self);
        let lock = this.lock;
        lock.try_upgrade_release_on_fail(Some(this.shard))
            .then(|| WriteGuard { lock })
    }
}

impl<W: WorkerContext> Drop for ReadGuard<'_, W> {
    fn drop(&mut self) {
        self.lock.read_unlock(Some(self.shard));
    }
}

impl<W: WorkerContext> Debug for ReadGuard<'_, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadGuard")
            .field("shard", &self.shard)
            .finish()
    }
}

/// RAII exclusive access to a [`ReaderWriterLock`]; released on drop.
#[must_use = "if unused the lock is released immediately"]
pub struct WriteGuard<'a, W: WorkerContext = ThreadSlots> {
    lock: &'a ReaderWriterLock<W>,
}

impl<W: WorkerContext> Drop for WriteGuard<'_, W> {
    fn drop(&mut self) {
        self.lock.write_unlock();
    }
}

impl<W: WorkerContext> Debug for WriteGuard<'_, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteGuard").finish()
    }
}
