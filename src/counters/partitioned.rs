//! Partitioned counter: sharded local cells periodically folded into a
//! global accumulator.
//!
//! This module provides [`PartitionedCounter`]. Unlike a plain sharded
//! counter, whose value is only ever known by summing all shards, a
//! partitioned counter keeps each shard's drift bounded by a threshold and
//! flushes overflowing shards into one shared accumulator. After [`sync`]
//! the accumulator alone holds the exact total.
//!
//! [`sync`]: PartitionedCounter::sync

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crossbeam_utils::CachePadded;

use crate::error::{try_alloc_slice, Error, Result};
use crate::worker::{ThreadSlots, WorkerContext};

/// Where flushed deltas accumulate.
enum Accumulator {
    Embedded(CachePadded<AtomicI64>),
    Shared(Arc<AtomicI64>),
}

impl Accumulator {
    #[inline]
    fn get(&self) -> &AtomicI64 {
        match self {
            Accumulator::Embedded(global) => &**global,
            Accumulator::Shared(global) => &**global,
        }
    }
}

/// A scalable counter made of per-worker cells and a global accumulator.
///
/// Each update is a single atomic add on the caller's own cache-padded cell.
/// When a cell's magnitude exceeds the threshold it is swapped to zero and
/// its content is added to the global accumulator, so shared-cache-line
/// traffic happens once every `threshold` updates at most.
///
/// The logical value is always `global + Σ cells`.
///
/// # Ordering
///
/// Every operation on the cells and on the accumulator is `SeqCst`.
/// [`ReaderWriterLock`](crate::locks::rwlock::ReaderWriterLock) relies on a
/// single total order between reader increments and its writer flag.
///
/// # Examples
///
/// ```rust
/// use ripartito::counters::partitioned::PartitionedCounter;
///
/// let counter = PartitionedCounter::new(4, 8).unwrap();
/// counter.add_at(5, 0);
/// counter.add_at(-2, 1);
///
/// // Still local: below the threshold.
/// assert_eq!(counter.global(), 0);
/// assert_eq!(counter.get(), 3);
///
/// counter.sync();
/// assert_eq!(counter.global(), 3);
/// ```
///
/// Sharing the accumulator with the caller:
///
/// ```rust
/// use std::sync::atomic::{AtomicI64, Ordering};
/// use std::sync::Arc;
/// use ripartito::counters::partitioned::PartitionedCounter;
///
/// let total = Arc::new(AtomicI64::new(0));
/// {
///     let counter = PartitionedCounter::new(2, 100)
///         .unwrap()
///         .with_global(Arc::clone(&total));
///     counter.add(7);
/// } // dropping the counter flushes every cell
/// assert_eq!(total.load(Ordering::SeqCst), 7);
/// ```
pub struct PartitionedCounter<W = ThreadSlots> {
    name: &'static str,
    cells: Box<[CachePadded<AtomicI64>]>,
    global: Accumulator,
    threshold: i64,
    workers: W,
}

impl PartitionedCounter<ThreadSlots> {
    /// Creates a counter with `num_shards` cells and the given flush threshold.
    ///
    /// A shard count of zero means one cell per hardware thread.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidThreshold`] for a negative threshold,
    /// [`Error::Allocation`] if the cells cannot be allocated.
    pub fn new(num_shards: usize, threshold: i64) -> Result<Self> {
        Self::with_workers(ThreadSlots, num_shards, threshold)
    }
}

impl<W: WorkerContext> PartitionedCounter<W> {
    /// Creates a counter whose default shard is chosen by `workers`.
    ///
    /// A shard count of zero means `workers.num_workers()` cells.
    pub fn with_workers(workers: W, num_shards: usize, threshold: i64) -> Result<Self> {
        if threshold < 0 {
            return Err(Error::InvalidThreshold(threshold));
        }
        let num_shards = match num_shards {
            0 => workers.num_workers().max(1),
            n => n,
        };
        let cells = try_alloc_slice("counter cells", num_shards, |_| {
            CachePadded::new(AtomicI64::new(0))
        })?;
        log::debug!("partitioned counter: {num_shards} shards, threshold {threshold}");

        Ok(Self {
            name: "",
            cells,
            global: Accumulator::Embedded(CachePadded::new(AtomicI64::new(0))),
            threshold,
            workers,
        })
    }

    /// Sets the name of this counter, returning `self` for method chaining.
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Replaces the embedded accumulator with a caller-owned one.
    ///
    /// Whatever the embedded accumulator held is added to `global`, so the
    /// logical value is preserved.
    pub fn with_global(mut self, global: Arc<AtomicI64>) -> Self {
        let held = self.global.get().swap(0, Ordering::SeqCst);
        global.fetch_add(held, Ordering::SeqCst);
        self.global = Accumulator::Shared(global);
        self
    }

    /// Adds `delta` to the calling worker's cell.
    #[inline]
    pub fn add(&self, delta: i64) {
        self.add_at(delta, self.workers.current_worker_id());
    }

    /// Adds `delta` to cell `shard mod num_shards`.
    ///
    /// If the cell then exceeds the threshold in magnitude it is flushed into
    /// the global accumulator.
    #[inline]
    pub fn add_at(&self, delta: i64, shard: usize) {
        let cell = &self.cells[shard % self.cells.len()];
        let current = cell.fetch_add(delta, Ordering::SeqCst).wrapping_add(delta);
        if current > self.threshold || current < -self.threshold {
            let flushed = cell.swap(0, Ordering::SeqCst);
            self.global.get().fetch_add(flushed, Ordering::SeqCst);
        }
    }

    /// Subtracts `delta` from the calling worker's cell.
    #[inline]
    pub fn sub(&self, delta: i64) {
        self.add(delta.wrapping_neg());
    }

    /// Subtracts `delta` from cell `shard mod num_shards`.
    #[inline]
    pub fn sub_at(&self, delta: i64, shard: usize) {
        self.add_at(delta.wrapping_neg(), shard);
    }

    /// Folds every cell into the global accumulator.
    ///
    /// Afterwards [`global`](Self::global) is the exact total, provided no
    /// `add` ran concurrently.
    pub fn sync(&self) {
        let global = self.global.get();
        for cell in self.cells.iter() {
            let flushed = cell.swap(0, Ordering::SeqCst);
            global.fetch_add(flushed, Ordering::SeqCst);
        }
    }

    /// Returns the global accumulator.
    #[inline]
    pub fn global(&self) -> i64 {
        self.global.get().load(Ordering::SeqCst)
    }

    /// Returns `global + Σ cells`.
    ///
    /// Each cell is read atomically but the sum is a racy snapshot: it is
    /// exact only while no `add` is in flight.
    pub fn get(&self) -> i64 {
        self.cells
            .iter()
            .map(|cell| cell.load(Ordering::SeqCst))
            .fold(self.global(), i64::wrapping_add)
    }

    /// Returns the content of cell `shard mod num_shards`.
    pub fn local_value(&self, shard: usize) -> i64 {
        self.cells[shard % self.cells.len()].load(Ordering::SeqCst)
    }

    /// Returns the content of every cell, in shard order.
    pub fn local_values(&self) -> impl Iterator<Item = i64> + '_ {
        self.cells.iter().map(|cell| cell.load(Ordering::SeqCst))
    }

    /// Number of cells.
    #[inline]
    pub fn num_shards(&self) -> usize {
        self.cells.len()
    }

    /// Flush threshold.
    #[inline]
    pub fn threshold(&self) -> i64 {
        self.threshold
    }

    /// Name given with [`with_name`](Self::with_name), empty by default.
    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The worker provider choosing the default shard.
    pub fn workers(&self) -> &W {
        &self.workers
    }
}

impl<W> Drop for PartitionedCounter<W> {
    fn drop(&mut self) {
        let global = self.global.get();
        let mut flushed = 0i64;
        for cell in self.cells.iter() {
            let value = cell.swap(0, Ordering::SeqCst);
            global.fetch_add(value, Ordering::SeqCst);
            flushed = flushed.wrapping_add(value);
        }
        log::trace!("partitioned counter {:?} flushed {flushed} on drop", self.name);
    }
}

impl<W> Debug for PartitionedCounter<W> {
    /// Formats the counter showing the accumulator and non-zero cells.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{{ global:{}",
            self.name,
            self.global.get().load(Ordering::SeqCst)
        )?;
        for (i, cell) in self.cells.iter().enumerate() {
            let val = cell.load(Ordering::SeqCst);
            if val != 0 {
                write!(f, " [{i}]:{val}")?;
            }
        }
        write!(f, " }}")
    }
}
