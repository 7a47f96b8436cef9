//! Per-worker reducers.
//!
//! A reducer keeps one cache-padded slot per worker; updates touch only the
//! caller's slot and reads combine all slots. This module provides:
//!
//! - [`ReducerSum`]: signed sum,
//! - [`ReducerMax`]: running maximum,
//! - [`ReducerVec`]: per-worker vectors concatenated on read.

use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

use crate::error::{try_alloc_slice, Result};
use crate::locks::spin::SpinMutex;
use crate::parallel::{self, DefaultBackend, Parallel};
use crate::worker::{ThreadSlots, WorkerContext};

/// A per-worker sum.
///
/// Reads aggregate all slots, writes touch one. All operations are
/// `Relaxed`: the reducer establishes no happens-before relationship, join
/// the workers before trusting [`get`](Self::get).
///
/// # Examples
///
/// ```rust
/// use ripartito::counters::reducer::ReducerSum;
///
/// let sum = ReducerSum::new().unwrap();
/// sum.add(10);
/// sum.inc();
/// sum.add(-4);
/// assert_eq!(sum.get(), 7);
/// ```
pub struct ReducerSum<W = ThreadSlots> {
    slots: Box<[CachePadded<AtomicI64>]>,
    workers: W,
}

impl ReducerSum<ThreadSlots> {
    /// Creates a sum with one slot per hardware thread.
    pub fn new() -> Result<Self> {
        Self::with_workers(ThreadSlots)
    }
}

impl<W: WorkerContext> ReducerSum<W> {
    /// Creates a sum with one slot per worker of `workers`.
    pub fn with_workers(workers: W) -> Result<Self> {
        let slots = try_alloc_slice("reducer slots", workers.num_workers().max(1), |_| {
            CachePadded::new(AtomicI64::new(0))
        })?;
        Ok(Self { slots, workers })
    }

    /// Sets the initial value, returning `self` for method chaining.
    pub fn with_initial(self, initial: i64) -> Self {
        self.add(initial);
        self
    }

    /// Adds `value` to the calling worker's slot.
    #[inline]
    pub fn add(&self, value: i64) {
        let idx = self.workers.current_worker_id() % self.slots.len();
        self.slots[idx].fetch_add(value, Ordering::Relaxed);
    }

    /// Adds one.
    #[inline]
    pub fn inc(&self) {
        self.add(1);
    }

    /// Returns the sum of all slots.
    pub fn get(&self) -> i64 {
        self.slots
            .iter()
            .map(|slot| slot.load(Ordering::Relaxed))
            .fold(0, i64::wrapping_add)
    }
}

impl<W> Debug for ReducerSum<W> {
    /// Formats the reducer showing non-zero slots.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReducerSum{{")?;
        for (i, slot) in self.slots.iter().enumerate() {
            let val = slot.load(Ordering::Relaxed);
            if val != 0 {
                write!(f, " [{i}]:{val}")?;
            }
        }
        write!(f, " }}")
    }
}

/// A per-worker maximum.
///
/// Slots start at zero, so [`get`](Self::get) is 0 until something larger
/// is observed.
///
/// # Examples
///
/// ```rust
/// use ripartito::counters::reducer::ReducerMax;
///
/// let max = ReducerMax::new().unwrap();
/// max.update(100);
/// max.update(150);
/// max.update(75);
/// assert_eq!(max.get(), 150);
/// ```
pub struct ReducerMax<W = ThreadSlots> {
    slots: Box<[CachePadded<AtomicU64>]>,
    workers: W,
}

impl ReducerMax<ThreadSlots> {
    /// Creates a maximum with one slot per hardware thread.
    pub fn new() -> Result<Self> {
        Self::with_workers(ThreadSlots)
    }
}

impl<W: WorkerContext> ReducerMax<W> {
    /// Creates a maximum with one slot per worker of `workers`.
    pub fn with_workers(workers: W) -> Result<Self> {
        let slots = try_alloc_slice("reducer slots", workers.num_workers().max(1), |_| {
            CachePadded::new(AtomicU64::new(0))
        })?;
        Ok(Self { slots, workers })
    }

    /// Observes `value`, raising the calling worker's slot if larger.
    #[inline]
    pub fn update(&self, value: u64) {
        let idx = self.workers.current_worker_id() % self.slots.len();
        self.slots[idx].fetch_max(value, Ordering::Relaxed);
    }

    /// Returns the maximum over all slots.
    pub fn get(&self) -> u64 {
        self.slots
            .iter()
            .map(|slot| slot.load(Ordering::Relaxed))
            .max()
            .unwrap_or(0)
    }
}

impl<W> Debug for ReducerMax<W> {
    /// Formats the reducer showing non-zero slots.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReducerMax{{")?;
        for (i, slot) in self.slots.iter().enumerate() {
            let val = slot.load(Ordering::Relaxed);
            if val != 0 {
                write!(f, " [{i}]:{val}")?;
            }
        }
        write!(f, " }}")
    }
}

/// Per-worker vectors, concatenated on read.
///
/// Each worker pushes into its own cache-padded vector, so pushes from
/// different workers never contend. Reads lock every slot (in slot order)
/// and copy them into one vector, in parallel on the reducer's backend.
///
/// # Examples
///
/// ```rust
/// use ripartito::counters::reducer::ReducerVec;
/// use ripartito::parallel::Serial;
///
/// let items = ReducerVec::with_backend(Serial).unwrap();
/// items.push(3);
/// items.push(1);
/// items.push(2);
/// assert_eq!(items.get(), vec![3, 1, 2]);
/// assert_eq!(items.get_sorted(), vec![1, 2, 3]);
/// ```
pub struct ReducerVec<T, P = DefaultBackend> {
    slots: Box<[CachePadded<SpinMutex<Vec<T>>>]>,
    backend: P,
}

impl<T> ReducerVec<T, DefaultBackend> {
    /// Creates a reducer with one vector per worker of the default backend.
    pub fn new() -> Result<Self> {
        Self::with_backend(DefaultBackend::default())
    }
}

impl<T, P: Parallel> ReducerVec<T, P> {
    /// Creates a reducer with one vector per worker of `backend`.
    pub fn with_backend(backend: P) -> Result<Self> {
        let slots = try_alloc_slice("reducer slots", backend.num_workers().max(1), |_| {
            CachePadded::new(SpinMutex::new(Vec::new()))
        })?;
        Ok(Self { slots, backend })
    }

    /// Appends `value` to the calling worker's vector.
    pub fn push(&self, value: T) {
        let idx = self.backend.current_worker_id() % self.slots.len();
        self.slots[idx].lock().push(value);
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        self.slots.iter().map(|slot| slot.lock().len()).sum()
    }

    /// Returns `true` if no element was pushed.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|slot| slot.lock().is_empty())
    }

    /// Calls `f` on every element, serially, in slot order.
    pub fn serial_for_each(&self, mut f: impl FnMut(&T)) {
        for slot in self.slots.iter() {
            slot.lock().iter().for_each(&mut f);
        }
    }

    /// Returns `found(e)` for the first element (in slot order) satisfying
    /// `matches`, or `default` if none does.
    pub fn find_first_match<R>(
        &self,
        matches: impl Fn(&T) -> bool,
        found: impl FnOnce(&T) -> R,
        default: R,
    ) -> R {
        for slot in self.slots.iter() {
            let guard = slot.lock();
            if let Some(e) = guard.iter().find(|e| matches(e)) {
                return found(e);
            }
        }
        default
    }
}

impl<T: Send + Sync, P: Parallel> ReducerVec<T, P> {
    /// Calls `f` on every element; slots are visited in parallel.
    pub fn for_each(&self, f: impl Fn(&T) + Send + Sync) {
        self.backend.run(0..self.slots.len(), |i| {
            self.slots[i].lock().iter().for_each(&f);
        });
    }
}

impl<T: Clone + Send + Sync, P: Parallel> ReducerVec<T, P> {
    /// Returns all elements, slot after slot.
    ///
    /// Every slot stays locked for the duration of the copy, so the result
    /// is a consistent snapshot.
    pub fn get(&self) -> Vec<T> {
        let guards: Vec<_> = self.slots.iter().map(|slot| slot.lock()).collect();
        let sizes: Vec<usize> = guards.iter().map(|guard| guard.len()).collect();
        parallel::gather(&self.backend, &sizes, |i, window| {
            for value in guards[i].iter() {
                window.push(value.clone());
            }
        })
    }

    /// Returns all elements, sorted.
    pub fn get_sorted(&self) -> Vec<T>
    where
        T: Ord,
    {
        let mut output = self.get();
        parallel::sort(&self.backend, &mut output);
        output
    }
}

impl<T, P> Debug for ReducerVec<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReducerVec")
            .field("slots", &self.slots.len())
            .finish()
    }
}
