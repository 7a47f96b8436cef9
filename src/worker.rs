//! Worker identity: which shard should the current thread touch?
//!
//! Every sharded structure in this crate picks the shard it updates from a
//! small integer identifying the calling worker. That integer only spreads
//! contention; correctness never depends on it, and two workers sharing an id
//! merely contend on the same cache line.
//!
//! The identity is supplied by a [`WorkerContext`], injected into each
//! structure at construction, so tests can run with deterministic ids:
//!
//! | Provider | Id source | Workers |
//! |----------|-----------|---------|
//! | [`ThreadSlots`] | round-robin thread-local slot | hardware concurrency |
//! | [`FixedWorker`] | a constant | configurable |
//! | `RayonWorkers` (feature `rayon`) | rayon thread index | rayon pool size |
//!
//! # Thread Slot Assignment
//!
//! [`ThreadSlots`] assigns ids the first time a thread asks for one: the
//! first thread gets 0, the second 1, and so on. The id is stable for the
//! lifetime of the thread.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

/// Worker count assumed when hardware parallelism cannot be queried.
pub const FALLBACK_PARALLELISM: usize = 8;

/// Global counter for assigning slot ids to threads.
static NEXT_SLOT_ID: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    /// Slot id of the current thread, assigned lazily on first use.
    static THREAD_SLOT_INDEX: usize = NEXT_SLOT_ID.fetch_add(1, Ordering::Relaxed);
}

/// Supplies the identity of the calling worker and the number of workers.
///
/// Implementations must be cheap: `current_worker_id` is called on every
/// counter update and every lock acquisition that does not carry an explicit
/// shard hint.
pub trait WorkerContext: Send + Sync {
    /// Returns a small non-negative integer identifying the calling worker.
    ///
    /// The value must be stable for the duration of one task. Callers reduce
    /// it modulo their shard count.
    fn current_worker_id(&self) -> usize;

    /// Returns the number of workers expected to run concurrently.
    fn num_workers(&self) -> usize;
}

impl<W: WorkerContext + ?Sized> WorkerContext for &W {
    #[inline]
    fn current_worker_id(&self) -> usize {
        (**self).current_worker_id()
    }

    #[inline]
    fn num_workers(&self) -> usize {
        (**self).num_workers()
    }
}

impl<W: WorkerContext + ?Sized> WorkerContext for Arc<W> {
    #[inline]
    fn current_worker_id(&self) -> usize {
        (**self).current_worker_id()
    }

    #[inline]
    fn num_workers(&self) -> usize {
        (**self).num_workers()
    }
}

/// Returns the hardware concurrency of this machine.
///
/// Queried once and cached. Falls back to [`FALLBACK_PARALLELISM`] when the
/// platform cannot report it.
pub fn hardware_concurrency() -> usize {
    static PARALLELISM: OnceLock<usize> = OnceLock::new();
    *PARALLELISM.get_or_init(|| {
        std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or_else(|err| {
                log::warn!(
                    "failed to detect hardware concurrency ({err}), defaulting to {FALLBACK_PARALLELISM}"
                );
                FALLBACK_PARALLELISM
            })
    })
}

/// Default worker provider: one round-robin slot per OS thread.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ThreadSlots;

impl WorkerContext for ThreadSlots {
    #[inline]
    fn current_worker_id(&self) -> usize {
        THREAD_SLOT_INDEX.with(|idx| *idx)
    }

    #[inline]
    fn num_workers(&self) -> usize {
        hardware_concurrency()
    }
}

/// A provider that always reports the same worker id.
///
/// Useful in tests that need to know exactly which shard an update lands on.
///
/// # Examples
///
/// ```rust
/// use ripartito::worker::{FixedWorker, WorkerContext};
///
/// let worker = FixedWorker::new(3).with_workers(4);
/// assert_eq!(worker.current_worker_id(), 3);
/// assert_eq!(worker.num_workers(), 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWorker {
    id: usize,
    workers: usize,
}

impl FixedWorker {
    /// Creates a provider reporting `id` and a single worker.
    pub const fn new(id: usize) -> Self {
        Self { id, workers: 1 }
    }

    /// Sets the reported worker count, returning `self` for method chaining.
    pub const fn with_workers(self, workers: usize) -> Self {
        Self { workers, ..self }
    }
}

impl WorkerContext for FixedWorker {
    #[inline]
    fn current_worker_id(&self) -> usize {
        self.id
    }

    #[inline]
    fn num_workers(&self) -> usize {
        self.workers
    }
}

/// Worker identity taken from the current rayon thread pool.
///
/// Threads outside the pool all report `current_num_threads()`, one past the
/// last pool index.
#[cfg(feature = "rayon")]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RayonWorkers;

#[cfg(feature = "rayon")]
impl WorkerContext for RayonWorkers {
    #[inline]
    fn current_worker_id(&self) -> usize {
        rayon::current_thread_index().unwrap_or_else(rayon::current_num_threads)
    }

    #[inline]
    fn num_workers(&self) -> usize {
        rayon::current_num_threads()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn test_thread_slot_is_stable() {
        let slots = ThreadSlots;
        let first = slots.current_worker_id();
        for _ in 0..100 {
            assert_eq!(slots.current_worker_id(), first);
        }
    }

    #[test]
    fn test_thread_slots_are_distinct() {
        let handles: Vec<_> = (0..8)
            .map(|_| thread::spawn(|| ThreadSlots.current_worker_id()))
            .collect();
        let ids: HashSet<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(ids.len(), 8);
    }

    #[test]
    fn test_hardware_concurrency() {
        assert!(hardware_concurrency() >= 1);
        assert_eq!(ThreadSlots.num_workers(), hardware_concurrency());
    }

    #[test]
    fn test_fixed_worker() {
        let worker = FixedWorker::new(7);
        assert_eq!(worker.current_worker_id(), 7);
        assert_eq!(worker.num_workers(), 1);
        assert_eq!(worker.with_workers(16).num_workers(), 16);
    }

    #[test]
    fn test_references_and_arcs() {
        let worker = FixedWorker::new(2);
        let by_ref: &dyn WorkerContext = &worker;
        assert_eq!(by_ref.current_worker_id(), 2);
        let shared = Arc::new(worker);
        assert_eq!(shared.current_worker_id(), 2);
    }
}
