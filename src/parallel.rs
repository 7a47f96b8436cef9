//! Thin dispatch layer over a parallel-execution backend.
//!
//! The sharded structures only need three things from a runtime:
//!
//! - [`Parallel::run`]: call `body(i)` for every `i` in a range, return when
//!   all calls are done;
//! - [`Parallel::run_two`]: run two closures, possibly concurrently;
//! - [`Parallel::run_each`]: hand each element of a slice to `body`, possibly
//!   concurrently.
//!
//! Scheduling is entirely the backend's business. Three backends ship with
//! the crate:
//!
//! | Backend | Execution |
//! |---------|-----------|
//! | [`Serial`] | the calling thread, in order |
//! | [`Scoped`] | `std::thread::scope`, one contiguous chunk per thread |
//! | `Rayon` (feature `rayon`) | the global rayon pool |
//!
//! [`DefaultBackend`] is `Rayon` when the feature is enabled and [`Scoped`]
//! otherwise.

use std::cmp::Ordering;
use std::ops::Range;
use std::thread;

use crate::worker::{hardware_concurrency, ThreadSlots, WorkerContext};

/// Below this length [`sort_by`] sorts serially.
pub const SERIAL_SORT_CUTOFF: usize = 10_000;

/// A parallel-execution backend.
///
/// Every backend is also a [`WorkerContext`], so structures that both
/// dispatch work and pick shards need a single capability.
pub trait Parallel: WorkerContext {
    /// Calls `body(i)` for each `i` in `range`; returns once all calls completed.
    fn run<F>(&self, range: Range<usize>, body: F)
    where
        F: Fn(usize) + Send + Sync;

    /// Runs `a` and `b`, possibly concurrently; returns once both completed.
    fn run_two<A, B, RA, RB>(&self, a: A, b: B) -> (RA, RB)
    where
        A: FnOnce() -> RA + Send,
        B: FnOnce() -> RB + Send,
        RA: Send,
        RB: Send;

    /// Calls `body(i, &mut items[i])` for every element; returns once all
    /// calls completed.
    fn run_each<T, F>(&self, items: &mut [T], body: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Send + Sync;
}

/// Runs everything on the calling thread.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Serial;

impl WorkerContext for Serial {
    #[inline]
    fn current_worker_id(&self) -> usize {
        0
    }

    #[inline]
    fn num_workers(&self) -> usize {
        1
    }
}

impl Parallel for Serial {
    fn run<F>(&self, range: Range<usize>, body: F)
    where
        F: Fn(usize) + Send + Sync,
    {
        range.for_each(body);
    }

    fn run_two<A, B, RA, RB>(&self, a: A, b: B) -> (RA, RB)
    where
        A: FnOnce() -> RA + Send,
        B: FnOnce() -> RB + Send,
        RA: Send,
        RB: Send,
    {
        let ra = a();
        (ra, b())
    }

    fn run_each<T, F>(&self, items: &mut [T], body: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Send + Sync,
    {
        for (i, item) in items.iter_mut().enumerate() {
            body(i, item);
        }
    }
}

/// Spawns scoped OS threads, splitting work into one contiguous chunk per
/// thread. The calling thread processes the first chunk itself.
///
/// There is no pool: every `run_two` spawns one thread, so callers that
/// recurse through it must bound their own depth, as [`sort_by`] does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scoped {
    threads: usize,
}

impl Scoped {
    /// Creates a backend using one thread per hardware core.
    pub fn new() -> Self {
        Self::with_threads(hardware_concurrency())
    }

    /// Creates a backend using at most `threads` threads (at least one).
    pub fn with_threads(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
        }
    }

    fn chunk_len(&self, len: usize) -> usize {
        len.div_ceil(self.threads).max(1)
    }
}

impl Default for Scoped {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerContext for Scoped {
    #[inline]
    fn current_worker_id(&self) -> usize {
        ThreadSlots.current_worker_id()
    }

    #[inline]
    fn num_workers(&self) -> usize {
        self.threads
    }
}

impl Parallel for Scoped {
    fn run<F>(&self, range: Range<usize>, body: F)
    where
        F: Fn(usize) + Send + Sync,
    {
        let len = range.len();
        if len <= 1 || self.threads == 1 {
            return range.for_each(body);
        }
        let chunk = self.chunk_len(len);
        let body = &body;
        thread::scope(|s| {
            let mut start = range.start + chunk;
            while start < range.end {
                let end = (start + chunk).min(range.end);
                s.spawn(move || (start..end).for_each(body));
                start = end;
            }
            (range.start..range.start + chunk).for_each(body);
        });
    }

    fn run_two<A, B, RA, RB>(&self, a: A, b: B) -> (RA, RB)
    where
        A: FnOnce() -> RA + Send,
        B: FnOnce() -> RB + Send,
        RA: Send,
        RB: Send,
    {
        if self.threads == 1 {
            return Serial.run_two(a, b);
        }
        thread::scope(|s| {
            let handle = s.spawn(b);
            let ra = a();
            match handle.join() {
                Ok(rb) => (ra, rb),
                Err(payload) => std::panic::resume_unwind(payload),
            }
        })
    }

    fn run_each<T, F>(&self, items: &mut [T], body: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Send + Sync,
    {
        if items.len() <= 1 || self.threads == 1 {
            return Serial.run_each(items, body);
        }
        let chunk = self.chunk_len(items.len());
        let body = &body;
        thread::scope(|s| {
            let mut chunks = items.chunks_mut(chunk).enumerate();
            let first = chunks.next();
            for (n, part) in chunks {
                s.spawn(move || {
                    for (j, item) in part.iter_mut().enumerate() {
                        body(n * chunk + j, item);
                    }
                });
            }
            if let Some((_, part)) = first {
                for (j, item) in part.iter_mut().enumerate() {
                    body(j, item);
                }
            }
        });
    }
}

/// Dispatches to the global rayon thread pool.
#[cfg(feature = "rayon")]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Rayon;

#[cfg(feature = "rayon")]
impl WorkerContext for Rayon {
    #[inline]
    fn current_worker_id(&self) -> usize {
        crate::worker::RayonWorkers.current_worker_id()
    }

    #[inline]
    fn num_workers(&self) -> usize {
        crate::worker::RayonWorkers.num_workers()
    }
}

#[cfg(feature = "rayon")]
impl Parallel for Rayon {
    fn run<F>(&self, range: Range<usize>, body: F)
    where
        F: Fn(usize) + Send + Sync,
    {
        use rayon::prelude::*;
        range.into_par_iter().for_each(body);
    }

    fn run_two<A, B, RA, RB>(&self, a: A, b: B) -> (RA, RB)
    where
        A: FnOnce() -> RA + Send,
        B: FnOnce() -> RB + Send,
        RA: Send,
        RB: Send,
    {
        rayon::join(a, b)
    }

    fn run_each<T, F>(&self, items: &mut [T], body: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Send + Sync,
    {
        use rayon::prelude::*;
        items
            .par_iter_mut()
            .enumerate()
            .for_each(|(i, item)| body(i, item));
    }
}

/// Backend used when none is given explicitly.
#[cfg(feature = "rayon")]
pub type DefaultBackend = Rayon;

/// Backend used when none is given explicitly.
#[cfg(not(feature = "rayon"))]
pub type DefaultBackend = Scoped;

/// Returns the exclusive prefix sums of `sizes`, with the grand total appended.
///
/// ```rust
/// use ripartito::parallel::prefix_sums;
///
/// assert_eq!(prefix_sums(&[3, 0, 2]), vec![0, 3, 3, 5]);
/// ```
pub fn prefix_sums(sizes: &[usize]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(sizes.len() + 1);
    let mut total = 0;
    offsets.push(total);
    for size in sizes {
        total += size;
        offsets.push(total);
    }
    offsets
}

/// One part's slice of the output buffer being filled by [`gather`].
pub struct Window<'a, T> {
    slots: &'a mut [Option<T>],
    filled: usize,
}

impl<T> Window<'_, T> {
    /// Appends `value` to this window.
    ///
    /// # Panics
    ///
    /// Panics if the window is already full.
    #[inline]
    pub fn push(&mut self, value: T) {
        assert!(
            self.filled < self.slots.len(),
            "window overflow: part is larger than its declared size"
        );
        self.slots[self.filled] = Some(value);
        self.filled += 1;
    }

    /// Number of slots still to fill.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.slots.len() - self.filled
    }
}

/// Concatenates `sizes.len()` parts into one vector.
///
/// Each part `i` receives a window of exactly `sizes[i]` slots, placed at the
/// prefix sum of the sizes before it, and `fill(i, window)` must push exactly
/// that many values. Parts are filled in parallel on `backend`.
///
/// # Panics
///
/// Panics if a part pushes more or fewer values than its declared size.
pub fn gather<P, T, F>(backend: &P, sizes: &[usize], fill: F) -> Vec<T>
where
    P: Parallel + ?Sized,
    T: Send,
    F: Fn(usize, &mut Window<'_, T>) + Send + Sync,
{
    let offsets = prefix_sums(sizes);
    let total = offsets[sizes.len()];
    let mut slots: Vec<Option<T>> = Vec::with_capacity(total);
    slots.resize_with(total, || None);

    let mut windows = Vec::with_capacity(sizes.len());
    let mut rest = slots.as_mut_slice();
    for part in offsets.windows(2) {
        let (head, tail) = std::mem::take(&mut rest).split_at_mut(part[1] - part[0]);
        windows.push(Window {
            slots: head,
            filled: 0,
        });
        rest = tail;
    }

    backend.run_each(&mut windows, |i, window| fill(i, window));
    assert!(
        windows.iter().all(|w| w.remaining() == 0),
        "window underflow: part is smaller than its declared size"
    );
    drop(windows);

    slots.into_iter().flatten().collect()
}

/// Sorts `slice` in ascending order on `backend`.
pub fn sort<P, T>(backend: &P, slice: &mut [T])
where
    P: Parallel + ?Sized,
    T: Ord + Clone + Send,
{
    sort_by(backend, slice, T::cmp);
}

/// Sorts `slice` with `compare` on `backend`.
///
/// Slices shorter than [`SERIAL_SORT_CUTOFF`] are sorted serially; longer
/// ones are split in halves sorted with [`Parallel::run_two`] and merged.
/// Splitting stops once every one of `backend.num_workers()` workers has a
/// part, so a [`Scoped`] backend never runs more than its thread count. The
/// sort is stable.
pub fn sort_by<P, T, F>(backend: &P, slice: &mut [T], compare: F)
where
    P: Parallel + ?Sized,
    T: Clone + Send,
    F: Fn(&T, &T) -> Ordering + Sync,
{
    merge_sort(backend, slice, &compare, backend.num_workers());
}

/// `budget` is the number of workers this call may occupy; it is split
/// between the two halves, and a call with a budget of one sorts serially.
fn merge_sort<P, T, F>(backend: &P, slice: &mut [T], compare: &F, budget: usize)
where
    P: Parallel + ?Sized,
    T: Clone + Send,
    F: Fn(&T, &T) -> Ordering + Sync,
{
    if slice.len() < SERIAL_SORT_CUTOFF || budget <= 1 {
        slice.sort_by(compare);
        return;
    }
    let mid = slice.len() / 2;
    let (left, right) = slice.split_at_mut(mid);
    let left_budget = budget / 2;
    backend.run_two(
        || merge_sort(backend, left, compare, left_budget),
        || merge_sort(backend, right, compare, budget - left_budget),
    );

    let mut merged = Vec::with_capacity(slice.len());
    let (left, right) = slice.split_at(mid);
    let (mut i, mut j) = (0, 0);
    while i < left.len() && j < right.len() {
        if compare(&right[j], &left[i]) == Ordering::Less {
            merged.push(right[j].clone());
            j += 1;
        } else {
            merged.push(left[i].clone());
            i += 1;
        }
    }
    merged.extend_from_slice(&left[i..]);
    merged.extend_from_slice(&right[j..]);
    slice.clone_from_slice(&merged);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    fn check_run<P: Parallel>(backend: &P) {
        let hits: Vec<AtomicUsize> = (0..1000).map(|_| AtomicUsize::new(0)).collect();
        backend.run(0..1000, |i| {
            hits[i].fetch_add(1, AtomicOrdering::Relaxed);
        });
        assert!(hits.iter().all(|h| h.load(AtomicOrdering::Relaxed) == 1));
    }

    fn check_run_each<P: Parallel>(backend: &P) {
        let mut items = vec![0usize; 257];
        backend.run_each(&mut items, |i, item| *item = i * 2);
        assert!(items.iter().enumerate().all(|(i, v)| *v == i * 2));
    }

    #[test]
    fn test_serial() {
        check_run(&Serial);
        check_run_each(&Serial);
        assert_eq!(Serial.run_two(|| 1, || "two"), (1, "two"));
        assert_eq!(Serial.num_workers(), 1);
        assert_eq!(Serial.current_worker_id(), 0);
    }

    #[test]
    fn test_scoped() {
        for threads in [1, 2, 3, 8] {
            let backend = Scoped::with_threads(threads);
            check_run(&backend);
            check_run_each(&backend);
            assert_eq!(backend.run_two(|| 1, || 2), (1, 2));
            assert_eq!(backend.num_workers(), threads);
        }
    }

    #[test]
    fn test_scoped_offset_range() {
        let sum = AtomicUsize::new(0);
        Scoped::with_threads(4).run(10..20, |i| {
            sum.fetch_add(i, AtomicOrdering::Relaxed);
        });
        assert_eq!(sum.into_inner(), (10..20).sum::<usize>());
    }

    #[test]
    fn test_scoped_zero_threads_means_one() {
        assert_eq!(Scoped::with_threads(0).num_workers(), 1);
    }

    #[test]
    #[should_panic(expected = "boom")]
    fn test_scoped_run_two_propagates_panic() {
        Scoped::with_threads(2).run_two(|| (), || panic!("boom"));
    }

    #[test]
    fn test_prefix_sums() {
        assert_eq!(prefix_sums(&[]), vec![0]);
        assert_eq!(prefix_sums(&[1, 2, 3]), vec![0, 1, 3, 6]);
    }

    #[test]
    fn test_gather() {
        let parts = vec![vec![1, 2], vec![], vec![3, 4, 5], vec![6]];
        let sizes: Vec<usize> = parts.iter().map(Vec::len).collect();
        let out = gather(&Scoped::with_threads(3), &sizes, |i, window| {
            for v in &parts[i] {
                window.push(*v);
            }
        });
        assert_eq!(out, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    #[should_panic(expected = "window underflow")]
    fn test_gather_underflow() {
        gather::<_, u32, _>(&Serial, &[2], |_, window| window.push(1));
    }

    #[test]
    #[should_panic(expected = "window overflow")]
    fn test_gather_overflow() {
        gather::<_, u32, _>(&Serial, &[1], |_, window| {
            window.push(1);
            window.push(2);
        });
    }

    #[test]
    fn test_sort_small_and_large() {
        let mut small = vec![5, 3, 9, 1];
        sort(&Serial, &mut small);
        assert_eq!(small, vec![1, 3, 5, 9]);

        let mut large: Vec<u64> = (0..50_000u64).map(|i| (i * 7919) % 50_000).collect();
        sort(&Scoped::with_threads(4), &mut large);
        assert!(large.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(large.len(), 50_000);
    }

    #[test]
    fn test_sort_stays_within_thread_count() {
        use std::collections::HashSet;
        use std::sync::Mutex;

        for threads in [1, 2, 4] {
            let seen = Mutex::new(HashSet::new());
            let mut values: Vec<u32> = (0..200_000u32).rev().collect();
            sort_by(&Scoped::with_threads(threads), &mut values, |a, b| {
                seen.lock().unwrap().insert(thread::current().id());
                a.cmp(b)
            });
            assert!(values.windows(2).all(|w| w[0] <= w[1]));
            let used = seen.into_inner().unwrap().len();
            assert!(used <= threads, "{used} threads used with {threads}");
        }
    }

    #[test]
    fn test_gather_moves_non_clone_values() {
        let sizes = [3, 0, 2];
        let out: Vec<Box<usize>> = gather(&Scoped::with_threads(2), &sizes, |i, window| {
            for j in 0..sizes[i] {
                window.push(Box::new(i * 10 + j));
            }
        });
        let out: Vec<usize> = out.into_iter().map(|b| *b).collect();
        assert_eq!(out, vec![0, 1, 2, 20, 21]);
    }

    #[test]
    fn test_sort_by_is_stable() {
        let mut pairs: Vec<(u32, usize)> = (0..30_000).map(|i| ((i % 3) as u32, i)).collect();
        sort_by(&Scoped::with_threads(2), &mut pairs, |a, b| a.0.cmp(&b.0));
        assert!(pairs
            .windows(2)
            .all(|w| w[0].0 < w[1].0 || (w[0].0 == w[1].0 && w[0].1 < w[1].1)));
    }
}
