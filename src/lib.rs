//! # Ripartito - Partitioned Counters, Scalable Locks and Sharded Maps
//!
//! Low-level concurrency primitives for parallel programs where many workers
//! hit the same shared object at once. Every structure in this crate is
//! **partitioned**: instead of one hot memory location, state is spread over
//! an array of cache-padded cells, and each worker mostly touches its own.
//!
//! ## The Problem
//!
//! A reader-writer lock built on a single reader count turns every
//! `read_lock` into a write to a shared cache line. With many cores taking
//! read locks concurrently, the line bounces between caches and "shared"
//! access serializes in hardware even though no writer is around. The same
//! happens to a single atomic counter, and to a hash map behind one lock.
//!
//! ## The Solution: Partitioning
//!
//! 1. **[`PartitionedCounter`](counters::partitioned::PartitionedCounter)**:
//!    one cell per shard plus a global accumulator. Updates land in the
//!    caller's cell and are flushed to the accumulator only when the cell
//!    drifts past a threshold, or on [`sync`](counters::partitioned::PartitionedCounter::sync).
//!
//! 2. **[`ReaderWriterLock`](locks::rwlock::ReaderWriterLock)**: the reader
//!    count is a partitioned counter, so readers on different workers never
//!    share a cache line. A writer raises a flag, then flushes the counter
//!    until it reads zero.
//!
//! 3. **[`ShardedMap`](map::ShardedMap)**: a power-of-two array of hash maps,
//!    each behind its own spin lock. Keys in different shards never contend.
//!
//! Which cell a caller uses comes from its worker id, provided by a
//! [`WorkerContext`](worker::WorkerContext): per-thread slots by default,
//! or any runtime's notion of a worker.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::thread;
//! use ripartito::locks::rwlock::ReaderWriterLock;
//! use ripartito::map::ShardedMap;
//!
//! let lock = Arc::new(ReaderWriterLock::new()?);
//! let map = Arc::new(ShardedMap::new()?);
//!
//! let handles: Vec<_> = (0..4u32)
//!     .map(|t| {
//!         let (lock, map) = (Arc::clone(&lock), Arc::clone(&map));
//!         thread::spawn(move || {
//!             let _read = lock.read();
//!             map.insert(t, t * 10);
//!         })
//!     })
//!     .collect();
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//!
//! let _write = lock.write();
//! assert_eq!(map.len(), 4);
//! assert_eq!(map.value(&2, 0), 20);
//! # Ok::<(), ripartito::Error>(())
//! ```
//!
//! ## Modules
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`counters`] | partitioned counter, per-worker reducers |
//! | [`locks`] | spin locks, scalable reader-writer lock |
//! | [`map`] | sharded hash map and multimap |
//! | [`parallel`] | backend abstraction, parallel gather and sort |
//! | [`worker`] | worker id providers |
//! | `snapshot` | serializable state captures (feature `serde`) |
//!
//! ## Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `serde` | `snapshot` types and `Serialize` for [`LockState`](locks::rwlock::LockState) |
//! | `json` | JSON rendering of snapshots |
//! | `rayon` | rayon-backed `parallel::Rayon` backend and `worker::RayonWorkers` |
//! | `full` | `json` and `rayon` |
//!
//! ## Logging
//!
//! The crate logs through the [`log`] facade: construction at `debug`,
//! fallbacks at `warn`, teardown at `trace`. Hot paths never log.

pub mod counters;
pub mod locks;
pub mod map;
pub mod parallel;
pub mod worker;

mod error;

#[cfg(feature = "serde")]
pub mod snapshot;

pub use error::{Error, Result};
