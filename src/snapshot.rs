//! Serializable snapshots of counters, locks and maps.
//!
//! A snapshot copies the observable state of a primitive at one moment. It
//! is plain data: serialize it with any serde format.
//!
//! # Feature Flag
//!
//! This module requires the `serde` feature; [`to_json`] and
//! [`to_json_pretty`] additionally require `json`.
//!
//! ```toml
//! [dependencies]
//! ripartito = { version = "0.1", features = ["json"] }
//! ```
//!
//! # Examples
//!
//! ```rust
//! use ripartito::counters::partitioned::PartitionedCounter;
//! use ripartito::snapshot::CounterSnapshot;
//!
//! let counter = PartitionedCounter::new(4, 8).unwrap().with_name("requests");
//! counter.add_at(3, 0);
//! counter.add_at(2, 1);
//!
//! let snapshot = CounterSnapshot::from_counter(&counter);
//! assert_eq!(snapshot.name, "requests");
//! assert_eq!(snapshot.global, 0);
//! assert_eq!(snapshot.cells, vec![3, 2, 0, 0]);
//! assert_eq!(snapshot.total(), 5);
//! ```

use serde::{Deserialize, Serialize};

use crate::counters::partitioned::PartitionedCounter;
use crate::locks::rwlock::{LockState, ReaderWriterLock};
use crate::map::ShardedMap;
use crate::worker::WorkerContext;

#[cfg(feature = "json")]
use crate::error::Result;

/// Global accumulator and per-shard cells of a
/// [`PartitionedCounter`].
///
/// Cells are read one by one while writers may be running, so the snapshot
/// is only exact for a quiescent counter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CounterSnapshot {
    /// Counter name, `"(unnamed)"` when none was given.
    pub name: String,
    /// Value of the global accumulator.
    pub global: i64,
    /// Unflushed value of every shard.
    pub cells: Vec<i64>,
    /// Flush threshold.
    pub threshold: i64,
}

impl CounterSnapshot {
    /// Captures `counter` without flushing it.
    pub fn from_counter<W: WorkerContext>(counter: &PartitionedCounter<W>) -> Self {
        let name = match counter.name() {
            "" => "(unnamed)".to_string(),
            name => name.to_string(),
        };
        Self {
            name,
            global: counter.global(),
            cells: counter.local_values().collect(),
            threshold: counter.threshold(),
        }
    }

    /// Global value plus every unflushed cell.
    pub fn total(&self) -> i64 {
        self.cells
            .iter()
            .fold(self.global, |acc, cell| acc.wrapping_add(*cell))
    }
}

/// State of a [`ReaderWriterLock`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockSnapshot {
    /// Lock state at capture time.
    pub state: LockState,
    /// Reader counter behind the lock.
    pub readers: CounterSnapshot,
}

impl LockSnapshot {
    /// Captures `lock`.
    pub fn from_lock<W: WorkerContext>(lock: &ReaderWriterLock<W>) -> Self {
        Self {
            state: lock.state(),
            readers: CounterSnapshot::from_counter(lock.readers()),
        }
    }
}

/// Shard occupancy of a [`ShardedMap`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MapSnapshot {
    /// Number of shards.
    pub shards: usize,
    /// Entries per shard.
    pub shard_sizes: Vec<usize>,
    /// Total entries.
    pub len: usize,
}

impl MapSnapshot {
    /// Captures `map`, locking one shard at a time.
    pub fn from_map<K, V, S, P>(map: &ShardedMap<K, V, S, P>) -> Self
    where
        K: Eq + std::hash::Hash,
        S: std::hash::BuildHasher,
    {
        let shard_sizes = map.shard_sizes();
        Self {
            shards: shard_sizes.len(),
            len: shard_sizes.iter().sum(),
            shard_sizes,
        }
    }

    /// Size of the largest shard.
    pub fn max_shard(&self) -> usize {
        self.shard_sizes.iter().copied().max().unwrap_or(0)
    }
}

/// Serializes a snapshot to compact JSON.
///
/// ```rust
/// use ripartito::snapshot::{to_json, MapSnapshot};
///
/// let snapshot = MapSnapshot { shards: 2, shard_sizes: vec![1, 0], len: 1 };
/// assert_eq!(
///     to_json(&snapshot).unwrap(),
///     r#"{"shards":2,"shard_sizes":[1,0],"len":1}"#
/// );
/// ```
#[cfg(feature = "json")]
pub fn to_json<T: Serialize>(snapshot: &T) -> Result<String> {
    Ok(serde_json::to_string(snapshot)?)
}

/// Serializes a snapshot to indented JSON.
#[cfg(feature = "json")]
pub fn to_json_pretty<T: Serialize>(snapshot: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(snapshot)?)
}
