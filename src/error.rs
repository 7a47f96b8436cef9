//! Unified error type for the crate.
//!
//! Every fallible constructor returns [`Result`], so callers handle
//! construction failures of counters, locks, maps and reducers the same way.
//! Ordinary runtime conditions (a key that is not present, a lock that is
//! busy) are never errors: they are reported through `bool` or `Option`.
//!
//! # Example
//!
//! ```rust
//! use ripartito::counters::partitioned::PartitionedCounter;
//! use ripartito::{Error, Result};
//!
//! fn build() -> Result<PartitionedCounter> {
//!     PartitionedCounter::new(8, 8)
//! }
//!
//! assert!(build().is_ok());
//! assert!(matches!(
//!     PartitionedCounter::new(8, -1),
//!     Err(Error::InvalidThreshold(-1))
//! ));
//! ```

use std::collections::TryReserveError;

use thiserror::Error;

/// Errors reported by the constructors of this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The shard (or cell) array could not be allocated.
    ///
    /// The component is not constructed at all in this case.
    #[error("failed to allocate {requested} {what}: {source}")]
    Allocation {
        /// What was being allocated (e.g. `"counter cells"`).
        what: &'static str,
        /// Number of elements requested.
        requested: usize,
        /// The underlying allocator error.
        #[source]
        source: TryReserveError,
    },

    /// A shard count of zero was given where at least one shard is required.
    #[error("{what} requires at least one shard")]
    ZeroShards {
        /// The component being constructed.
        what: &'static str,
    },

    /// The flush threshold of a partitioned counter must not be negative.
    #[error("invalid threshold {0}: must be >= 0")]
    InvalidThreshold(i64),

    /// Error from JSON serialization of a snapshot.
    #[cfg(feature = "json")]
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Allocates a boxed slice of `len` elements produced by `init`, reporting
/// allocation failure instead of aborting.
pub(crate) fn try_alloc_slice<T>(
    what: &'static str,
    len: usize,
    mut init: impl FnMut(usize) -> T,
) -> Result<Box<[T]>> {
    let mut slots = Vec::new();
    slots
        .try_reserve_exact(len)
        .map_err(|source| Error::Allocation {
            what,
            requested: len,
            source,
        })?;
    slots.extend((0..len).map(&mut init));
    Ok(slots.into_boxed_slice())
}
