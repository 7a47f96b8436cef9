//! Sharded concurrent hash maps.
//!
//! A sharded map is a fixed array of independent [`hashbrown::HashMap`]s,
//! each behind its own [`SpinMutex`](crate::locks::spin::SpinMutex) and
//! cache-padded so that two shards never share a cache line. A key always
//! lives in the shard picked by the top bits of its hash:
//!
//! ```text
//!   key ──hash──► h: u64 ──(h >> 32) & (B - 1)──► shard index
//! ```
//!
//! Using the high half decorrelates the shard choice from the low bits,
//! which the per-shard table already uses for its own buckets.
//!
//! Operations on keys in different shards run fully in parallel; operations
//! on keys in the same shard are serialized by that shard's lock. There is
//! no global lock: whole-map operations visit shards one by one (or in
//! parallel on the map's backend).
//!
//! # Shard count
//!
//! `B = next_power_of_two(workers × blow_up_factor)`, with a default
//! blow-up factor of [`DEFAULT_BLOW_UP_FACTOR`]: with many more shards than
//! workers, two workers rarely hit the same shard at the same time.

mod multi;
mod sharded;

pub use hashbrown::DefaultHashBuilder;
pub use multi::ShardedMultiMap;
pub use sharded::ShardedMap;

/// Shards per worker used by the default constructors.
pub const DEFAULT_BLOW_UP_FACTOR: usize = 10;

/// Returns the shard count for `workers` workers and the given blow-up
/// factor: the next power of two of their product (at least 1).
///
/// ```rust
/// use ripartito::map::shard_count;
///
/// assert_eq!(shard_count(8, 10), 128);
/// assert_eq!(shard_count(1, 1), 1);
/// assert_eq!(shard_count(3, 3), 16);
/// ```
pub fn shard_count(workers: usize, blow_up_factor: usize) -> usize {
    workers
        .max(1)
        .saturating_mul(blow_up_factor.max(1))
        .checked_next_power_of_two()
        .unwrap_or(1 << (usize::BITS - 1))
}

/// Maps a 64-bit hash to one of `num_shards` shards (a power of two).
#[inline]
pub(crate) fn shard_of(hash: u64, num_shards: usize) -> usize {
    ((hash >> 32) as usize) & (num_shards - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_count() {
        assert_eq!(shard_count(0, 0), 1);
        assert_eq!(shard_count(4, 10), 64);
        assert_eq!(shard_count(16, 10), 256);
        assert_eq!(shard_count(usize::MAX, 2), 1 << (usize::BITS - 1));
    }

    #[test]
    fn test_shard_of_uses_high_bits() {
        assert_eq!(shard_of(0x0000_0003_ffff_ffff, 4), 3);
        assert_eq!(shard_of(0x0000_0000_ffff_ffff, 4), 0);
        assert_eq!(shard_of(u64::MAX, 1), 0);
    }
}
