use std::borrow::Borrow;
use std::fmt::{self, Debug};
use std::hash::{BuildHasher, Hash};

use hashbrown::DefaultHashBuilder;

use crate::error::Result;
use crate::map::ShardedMap;
use crate::parallel::{DefaultBackend, Parallel};

/// A sharded map holding any number of values per key.
///
/// Values under one key keep their insertion order.
///
/// ```rust
/// use ripartito::map::ShardedMultiMap;
///
/// let map = ShardedMultiMap::new().unwrap();
/// map.insert("fruit", "apple");
/// map.insert("fruit", "pear");
/// map.insert("veg", "leek");
///
/// assert_eq!(map.count(&"fruit"), 2);
/// assert_eq!(map.equal_range(&"fruit"), vec!["apple", "pear"]);
/// assert_eq!(map.len(), 3);
///
/// assert_eq!(map.remove_all(&"fruit"), vec!["apple", "pear"]);
/// assert!(map.equal_range(&"fruit").is_empty());
/// ```
pub struct ShardedMultiMap<K, V, S = DefaultHashBuilder, P = DefaultBackend> {
    inner: ShardedMap<K, Vec<V>, S, P>,
}

impl<K, V> ShardedMultiMap<K, V> {
    /// Creates a multimap with the default shard layout.
    pub fn new() -> Result<Self> {
        Ok(Self {
            inner: ShardedMap::new()?,
        })
    }

    /// Creates a multimap with `num_shards` shards, rounded up to a power
    /// of two.
    pub fn with_shards(num_shards: usize) -> Result<Self> {
        Ok(Self {
            inner: ShardedMap::with_shards(num_shards)?,
        })
    }
}

impl<K, V, S: Clone, P: Parallel> ShardedMultiMap<K, V, S, P> {
    /// Creates a multimap with an explicit hasher, backend and shard count.
    pub fn with_layout(hasher: S, backend: P, num_shards: usize) -> Result<Self> {
        Ok(Self {
            inner: ShardedMap::with_layout(hasher, backend, num_shards)?,
        })
    }
}

impl<K, V, S, P> ShardedMultiMap<K, V, S, P> {
    /// Number of shards.
    pub fn num_shards(&self) -> usize {
        self.inner.num_shards()
    }
}

impl<K, V, S, P> ShardedMultiMap<K, V, S, P>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    /// Appends `value` to the values under `key`.
    pub fn insert(&self, key: K, value: V) {
        self.inner.lock_shard(&key).entry(key).or_default().push(value);
    }

    /// Copies of every value under `key`, in insertion order.
    pub fn equal_range<Q>(&self, key: &Q) -> Vec<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.inner
            .lock_shard(key)
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of values under `key`.
    pub fn count<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock_shard(key).get(key).map_or(0, Vec::len)
    }

    /// Returns `true` if at least one value is stored under `key`.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.contains(key)
    }

    /// Removes `key`, returning all its values.
    pub fn remove_all<Q>(&self, key: &Q) -> Vec<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.remove(key).unwrap_or_default()
    }

    /// Total number of values, over all keys.
    pub fn len(&self) -> usize {
        let mut total = 0;
        self.inner.for_each_shard(|shard| {
            total += shard.values().map(Vec::len).sum::<usize>();
        });
        total
    }

    /// Number of distinct keys.
    pub fn key_count(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if no value is stored.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Removes every key.
    pub fn clear(&self) {
        self.inner.clear();
    }
}

impl<K, V, S, P> Debug for ShardedMultiMap<K, V, S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardedMultiMap")
            .field("shards", &self.inner.num_shards())
            .finish()
    }
}
