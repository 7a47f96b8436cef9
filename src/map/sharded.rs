use std::borrow::Borrow;
use std::fmt::{self, Debug};
use std::hash::{BuildHasher, Hash};

use crossbeam_utils::CachePadded;
use hashbrown::hash_map::Entry;
use hashbrown::{DefaultHashBuilder, HashMap};

use crate::error::{try_alloc_slice, Error, Result};
use crate::locks::spin::{SpinMutex, SpinMutexGuard};
use crate::map::{shard_count, shard_of, DEFAULT_BLOW_UP_FACTOR};
use crate::parallel::{self, DefaultBackend, Parallel};

type Shard<K, V, S> = CachePadded<SpinMutex<HashMap<K, V, S>>>;

/// A concurrent hash map with one exclusive lock per shard.
///
/// Lookups copy values out (`V: Clone`), so nothing returned by the map
/// borrows a shard after its lock is released.
///
/// # Examples
///
/// ```rust
/// use ripartito::map::ShardedMap;
///
/// let map = ShardedMap::new().unwrap();
///
/// assert_eq!(map.insert("a", 1), (true, 1));
/// assert_eq!(map.insert("a", 2), (false, 1)); // already present
/// assert_eq!(map.value(&"a", 0), 1);
///
/// map.insert_or_assign("a", 3);
/// assert_eq!(map.value(&"a", 0), 3);
///
/// map.remove(&"a");
/// assert!(!map.contains(&"a"));
/// assert_eq!(map.value(&"a", 0), 0);
/// ```
///
/// Sharing across threads:
///
/// ```rust
/// use std::sync::Arc;
/// use std::thread;
/// use ripartito::map::ShardedMap;
///
/// let map = Arc::new(ShardedMap::new().unwrap());
/// let handles: Vec<_> = (0..4u64)
///     .map(|t| {
///         let map = Arc::clone(&map);
///         thread::spawn(move || {
///             for i in 0..100 {
///                 map.insert(t * 100 + i, t);
///             }
///         })
///     })
///     .collect();
/// for h in handles {
///     h.join().unwrap();
/// }
/// assert_eq!(map.len(), 400);
/// ```
pub struct ShardedMap<K, V, S = DefaultHashBuilder, P = DefaultBackend> {
    shards: Box<[Shard<K, V, S>]>,
    hasher: S,
    backend: P,
}

impl<K, V> ShardedMap<K, V> {
    /// Creates a map sized for the default backend's workers with
    /// [`DEFAULT_BLOW_UP_FACTOR`] shards per worker.
    pub fn new() -> Result<Self> {
        Self::with_blow_up(DEFAULT_BLOW_UP_FACTOR)
    }

    /// Creates a map with `blow_up_factor` shards per worker (rounded up to
    /// a power of two).
    pub fn with_blow_up(blow_up_factor: usize) -> Result<Self> {
        Self::with_hasher_and_backend(
            DefaultHashBuilder::default(),
            DefaultBackend::default(),
            blow_up_factor,
        )
    }

    /// Creates a map with exactly `num_shards` shards, rounded up to a power
    /// of two.
    ///
    /// # Errors
    ///
    /// [`Error::ZeroShards`] if `num_shards` is zero.
    pub fn with_shards(num_shards: usize) -> Result<Self> {
        Self::with_layout(
            DefaultHashBuilder::default(),
            DefaultBackend::default(),
            num_shards,
        )
    }
}

impl<K, V, S: Clone> ShardedMap<K, V, S> {
    /// Creates a map hashing keys with `hasher`, on the default backend.
    pub fn with_hasher(hasher: S) -> Result<Self> {
        Self::with_hasher_and_backend(hasher, DefaultBackend::default(), DEFAULT_BLOW_UP_FACTOR)
    }
}

impl<K, V, P: Parallel> ShardedMap<K, V, DefaultHashBuilder, P> {
    /// Creates a map sized for `backend`'s workers, which also runs
    /// [`for_each`](Self::for_each) and [`unlocked_entries`](Self::unlocked_entries).
    pub fn with_backend(backend: P) -> Result<Self> {
        Self::with_hasher_and_backend(DefaultHashBuilder::default(), backend, DEFAULT_BLOW_UP_FACTOR)
    }
}

impl<K, V, S: Clone, P: Parallel> ShardedMap<K, V, S, P> {
    /// Creates a map sized from `backend.num_workers() × blow_up_factor`.
    pub fn with_hasher_and_backend(hasher: S, backend: P, blow_up_factor: usize) -> Result<Self> {
        let num_shards = shard_count(backend.num_workers(), blow_up_factor);
        Self::with_layout(hasher, backend, num_shards)
    }

    /// Creates a map with `num_shards` shards (rounded up to a power of
    /// two), hashing with `hasher` and running bulk operations on `backend`.
    pub fn with_layout(hasher: S, backend: P, num_shards: usize) -> Result<Self> {
        if num_shards == 0 {
            return Err(Error::ZeroShards { what: "sharded map" });
        }
        let num_shards = shard_count(num_shards, 1);
        let shards = try_alloc_slice("map shards", num_shards, |_| {
            CachePadded::new(SpinMutex::new(HashMap::with_hasher(hasher.clone())))
        })?;
        log::debug!("sharded map: {num_shards} shards");
        Ok(Self {
            shards,
            hasher,
            backend,
        })
    }
}

impl<K, V, S, P> ShardedMap<K, V, S, P> {
    /// Number of shards.
    #[inline]
    pub fn num_shards(&self) -> usize {
        self.shards.len()
    }

    /// The backend running bulk operations.
    pub fn backend(&self) -> &P {
        &self.backend
    }
}

impl<K, V, S, P> ShardedMap<K, V, S, P>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    /// Index of the shard `key` belongs to. Stable for the map's lifetime.
    #[inline]
    pub fn shard_index<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        shard_of(self.hasher.hash_one(key), self.shards.len())
    }

    /// Locks and returns the shard holding `key`.
    pub(crate) fn lock_shard<Q>(&self, key: &Q) -> SpinMutexGuard<'_, HashMap<K, V, S>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shards[self.shard_index(key)].lock()
    }

    /// Visits every shard in order, each locked while `f` runs.
    pub(crate) fn for_each_shard(&self, mut f: impl FnMut(&HashMap<K, V, S>)) {
        for shard in self.shards.iter() {
            f(&shard.lock());
        }
    }

    /// Inserts `value` under `key` if the key is absent.
    ///
    /// Returns whether the insertion happened, and a copy of the value now
    /// stored under `key` (the pre-existing one when nothing was inserted).
    pub fn insert(&self, key: K, value: V) -> (bool, V)
    where
        V: Clone,
    {
        let mut shard = self.lock_shard(&key);
        match shard.entry(key) {
            Entry::Occupied(entry) => (false, entry.get().clone()),
            Entry::Vacant(entry) => (true, entry.insert(value).clone()),
        }
    }

    /// Inserts `value` under `key`, overwriting any previous value.
    ///
    /// Returns `true` if the key was not present before.
    pub fn insert_or_assign(&self, key: K, value: V) -> bool {
        self.lock_shard(&key).insert(key, value).is_none()
    }

    /// Removes `key`, returning its value if it was present.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lock_shard(key).remove(key)
    }

    /// Returns `true` if `key` is present.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lock_shard(key).contains_key(key)
    }

    /// Returns a copy of the value under `key`, or `fallback` if absent.
    pub fn value<Q>(&self, key: &Q, fallback: V) -> V
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.get(key).unwrap_or(fallback)
    }

    /// Returns a copy of the value under `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        self.lock_shard(key).get(key).cloned()
    }

    /// Calls `f` on the value under `key` while its shard is locked.
    ///
    /// `f` must not access this map.
    pub fn with_value<Q, R>(&self, key: &Q, f: impl FnOnce(&mut V) -> R) -> Option<R>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.lock_shard(key).get_mut(key).map(f)
    }

    /// Total number of entries, counted shard by shard.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    /// Returns `true` if every shard is empty.
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.lock().is_empty())
    }

    /// Removes every entry, shard by shard.
    pub fn clear(&self) {
        for shard in self.shards.iter() {
            shard.lock().clear();
        }
    }

    /// Number of entries in each shard.
    pub fn shard_sizes(&self) -> Vec<usize> {
        self.shards.iter().map(|shard| shard.lock().len()).collect()
    }

    /// Like [`value`](Self::value), without locking.
    ///
    /// The exclusive borrow guarantees no concurrent mutator.
    pub fn unlocked_value<Q>(&mut self, key: &Q, fallback: V) -> V
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let idx = self.shard_index(key);
        self.shards[idx]
            .get_mut()
            .get(key)
            .cloned()
            .unwrap_or(fallback)
    }

    /// Like [`is_empty`](Self::is_empty), without locking.
    pub fn unlocked_empty(&mut self) -> bool {
        self.shards.iter_mut().all(|shard| shard.get_mut().is_empty())
    }
}

impl<K, V, S, P> ShardedMap<K, V, S, P>
where
    K: Eq + Hash + Send + Sync,
    V: Send + Sync,
    S: BuildHasher + Send + Sync,
    P: Parallel,
{
    /// Calls `f` on every entry.
    ///
    /// Shards are visited in parallel on the map's backend, each one locked
    /// for the duration of its visit: `f` runs concurrently for entries of
    /// different shards, never for two entries of the same shard. `f` must
    /// not access this map.
    pub fn for_each(&self, f: impl Fn(&K, &V) + Send + Sync) {
        self.backend.run(0..self.shards.len(), |i| {
            for (key, value) in self.shards[i].lock().iter() {
                f(key, value);
            }
        });
    }

    /// Copies every entry into one vector, without locking.
    ///
    /// Shard sizes are prefix-summed to give each shard its own output
    /// window, then all shards are copied in parallel. Entries appear in
    /// shard order; the order inside a shard is unspecified.
    pub fn unlocked_entries(&mut self) -> Vec<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        let maps: Vec<&HashMap<K, V, S>> = self
            .shards
            .iter_mut()
            .map(|shard| &*shard.get_mut())
            .collect();
        let sizes: Vec<usize> = maps.iter().map(|map| map.len()).collect();
        parallel::gather(&self.backend, &sizes, |i, window| {
            for (key, value) in maps[i].iter() {
                window.push((key.clone(), value.clone()));
            }
        })
    }
}

impl<K, V, S, P> Debug for ShardedMap<K, V, S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardedMap")
            .field("shards", &self.shards.len())
            .finish()
    }
}
