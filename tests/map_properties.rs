use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use ripartito::map::{DefaultHashBuilder, ShardedMap, ShardedMultiMap};
use ripartito::parallel::{Scoped, Serial};

#[test]
fn test_insert_then_value_round_trip() {
    let map = ShardedMap::with_layout(DefaultHashBuilder::default(), Serial, 32).unwrap();
    for i in 0..1_000u64 {
        assert_eq!(map.insert(i, i * i), (true, i * i));
    }
    for i in 0..1_000u64 {
        assert_eq!(map.value(&i, u64::MAX), i * i);
    }
    assert_eq!(map.value(&5_000, u64::MAX), u64::MAX);
}

#[test]
fn test_remove_makes_key_absent() {
    let map: ShardedMap<String, usize> = ShardedMap::with_shards(8).unwrap();
    for i in 0..100 {
        map.insert(format!("key-{i}"), i);
    }
    for i in (0..100).step_by(2) {
        assert_eq!(map.remove(format!("key-{i}").as_str()), Some(i));
    }
    for i in 0..100 {
        assert_eq!(map.contains(format!("key-{i}").as_str()), i % 2 == 1);
    }
    assert_eq!(map.len(), 50);
}

#[test]
fn test_insert_or_assign_is_idempotent() {
    let map: ShardedMap<u8, &str> = ShardedMap::with_shards(2).unwrap();
    assert!(map.insert_or_assign(1, "a"));
    for _ in 0..5 {
        assert!(!map.insert_or_assign(1, "b"));
        assert_eq!(map.value(&1, ""), "b");
        assert_eq!(map.len(), 1);
    }
}

#[test]
fn test_concurrent_mixed_operations_match_model() {
    let map = Arc::new(
        ShardedMap::with_layout(DefaultHashBuilder::default(), Scoped::with_threads(4), 16)
            .unwrap(),
    );

    let handles: Vec<_> = (0..8u64)
        .map(|t| {
            let map = Arc::clone(&map);
            thread::spawn(move || {
                let base = t * 10_000;
                for i in 0..2_000 {
                    map.insert(base + i, i);
                }
                for i in (0..2_000).filter(|i| i % 4 == 0) {
                    map.remove(&(base + i));
                }
                for i in (0..2_000).filter(|i| i % 4 == 1) {
                    map.insert_or_assign(base + i, i + 1);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let mut model = HashMap::new();
    for t in 0..8u64 {
        for i in 0..2_000u64 {
            match i % 4 {
                0 => {}
                1 => {
                    model.insert(t * 10_000 + i, i + 1);
                }
                _ => {
                    model.insert(t * 10_000 + i, i);
                }
            }
        }
    }

    assert_eq!(map.len(), model.len());
    for (key, value) in &model {
        assert_eq!(map.get(key), Some(*value));
    }

    let mut map = Arc::try_unwrap(map).unwrap();
    let entries: HashMap<u64, u64> = map.unlocked_entries().into_iter().collect();
    assert_eq!(entries, model);
}

#[test]
fn test_same_shard_keys_are_serialized() {
    let map: Arc<ShardedMap<u64, u64>> = Arc::new(ShardedMap::with_shards(4).unwrap());
    let shard = map.shard_index(&0u64);
    let keys: Vec<u64> = (0..)
        .filter(|k| map.shard_index(k) == shard)
        .take(64)
        .collect();
    let keys = Arc::new(keys);

    thread::scope(|s| {
        for t in 0..4u64 {
            let (map, keys) = (&map, &keys);
            s.spawn(move || {
                for _ in 0..500 {
                    for key in keys.iter() {
                        map.insert(*key, t);
                    }
                }
            });
        }
    });

    assert_eq!(map.len(), 64);
    assert_eq!(map.shard_sizes()[shard], 64);
}

#[test]
fn test_multimap_concurrent_groups() {
    let map: Arc<ShardedMultiMap<u32, u32>> = Arc::new(ShardedMultiMap::with_shards(8).unwrap());

    thread::scope(|s| {
        for t in 0..4u32 {
            let map = &map;
            s.spawn(move || {
                for i in 0..1_000 {
                    map.insert(i % 10, t);
                }
            });
        }
    });

    assert_eq!(map.len(), 4_000);
    assert_eq!(map.key_count(), 10);
    for key in 0..10 {
        assert_eq!(map.count(&key), 400);
    }
}
