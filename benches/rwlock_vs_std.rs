use std::sync::{Arc, RwLock};
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ripartito::locks::rwlock::ReaderWriterLock;

const NUM_THREADS: usize = 8;
const ITERATIONS_PER_THREAD: usize = 200_000;
// One write every WRITE_EVERY acquisitions.
const WRITE_EVERY: usize = 1_000;

fn bench_read_mostly(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_mostly");
    let label = format!("{}threads x {}iter", NUM_THREADS, ITERATIONS_PER_THREAD);

    group.bench_function(BenchmarkId::new("ReaderWriterLock", &label), |b| {
        b.iter(|| {
            let lock = Arc::new(ReaderWriterLock::new().unwrap());
            let mut handles = vec![];

            for _ in 0..NUM_THREADS {
                let lock = Arc::clone(&lock);
                handles.push(thread::spawn(move || {
                    for i in 0..ITERATIONS_PER_THREAD {
                        if i % WRITE_EVERY == 0 {
                            drop(black_box(lock.write()));
                        } else {
                            drop(black_box(lock.read()));
                        }
                    }
                }));
            }

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(lock.state())
        })
    });

    group.bench_function(BenchmarkId::new("std::sync::RwLock", &label), |b| {
        b.iter(|| {
            let lock = Arc::new(RwLock::new(()));
            let mut handles = vec![];

            for _ in 0..NUM_THREADS {
                let lock = Arc::clone(&lock);
                handles.push(thread::spawn(move || {
                    for i in 0..ITERATIONS_PER_THREAD {
                        if i % WRITE_EVERY == 0 {
                            drop(black_box(lock.write().unwrap()));
                        } else {
                            drop(black_box(lock.read().unwrap()));
                        }
                    }
                }));
            }

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(lock.is_poisoned())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_read_mostly);
criterion_main!(benches);
