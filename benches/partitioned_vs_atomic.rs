use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ripartito::counters::partitioned::PartitionedCounter;

const NUM_THREADS: usize = 8;
const ITERATIONS_PER_THREAD: usize = 1_000_000;

fn bench_counter_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("counter_add");
    let label = format!("{}threads x {}iter", NUM_THREADS, ITERATIONS_PER_THREAD);

    for threshold in [0, 64, 4096] {
        group.bench_function(
            BenchmarkId::new(format!("PartitionedCounter (threshold {threshold})"), &label),
            |b| {
                b.iter(|| {
                    let counter = Arc::new(PartitionedCounter::new(0, threshold).unwrap());
                    let mut handles = vec![];

                    for _ in 0..NUM_THREADS {
                        let counter = Arc::clone(&counter);
                        handles.push(thread::spawn(move || {
                            for _ in 0..ITERATIONS_PER_THREAD {
                                counter.add(1);
                            }
                        }));
                    }

                    for handle in handles {
                        handle.join().unwrap();
                    }

                    counter.sync();
                    black_box(counter.global())
                })
            },
        );
    }

    group.bench_function(BenchmarkId::new("AtomicI64 (single)", &label), |b| {
        b.iter(|| {
            let counter = Arc::new(AtomicI64::new(0));
            let mut handles = vec![];

            for _ in 0..NUM_THREADS {
                let counter = Arc::clone(&counter);
                handles.push(thread::spawn(move || {
                    for _ in 0..ITERATIONS_PER_THREAD {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                }));
            }

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(counter.load(Ordering::SeqCst))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_counter_add);
criterion_main!(benches);
