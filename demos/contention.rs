//! Contention demo: many threads hammering a partitioned counter, a
//! reader-writer lock and a sharded map, then dumping their snapshots.
//!
//! Run with:
//! ```bash
//! cargo run --example contention --features demo -- --help
//! ```

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use clap::{Parser, ValueEnum};
use ripartito::counters::partitioned::PartitionedCounter;
use ripartito::locks::rwlock::ReaderWriterLock;
use ripartito::map::ShardedMap;
use ripartito::snapshot::{self, CounterSnapshot, LockSnapshot, MapSnapshot};

/// Which primitive to exercise.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Workload {
    /// Every thread adds to one partitioned counter
    Counter,
    /// Read-mostly traffic on a reader-writer lock
    Lock,
    /// Inserts and lookups on a sharded map
    Map,
    /// All of the above
    All,
}

/// Contention demo for ripartito - partitioned counters, scalable locks and
/// sharded maps.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Workload to run
    #[arg(short, long, value_enum, default_value = "all")]
    workload: Workload,

    /// Number of threads
    #[arg(short, long, default_value = "8")]
    threads: usize,

    /// Number of iterations per thread
    #[arg(short, long, default_value = "100000")]
    iterations: usize,

    /// Number of counter shards (0 = one per hardware thread)
    #[arg(short, long, default_value = "0")]
    shards: usize,

    /// Counter flush threshold
    #[arg(long, default_value = "64")]
    threshold: i64,

    /// One write every N lock acquisitions
    #[arg(long, default_value = "1000")]
    write_every: usize,

    /// Pretty print JSON output
    #[arg(long)]
    pretty: bool,
}

fn render<T: serde::Serialize>(args: &Args, snapshot: &T) -> ripartito::Result<String> {
    if args.pretty {
        snapshot::to_json_pretty(snapshot)
    } else {
        snapshot::to_json(snapshot)
    }
}

fn run_threads(threads: usize, body: impl Fn(usize) + Send + Sync) {
    thread::scope(|s| {
        for t in 0..threads {
            let body = &body;
            s.spawn(move || body(t));
        }
    });
}

fn counter_workload(args: &Args) -> ripartito::Result<()> {
    let counter = PartitionedCounter::new(args.shards, args.threshold)?.with_name("events");

    let start = Instant::now();
    run_threads(args.threads, |_| {
        for _ in 0..args.iterations {
            counter.add(1);
        }
    });
    let elapsed = start.elapsed();

    println!("counter: {:?} before sync", counter.get());
    println!("{}", render(args, &CounterSnapshot::from_counter(&counter))?);
    counter.sync();
    println!(
        "counter: {} after sync, {} adds in {:?}",
        counter.global(),
        args.threads * args.iterations,
        elapsed
    );
    Ok(())
}

fn lock_workload(args: &Args) -> ripartito::Result<()> {
    let lock = Arc::new(ReaderWriterLock::new()?);
    let write_every = args.write_every.max(1);

    let start = Instant::now();
    run_threads(args.threads, |_| {
        for i in 0..args.iterations {
            if i % write_every == 0 {
                drop(lock.write());
            } else {
                drop(lock.read());
            }
        }
    });

    println!("lock: {} acquisitions in {:?}", args.threads * args.iterations, start.elapsed());
    println!("{}", render(args, &LockSnapshot::from_lock(&lock))?);
    Ok(())
}

fn map_workload(args: &Args) -> ripartito::Result<()> {
    let map: ShardedMap<usize, usize> = ShardedMap::new()?;

    let start = Instant::now();
    run_threads(args.threads, |t| {
        for i in 0..args.iterations {
            let key = (t * args.iterations + i) % (args.iterations * 2).max(1);
            if i % 4 == 0 {
                map.insert_or_assign(key, t);
            } else {
                map.value(&key, 0);
            }
        }
    });

    println!("map: {} entries in {:?}", map.len(), start.elapsed());
    println!("{}", render(args, &MapSnapshot::from_map(&map))?);
    Ok(())
}

fn main() -> ripartito::Result<()> {
    let args = Args::parse();

    match args.workload {
        Workload::Counter => counter_workload(&args),
        Workload::Lock => lock_workload(&args),
        Workload::Map => map_workload(&args),
        Workload::All => {
            counter_workload(&args)?;
            lock_workload(&args)?;
            map_workload(&args)
        }
    }
}
