use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use flakeid::{
    Checkpoint, CheckpointStore, DEFAULT_EPOCH, FileCheckpointStore, SequenceGenerator,
    SystemClock, ThreadRandom,
};
use std::{
    sync::{Arc, Barrier},
    thread::scope,
    time::Instant,
};

// Number of IDs generated per benchmark iteration (split across threads for
// the contended case).
const TOTAL_IDS: usize = 4096;

fn generator() -> SequenceGenerator {
    SequenceGenerator::new(1, DEFAULT_EPOCH, SystemClock, ThreadRandom).unwrap()
}

fn benchmark_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequential");
    group.throughput(Throughput::Elements(TOTAL_IDS as u64));

    group.bench_function(format!("elems/{TOTAL_IDS}"), |b| {
        let generator = generator();
        b.iter(|| {
            for _ in 0..TOTAL_IDS {
                black_box(generator.next_id().unwrap());
            }
        });
    });

    group.finish();
}

fn benchmark_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended");

    for thread_count in [1, 2, 4, 8] {
        let ids_per_thread = TOTAL_IDS / thread_count;

        group.throughput(Throughput::Elements(TOTAL_IDS as u64));
        group.bench_function(format!("elems/{TOTAL_IDS}/threads/{thread_count}"), |b| {
            b.iter_custom(|iters| {
                let generator = Arc::new(generator());
                let start = Instant::now();

                for _ in 0..iters {
                    let barrier = Arc::new(Barrier::new(thread_count + 1));
                    scope(|s| {
                        for _ in 0..thread_count {
                            let generator = Arc::clone(&generator);
                            let barrier = Arc::clone(&barrier);
                            s.spawn(move || {
                                barrier.wait();
                                for _ in 0..ids_per_thread {
                                    black_box(generator.next_id().unwrap());
                                }
                            });
                        }
                        barrier.wait();
                    });
                }

                start.elapsed()
            });
        });
    }

    group.finish();
}

fn benchmark_checkpoint_write(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let store = FileCheckpointStore::new(dir.path().join("checkpoint.json"));
    let mut timestamp = DEFAULT_EPOCH;

    c.bench_function("checkpoint/file_write", |b| {
        b.iter(|| {
            timestamp += 1;
            store.write(black_box(&Checkpoint::new(timestamp))).unwrap();
        });
    });
}

criterion_group!(
    benches,
    benchmark_sequential,
    benchmark_contended,
    benchmark_checkpoint_write,
);
criterion_main!(benches);
