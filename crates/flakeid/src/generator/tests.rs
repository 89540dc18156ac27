use std::collections::HashSet;
use std::sync::Arc;
use std::thread::{scope, sleep};

use core::time::Duration;
use portable_atomic::{AtomicU64, Ordering};

use crate::{
    Error, FlakeId, GeneratorState, RandSource, SequenceGenerator, SystemClock, ThreadRandom,
    TimeSource,
};

struct MockTime {
    millis: u64,
}

impl TimeSource for MockTime {
    fn current_millis(&self) -> u64 {
        self.millis
    }
}

/// A clock the test moves by hand, shared with the generator.
#[derive(Clone, Default)]
struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    fn at(millis: u64) -> Self {
        let clock = Self::default();
        clock.set(millis);
        clock
    }

    fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn current_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

struct FixedRand(u64);

impl RandSource for FixedRand {
    fn rand(&self) -> u64 {
        self.0
    }
}

#[test]
fn sequence_increments_within_same_tick() {
    let generator = SequenceGenerator::new(5, 0, MockTime { millis: 42 }, FixedRand(9)).unwrap();

    let id1 = generator.next_id().unwrap();
    let id2 = generator.next_id().unwrap();
    let id3 = generator.next_id().unwrap();

    for id in [id1, id2, id3] {
        assert_eq!(id.timestamp(), 42);
        assert_eq!(id.worker_id(), 5);
    }
    assert_eq!(id1.sequence(), 10);
    assert_eq!(id2.sequence(), 11);
    assert_eq!(id3.sequence(), 12);
    assert!(id1 < id2 && id2 < id3);
    assert_eq!(generator.last_timestamp(), 42);
}

#[test]
fn first_sequence_of_each_millisecond_is_between_1_and_100() {
    let clock = ManualClock::at(1_000);
    let generator = SequenceGenerator::new(0, 0, clock.clone(), ThreadRandom).unwrap();

    for millis in 1_000..3_000 {
        clock.set(millis);
        let id = generator.next_id().unwrap();
        assert_eq!(id.timestamp(), millis);
        assert!((1..=100).contains(&id.sequence()), "sequence {}", id.sequence());
    }
}

#[test]
fn reseed_reduces_large_random_values() {
    let generator =
        SequenceGenerator::new(0, 0, MockTime { millis: 7 }, FixedRand(u64::MAX)).unwrap();
    // u64::MAX % 100 == 15
    assert_eq!(generator.next_id().unwrap().sequence(), 16);
}

#[test]
fn clock_regression_is_an_error_and_leaves_state_untouched() {
    let clock = ManualClock::at(50);
    let generator = SequenceGenerator::new(1, 0, clock.clone(), FixedRand(0)).unwrap();
    generator.next_id().unwrap();
    let before = generator.state().unwrap();

    clock.set(40);
    assert_eq!(
        generator.next_id(),
        Err(Error::ClockRegression { now: 40, last: 50 })
    );
    assert_eq!(generator.state().unwrap(), before);
    assert_eq!(generator.last_timestamp(), 50);

    clock.set(50);
    let id = generator.next_id().unwrap();
    assert_eq!(id.timestamp(), 50);
    assert_eq!(id.sequence(), 2);
}

#[test]
fn clock_past_the_timestamp_field_is_exhausted() {
    let epoch = 1_000;
    let now = epoch + FlakeId::max_timestamp() + 1;
    let generator = SequenceGenerator::new(0, epoch, MockTime { millis: now }, FixedRand(0)).unwrap();

    assert_eq!(
        generator.next_id(),
        Err(Error::EpochExhausted {
            now,
            ceiling: epoch + FlakeId::max_timestamp(),
        })
    );
}

#[test]
fn last_encodable_millisecond_still_issues() {
    let now = FlakeId::max_timestamp();
    let generator = SequenceGenerator::new(0, 0, MockTime { millis: now }, FixedRand(0)).unwrap();
    assert_eq!(generator.next_id().unwrap().timestamp(), now);
}

#[test]
fn clock_before_epoch_is_rejected() {
    let generator =
        SequenceGenerator::new(0, 1_000, MockTime { millis: 999 }, FixedRand(0)).unwrap();
    assert_eq!(
        generator.next_id(),
        Err(Error::BeforeEpoch {
            now: 999,
            epoch: 1_000
        })
    );
}

#[test]
fn exhausted_millisecond_blocks_until_the_clock_moves() {
    let clock = ManualClock::at(42);
    let generator = SequenceGenerator::new(3, 0, clock.clone(), FixedRand(0)).unwrap();

    for expected in 1..=FlakeId::max_sequence() {
        let id = generator.next_id().unwrap();
        assert_eq!(id.timestamp(), 42);
        assert_eq!(id.sequence(), expected);
    }
    let last = generator.state().unwrap();
    assert!(!last.has_sequence_room());

    let id = scope(|s| {
        s.spawn(|| {
            sleep(Duration::from_millis(20));
            clock.set(43);
        });
        generator.next_id().unwrap()
    });

    assert_eq!(id.timestamp(), 43);
    assert_eq!(id.sequence(), 1);
    assert_eq!(id.worker_id(), 3);
}

#[test]
fn restored_generator_skips_the_checkpointed_millisecond() {
    let clock = ManualClock::at(100);
    let generator = SequenceGenerator::restore(2, 100, 0, clock.clone(), FixedRand(4)).unwrap();
    assert_eq!(generator.last_timestamp(), 100);

    let id = scope(|s| {
        s.spawn(|| {
            sleep(Duration::from_millis(10));
            clock.set(101);
        });
        generator.next_id().unwrap()
    });

    assert_eq!(id.timestamp(), 101);
    assert_eq!(id.sequence(), 5);
}

#[test]
fn restored_generator_rejects_an_earlier_clock() {
    let generator =
        SequenceGenerator::restore(2, 5_000, 0, MockTime { millis: 4_000 }, FixedRand(0)).unwrap();
    assert_eq!(
        generator.next_id(),
        Err(Error::ClockRegression {
            now: 4_000,
            last: 5_000
        })
    );
}

#[test]
fn out_of_range_worker_id_is_rejected() {
    let result = SequenceGenerator::new(1024, 0, MockTime { millis: 1 }, FixedRand(0));
    assert!(matches!(result, Err(Error::InvalidConfig { .. })));

    let state = GeneratorState::new(1, 0, FlakeId::max_sequence() + 1);
    let result = SequenceGenerator::from_state(state, 0, MockTime { millis: 1 }, FixedRand(0));
    assert!(matches!(result, Err(Error::InvalidConfig { .. })));

    assert!(SequenceGenerator::new(1023, 0, MockTime { millis: 1 }, FixedRand(0)).is_ok());
}

#[test]
fn ids_are_strictly_increasing_on_the_system_clock() {
    let generator = SequenceGenerator::new(9, crate::DEFAULT_EPOCH, SystemClock, ThreadRandom).unwrap();
    let mut last = generator.next_id().unwrap();
    for _ in 0..50_000 {
        let id = generator.next_id().unwrap();
        assert!(id > last, "{id:?} <= {last:?}");
        assert_eq!(id.worker_id(), 9);
        assert!(id.to_raw() < 1 << 63);
        last = id;
    }
    assert_eq!(generator.checkpoint().last_timestamp, last.decode(crate::DEFAULT_EPOCH).timestamp);
}

#[test]
fn concurrent_callers_never_see_duplicates() {
    const THREADS: usize = 8;
    const IDS_PER_THREAD: usize = 10_000;

    let generator = SequenceGenerator::new(17, crate::DEFAULT_EPOCH, SystemClock, ThreadRandom).unwrap();

    let batches: Vec<Vec<u64>> = scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    let mut ids = Vec::with_capacity(IDS_PER_THREAD);
                    let mut last = 0;
                    for _ in 0..IDS_PER_THREAD {
                        let id = generator.next_id().unwrap().to_raw();
                        // Each caller observes its own ids in increasing order.
                        assert!(id > last);
                        last = id;
                        ids.push(id);
                    }
                    ids
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let mut seen = HashSet::with_capacity(THREADS * IDS_PER_THREAD);
    for id in batches.into_iter().flatten() {
        assert!(seen.insert(id), "duplicate id {id}");
    }
    assert_eq!(seen.len(), THREADS * IDS_PER_THREAD);
}
