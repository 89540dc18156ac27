use core::time::Duration;
use std::thread;

use portable_atomic::{AtomicU64, Ordering};

use crate::{
    checkpoint::Checkpoint,
    error::{Error, Result},
    generator::{Advance, GeneratorState, Mutex, MutexGuard},
    id::FlakeId,
    rand::{RandSource, ThreadRandom},
    time::{SystemClock, TimeSource},
};

/// How long a caller sleeps before re-reading the clock once the current
/// millisecond has run out of sequence values.
pub const SEQUENCE_BACKOFF: Duration = Duration::from_millis(1);

/// The first sequence of every millisecond is drawn from `[1, RESEED_SPAN]`
/// instead of always starting at zero, so the low bits of IDs spread evenly
/// when consumers shard by `id % n`.
pub const RESEED_SPAN: u64 = 100;

/// A lock-based Snowflake generator that is safe to share across threads.
///
/// Every call to [`SequenceGenerator::next_id`] runs the whole
/// read-clock/compare/advance/encode step under one mutex, so concurrent
/// callers are serialized and block (they do not spin) while another call is
/// in flight.
///
/// The last used timestamp is mirrored in an atomic so the periodic
/// checkpoint writer can sample it without contending on the lock.
///
/// ## Failure model
/// - A clock reading earlier than the last used timestamp fails with
///   [`Error::ClockRegression`]; nothing is auto-corrected.
/// - A clock reading past the 41-bit window fails with
///   [`Error::EpochExhausted`].
/// - Running out of sequence values within a millisecond is *not* an error:
///   the caller sleeps in [`SEQUENCE_BACKOFF`] steps until the clock moves.
pub struct SequenceGenerator<T = SystemClock, R = ThreadRandom>
where
    T: TimeSource,
    R: RandSource,
{
    state: Mutex<GeneratorState>,
    last_timestamp: AtomicU64,
    epoch: u64,
    time: T,
    rng: R,
}

impl<T, R> SequenceGenerator<T, R>
where
    T: TimeSource,
    R: RandSource,
{
    /// Creates a generator with no history.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `worker_id` does not fit the
    /// 10-bit worker field.
    pub fn new(worker_id: u64, epoch: u64, time: T, rng: R) -> Result<Self> {
        Self::from_state(GeneratorState::new(worker_id, 0, 0), epoch, time, rng)
    }

    /// Creates a generator that resumes after a previous incarnation whose
    /// last persisted timestamp was `last_timestamp`.
    ///
    /// The checkpointed millisecond is treated as fully consumed, so the
    /// first ID is always issued in a strictly later millisecond.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `worker_id` does not fit the
    /// 10-bit worker field.
    pub fn restore(worker_id: u64, last_timestamp: u64, epoch: u64, time: T, rng: R) -> Result<Self> {
        let state = GeneratorState::new(worker_id, last_timestamp, FlakeId::max_sequence());
        Self::from_state(state, epoch, time, rng)
    }

    /// Creates a generator from an explicit state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the worker ID or sequence in
    /// `state` is out of range.
    pub fn from_state(state: GeneratorState, epoch: u64, time: T, rng: R) -> Result<Self> {
        if state.worker_id() > FlakeId::max_worker_id() {
            return Err(Error::InvalidConfig {
                reason: format!(
                    "worker id {} exceeds the maximum of {}",
                    state.worker_id(),
                    FlakeId::max_worker_id()
                ),
            });
        }
        if state.last_sequence() > FlakeId::max_sequence() {
            return Err(Error::InvalidConfig {
                reason: format!(
                    "sequence {} exceeds the maximum of {}",
                    state.last_sequence(),
                    FlakeId::max_sequence()
                ),
            });
        }
        Ok(Self {
            last_timestamp: AtomicU64::new(state.last_timestamp()),
            state: Mutex::new(state),
            epoch,
            time,
            rng,
        })
    }

    /// Generates the next ID, blocking while the current millisecond is out
    /// of sequence values.
    ///
    /// # Errors
    ///
    /// - [`Error::ClockRegression`] if the clock reads earlier than the last
    ///   used timestamp (also checked on every re-read while waiting). The
    ///   generator state is left unmodified.
    /// - [`Error::EpochExhausted`] / [`Error::BeforeEpoch`] if the clock is
    ///   outside the encodable window.
    /// - [`Error::LockPoisoned`] if another thread panicked while holding the
    ///   lock (std mutex builds only).
    ///
    /// # Example
    /// ```
    /// use flakeid::{DEFAULT_EPOCH, SequenceGenerator, SystemClock, ThreadRandom};
    ///
    /// let generator = SequenceGenerator::new(7, DEFAULT_EPOCH, SystemClock, ThreadRandom).unwrap();
    /// let a = generator.next_id().unwrap();
    /// let b = generator.next_id().unwrap();
    /// assert!(a < b);
    /// assert_eq!(a.worker_id(), 7);
    /// ```
    pub fn next_id(&self) -> Result<FlakeId> {
        let mut state = self.lock()?;
        let mut now = self.time.current_millis();

        loop {
            self.check_window(now)?;
            match state.advance(now, || self.rng.rand() % RESEED_SPAN)? {
                Advance::Issued { sequence } => {
                    let worker_id = state.worker_id();
                    let id = FlakeId::from_components(now - self.epoch, worker_id, sequence);
                    self.last_timestamp.store(now, Ordering::Release);
                    tracing::trace!(id = id.to_raw(), timestamp = now, worker_id, sequence, "issued id");
                    return Ok(id);
                }
                Advance::Exhausted => {
                    thread::sleep(SEQUENCE_BACKOFF);
                    now = self.time.current_millis();
                }
            }
        }
    }

    /// Returns a snapshot of the generator state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockPoisoned`] if the lock is poisoned (std mutex
    /// builds only).
    pub fn state(&self) -> Result<GeneratorState> {
        Ok(*self.lock()?)
    }

    /// Returns the last used timestamp without taking the lock.
    ///
    /// The value may trail a concurrent `next_id` by one call, never lead it.
    pub fn last_timestamp(&self) -> u64 {
        self.last_timestamp.load(Ordering::Acquire)
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Returns the worker ID encoded into every ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockPoisoned`] if the lock is poisoned (std mutex
    /// builds only).
    pub fn worker_id(&self) -> Result<u64> {
        Ok(self.lock()?.worker_id())
    }

    /// Returns the checkpoint a periodic writer should persist right now.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint::new(self.last_timestamp())
    }

    fn check_window(&self, now: u64) -> Result<()> {
        if now < self.epoch {
            return Err(Error::BeforeEpoch {
                now,
                epoch: self.epoch,
            });
        }
        let ceiling = self.epoch.saturating_add(FlakeId::max_timestamp());
        if now > ceiling {
            return Err(Error::EpochExhausted { now, ceiling });
        }
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, GeneratorState>> {
        #[cfg(feature = "parking-lot")]
        {
            Ok(self.state.lock())
        }
        #[cfg(not(feature = "parking-lot"))]
        {
            Ok(self.state.lock()?)
        }
    }
}
