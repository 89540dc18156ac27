use core::cmp::Ordering;

use crate::{
    error::{Error, Result},
    id::FlakeId,
};

/// The mutable core of a [`SequenceGenerator`], owned by exactly one
/// generator and only ever touched while its lock is held.
///
/// `last_timestamp` is absolute (milliseconds since the Unix epoch) and never
/// decreases for the lifetime of the state.
///
/// [`SequenceGenerator`]: crate::SequenceGenerator
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GeneratorState {
    worker_id: u64,
    last_timestamp: u64,
    last_sequence: u64,
}

/// Outcome of offering a clock reading to [`GeneratorState::advance`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Advance {
    /// The state moved to `(now, sequence)`.
    Issued { sequence: u64 },
    /// Every sequence value of the current millisecond is used. The state is
    /// untouched; the caller must wait for the clock to move.
    Exhausted,
}

impl GeneratorState {
    pub const fn new(worker_id: u64, last_timestamp: u64, last_sequence: u64) -> Self {
        Self {
            worker_id,
            last_timestamp,
            last_sequence,
        }
    }

    pub const fn worker_id(&self) -> u64 {
        self.worker_id
    }

    pub const fn last_timestamp(&self) -> u64 {
        self.last_timestamp
    }

    pub const fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// Returns true if the current millisecond still has a free sequence
    /// value.
    pub const fn has_sequence_room(&self) -> bool {
        self.last_sequence < FlakeId::max_sequence()
    }

    /// Applies one clock reading.
    ///
    /// `reseed` is consulted only when `now` opens a new millisecond and must
    /// return a value below `FlakeId::max_sequence()`; the first sequence of
    /// the millisecond is `reseed() + 1`.
    ///
    /// On error the state is left exactly as it was.
    pub(crate) fn advance(&mut self, now: u64, reseed: impl FnOnce() -> u64) -> Result<Advance> {
        let sequence = match now.cmp(&self.last_timestamp) {
            Ordering::Less => return Err(self.cold_clock_behind(now)),
            Ordering::Equal => {
                if !self.has_sequence_room() {
                    return Ok(Advance::Exhausted);
                }
                self.last_sequence + 1
            }
            Ordering::Greater => {
                let base = reseed();
                debug_assert!(base < FlakeId::max_sequence(), "reseed overflow");
                base + 1
            }
        };

        self.last_timestamp = now;
        self.last_sequence = sequence;
        Ok(Advance::Issued { sequence })
    }

    #[cold]
    #[inline(never)]
    fn cold_clock_behind(&self, now: u64) -> Error {
        Error::ClockRegression {
            now,
            last: self.last_timestamp,
        }
    }
}
