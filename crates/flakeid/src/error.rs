//! Error types shared by every component of the generator.
//!
//! All variants except [`Error::PersistenceWrite`] are fatal to the caller:
//! startup aborts, or the in-flight `next_id` call fails without issuing an
//! ID. Checkpoint write failures are reported by the periodic writer and
//! retried on its next tick.

/// A result type defaulting to this crate's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// All error variants that `flakeid` can emit.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The wall clock reported a time earlier than the last timestamp this
    /// generator (or a previous incarnation, via its checkpoint) used.
    #[error("clock moved backwards: now {now} ms, last used {last} ms")]
    ClockRegression { now: u64, last: u64 },

    /// The wall clock is past the last instant the 41-bit timestamp field can
    /// represent. Permanent for the lifetime of the epoch.
    #[error("timestamp space exhausted: now {now} ms exceeds ceiling {ceiling} ms")]
    EpochExhausted { now: u64, ceiling: u64 },

    /// The wall clock is earlier than the configured epoch.
    #[error("clock {now} ms is earlier than the epoch {epoch} ms")]
    BeforeEpoch { now: u64, epoch: u64 },

    /// A field handed to the bit encoder does not fit its bit width.
    #[error("{field} {value} exceeds the maximum of {max}")]
    FieldOverflow {
        field: &'static str,
        value: u64,
        max: u64,
    },

    /// Every worker id in the coordinated range is already claimed.
    #[error("all worker ids in 0..={max_worker_id} are claimed")]
    WorkerPoolExhausted { max_worker_id: u64 },

    /// The coordination session holding this worker id has ended, so another
    /// process may already be using the id. Permanent; the process must
    /// restart and acquire a new id.
    #[error("worker id {worker_id} is no longer held by this process")]
    WorkerSlotLost { worker_id: u64 },

    /// The coordination service stayed unreachable for the whole retry
    /// budget.
    #[error("coordination service unavailable after {attempts} attempt(s): {reason}")]
    CoordinationUnavailable { attempts: u32, reason: String },

    /// The checkpoint exists but could not be read or parsed.
    #[error("failed to read checkpoint {path}: {reason}")]
    PersistenceRead { path: String, reason: String },

    /// The checkpoint could not be written.
    #[error("failed to write checkpoint {path}: {reason}")]
    PersistenceWrite { path: String, reason: String },

    /// A configuration value is out of range.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The generator lock was poisoned by a panicking thread.
    ///
    /// When the `parking-lot` feature is enabled, mutexes do **not** poison,
    /// so this variant is not available.
    #[cfg_attr(docsrs, doc(cfg(not(feature = "parking-lot"))))]
    #[cfg(not(feature = "parking-lot"))]
    #[error("generator lock poisoned")]
    LockPoisoned,
}

impl Error {
    /// Returns `true` for the one non-fatal kind, a failed periodic write.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::PersistenceWrite { .. })
    }
}

#[cfg(not(feature = "parking-lot"))]
use crate::generator::{MutexGuard, PoisonError};
#[cfg(not(feature = "parking-lot"))]
impl<T> From<PoisonError<MutexGuard<'_, T>>> for Error {
    fn from(_: PoisonError<MutexGuard<'_, T>>) -> Self {
        Self::LockPoisoned
    }
}
