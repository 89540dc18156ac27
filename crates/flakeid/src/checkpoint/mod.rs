//! Durable record of the last timestamp a generator used.
//!
//! A checkpoint is read once at startup, to refuse starting on a clock that
//! is behind a previous incarnation, and rewritten wholesale on a fixed
//! interval afterwards. The record trails the generator by up to one
//! interval; a crash inside that window followed by a clock step back of
//! less than the interval goes undetected.

mod file;
mod memory;

pub use file::*;
pub use memory::*;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// The persisted record: `{"lastTimestamp": <ms since Unix epoch>}`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(rename = "lastTimestamp")]
    pub last_timestamp: u64,
}

impl Checkpoint {
    pub const fn new(last_timestamp: u64) -> Self {
        Self { last_timestamp }
    }
}

/// Where checkpoints live.
///
/// Implementations overwrite the previous record on every write; there is
/// no history.
pub trait CheckpointStore: Send + Sync {
    /// Reads the current checkpoint, or `None` on first run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PersistenceRead`] if a record exists but cannot be
    /// read or parsed.
    ///
    /// [`Error::PersistenceRead`]: crate::Error::PersistenceRead
    fn read(&self) -> Result<Option<Checkpoint>>;

    /// Replaces the stored checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PersistenceWrite`] if the record cannot be written.
    ///
    /// [`Error::PersistenceWrite`]: crate::Error::PersistenceWrite
    fn write(&self, checkpoint: &Checkpoint) -> Result<()>;
}

impl<S: CheckpointStore + ?Sized> CheckpointStore for std::sync::Arc<S> {
    fn read(&self) -> Result<Option<Checkpoint>> {
        (**self).read()
    }

    fn write(&self, checkpoint: &Checkpoint) -> Result<()> {
        (**self).write(checkpoint)
    }
}
