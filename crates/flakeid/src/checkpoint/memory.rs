use crate::{
    checkpoint::{Checkpoint, CheckpointStore},
    error::{Error, Result},
    generator::Mutex,
};

/// An in-process [`CheckpointStore`].
///
/// Useful for tests and for embedding the generator where durability comes
/// from elsewhere. Writes can be made to fail on demand to exercise the
/// periodic writer's error path.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    checkpoint: Option<Checkpoint>,
    writes: usize,
    fail_writes: bool,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `checkpoint`.
    pub fn with_checkpoint(checkpoint: Checkpoint) -> Self {
        let store = Self::default();
        store.with_inner(|inner| inner.checkpoint = Some(checkpoint));
        store
    }

    /// Makes every subsequent write fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.with_inner(|inner| inner.fail_writes = fail);
    }

    /// Number of successful writes so far.
    pub fn writes(&self) -> usize {
        self.with_inner(|inner| inner.writes)
    }

    /// The stored checkpoint, if any.
    pub fn current(&self) -> Option<Checkpoint> {
        self.with_inner(|inner| inner.checkpoint)
    }

    fn with_inner<O>(&self, f: impl FnOnce(&mut MemoryInner) -> O) -> O {
        #[cfg(feature = "parking-lot")]
        let mut inner = self.inner.lock();
        // A panic while holding this lock cannot leave the record torn.
        #[cfg(not(feature = "parking-lot"))]
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut inner)
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn read(&self) -> Result<Option<Checkpoint>> {
        Ok(self.current())
    }

    fn write(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.with_inner(|inner| {
            if inner.fail_writes {
                return Err(Error::PersistenceWrite {
                    path: "memory".to_string(),
                    reason: "writes disabled".to_string(),
                });
            }
            inner.checkpoint = Some(*checkpoint);
            inner.writes += 1;
            Ok(())
        })
    }
}
