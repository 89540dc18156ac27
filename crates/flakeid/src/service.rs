//! The assembled ID service: worker-ID allocation, checkpoint recovery,
//! generation, and periodic persistence behind one handle.

use core::time::Duration;
use std::sync::Arc;

use crate::{
    checkpoint::{Checkpoint, CheckpointStore},
    error::{Error, Result},
    flusher::{CheckpointFlusher, DEFAULT_FLUSH_INTERVAL},
    generator::SequenceGenerator,
    id::FlakeId,
    rand::{RandSource, ThreadRandom},
    time::{DEFAULT_EPOCH, SystemClock, TimeSource},
    worker::{WorkerAssignment, WorkerIdAllocator},
};

/// Startup parameters for an [`IdService`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Custom epoch in milliseconds since the Unix epoch.
    pub epoch: u64,
    /// Spacing between checkpoint writes.
    pub flush_interval: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            epoch: DEFAULT_EPOCH,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

/// A running ID service.
///
/// Owns the generator, the worker slot it encodes, and the checkpoint task.
/// The service is meant to be shared behind an `Arc`; [`IdService::shutdown`]
/// consumes it once every other handle is gone.
pub struct IdService<T = SystemClock, R = ThreadRandom>
where
    T: TimeSource,
    R: RandSource,
{
    generator: Arc<SequenceGenerator<T, R>>,
    assignment: WorkerAssignment,
    flusher: CheckpointFlusher,
}

impl<T, R> IdService<T, R>
where
    T: TimeSource + Send + Sync + 'static,
    R: RandSource + Send + Sync + 'static,
{
    /// Brings the service up.
    ///
    /// In order:
    /// 1. Reads the last checkpoint. A clock reading earlier than the
    ///    checkpoint aborts startup before any worker ID is claimed.
    /// 2. Acquires a worker ID from `allocator`.
    /// 3. Restores the generator so the first ID lands in a millisecond
    ///    strictly after the checkpoint (or after "now" on first run).
    /// 4. Starts the periodic checkpoint writer.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfig`] for a zero flush interval.
    /// - [`Error::PersistenceRead`] if the checkpoint exists but cannot be
    ///   read.
    /// - [`Error::ClockRegression`] if the clock is behind the checkpoint.
    /// - [`Error::BeforeEpoch`] if the clock is before the configured epoch.
    /// - Any error from [`WorkerIdAllocator::acquire`].
    pub async fn start<S>(
        config: ServiceConfig,
        allocator: &WorkerIdAllocator,
        store: Arc<S>,
        time: T,
        rng: R,
    ) -> Result<Self>
    where
        S: CheckpointStore + ?Sized + 'static,
    {
        if config.flush_interval.is_zero() {
            return Err(Error::InvalidConfig {
                reason: "checkpoint interval must be greater than zero".to_string(),
            });
        }

        let checkpoint = read_checkpoint(&store).await?;
        let now = time.current_millis();
        if now < config.epoch {
            return Err(Error::BeforeEpoch {
                now,
                epoch: config.epoch,
            });
        }
        let last_timestamp = match checkpoint {
            Some(Checkpoint { last_timestamp }) if now < last_timestamp => {
                tracing::error!(
                    now,
                    last_timestamp,
                    behind_ms = last_timestamp - now,
                    "clock is behind the last checkpoint; refusing to start"
                );
                return Err(Error::ClockRegression {
                    now,
                    last: last_timestamp,
                });
            }
            Some(Checkpoint { last_timestamp }) => last_timestamp,
            None => {
                tracing::info!("no checkpoint found; starting fresh");
                now
            }
        };

        let assignment = allocator.acquire().await?;
        let worker_id = assignment.worker_id;

        let generator = match SequenceGenerator::restore(worker_id, last_timestamp, config.epoch, time, rng) {
            Ok(generator) => Arc::new(generator),
            Err(e) => {
                if let Err(release) = assignment.release().await {
                    tracing::warn!(error = %release, "failed to release worker slot after startup error");
                }
                return Err(e);
            }
        };

        let flusher = CheckpointFlusher::spawn(Arc::clone(&generator), store, config.flush_interval);

        tracing::info!(
            worker_id,
            epoch = config.epoch,
            last_timestamp,
            flush_interval_ms = config.flush_interval.as_millis() as u64,
            "id service started"
        );

        Ok(Self {
            generator,
            assignment,
            flusher,
        })
    }
}

impl<T, R> IdService<T, R>
where
    T: TimeSource,
    R: RandSource,
{
    /// Returns the next ID as a raw integer.
    ///
    /// This is a synchronous call that may sleep for a millisecond at a time
    /// when the sequence space of the current millisecond is used up. Async
    /// callers with strict latency needs should move it to a blocking thread.
    ///
    /// # Errors
    ///
    /// See [`SequenceGenerator::next_id`].
    pub fn generate_id(&self) -> Result<u64> {
        self.next_id().map(u64::from)
    }

    /// Returns the next ID.
    ///
    /// # Errors
    ///
    /// - [`Error::WorkerSlotLost`] once the coordination session behind the
    ///   worker ID has ended. An ID generated concurrently with the loss is
    ///   discarded, never returned.
    /// - Otherwise see [`SequenceGenerator::next_id`].
    pub fn next_id(&self) -> Result<FlakeId> {
        let id = self.generator.next_id()?;
        if self.assignment.is_lost() {
            return Err(self.cold_slot_lost());
        }
        Ok(id)
    }

    #[cold]
    #[inline(never)]
    fn cold_slot_lost(&self) -> Error {
        tracing::error!(worker_id = self.assignment.worker_id, "worker slot lost; refusing to issue ids");
        Error::WorkerSlotLost {
            worker_id: self.assignment.worker_id,
        }
    }

    /// The worker ID this service encodes.
    pub fn worker_id(&self) -> u64 {
        self.assignment.worker_id
    }

    pub fn generator(&self) -> &Arc<SequenceGenerator<T, R>> {
        &self.generator
    }

    /// Stops the checkpoint task (writing one final checkpoint) and releases
    /// the worker slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CoordinationUnavailable`] if the slot could not be
    /// released. The final checkpoint is written regardless.
    pub async fn shutdown(self) -> Result<()> {
        let worker_id = self.assignment.worker_id;
        self.flusher.shutdown().await;
        if self.assignment.is_lost() {
            tracing::warn!(worker_id, "worker slot already lost; nothing to release");
        } else {
            self.assignment.release().await?;
        }
        tracing::info!(worker_id, "id service stopped");
        Ok(())
    }
}

async fn read_checkpoint<S>(store: &Arc<S>) -> Result<Option<Checkpoint>>
where
    S: CheckpointStore + ?Sized + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || store.read())
        .await
        .map_err(|join| Error::PersistenceRead {
            path: String::from("<blocking task>"),
            reason: join.to_string(),
        })?
}
