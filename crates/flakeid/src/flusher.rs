//! Periodic checkpoint writer.
//!
//! The [`CheckpointFlusher`] owns one tokio task that samples a
//! [`CheckpointSource`] on a fixed interval and hands the result to a
//! [`CheckpointStore`] on the blocking pool. It never touches the generator
//! lock, only the lock-free timestamp mirror. Write failures are logged and
//! the next tick simply tries again.
//!
//! Shutdown is cooperative via a shared [`CancellationToken`]; stopping the
//! flusher performs one last write so a graceful exit leaves an exact record.
//! Dropping the handle cancels the task too, without waiting for it.

use core::time::Duration;
use std::sync::Arc;

use tokio::{
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tokio_util::sync::CancellationToken;

use crate::{
    checkpoint::{Checkpoint, CheckpointStore},
    error::Result,
    generator::SequenceGenerator,
    rand::RandSource,
    time::TimeSource,
};

/// Default spacing between checkpoint writes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Anything that can report the timestamp worth persisting.
pub trait CheckpointSource: Send + Sync + 'static {
    fn checkpoint(&self) -> Checkpoint;
}

impl<T, R> CheckpointSource for SequenceGenerator<T, R>
where
    T: TimeSource + Send + Sync + 'static,
    R: RandSource + Send + Sync + 'static,
{
    fn checkpoint(&self) -> Checkpoint {
        SequenceGenerator::checkpoint(self)
    }
}

/// Handle to the running checkpoint task.
pub struct CheckpointFlusher {
    shutdown_token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl CheckpointFlusher {
    /// Starts the periodic writer on the current tokio runtime.
    ///
    /// The first write happens one full `period` after spawning.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime, or if `period` is zero.
    pub fn spawn<G, S>(source: Arc<G>, store: Arc<S>, period: Duration) -> Self
    where
        G: CheckpointSource + ?Sized,
        S: CheckpointStore + ?Sized + 'static,
    {
        let shutdown_token = CancellationToken::new();
        let token = shutdown_token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = flush(&source, &store).await {
                            tracing::warn!(error = %e, "checkpoint write failed; retrying next interval");
                        }
                    }
                }
            }

            match flush(&source, &store).await {
                Ok(checkpoint) => {
                    tracing::info!(last_timestamp = checkpoint.last_timestamp, "final checkpoint written");
                }
                Err(e) => tracing::error!(error = %e, "final checkpoint write failed"),
            }
        });

        Self {
            shutdown_token,
            handle: Some(handle),
        }
    }

    /// Stops the periodic task and waits for its final write.
    pub async fn shutdown(mut self) {
        self.shutdown_token.cancel();
        let Some(handle) = self.handle.take() else {
            return;
        };
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "checkpoint task did not exit cleanly");
        }
    }
}

impl Drop for CheckpointFlusher {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}

async fn flush<G, S>(source: &Arc<G>, store: &Arc<S>) -> Result<Checkpoint>
where
    G: CheckpointSource + ?Sized,
    S: CheckpointStore + ?Sized + 'static,
{
    let checkpoint = source.checkpoint();
    let store = Arc::clone(store);
    match tokio::task::spawn_blocking(move || store.write(&checkpoint)).await {
        Ok(result) => result.map(|()| {
            tracing::debug!(last_timestamp = checkpoint.last_timestamp, "checkpoint written");
            checkpoint
        }),
        Err(join) => Err(crate::Error::PersistenceWrite {
            path: String::from("<blocking task>"),
            reason: join.to_string(),
        }),
    }
}
