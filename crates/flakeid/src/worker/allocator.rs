use core::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::{
    error::{Error, Result},
    id::FlakeId,
    worker::{Coordinator, RetryPolicy},
};

/// How this process obtains its worker ID.
///
/// The set of strategies is closed: an operator either pins an ID or lets
/// the fleet arbitrate through a coordination service.
pub enum WorkerIdAllocator {
    /// An operator-supplied ID. No coordination happens; keeping it unique
    /// across the fleet is the operator's job.
    Static { worker_id: u64 },
    /// The lowest free slot in a coordination namespace.
    Coordinated(CoordinatedAllocator),
}

impl WorkerIdAllocator {
    /// Creates a [`WorkerIdAllocator::Static`] after range checking the ID.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `worker_id` exceeds 1023.
    pub fn fixed(worker_id: u64) -> Result<Self> {
        check_worker_id("worker id", worker_id)?;
        Ok(Self::Static { worker_id })
    }

    /// Acquires the worker ID. Called once, before any ID is generated.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidConfig`] for an out-of-range static ID.
    /// - [`Error::WorkerPoolExhausted`] if every coordinated slot is taken.
    /// - [`Error::CoordinationUnavailable`] if the coordination service
    ///   stays unreachable for the whole retry budget.
    pub async fn acquire(&self) -> Result<WorkerAssignment> {
        match self {
            Self::Static { worker_id } => {
                check_worker_id("worker id", *worker_id)?;
                tracing::info!(worker_id, "using static worker id");
                Ok(WorkerAssignment {
                    worker_id: *worker_id,
                    slot: None,
                })
            }
            Self::Coordinated(allocator) => allocator.acquire().await,
        }
    }
}

/// Scans `0..=max_worker_id` in order and claims the first free slot.
pub struct CoordinatedAllocator {
    coordinator: Arc<dyn Coordinator>,
    namespace: String,
    max_worker_id: u64,
    retry: RetryPolicy,
}

impl CoordinatedAllocator {
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `max_worker_id` exceeds 1023.
    pub fn new(
        coordinator: Arc<dyn Coordinator>,
        namespace: impl Into<String>,
        max_worker_id: u64,
        retry: RetryPolicy,
    ) -> Result<Self> {
        check_worker_id("max worker id", max_worker_id)?;
        Ok(Self {
            coordinator,
            namespace: namespace.into(),
            max_worker_id,
            retry,
        })
    }

    /// The coordination key for `worker_id`: `"{namespace}/{worker_id}"`.
    pub fn slot_key(&self, worker_id: u64) -> String {
        format!("{}/{worker_id}", self.namespace.trim_end_matches('/'))
    }

    /// Claims the lowest free worker ID.
    ///
    /// Each claim is an atomic create-if-absent, so two processes racing for
    /// the same ID cannot both win.
    ///
    /// # Errors
    ///
    /// - [`Error::WorkerPoolExhausted`] if every slot is taken.
    /// - [`Error::CoordinationUnavailable`] once the retry budget is spent.
    ///   The budget covers the whole scan, not each slot.
    pub async fn acquire(&self) -> Result<WorkerAssignment> {
        let owner = self.coordinator.owner_token();
        let coordinator = self.coordinator.as_ref();
        let mut budget = self.retry.budget();

        for worker_id in 0..=self.max_worker_id {
            let key = self.slot_key(worker_id);
            let (key_ref, owner_ref) = (key.as_str(), owner.as_bytes());
            let claimed = budget
                .run("claim worker slot", move || coordinator.try_claim(key_ref, owner_ref))
                .await?;

            if claimed {
                tracing::info!(worker_id, key = %key, owner = %owner, "claimed worker slot");
                return Ok(WorkerAssignment {
                    worker_id,
                    slot: Some(WorkerSlot {
                        worker_id,
                        key,
                        lost: self.coordinator.session_lost(),
                        coordinator: Arc::clone(&self.coordinator),
                    }),
                });
            }
            tracing::debug!(worker_id, "worker slot already claimed");
        }

        tracing::error!(max_worker_id = self.max_worker_id, "no free worker slot");
        Err(Error::WorkerPoolExhausted {
            max_worker_id: self.max_worker_id,
        })
    }
}

/// The outcome of [`WorkerIdAllocator::acquire`].
pub struct WorkerAssignment {
    pub worker_id: u64,
    /// The claimed slot when the ID came from a coordination service.
    pub slot: Option<WorkerSlot>,
}

impl WorkerAssignment {
    /// Returns true once the coordination session behind this ID has ended.
    /// Another process may then claim the same ID, so nothing more may be
    /// generated with it. Static IDs are never lost.
    pub fn is_lost(&self) -> bool {
        self.slot.as_ref().is_some_and(WorkerSlot::is_lost)
    }

    /// Gives the ID back. A no-op for static IDs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CoordinationUnavailable`] if the session could not be
    /// ended cleanly. The coordination service still reclaims the slot once
    /// the session times out.
    pub async fn release(self) -> Result<()> {
        match self.slot {
            Some(slot) => slot.release().await,
            None => Ok(()),
        }
    }
}

/// Exclusive, session-scoped ownership of one worker ID.
///
/// Dropping the slot does not release it; the slot lives until the session
/// ends, either through [`WorkerSlot::release`] or because the process went
/// away.
pub struct WorkerSlot {
    worker_id: u64,
    key: String,
    lost: CancellationToken,
    coordinator: Arc<dyn Coordinator>,
}

impl WorkerSlot {
    pub fn worker_id(&self) -> u64 {
        self.worker_id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns true once the owning session has ended.
    pub fn is_lost(&self) -> bool {
        self.lost.is_cancelled()
    }

    /// A token cancelled when the owning session ends.
    pub fn session_lost(&self) -> CancellationToken {
        self.lost.clone()
    }

    /// Ends the owning session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CoordinationUnavailable`] if the coordinator could
    /// not end the session.
    pub async fn release(self) -> Result<()> {
        self.coordinator
            .release()
            .await
            .map_err(|e| Error::CoordinationUnavailable {
                attempts: 1,
                reason: format!("release {}: {e}", self.key),
            })?;
        tracing::info!(worker_id = self.worker_id, key = %self.key, "released worker slot");
        Ok(())
    }
}

impl fmt::Debug for WorkerAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerAssignment")
            .field("worker_id", &self.worker_id)
            .field("slot", &self.slot)
            .finish()
    }
}

impl fmt::Debug for WorkerSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerSlot")
            .field("worker_id", &self.worker_id)
            .field("key", &self.key)
            .field("lost", &self.is_lost())
            .finish_non_exhaustive()
    }
}

fn check_worker_id(what: &str, worker_id: u64) -> Result<()> {
    if worker_id > FlakeId::max_worker_id() {
        return Err(Error::InvalidConfig {
            reason: format!(
                "{what} {worker_id} exceeds the maximum of {}",
                FlakeId::max_worker_id()
            ),
        });
    }
    Ok(())
}
