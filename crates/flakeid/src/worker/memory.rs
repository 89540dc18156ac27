use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use portable_atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::worker::{CoordinationError, Coordinator};

/// An in-process coordination space shared by any number of
/// [`MemoryCoordinator`] sessions.
///
/// Behaves like the real thing within one process: claims are atomic, and
/// ending a session drops every entry it created.
#[derive(Clone, Default)]
pub struct MemorySpace {
    inner: Arc<SpaceInner>,
}

#[derive(Default)]
struct SpaceInner {
    entries: Mutex<BTreeMap<String, Entry>>,
    next_session: AtomicU64,
}

struct Entry {
    owner: Vec<u8>,
    session: u64,
}

impl MemorySpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.inner.entries.lock().await.contains_key(key)
    }

    /// The value stored at `key`, if the entry exists.
    pub async fn owner(&self, key: &str) -> Option<Vec<u8>> {
        self.inner
            .entries
            .lock()
            .await
            .get(key)
            .map(|entry| entry.owner.clone())
    }

    pub async fn len(&self) -> usize {
        self.inner.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// One session against a [`MemorySpace`].
pub struct MemoryCoordinator {
    space: MemorySpace,
    session: u64,
    closed: AtomicBool,
    lost: CancellationToken,
    pending_failures: AtomicU32,
}

impl MemoryCoordinator {
    /// Opens a new session on `space`.
    pub fn new(space: &MemorySpace) -> Self {
        let session = space.inner.next_session.fetch_add(1, Ordering::Relaxed) + 1;
        Self {
            space: space.clone(),
            session,
            closed: AtomicBool::new(false),
            lost: CancellationToken::new(),
            pending_failures: AtomicU32::new(0),
        }
    }

    /// Makes the next `n` claims fail as if the service were unreachable.
    pub fn fail_next(&self, n: u32) {
        self.pending_failures.store(n, Ordering::Relaxed);
    }

    fn take_failure(&self) -> bool {
        self.pending_failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Coordinator for MemoryCoordinator {
    async fn try_claim(&self, key: &str, owner: &[u8]) -> Result<bool, CoordinationError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CoordinationError::SessionClosed);
        }
        if self.take_failure() {
            return Err(CoordinationError::Unreachable(String::from("injected failure")));
        }

        let mut entries = self.space.inner.entries.lock().await;
        if let Some(entry) = entries.get(key) {
            return Ok(entry.session == self.session && entry.owner == owner);
        }
        entries.insert(
            key.to_owned(),
            Entry {
                owner: owner.to_vec(),
                session: self.session,
            },
        );
        Ok(true)
    }

    fn owner_token(&self) -> String {
        format!("memory-session-{}", self.session)
    }

    fn session_lost(&self) -> CancellationToken {
        self.lost.clone()
    }

    async fn release(&self) -> Result<(), CoordinationError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.lost.cancel();
        self.space
            .inner
            .entries
            .lock()
            .await
            .retain(|_, entry| entry.session != self.session);
        Ok(())
    }
}
