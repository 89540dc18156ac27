use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Failures reported by a [`Coordinator`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CoordinationError {
    /// The service could not be reached or did not answer in time. Worth
    /// retrying.
    #[error("coordination service unreachable: {0}")]
    Unreachable(String),

    /// The session backing this client has ended; nothing claimed through it
    /// is owned any more.
    #[error("coordination session closed")]
    SessionClosed,
}

impl CoordinationError {
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unreachable(_))
    }
}

/// A strongly consistent store with atomic create-if-absent and
/// session-scoped entries.
///
/// Entries created through a coordinator belong to its session and vanish
/// when the session ends, whether by [`Coordinator::release`], process exit,
/// or the service expiring a silent client.
#[async_trait]
pub trait Coordinator: Send + Sync {
    /// Atomically creates a session-scoped entry at `key` holding `owner`.
    ///
    /// Returns `Ok(true)` if this call created the entry, or if the entry
    /// already holds `owner` under this same session (a retried claim whose
    /// first response was lost). Returns `Ok(false)` if anyone else holds it.
    async fn try_claim(&self, key: &str, owner: &[u8]) -> Result<bool, CoordinationError>;

    /// Opaque token identifying this session, stored as the value of every
    /// claimed entry.
    fn owner_token(&self) -> String;

    /// A token that is cancelled once the session has ended for any reason:
    /// an explicit release, an expired lease, or a lost connection. After
    /// that, nothing claimed through this coordinator is owned any more.
    fn session_lost(&self) -> CancellationToken;

    /// Ends the session, releasing every entry claimed through it.
    async fn release(&self) -> Result<(), CoordinationError>;
}
