//! etcd-backed coordination.
//!
//! A lease plays the part of the session: every slot is written with the
//! lease attached, a background task keeps the lease alive, and when the
//! process dies or is partitioned away the lease expires and etcd deletes
//! the slots. Claims are single transactions guarded by
//! `create_revision(key) == 0`, i.e. "the key does not exist".
//!
//! The keep-alive task gives up once no renewal has been acknowledged for a
//! full TTL, or once the response stream breaks. At that point the lease may
//! already be gone server side, so the session-lost token is cancelled and
//! the service stops issuing IDs.

use core::time::Duration;

use async_trait::async_trait;
use etcd_client::{
    Client, Compare, CompareOp, ConnectOptions, LeaseKeepAliveStream, LeaseKeeper, PutOptions, Txn, TxnOp,
    TxnOpResponse,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    error::Result,
    worker::{CoordinationError, Coordinator, RetryPolicy},
};

/// A [`Coordinator`] session against an etcd cluster.
pub struct EtcdCoordinator {
    client: Client,
    lease_id: i64,
    shutdown_token: CancellationToken,
    session_lost: CancellationToken,
}

impl EtcdCoordinator {
    /// Connects to `endpoints`, grants a lease of `lease_ttl`, and starts
    /// keeping it alive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CoordinationUnavailable`] if the cluster cannot be
    /// reached within `retry`.
    ///
    /// [`Error::CoordinationUnavailable`]: crate::Error::CoordinationUnavailable
    pub async fn connect(endpoints: &[String], lease_ttl: Duration, retry: &RetryPolicy) -> Result<Self> {
        let ttl_secs = lease_ttl.as_secs().max(1) as i64;
        let timeout = Duration::from_secs(ttl_secs as u64);

        let (client, lease_id) = retry
            .run("connect to etcd", move || async move {
                let options = ConnectOptions::new()
                    .with_connect_timeout(timeout)
                    .with_timeout(timeout);
                let mut client = Client::connect(endpoints, Some(options))
                    .await
                    .map_err(unreachable)?;
                let lease = client.lease_grant(ttl_secs, None).await.map_err(unreachable)?;
                Ok((client, lease.id()))
            })
            .await?;

        let (keeper, responses) = retry
            .run("start lease keep-alive", || {
                let mut client = client.clone();
                async move { client.lease_keep_alive(lease_id).await.map_err(unreachable) }
            })
            .await?;

        let shutdown_token = CancellationToken::new();
        let session_lost = CancellationToken::new();
        tokio::spawn(keep_lease_alive(
            lease_id,
            Duration::from_secs(ttl_secs as u64),
            keeper,
            responses,
            shutdown_token.clone(),
            session_lost.clone(),
        ));

        tracing::info!(lease_id, ttl_secs, "etcd session established");
        Ok(Self {
            client,
            lease_id,
            shutdown_token,
            session_lost,
        })
    }

    pub fn lease_id(&self) -> i64 {
        self.lease_id
    }
}

#[async_trait]
impl Coordinator for EtcdCoordinator {
    async fn try_claim(&self, key: &str, owner: &[u8]) -> Result<bool, CoordinationError> {
        if self.session_lost.is_cancelled() {
            return Err(CoordinationError::SessionClosed);
        }
        let txn = Txn::new()
            .when([Compare::create_revision(key, CompareOp::Equal, 0)])
            .and_then([TxnOp::put(
                key,
                owner,
                Some(PutOptions::new().with_lease(self.lease_id)),
            )])
            .or_else([TxnOp::get(key, None)]);
        let mut client = self.client.clone();
        let resp = client.txn(txn).await.map_err(unreachable)?;
        if resp.succeeded() {
            return Ok(true);
        }
        // A retried claim may find the put from an attempt whose response
        // never arrived.
        let held = resp.op_responses().iter().any(|op| match op {
            TxnOpResponse::Get(get) => get
                .kvs()
                .first()
                .is_some_and(|kv| kv.value() == owner && kv.lease() == self.lease_id),
            _ => false,
        });
        Ok(held)
    }

    fn owner_token(&self) -> String {
        format!("etcd-lease-{:x}", self.lease_id)
    }

    fn session_lost(&self) -> CancellationToken {
        self.session_lost.clone()
    }

    async fn release(&self) -> Result<(), CoordinationError> {
        self.shutdown_token.cancel();
        self.session_lost.cancel();
        let mut client = self.client.clone();
        client
            .lease_revoke(self.lease_id)
            .await
            .map_err(unreachable)?;
        tracing::info!(lease_id = self.lease_id, "etcd lease revoked");
        Ok(())
    }
}

impl Drop for EtcdCoordinator {
    fn drop(&mut self) {
        self.shutdown_token.cancel();
    }
}

/// Tracks how long ago the lease was last confirmed alive.
#[derive(Copy, Clone, Debug)]
struct Renewal {
    ttl: Duration,
    last: Instant,
}

impl Renewal {
    fn new(ttl: Duration, now: Instant) -> Self {
        Self { ttl, last: now }
    }

    fn renewed(&mut self, now: Instant) {
        self.last = now;
    }

    /// The server may already have expired the lease.
    fn lapsed(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last) >= self.ttl
    }
}

async fn keep_lease_alive(
    lease_id: i64,
    ttl: Duration,
    mut keeper: LeaseKeeper,
    mut responses: LeaseKeepAliveStream,
    shutdown: CancellationToken,
    lost: CancellationToken,
) {
    let period = (ttl / 3).max(Duration::from_secs(1));
    let mut ticker = tokio::time::interval(period);
    let mut renewal = Renewal::new(ttl, Instant::now());

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if renewal.lapsed(Instant::now()) {
                    tracing::error!(lease_id, ?ttl, "no lease renewal within ttl; worker slot is no longer held");
                    break;
                }
                if let Err(e) = keeper.keep_alive().await {
                    tracing::warn!(lease_id, error = %e, "lease keep-alive request failed");
                    continue;
                }
                match tokio::time::timeout(period, responses.message()).await {
                    Ok(Ok(Some(resp))) if resp.ttl() > 0 => {
                        renewal.renewed(Instant::now());
                        tracing::trace!(lease_id, ttl = resp.ttl(), "lease renewed");
                    }
                    Ok(Ok(_)) => {
                        tracing::error!(lease_id, "lease expired; worker slot is no longer held");
                        break;
                    }
                    Ok(Err(e)) => {
                        tracing::error!(lease_id, error = %e, "lease keep-alive stream failed");
                        break;
                    }
                    Err(_) => {
                        tracing::warn!(lease_id, "lease keep-alive response timed out");
                    }
                }
            }
        }
    }
    lost.cancel();
}

fn unreachable(e: etcd_client::Error) -> CoordinationError {
    CoordinationError::Unreachable(e.to_string())
}
