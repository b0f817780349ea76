use async_trait::async_trait;
use gwc_api::constants::LEADER_ELECTION_LEASE;
use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams};
#[cfg(test)]
use mockall::automock;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum LeaderElectionError {
    #[error("Lease request failed: {0}")]
    Lease(String),
}

/// A lease owned by at most one replica at a time.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LeaderLease: Send + Sync {
    /// Takes the lease when it is free or expired, renews it when already
    /// held. Returns whether this replica holds it afterwards.
    async fn try_acquire_or_renew(&self) -> Result<bool, LeaderElectionError>;

    /// Releases the lease so another replica can take over without waiting
    /// for it to expire.
    async fn step_down(&self) -> Result<(), LeaderElectionError>;
}

/// [`LeaderLease`] backed by a `coordination.k8s.io` Lease.
pub struct KubeLease {
    lock: LeaseLock,
}

impl KubeLease {
    pub fn new(
        client: Client,
        namespace: &str,
        holder_id: impl Into<String>,
        lease_duration: Duration,
    ) -> Self {
        let lock = LeaseLock::new(
            client,
            namespace,
            LeaseLockParams {
                holder_id: holder_id.into(),
                lease_name: LEADER_ELECTION_LEASE.to_string(),
                lease_ttl: lease_duration,
            },
        );
        Self { lock }
    }
}

#[async_trait]
impl LeaderLease for KubeLease {
    async fn try_acquire_or_renew(&self) -> Result<bool, LeaderElectionError> {
        self.lock
            .try_acquire_or_renew()
            .await
            .map(|result| result.acquired_lease)
            .map_err(|err| LeaderElectionError::Lease(err.to_string()))
    }

    async fn step_down(&self) -> Result<(), LeaderElectionError> {
        self.lock
            .step_down()
            .await
            .map_err(|err| LeaderElectionError::Lease(err.to_string()))
    }
}

/// Retries every `retry_interval` until the lease is held. Returns `false`
/// when `shutdown` resolves first.
pub async fn acquire<S>(lease: &dyn LeaderLease, retry_interval: Duration, shutdown: S) -> bool
where
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        match lease.try_acquire_or_renew().await {
            Ok(true) => {
                info!("Acquired leadership");
                return true;
            }
            Ok(false) => debug!("Lease is held by another replica"),
            Err(err) => warn!(error = %err, "Failed to acquire lease"),
        }

        tokio::select! {
            () = sleep(retry_interval) => {}
            () = &mut shutdown => return false,
        }
    }
}

/// Renews a held lease every `retry_interval`. Returns once leadership is
/// lost: another replica holds the lease, or renewals have failed for a
/// whole `lease_duration`.
pub async fn hold(lease: &dyn LeaderLease, retry_interval: Duration, lease_duration: Duration) {
    let mut renewed_at = Instant::now();

    loop {
        sleep(retry_interval).await;

        match lease.try_acquire_or_renew().await {
            Ok(true) => {
                renewed_at = Instant::now();
                debug!("Renewed lease");
            }
            Ok(false) => {
                warn!("Lease was taken over by another replica");
                return;
            }
            Err(err) => {
                warn!(error = %err, "Failed to renew lease");
                if renewed_at.elapsed() >= lease_duration {
                    warn!(
                        lease_duration = ?lease_duration,
                        "Lease expired without a successful renewal"
                    );
                    return;
                }
            }
        }
    }
}
