use super::ReconcileError;
use super::conditions::{Outcome, apply_outcome, is_stale};
use super::lifecycle::{Lifecycle, add_finalizer, remove_finalizer};
use super::listeners::{collect_route_listeners, desired_gateway, merge_gateway};
use crate::kubernetes::routes::{Route, RouteKind};
use crate::options::Options;
use crate::store::{ResourceStore, StoreError, retry_on_conflict};
use gwc_api::constants::Reason;
use gwc_api::v1::WrappedGateway;
use k8s_openapi::chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Drives the Gateway derived from each WrappedGateway, and the
/// WrappedGateway's status, toward the desired state.
pub struct WrappedGatewayReconciler {
    store: Arc<dyn ResourceStore>,
    options: Arc<Options>,
}

impl WrappedGatewayReconciler {
    pub fn new(store: Arc<dyn ResourceStore>, options: Arc<Options>) -> Self {
        Self { store, options }
    }

    #[instrument(skip(self))]
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<(), ReconcileError> {
        let Some(mut wrapped_gateway) = self.store.get_wrapped_gateway(namespace, name).await?
        else {
            debug!("WrappedGateway no longer exists");
            return Ok(());
        };

        match Lifecycle::of(&wrapped_gateway.metadata) {
            Lifecycle::Gone => return Ok(()),
            Lifecycle::PendingDeletion => {
                return self.finalize(namespace, name, wrapped_gateway).await;
            }
            Lifecycle::Active => {}
        }

        if add_finalizer(&mut wrapped_gateway.metadata) {
            wrapped_gateway = match self.store.replace_wrapped_gateway(&wrapped_gateway).await {
                Ok(wrapped_gateway) => wrapped_gateway,
                Err(err) => {
                    return self.fail(namespace, name, Reason::FinalizerFailed, err).await;
                }
            };
            debug!("Added finalizer");
        }

        let existing = match self.store.get_gateway(namespace, name).await {
            Ok(existing) => existing,
            Err(err) => return self.fail(namespace, name, Reason::GatewayFetchFailed, err).await,
        };

        let routes = match self.list_routes().await {
            Ok(routes) => routes,
            Err(err) => return self.fail(namespace, name, Reason::RoutesFetchFailed, err).await,
        };
        let route_listeners = collect_route_listeners(&routes, namespace, name);

        let desired = match desired_gateway(&wrapped_gateway, &route_listeners) {
            Ok(desired) => desired,
            Err(err) => {
                error!(error = %err, "Unable to build Gateway");
                self.record(namespace, name, &Outcome::failed(Reason::GatewaySyncFailed, err))
                    .await;
                return Ok(());
            }
        };

        let synced = match existing {
            None => self.store.create_gateway(&desired).await.map(|_| "created"),
            Some(existing) => match merge_gateway(&existing, desired) {
                Ok(None) => Ok("unchanged"),
                Ok(Some(merged)) => self.store.replace_gateway(&merged).await.map(|_| "updated"),
                Err(err) => {
                    error!(error = %err, "Unable to compare Gateway");
                    self.record(namespace, name, &Outcome::failed(Reason::GatewaySyncFailed, err))
                        .await;
                    return Ok(());
                }
            },
        };
        match synced {
            Ok("unchanged") => debug!(listeners = route_listeners.len(), "Gateway is up to date"),
            Ok(action) => info!(listeners = route_listeners.len(), action, "Synced Gateway"),
            Err(err) => return self.fail(namespace, name, Reason::GatewaySyncFailed, err).await,
        }

        if let Err(err) = self.write_status(namespace, name, &Outcome::succeeded()).await {
            return self.fail(namespace, name, Reason::GatewayStatusFailed, err).await;
        }

        Ok(())
    }

    /// Releases a WrappedGateway marked for deletion. The store collects the
    /// owned Gateway once the finalizer is gone.
    async fn finalize(
        &self,
        namespace: &str,
        name: &str,
        mut wrapped_gateway: WrappedGateway,
    ) -> Result<(), ReconcileError> {
        if remove_finalizer(&mut wrapped_gateway.metadata) {
            if let Err(err) = self.store.replace_wrapped_gateway(&wrapped_gateway).await {
                return self.fail(namespace, name, Reason::FinalizerFailed, err).await;
            }
            info!("Removed finalizer from deleted WrappedGateway");
        }
        Ok(())
    }

    /// Every route kind is listed on its own.
    async fn list_routes(&self) -> Result<Vec<Route>, StoreError> {
        let mut routes = Vec::new();
        for kind in RouteKind::all() {
            let listed = self.store.list_routes(kind).await?;
            debug!(%kind, count = listed.len(), "Listed routes");
            routes.extend(listed);
        }
        Ok(routes)
    }

    /// Records `outcome` on the Ready condition, re-reading the object on
    /// conflict. Unchanged statuses are only rewritten after a successful
    /// reconcile once they have gone stale.
    async fn write_status(
        &self,
        namespace: &str,
        name: &str,
        outcome: &Outcome,
    ) -> Result<(), StoreError> {
        let refresh_interval = self.options.status_refresh_interval();

        retry_on_conflict(
            self.options.conflict_retry_attempts(),
            "write WrappedGateway status",
            || async {
                let Some(mut current) = self.store.get_wrapped_gateway(namespace, name).await?
                else {
                    return Ok(());
                };

                let now = Utc::now();
                let generation = current.metadata.generation;
                let status = current.status.get_or_insert_with(Default::default);
                let stale = is_stale(status, now, refresh_interval);
                let changed = apply_outcome(status, outcome, generation, now);

                if !changed && !(stale && outcome.reason().is_success()) {
                    debug!(reason = %outcome.reason(), "Status is up to date");
                    return Ok(());
                }

                self.store.replace_wrapped_gateway_status(&current).await?;
                debug!(reason = %outcome.reason(), "Wrote status");
                Ok(())
            },
        )
        .await
    }

    async fn record(&self, namespace: &str, name: &str, outcome: &Outcome) {
        if let Err(err) = self.write_status(namespace, name, outcome).await {
            warn!(error = %err, reason = %outcome.reason(), "Failed to record status");
        }
    }

    async fn fail(
        &self,
        namespace: &str,
        name: &str,
        reason: Reason,
        err: StoreError,
    ) -> Result<(), ReconcileError> {
        warn!(%reason, error = %err, "Reconciliation failed");
        self.record(namespace, name, &Outcome::failed(reason, &err)).await;
        ReconcileError::propagate(err)
    }
}
