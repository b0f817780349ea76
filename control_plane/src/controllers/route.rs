use super::ReconcileError;
use super::dependency_index::DependencyIndex;
use super::lifecycle::{Lifecycle, add_finalizer, remove_finalizer};
use crate::kubernetes::objects::ObjectRef;
use crate::kubernetes::routes::RouteKind;
use crate::options::Options;
use crate::store::{ResourceStore, retry_on_conflict};
use gwc_api::constants::ANNOTATION_CHILD_MODIFIED_AT;
use k8s_openapi::chrono::{SecondsFormat, Utc};
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

/// Keeps each route's parent-refs history and re-triggers the wrapped
/// gateways a route attaches to or detaches from.
pub struct RouteReconciler {
    store: Arc<dyn ResourceStore>,
    options: Arc<Options>,
}

impl RouteReconciler {
    pub fn new(store: Arc<dyn ResourceStore>, options: Arc<Options>) -> Self {
        Self { store, options }
    }

    #[instrument(skip(self))]
    pub async fn reconcile(
        &self,
        kind: RouteKind,
        namespace: &str,
        name: &str,
    ) -> Result<(), ReconcileError> {
        let Some(mut route) = self.store.get_route(kind, namespace, name).await? else {
            debug!("Route no longer exists");
            return Ok(());
        };
        let route_namespace = route.namespace();

        match Lifecycle::of(route.metadata()) {
            Lifecycle::Gone => return Ok(()),
            Lifecycle::PendingDeletion => {
                let previous = DependencyIndex::read(route.metadata());
                self.notify(previous.affected_gateways(&[], &route_namespace))
                    .await?;

                remove_finalizer(route.metadata_mut());
                if let Err(err) = self.store.replace_route(&route).await {
                    return ReconcileError::propagate(err);
                }
                info!("Removed finalizer from deleted route");
                return Ok(());
            }
            Lifecycle::Active => {}
        }

        if add_finalizer(route.metadata_mut()) {
            route = match self.store.replace_route(&route).await {
                Ok(route) => route,
                Err(err) => return ReconcileError::propagate(err),
            };
            debug!("Added finalizer");
        }

        let previous = DependencyIndex::read(route.metadata());
        let current = route.parent_refs();
        if previous.matches(&current) {
            debug!("Parent refs unchanged");
            return Ok(());
        }

        self.notify(previous.affected_gateways(&current, &route_namespace))
            .await?;

        if let Err(err) = DependencyIndex::new(current).write(route.metadata_mut()) {
            error!(error = %err, "Unable to encode parent refs");
            return Ok(());
        }
        if let Err(err) = self.store.replace_route(&route).await {
            return ReconcileError::propagate(err);
        }
        info!(parent_refs = route.parent_refs().len(), "Recorded parent refs");

        Ok(())
    }

    /// Touches the child-modified annotation on each wrapped gateway so its
    /// reconciler runs again. Gateways that no longer exist are skipped.
    async fn notify(&self, wrapped_gateways: Vec<ObjectRef>) -> Result<(), ReconcileError> {
        for wrapped_gateway_ref in wrapped_gateways {
            let namespace = wrapped_gateway_ref.namespace().as_str();
            let name = wrapped_gateway_ref.name().as_str();

            let touched = retry_on_conflict(
                self.options.conflict_retry_attempts(),
                "touch WrappedGateway",
                || async {
                    let Some(mut wrapped_gateway) =
                        self.store.get_wrapped_gateway(namespace, name).await?
                    else {
                        return Ok(false);
                    };

                    wrapped_gateway.annotations_mut().insert(
                        ANNOTATION_CHILD_MODIFIED_AT.to_string(),
                        Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
                    );
                    self.store.replace_wrapped_gateway(&wrapped_gateway).await?;
                    Ok(true)
                },
            )
            .await;

            match touched {
                Ok(true) => info!(wrapped_gateway = %wrapped_gateway_ref, "Notified WrappedGateway"),
                Ok(false) => {
                    debug!(wrapped_gateway = %wrapped_gateway_ref, "WrappedGateway not found, skipping");
                }
                Err(err) if err.is_not_found() => {
                    debug!(wrapped_gateway = %wrapped_gateway_ref, "WrappedGateway not found, skipping");
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }
}
