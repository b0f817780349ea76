mod kube_store;

pub use self::kube_store::KubeStore;

use crate::kubernetes::routes::{Route, RouteKind};
use async_trait::async_trait;
use gateway_api::apis::standard::gateways::Gateway;
use gwc_api::v1::WrappedGateway;
#[cfg(test)]
use mockall::automock;
use std::future::Future;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} was modified since it was read")]
    Conflict(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("Store request failed: {0}")]
    Transport(String),
    #[error("Failed to serialize object: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Typed access to the objects the reconcilers read and write.
///
/// `get_*` answers `Ok(None)` when the object does not exist. Every `replace_*`
/// is conditional on the `metadata.resourceVersion` carried by the argument and
/// fails with [`StoreError::Conflict`] when that version is stale.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get_wrapped_gateway(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WrappedGateway>, StoreError>;

    async fn replace_wrapped_gateway(
        &self,
        wrapped_gateway: &WrappedGateway,
    ) -> Result<WrappedGateway, StoreError>;

    /// Writes only the status subresource.
    async fn replace_wrapped_gateway_status(
        &self,
        wrapped_gateway: &WrappedGateway,
    ) -> Result<WrappedGateway, StoreError>;

    async fn get_gateway(&self, namespace: &str, name: &str)
    -> Result<Option<Gateway>, StoreError>;

    async fn create_gateway(&self, gateway: &Gateway) -> Result<Gateway, StoreError>;

    async fn replace_gateway(&self, gateway: &Gateway) -> Result<Gateway, StoreError>;

    async fn get_route(
        &self,
        kind: RouteKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Route>, StoreError>;

    /// Lists routes of one kind across all namespaces.
    async fn list_routes(&self, kind: RouteKind) -> Result<Vec<Route>, StoreError>;

    async fn replace_route(&self, route: &Route) -> Result<Route, StoreError>;
}

/// Runs `operation` again while it fails with a conflict, up to `attempts`
/// times in total. The operation is expected to re-read whatever it writes.
pub async fn retry_on_conflict<F, Fut, T>(
    attempts: u32,
    operation_name: &str,
    mut operation: F,
) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        match operation().await {
            Err(err) if err.is_conflict() && attempt < attempts.max(1) => {
                debug!(
                    operation = %operation_name,
                    attempt,
                    error = %err,
                    "Conflict, retrying with a fresh read"
                );
            }
            Err(err) => {
                if err.is_conflict() {
                    warn!(
                        operation = %operation_name,
                        attempt,
                        error = %err,
                        "Conflict persisted after retries"
                    );
                }
                return Err(err);
            }
            Ok(result) => return Ok(result),
        }
    }
}
