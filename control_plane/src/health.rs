use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use gwc_api::v1::WrappedGateway;
use kube::api::ListParams;
use kube::{Api, Client};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_shutdown::Shutdown;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum HealthError {
    #[error("Failed to bind health server to {0}: {1}")]
    Bind(SocketAddr, std::io::Error),
    #[error("Health server failed: {0}")]
    Serve(std::io::Error),
}

#[async_trait]
pub trait ReadinessCheck: Send + Sync {
    async fn check(&self) -> Result<(), String>;
}

/// Ready once the API server answers a WrappedGateway list call.
pub struct KubernetesApiReadiness(Client);

impl KubernetesApiReadiness {
    pub fn new(client: Client) -> Self {
        Self(client)
    }
}

#[async_trait]
impl ReadinessCheck for KubernetesApiReadiness {
    async fn check(&self) -> Result<(), String> {
        Api::<WrappedGateway>::all(self.0.clone())
            .list_metadata(&ListParams::default().limit(1))
            .await
            .map(|_| ())
            .map_err(|err| err.to_string())
    }
}

async fn healthz() -> &'static str {
    "ping"
}

async fn readyz(State(readiness): State<Arc<dyn ReadinessCheck>>) -> (StatusCode, String) {
    match readiness.check().await {
        Ok(()) => (StatusCode::OK, "ok".to_string()),
        Err(err) => {
            warn!(error = %err, "Readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, err)
        }
    }
}

pub fn router(readiness: Arc<dyn ReadinessCheck>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(readiness)
}

pub async fn serve_health(
    address: SocketAddr,
    readiness: Arc<dyn ReadinessCheck>,
    shutdown: Shutdown,
) -> Result<(), HealthError> {
    let listener = TcpListener::bind(address)
        .await
        .map_err(|err| HealthError::Bind(address, err))?;

    info!(%address, "Serving health probes");
    axum::serve(listener, router(readiness))
        .with_graceful_shutdown(async move { shutdown.handle().await })
        .await
        .map_err(HealthError::Serve)
}
