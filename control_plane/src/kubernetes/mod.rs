use kube::Client;
use tracing::{error, info};

pub mod objects;
pub mod routes;

pub async fn create_client() -> Result<Client, kube::Error> {
    match Client::try_default().await {
        Ok(client) => {
            info!(
                default_namespace = client.default_namespace(),
                "Created Kubernetes client"
            );
            Ok(client)
        }
        Err(err) => {
            error!(error = %err, "Failed to create Kubernetes client");
            Err(err)
        }
    }
}
