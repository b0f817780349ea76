#![warn(
    clippy::pedantic,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used,
    clippy::expect_used
)]

use clap::Parser;
use gwc_control_plane::cli::Cli;
use gwc_control_plane::controllers::spawn_controllers;
use gwc_control_plane::health::{KubernetesApiReadiness, serve_health};
use gwc_control_plane::kubernetes::create_client;
use gwc_control_plane::leader::{self, KubeLease, LeaderLease};
use gwc_control_plane::store::KubeStore;
use gwc_control_plane::Options;
use gwc_core::crypto::init_crypto;
use gwc_core::instrumentation::{InstrumentationError, init_instrumentation};
use gwc_core::task::{Builder as TaskBuilder, TaskBuilderError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum MainError {
    #[error("Failed to initialise instrumentation: {0}")]
    Instrumentation(#[from] InstrumentationError),
    #[error("Failed to set up task supervision: {0}")]
    Tasks(#[from] TaskBuilderError),
    #[error("Failed to create Kubernetes client: {0}")]
    KubeClient(#[from] kube::Error),
    #[error("Leader election needs an identity, set --leader-election-identity or HOSTNAME")]
    MissingLeaseIdentity,
    #[error("Lost leadership of the controllers")]
    LeadershipLost,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), MainError> {
    let args = Cli::parse();

    init_crypto();
    init_instrumentation(args.log_format(), args.log_level())?;

    let options = Arc::new(Options::builder().concurrency(args.concurrency()).build());
    let task_builder = TaskBuilder::new()?;
    let client = create_client().await?;

    {
        let readiness = Arc::new(KubernetesApiReadiness::new(client.clone()));
        let shutdown = task_builder.shutdown();
        let address = args.health_address();
        task_builder.new_task("health").spawn(async move {
            if let Err(err) = serve_health(address, readiness, shutdown).await {
                error!(error = %err, "Health server stopped");
            }
        });
    }

    let lease = if args.leader_election() {
        let identity = args
            .leader_election_identity()
            .clone()
            .ok_or(MainError::MissingLeaseIdentity)?;
        let namespace = args
            .leader_election_namespace()
            .clone()
            .unwrap_or_else(|| client.default_namespace().to_string());
        info!(%identity, %namespace, "Waiting for leadership");

        let lease = KubeLease::new(client.clone(), &namespace, identity, options.lease_duration());
        let shutdown = task_builder.shutdown();
        if !leader::acquire(&lease, options.lease_retry_interval(), shutdown.handle()).await {
            info!("Shut down before acquiring leadership");
            return Ok(());
        }
        Some(lease)
    } else {
        None
    };

    let store = Arc::new(KubeStore::new(client.clone()));
    spawn_controllers(&task_builder, &client, store, options.clone());

    task_builder
        .new_task("shutdown_notice")
        .spawn_on_shutdown(async { info!("Shutdown requested, stopping controllers") });

    info!("Controllers started");

    let Some(lease) = lease else {
        task_builder.join_all().await;
        info!("Shut down");
        return Ok(());
    };

    tokio::select! {
        () = task_builder.join_all() => {}
        () = leader::hold(&lease, options.lease_retry_interval(), options.lease_duration()) => {
            error!("Leadership lost, exiting so another replica can take over");
            return Err(MainError::LeadershipLost);
        }
    }

    if let Err(err) = lease.step_down().await {
        warn!(error = %err, "Failed to release leader lease");
    }
    info!("Shut down");

    Ok(())
}
