mod conditions;
mod dependency_index;
mod lifecycle;
mod listeners;
mod route;
mod wrapped_gateway;

pub use self::dependency_index::DependencyIndex;
pub use self::lifecycle::Lifecycle;
pub use self::route::RouteReconciler;
pub use self::wrapped_gateway::WrappedGatewayReconciler;

use crate::kubernetes::objects::{ObjectRef, ObjectRefError};
use crate::kubernetes::routes::RouteResource;
use crate::options::Options;
use crate::store::{ResourceStore, StoreError};
use futures::StreamExt;
use gateway_api::apis::experimental::tlsroutes::TLSRoute;
use gateway_api::apis::standard::gateways::Gateway;
use gateway_api::apis::standard::grpcroutes::GRPCRoute;
use gateway_api::apis::standard::httproutes::HTTPRoute;
use gwc_api::v1::WrappedGateway;
use gwc_core::task::Builder as TaskBuilder;
use kube::core::NamespaceResourceScope;
use kube::runtime::controller::{self, Action};
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, Resource};
use std::fmt::Debug;
use std::future::{Future, ready};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_shutdown::Shutdown;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Reconciliation was cancelled by shutdown")]
    Cancelled,
}

impl ReconcileError {
    /// Conflicts and transport failures are worth another pass. Anything else
    /// was already absorbed before reaching the scheduler.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::Store(err) => matches!(
                err,
                StoreError::Conflict(_) | StoreError::AlreadyExists(_) | StoreError::Transport(_)
            ),
            ReconcileError::Cancelled => true,
        }
    }

    /// Store errors that a retry cannot fix end the reconcile quietly.
    pub(crate) fn propagate(err: StoreError) -> Result<(), ReconcileError> {
        let err = ReconcileError::Store(err);
        if err.is_retryable() {
            Err(err)
        } else {
            debug!(error = %err, "Absorbing store error");
            Ok(())
        }
    }
}

struct Context<R> {
    reconciler: R,
    options: Arc<Options>,
    shutdown: Shutdown,
}

/// Runs `reconcile` unless `shutdown` resolves first, in which case the pass
/// is abandoned and reported as cancelled.
async fn cancellable<S, F>(shutdown: S, reconcile: F) -> Result<(), ReconcileError>
where
    S: Future<Output = ()>,
    F: Future<Output = Result<(), ReconcileError>>,
{
    tokio::select! {
        result = reconcile => result,
        () = shutdown => Err(ReconcileError::Cancelled),
    }
}

fn key_of<K>(object: &K) -> Option<ObjectRef>
where
    K: Resource<DynamicType = ()>,
{
    match ObjectRef::for_object(object) {
        Ok(key) => Some(key),
        Err(ObjectRefError::MissingName) => {
            warn!(kind = %K::kind(&()), "Ignoring object without a name");
            None
        }
    }
}

async fn reconcile_wrapped_gateway(
    object: Arc<WrappedGateway>,
    ctx: Arc<Context<WrappedGatewayReconciler>>,
) -> Result<Action, ReconcileError> {
    let Some(key) = key_of(object.as_ref()) else {
        return Ok(Action::await_change());
    };

    cancellable(
        ctx.shutdown.handle(),
        ctx.reconciler.reconcile(key.namespace(), key.name()),
    )
    .await?;

    Ok(Action::requeue(ctx.options.controller_requeue_duration()))
}

async fn reconcile_route<K: RouteResource>(
    object: Arc<K>,
    ctx: Arc<Context<RouteReconciler>>,
) -> Result<Action, ReconcileError> {
    let Some(key) = key_of(object.as_ref()) else {
        return Ok(Action::await_change());
    };

    cancellable(
        ctx.shutdown.handle(),
        ctx.reconciler
            .reconcile(K::ROUTE_KIND, key.namespace(), key.name()),
    )
    .await?;

    Ok(Action::requeue(ctx.options.controller_requeue_duration()))
}

/// Cancelled passes and lost write races come back quickly. Anything else
/// waits out the error backoff.
fn requeue_after(err: &ReconcileError, options: &Options) -> Duration {
    match err {
        ReconcileError::Store(StoreError::Conflict(_) | StoreError::AlreadyExists(_))
        | ReconcileError::Cancelled => options.conflict_requeue_duration(),
        ReconcileError::Store(_) => options.controller_error_requeue_duration(),
    }
}

fn error_policy<K, R>(object: Arc<K>, err: &ReconcileError, ctx: Arc<Context<R>>) -> Action
where
    K: Resource<DynamicType = ()>,
{
    let requeue_after = requeue_after(err, &ctx.options);

    warn!(
        kind = %K::kind(&()),
        namespace = ?object.meta().namespace,
        name = ?object.meta().name,
        error = %err,
        requeue_after = ?requeue_after,
        "Reconciliation failed"
    );

    Action::requeue(requeue_after)
}

fn log_reconcile_result<T: Debug, E: Debug>(
    kind: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(reconciled) => debug!(kind, ?reconciled, "Reconciled"),
            Err(err) => debug!(kind, error = ?err, "Controller reported an error"),
        }
        ready(())
    }
}

fn controller_config(options: &Options) -> controller::Config {
    controller::Config::default().concurrency(options.concurrency())
}

fn spawn_route_controller<K>(
    task_builder: &TaskBuilder,
    client: &Client,
    ctx: Arc<Context<RouteReconciler>>,
    task_name: &'static str,
) where
    K: RouteResource<Scope = NamespaceResourceScope>,
{
    let routes = Api::<K>::all(client.clone());
    let config = controller_config(&ctx.options);

    task_builder.new_task(task_name).spawn(
        Controller::new(routes, WatcherConfig::default())
            .with_config(config)
            .shutdown_on_signal()
            .run(reconcile_route::<K>, error_policy::<K, RouteReconciler>, ctx)
            .for_each(log_reconcile_result(K::ROUTE_KIND.kind())),
    );
}

/// Starts the WrappedGateway controller and one controller per route kind.
/// All route controllers share a single [`RouteReconciler`].
pub fn spawn_controllers(
    task_builder: &TaskBuilder,
    client: &Client,
    store: Arc<dyn ResourceStore>,
    options: Arc<Options>,
) {
    let shutdown = task_builder.shutdown();

    let wrapped_gateway_ctx = Arc::new(Context {
        reconciler: WrappedGatewayReconciler::new(store.clone(), options.clone()),
        options: options.clone(),
        shutdown: shutdown.clone(),
    });
    let wrapped_gateways = Api::<WrappedGateway>::all(client.clone());
    let gateways = Api::<Gateway>::all(client.clone());

    info!("Starting WrappedGateway controller");
    task_builder.new_task("wrapped_gateway_controller").spawn(
        Controller::new(wrapped_gateways, WatcherConfig::default())
            .owns(gateways, WatcherConfig::default())
            .with_config(controller_config(&options))
            .shutdown_on_signal()
            .run(
                reconcile_wrapped_gateway,
                error_policy::<WrappedGateway, WrappedGatewayReconciler>,
                wrapped_gateway_ctx,
            )
            .for_each(log_reconcile_result("WrappedGateway")),
    );

    let route_ctx = Arc::new(Context {
        reconciler: RouteReconciler::new(store, options.clone()),
        options,
        shutdown,
    });

    info!("Starting route controllers");
    spawn_route_controller::<HTTPRoute>(task_builder, client, route_ctx.clone(), "http_route_controller");
    spawn_route_controller::<GRPCRoute>(task_builder, client, route_ctx.clone(), "grpc_route_controller");
    spawn_route_controller::<TLSRoute>(task_builder, client, route_ctx, "tls_route_controller");
}
