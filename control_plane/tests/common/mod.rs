//! In-memory store and fixpoint driver shared by the reconciliation tests.

#![allow(dead_code)]

use async_trait::async_trait;
use gateway_api::apis::experimental::tlsroutes::TLSRoute;
use gateway_api::apis::standard::gateways::Gateway;
use gateway_api::apis::standard::grpcroutes::GRPCRoute;
use gateway_api::apis::standard::httproutes::HTTPRoute;
use gwc_api::v1::WrappedGateway;
use gwc_control_plane::Options;
use gwc_control_plane::controllers::{RouteReconciler, WrappedGatewayReconciler};
use gwc_control_plane::kubernetes::routes::{Route, RouteKind, RouteResource};
use gwc_control_plane::store::{ResourceStore, StoreError};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use k8s_openapi::chrono::Utc;
use kube::api::ObjectMeta;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, Once};

static INIT: Once = Once::new();

pub fn init_test_env() {
    INIT.call_once(|| {
        gwc_core::crypto::init_crypto();
    });
}

type Key = (String, String);
type RouteKey = (RouteKind, String, String);

/// A pending reconcile, deduplicated while queued.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum WorkItem {
    WrappedGateway(String, String),
    Route(RouteKind, String, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub operation: &'static str,
}

impl WriteRecord {
    pub fn describe(&self) -> String {
        format!("{} {}/{}/{}", self.operation, self.kind, self.namespace, self.name)
    }
}

#[derive(Default)]
struct State {
    wrapped_gateways: BTreeMap<Key, WrappedGateway>,
    gateways: BTreeMap<Key, Gateway>,
    routes: BTreeMap<RouteKey, Route>,
    version: u64,
    writes: Vec<WriteRecord>,
    pending: VecDeque<WorkItem>,
    wrapped_gateway_gets: Vec<Key>,
}

fn key_of(metadata: &ObjectMeta) -> Key {
    (
        metadata
            .namespace
            .clone()
            .unwrap_or_else(|| "default".to_string()),
        metadata.name.clone().unwrap_or_default(),
    )
}

/// The object as it would compare after a write, ignoring its resource version.
fn comparable<T: Serialize>(object: &T) -> Value {
    let mut value = serde_json::to_value(object).expect("serializable object");
    if let Some(metadata) = value.get_mut("metadata").and_then(Value::as_object_mut) {
        metadata.remove("resourceVersion");
    }
    value
}

fn route_value(route: &Route) -> Value {
    match route {
        Route::Http(route) => comparable(route),
        Route::Grpc(route) => comparable(route),
        Route::Tls(route) => comparable(route),
    }
}

fn finalizers_empty(metadata: &ObjectMeta) -> bool {
    metadata.finalizers.as_ref().is_none_or(Vec::is_empty)
}

/// Keeps the fields a client cannot change through an update.
fn keep_server_fields(next: &mut ObjectMeta, stored: &ObjectMeta) {
    next.uid.clone_from(&stored.uid);
    next.generation = stored.generation;
    next.creation_timestamp.clone_from(&stored.creation_timestamp);
    next.deletion_timestamp.clone_from(&stored.deletion_timestamp);
}

impl State {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }

    fn stamp_new(&mut self, metadata: &mut ObjectMeta) {
        let version = self.next_version();
        metadata.uid = Some(format!("uid-{version}"));
        metadata.resource_version = Some(version);
        metadata.generation = Some(1);
        metadata.creation_timestamp = Some(Time(Utc::now()));
        if metadata.namespace.is_none() {
            metadata.namespace = Some("default".to_string());
        }
    }

    fn enqueue(&mut self, item: WorkItem) {
        if !self.pending.contains(&item) {
            self.pending.push_back(item);
        }
    }

    fn record(&mut self, kind: &str, key: &Key, operation: &'static str) {
        self.writes.push(WriteRecord {
            kind: kind.to_string(),
            namespace: key.0.clone(),
            name: key.1.clone(),
            operation,
        });
    }

    fn enqueue_owner(&mut self, gateway: &Gateway) {
        let namespace = key_of(&gateway.metadata).0;
        for owner in gateway.metadata.owner_references.iter().flatten() {
            if owner.kind == "WrappedGateway" {
                self.enqueue(WorkItem::WrappedGateway(
                    namespace.clone(),
                    owner.name.clone(),
                ));
            }
        }
    }

    /// Removes every Gateway owned by the object with `uid`.
    fn collect_garbage(&mut self, uid: Option<&str>) {
        let Some(uid) = uid else {
            return;
        };
        let owned = self
            .gateways
            .iter()
            .filter(|(_, gateway)| {
                gateway
                    .metadata
                    .owner_references
                    .iter()
                    .flatten()
                    .any(|owner| owner.uid == uid)
            })
            .map(|(key, _)| key.clone())
            .collect::<Vec<_>>();
        for key in owned {
            self.gateways.remove(&key);
            self.record("Gateway", &key, "collect");
        }
    }

    fn remove_wrapped_gateway(&mut self, key: &Key) {
        if let Some(removed) = self.wrapped_gateways.remove(key) {
            self.record("WrappedGateway", key, "remove");
            self.collect_garbage(removed.metadata.uid.as_deref());
        }
    }

    fn store_wrapped_gateway(&mut self, key: Key, wrapped_gateway: WrappedGateway) {
        let released = wrapped_gateway.metadata.deletion_timestamp.is_some()
            && finalizers_empty(&wrapped_gateway.metadata);
        self.wrapped_gateways.insert(key.clone(), wrapped_gateway);
        self.enqueue(WorkItem::WrappedGateway(key.0.clone(), key.1.clone()));
        if released {
            self.remove_wrapped_gateway(&key);
        }
    }

    fn store_route(&mut self, key: RouteKey, route: Route) {
        let released =
            route.metadata().deletion_timestamp.is_some() && finalizers_empty(route.metadata());
        self.enqueue(WorkItem::Route(key.0, key.1.clone(), key.2.clone()));
        if released {
            self.routes.remove(&key);
            self.record(key.0.kind(), &(key.1, key.2), "remove");
        } else {
            self.routes.insert(key, route);
        }
    }
}

/// A [`ResourceStore`] that enforces resource versions, finalizer-gated
/// deletion, owner-reference garbage collection and no-op suppression, and
/// queues the reconciles its writes would trigger in a real cluster.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("store lock")
    }

    pub fn apply_wrapped_gateway(&self, mut wrapped_gateway: WrappedGateway) {
        let mut state = self.state();
        let key = key_of(&wrapped_gateway.metadata);
        match state.wrapped_gateways.get(&key).cloned() {
            Some(stored) => {
                let spec_changed = stored.spec != wrapped_gateway.spec;
                let mut next = stored;
                next.spec = wrapped_gateway.spec;
                next.metadata.labels = wrapped_gateway.metadata.labels;
                next.metadata.annotations = wrapped_gateway.metadata.annotations;
                if spec_changed {
                    next.metadata.generation = next.metadata.generation.map(|g| g + 1);
                }
                next.metadata.resource_version = Some(state.next_version());
                state.record("WrappedGateway", &key, "apply");
                state.store_wrapped_gateway(key, next);
            }
            None => {
                state.stamp_new(&mut wrapped_gateway.metadata);
                state.record("WrappedGateway", &key, "apply");
                state.store_wrapped_gateway(key, wrapped_gateway);
            }
        }
    }

    pub fn apply_route(&self, mut route: Route) {
        let mut state = self.state();
        let (namespace, name) = key_of(route.metadata());
        let key = (route.kind(), namespace.clone(), name.clone());
        match state.routes.get(&key).cloned() {
            Some(stored) => {
                let annotations = stored.metadata().annotations.clone();
                let finalizers = stored.metadata().finalizers.clone();
                let spec_changed = route_value(&stored)["spec"] != route_value(&route)["spec"];
                keep_server_fields(route.metadata_mut(), stored.metadata());
                let metadata = route.metadata_mut();
                metadata.annotations = annotations;
                metadata.finalizers = finalizers;
                if spec_changed {
                    metadata.generation = metadata.generation.map(|g| g + 1);
                }
                let version = state.next_version();
                route.metadata_mut().resource_version = Some(version);
            }
            None => state.stamp_new(route.metadata_mut()),
        }
        state.record(key.0.kind(), &(namespace, name), "apply");
        state.store_route(key, route);
    }

    /// Deletes the way the API server does: objects holding finalizers only
    /// get a deletion timestamp.
    pub fn delete_wrapped_gateway(&self, namespace: &str, name: &str) {
        let mut state = self.state();
        let key = (namespace.to_string(), name.to_string());
        let Some(mut stored) = state.wrapped_gateways.get(&key).cloned() else {
            return;
        };
        if finalizers_empty(&stored.metadata) {
            state.remove_wrapped_gateway(&key);
            return;
        }
        stored.metadata.deletion_timestamp = Some(Time(Utc::now()));
        stored.metadata.resource_version = Some(state.next_version());
        state.record("WrappedGateway", &key, "delete");
        state.store_wrapped_gateway(key, stored);
    }

    pub fn delete_route(&self, kind: RouteKind, namespace: &str, name: &str) {
        let mut state = self.state();
        let key = (kind, namespace.to_string(), name.to_string());
        let Some(mut stored) = state.routes.get(&key).cloned() else {
            return;
        };
        state.record(kind.kind(), &(key.1.clone(), key.2.clone()), "delete");
        if finalizers_empty(stored.metadata()) {
            state.routes.remove(&key);
            return;
        }
        stored.metadata_mut().deletion_timestamp = Some(Time(Utc::now()));
        stored.metadata_mut().resource_version = Some(state.next_version());
        state.store_route(key, stored);
    }

    /// An out-of-band edit of a derived Gateway.
    pub fn edit_gateway(&self, namespace: &str, name: &str, edit: impl FnOnce(&mut Gateway)) {
        let mut state = self.state();
        let key = (namespace.to_string(), name.to_string());
        let Some(mut gateway) = state.gateways.get(&key).cloned() else {
            return;
        };
        edit(&mut gateway);
        gateway.metadata.resource_version = Some(state.next_version());
        state.record("Gateway", &key, "edit");
        state.enqueue_owner(&gateway);
        state.gateways.insert(key, gateway);
    }

    pub fn pop(&self) -> Option<WorkItem> {
        self.state().pending.pop_front()
    }

    pub fn enqueue(&self, item: WorkItem) {
        self.state().enqueue(item);
    }

    pub fn wrapped_gateway(&self, namespace: &str, name: &str) -> Option<WrappedGateway> {
        self.state()
            .wrapped_gateways
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn gateway(&self, namespace: &str, name: &str) -> Option<Gateway> {
        self.state()
            .gateways
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn route(&self, kind: RouteKind, namespace: &str, name: &str) -> Option<Route> {
        self.state()
            .routes
            .get(&(kind, namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn listener_hostnames(&self, namespace: &str, name: &str) -> Vec<String> {
        self.gateway(namespace, name)
            .map(|gateway| {
                gateway
                    .spec
                    .listeners
                    .iter()
                    .map(|listener| listener.hostname.clone().unwrap_or_default())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state().writes.clone()
    }

    /// Writes made after the first `mark` writes, as readable strings.
    pub fn writes_since(&self, mark: usize) -> Vec<String> {
        self.state().writes[mark..]
            .iter()
            .map(WriteRecord::describe)
            .collect()
    }

    pub fn wrapped_gateway_gets(&self) -> Vec<Key> {
        self.state().wrapped_gateway_gets.clone()
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get_wrapped_gateway(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WrappedGateway>, StoreError> {
        let mut state = self.state();
        let key = (namespace.to_string(), name.to_string());
        state.wrapped_gateway_gets.push(key.clone());
        Ok(state.wrapped_gateways.get(&key).cloned())
    }

    async fn replace_wrapped_gateway(
        &self,
        wrapped_gateway: &WrappedGateway,
    ) -> Result<WrappedGateway, StoreError> {
        let mut state = self.state();
        let key = key_of(&wrapped_gateway.metadata);
        let describe = format!("WrappedGateway/{}/{}", key.0, key.1);
        let Some(stored) = state.wrapped_gateways.get(&key).cloned() else {
            return Err(StoreError::NotFound(describe));
        };
        if stored.metadata.resource_version != wrapped_gateway.metadata.resource_version {
            return Err(StoreError::Conflict(describe));
        }

        let mut next = wrapped_gateway.clone();
        next.status.clone_from(&stored.status);
        keep_server_fields(&mut next.metadata, &stored.metadata);
        if comparable(&next) == comparable(&stored) {
            return Ok(stored);
        }
        if next.spec != stored.spec {
            next.metadata.generation = next.metadata.generation.map(|g| g + 1);
        }
        next.metadata.resource_version = Some(state.next_version());
        state.record("WrappedGateway", &key, "replace");
        state.store_wrapped_gateway(key, next.clone());
        Ok(next)
    }

    async fn replace_wrapped_gateway_status(
        &self,
        wrapped_gateway: &WrappedGateway,
    ) -> Result<WrappedGateway, StoreError> {
        let mut state = self.state();
        let key = key_of(&wrapped_gateway.metadata);
        let describe = format!("WrappedGateway/{}/{}", key.0, key.1);
        let Some(stored) = state.wrapped_gateways.get(&key).cloned() else {
            return Err(StoreError::NotFound(describe));
        };
        if stored.metadata.resource_version != wrapped_gateway.metadata.resource_version {
            return Err(StoreError::Conflict(describe));
        }

        let mut next = stored.clone();
        next.status.clone_from(&wrapped_gateway.status);
        if comparable(&next) == comparable(&stored) {
            return Ok(stored);
        }
        next.metadata.resource_version = Some(state.next_version());
        state.record("WrappedGateway", &key, "status");
        state.store_wrapped_gateway(key, next.clone());
        Ok(next)
    }

    async fn get_gateway(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Gateway>, StoreError> {
        Ok(self.gateway(namespace, name))
    }

    async fn create_gateway(&self, gateway: &Gateway) -> Result<Gateway, StoreError> {
        let mut state = self.state();
        let key = key_of(&gateway.metadata);
        if state.gateways.contains_key(&key) {
            return Err(StoreError::AlreadyExists(format!(
                "Gateway/{}/{}",
                key.0, key.1
            )));
        }

        let mut created = gateway.clone();
        state.stamp_new(&mut created.metadata);
        state.record("Gateway", &key, "create");
        state.enqueue_owner(&created);
        state.gateways.insert(key, created.clone());
        Ok(created)
    }

    async fn replace_gateway(&self, gateway: &Gateway) -> Result<Gateway, StoreError> {
        let mut state = self.state();
        let key = key_of(&gateway.metadata);
        let describe = format!("Gateway/{}/{}", key.0, key.1);
        let Some(stored) = state.gateways.get(&key).cloned() else {
            return Err(StoreError::NotFound(describe));
        };
        if stored.metadata.resource_version != gateway.metadata.resource_version {
            return Err(StoreError::Conflict(describe));
        }

        let mut next = gateway.clone();
        next.status.clone_from(&stored.status);
        keep_server_fields(&mut next.metadata, &stored.metadata);
        if comparable(&next) == comparable(&stored) {
            return Ok(stored);
        }
        next.metadata.generation = next.metadata.generation.map(|g| g + 1);
        next.metadata.resource_version = Some(state.next_version());
        state.record("Gateway", &key, "replace");
        state.enqueue_owner(&next);
        state.gateways.insert(key, next.clone());
        Ok(next)
    }

    async fn get_route(
        &self,
        kind: RouteKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Route>, StoreError> {
        Ok(self.route(kind, namespace, name))
    }

    async fn list_routes(&self, kind: RouteKind) -> Result<Vec<Route>, StoreError> {
        Ok(self
            .state()
            .routes
            .iter()
            .filter(|((route_kind, _, _), _)| *route_kind == kind)
            .map(|(_, route)| route.clone())
            .collect())
    }

    async fn replace_route(&self, route: &Route) -> Result<Route, StoreError> {
        let mut state = self.state();
        let (namespace, name) = key_of(route.metadata());
        let key = (route.kind(), namespace.clone(), name.clone());
        let describe = format!("{}/{namespace}/{name}", route.kind());
        let Some(stored) = state.routes.get(&key).cloned() else {
            return Err(StoreError::NotFound(describe));
        };
        if stored.metadata().resource_version != route.metadata().resource_version {
            return Err(StoreError::Conflict(describe));
        }

        let mut next = route.clone();
        keep_server_fields(next.metadata_mut(), stored.metadata());
        if route_value(&next) == route_value(&stored) {
            return Ok(stored);
        }
        if route_value(&next)["spec"] != route_value(&stored)["spec"] {
            let metadata = next.metadata_mut();
            metadata.generation = metadata.generation.map(|g| g + 1);
        }
        next.metadata_mut().resource_version = Some(state.next_version());
        state.record(key.0.kind(), &(namespace, name), "replace");
        state.store_route(key, next.clone());
        Ok(next)
    }
}

/// Both reconcilers over one [`MemoryStore`], driven until no work is left.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    wrapped_gateways: WrappedGatewayReconciler,
    routes: RouteReconciler,
}

impl Harness {
    pub fn new() -> Self {
        init_test_env();

        let store = Arc::new(MemoryStore::default());
        let options = Arc::new(Options::default());
        Self {
            wrapped_gateways: WrappedGatewayReconciler::new(store.clone(), options.clone()),
            routes: RouteReconciler::new(store.clone(), options),
            store,
        }
    }

    pub async fn reconcile(&self, item: WorkItem) {
        match &item {
            WorkItem::WrappedGateway(namespace, name) => self
                .wrapped_gateways
                .reconcile(namespace, name)
                .await
                .unwrap_or_else(|err| panic!("reconcile {item:?} failed: {err}")),
            WorkItem::Route(kind, namespace, name) => self
                .routes
                .reconcile(*kind, namespace, name)
                .await
                .unwrap_or_else(|err| panic!("reconcile {item:?} failed: {err}")),
        }
    }

    /// Reconciles queued work until the queue drains. Returns the number of
    /// passes taken.
    pub async fn run_to_fixpoint(&self) -> usize {
        let mut passes = 0;
        while let Some(item) = self.store.pop() {
            passes += 1;
            assert!(passes < 100, "no fixpoint after {passes} passes");
            self.reconcile(item).await;
        }
        passes
    }
}

pub fn wrapped_gateway(namespace: &str, name: &str) -> WrappedGateway {
    let mut wrapped_gateway: WrappedGateway = serde_yaml::from_str(
        r"
apiVersion: gateway-controller.homelab-helper.benfiola.com/v1
kind: WrappedGateway
metadata:
  name: placeholder
  labels:
    team: platform
spec:
  gatewayClassName: cilium
  listenerTemplate:
    port: 443
    protocol: HTTPS
    tls:
      mode: Terminate
      certificateRefs:
      - name: wildcard
",
    )
    .expect("valid WrappedGateway");
    wrapped_gateway.metadata.namespace = Some(namespace.to_string());
    wrapped_gateway.metadata.name = Some(name.to_string());
    wrapped_gateway
}

fn route_yaml(kind: RouteKind, namespace: &str, name: &str, parents: &[&str], hostnames: &[&str]) -> String {
    let api_version = match kind {
        RouteKind::Tls => "gateway.networking.k8s.io/v1alpha2",
        RouteKind::Http | RouteKind::Grpc => "gateway.networking.k8s.io/v1",
    };
    let parent_refs = serde_json::to_string(
        &parents
            .iter()
            .map(|parent| match parent.split_once('/') {
                Some((namespace, name)) => serde_json::json!({"namespace": namespace, "name": name}),
                None => serde_json::json!({"name": parent}),
            })
            .collect::<Vec<_>>(),
    )
    .expect("serializable parent refs");
    let hostnames = serde_json::to_string(hostnames).expect("serializable hostnames");

    format!(
        "
apiVersion: {api_version}
kind: {kind}
metadata:
  name: {name}
  namespace: {namespace}
spec:
  parentRefs: {parent_refs}
  hostnames: {hostnames}
  rules: []
"
    )
}

/// A route of `kind` attached to `parents` (`name` or `namespace/name`).
pub fn route(kind: RouteKind, namespace: &str, name: &str, parents: &[&str], hostnames: &[&str]) -> Route {
    let yaml = route_yaml(kind, namespace, name, parents, hostnames);
    match kind {
        RouteKind::Http => serde_yaml::from_str::<HTTPRoute>(&yaml)
            .expect("valid HTTPRoute")
            .into_route(),
        RouteKind::Grpc => serde_yaml::from_str::<GRPCRoute>(&yaml)
            .expect("valid GRPCRoute")
            .into_route(),
        RouteKind::Tls => serde_yaml::from_str::<TLSRoute>(&yaml)
            .expect("valid TLSRoute")
            .into_route(),
    }
}
