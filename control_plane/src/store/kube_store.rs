use super::{ResourceStore, StoreError};
use crate::kubernetes::routes::{Route, RouteKind, RouteResource};
use async_trait::async_trait;
use gateway_api::apis::experimental::tlsroutes::TLSRoute;
use gateway_api::apis::standard::gateways::Gateway;
use gateway_api::apis::standard::grpcroutes::GRPCRoute;
use gateway_api::apis::standard::httproutes::HTTPRoute;
use gwc_api::constants::DEFAULT_NAMESPACE;
use gwc_api::v1::WrappedGateway;
use kube::api::{ListParams, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use tracing::trace;

/// [`ResourceStore`] backed by the Kubernetes API. Holds no cache, every call
/// goes to the API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn namespaced<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<DynamicType = (), Scope = kube::core::NamespaceResourceScope>,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get<K>(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError>
    where
        K: Resource<DynamicType = (), Scope = kube::core::NamespaceResourceScope>
            + Clone
            + serde::de::DeserializeOwned
            + std::fmt::Debug,
    {
        trace!(kind = %K::kind(&()), namespace, name, "Getting object");
        self.namespaced::<K>(namespace)
            .get_opt(name)
            .await
            .map_err(|err| map_error(err, &describe::<K>(namespace, name)))
    }

    async fn replace<K>(&self, object: &K) -> Result<K, StoreError>
    where
        K: Resource<DynamicType = (), Scope = kube::core::NamespaceResourceScope>
            + Clone
            + serde::de::DeserializeOwned
            + serde::Serialize
            + std::fmt::Debug,
    {
        let (namespace, name) = identity(object);
        trace!(kind = %K::kind(&()), namespace, name, "Replacing object");
        self.namespaced::<K>(&namespace)
            .replace(&name, &PostParams::default(), object)
            .await
            .map_err(|err| map_error(err, &describe::<K>(&namespace, &name)))
    }

    async fn get_route_of<K>(&self, namespace: &str, name: &str) -> Result<Option<Route>, StoreError>
    where
        K: RouteResource<Scope = kube::core::NamespaceResourceScope>,
    {
        Ok(self.get::<K>(namespace, name).await?.map(K::into_route))
    }

    async fn list_routes_of<K>(&self) -> Result<Vec<Route>, StoreError>
    where
        K: RouteResource<Scope = kube::core::NamespaceResourceScope>,
    {
        let routes = Api::<K>::all(self.client.clone())
            .list(&ListParams::default())
            .await
            .map_err(|err| map_error(err, K::kind(&()).as_ref()))?;

        Ok(routes.items.into_iter().map(K::into_route).collect())
    }
}

fn identity<K: ResourceExt>(object: &K) -> (String, String) {
    (
        object
            .namespace()
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
        object.name_any(),
    )
}

fn describe<K: Resource<DynamicType = ()>>(namespace: &str, name: &str) -> String {
    format!("{}/{namespace}/{name}", K::kind(&()))
}

fn map_error(err: kube::Error, object: &str) -> StoreError {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => StoreError::NotFound(object.to_string()),
        kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
            StoreError::AlreadyExists(object.to_string())
        }
        kube::Error::Api(ae) if ae.code == 409 => StoreError::Conflict(object.to_string()),
        err => StoreError::Transport(format!("{object}: {err}")),
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get_wrapped_gateway(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<WrappedGateway>, StoreError> {
        self.get::<WrappedGateway>(namespace, name).await
    }

    async fn replace_wrapped_gateway(
        &self,
        wrapped_gateway: &WrappedGateway,
    ) -> Result<WrappedGateway, StoreError> {
        self.replace(wrapped_gateway).await
    }

    async fn replace_wrapped_gateway_status(
        &self,
        wrapped_gateway: &WrappedGateway,
    ) -> Result<WrappedGateway, StoreError> {
        let (namespace, name) = identity(wrapped_gateway);
        let data = serde_json::to_vec(wrapped_gateway)?;

        trace!(namespace, name, "Replacing WrappedGateway status");
        self.namespaced::<WrappedGateway>(&namespace)
            .replace_status(&name, &PostParams::default(), data)
            .await
            .map_err(|err| map_error(err, &describe::<WrappedGateway>(&namespace, &name)))
    }

    async fn get_gateway(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Gateway>, StoreError> {
        self.get::<Gateway>(namespace, name).await
    }

    async fn create_gateway(&self, gateway: &Gateway) -> Result<Gateway, StoreError> {
        let (namespace, name) = identity(gateway);

        trace!(namespace, name, "Creating Gateway");
        self.namespaced::<Gateway>(&namespace)
            .create(&PostParams::default(), gateway)
            .await
            .map_err(|err| map_error(err, &describe::<Gateway>(&namespace, &name)))
    }

    async fn replace_gateway(&self, gateway: &Gateway) -> Result<Gateway, StoreError> {
        self.replace(gateway).await
    }

    async fn get_route(
        &self,
        kind: RouteKind,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Route>, StoreError> {
        match kind {
            RouteKind::Http => self.get_route_of::<HTTPRoute>(namespace, name).await,
            RouteKind::Grpc => self.get_route_of::<GRPCRoute>(namespace, name).await,
            RouteKind::Tls => self.get_route_of::<TLSRoute>(namespace, name).await,
        }
    }

    async fn list_routes(&self, kind: RouteKind) -> Result<Vec<Route>, StoreError> {
        match kind {
            RouteKind::Http => self.list_routes_of::<HTTPRoute>().await,
            RouteKind::Grpc => self.list_routes_of::<GRPCRoute>().await,
            RouteKind::Tls => self.list_routes_of::<TLSRoute>().await,
        }
    }

    async fn replace_route(&self, route: &Route) -> Result<Route, StoreError> {
        Ok(match route {
            Route::Http(route) => self.replace(route).await?.into_route(),
            Route::Grpc(route) => self.replace(route).await?.into_route(),
            Route::Tls(route) => self.replace(route).await?.into_route(),
        })
    }
}
