use crate::kubernetes::objects::ObjectRef;
use gateway_api::apis::experimental::tlsroutes::{TLSRoute, TLSRouteParentRefs};
use gateway_api::apis::standard::gateways::Gateway;
use gateway_api::apis::standard::grpcroutes::{GRPCRoute, GRPCRouteParentRefs};
use gateway_api::apis::standard::httproutes::{HTTPRoute, HTTPRouteParentRefs};
use gwc_api::constants::{DEFAULT_NAMESPACE, GATEWAY_API_GROUP, GATEWAY_KIND};
use kube::api::ObjectMeta;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use strum::{Display, EnumIter, IntoEnumIterator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter)]
pub enum RouteKind {
    #[strum(serialize = "HTTPRoute")]
    Http,
    #[strum(serialize = "GRPCRoute")]
    Grpc,
    #[strum(serialize = "TLSRoute")]
    Tls,
}

impl RouteKind {
    pub fn all() -> impl Iterator<Item = RouteKind> {
        RouteKind::iter()
    }

    pub fn group(self) -> &'static str {
        GATEWAY_API_GROUP
    }

    pub fn kind(self) -> &'static str {
        match self {
            RouteKind::Http => "HTTPRoute",
            RouteKind::Grpc => "GRPCRoute",
            RouteKind::Tls => "TLSRoute",
        }
    }

}

/// A typed reference from a route to the gateway it attaches to. This is also
/// the element type persisted in the parent-refs annotation, so field names
/// follow the Gateway API wire format.
#[derive(Default, Deserialize, Serialize, Clone, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct ParentRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i32>,
}

impl ParentRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Resolves the reference to the gateway it names, defaulting group and
    /// kind to the Gateway API and namespace to the route's own. References to
    /// anything other than a Gateway resolve to `None`.
    pub fn resolve(&self, route_namespace: &str) -> Option<ObjectRef> {
        let group = self.group.as_deref().unwrap_or(GATEWAY_API_GROUP);
        let kind = self.kind.as_deref().unwrap_or(GATEWAY_KIND);
        if group != GATEWAY_API_GROUP || kind != GATEWAY_KIND {
            return None;
        }

        let namespace = self.namespace.as_deref().unwrap_or(route_namespace);
        Some(ObjectRef::of_kind::<Gateway>(namespace, self.name.as_str()))
    }
}

macro_rules! parent_ref_from {
    ($parent_ref_type:ty) => {
        impl From<&$parent_ref_type> for ParentRef {
            fn from(parent_ref: &$parent_ref_type) -> Self {
                Self {
                    group: parent_ref.group.clone(),
                    kind: parent_ref.kind.clone(),
                    namespace: parent_ref.namespace.clone(),
                    name: parent_ref.name.clone(),
                    section_name: parent_ref.section_name.clone(),
                    port: parent_ref.port,
                }
            }
        }
    };
}

parent_ref_from!(HTTPRouteParentRefs);
parent_ref_from!(GRPCRouteParentRefs);
parent_ref_from!(TLSRouteParentRefs);

/// The common capability every supported route kind exposes to the reconcilers.
pub trait RouteResource:
    Resource<DynamicType = ()> + Clone + Debug + DeserializeOwned + Serialize + Send + Sync + 'static
{
    const ROUTE_KIND: RouteKind;

    fn parent_refs(&self) -> Vec<ParentRef>;

    fn hostnames(&self) -> Vec<String>;

    fn into_route(self) -> Route;
}

macro_rules! route_resource {
    ($route_type:ty, $route_kind:expr, $variant:ident) => {
        impl RouteResource for $route_type {
            const ROUTE_KIND: RouteKind = $route_kind;

            fn parent_refs(&self) -> Vec<ParentRef> {
                self.spec
                    .parent_refs
                    .iter()
                    .flatten()
                    .map(ParentRef::from)
                    .collect()
            }

            fn hostnames(&self) -> Vec<String> {
                self.spec.hostnames.clone().unwrap_or_default()
            }

            fn into_route(self) -> Route {
                Route::$variant(self)
            }
        }
    };
}

route_resource!(HTTPRoute, RouteKind::Http, Http);
route_resource!(GRPCRoute, RouteKind::Grpc, Grpc);
route_resource!(TLSRoute, RouteKind::Tls, Tls);

/// Any of the route kinds the controller tracks. The reconcilers only ever
/// look at the projections below, so the algorithms stay kind-agnostic.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    Http(HTTPRoute),
    Grpc(GRPCRoute),
    Tls(TLSRoute),
}

impl Route {
    pub fn kind(&self) -> RouteKind {
        match self {
            Route::Http(_) => RouteKind::Http,
            Route::Grpc(_) => RouteKind::Grpc,
            Route::Tls(_) => RouteKind::Tls,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Route::Http(route) => route.meta(),
            Route::Grpc(route) => route.meta(),
            Route::Tls(route) => route.meta(),
        }
    }

    pub fn metadata_mut(&mut self) -> &mut ObjectMeta {
        match self {
            Route::Http(route) => route.meta_mut(),
            Route::Grpc(route) => route.meta_mut(),
            Route::Tls(route) => route.meta_mut(),
        }
    }

    pub fn parent_refs(&self) -> Vec<ParentRef> {
        match self {
            Route::Http(route) => route.parent_refs(),
            Route::Grpc(route) => route.parent_refs(),
            Route::Tls(route) => route.parent_refs(),
        }
    }

    pub fn hostnames(&self) -> Vec<String> {
        match self {
            Route::Http(route) => route.hostnames(),
            Route::Grpc(route) => route.hostnames(),
            Route::Tls(route) => route.hostnames(),
        }
    }

    pub fn namespace(&self) -> String {
        self.metadata()
            .namespace
            .clone()
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string())
    }

    /// Whether any parent ref resolves to the gateway at `namespace`/`name`.
    pub fn references_gateway(&self, namespace: &str, name: &str) -> bool {
        let route_namespace = self.namespace();
        self.parent_refs()
            .iter()
            .filter_map(|parent_ref| parent_ref.resolve(&route_namespace))
            .any(|gateway_ref| gateway_ref.namespace() == namespace && gateway_ref.name() == name)
    }
}
