use crate::kubernetes::routes::Route;
use gateway_api::apis::standard::gateways::{Gateway, GatewaySpec};
use gwc_api::constants::{ANNOTATION_PREFIX, NAMESPACE_NAME_LABEL};
use gwc_api::v1::{ListenerTemplate, WrappedGateway};
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayBuildError {
    #[error("WrappedGateway is missing the identity needed for an owner reference")]
    MissingOwnerReference,
    #[error("Failed to encode Gateway spec: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// One listener's worth of attachment: a hostname requested by routes of one
/// kind in one namespace. Field order is the listener sort order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RouteListener {
    pub hostname: String,
    pub namespace: String,
    pub group: String,
    pub kind: String,
}

/// Distinct listeners requested by the routes that reference the gateway at
/// `namespace`/`name`, in stable sorted order. Routes pending deletion no
/// longer count as references.
pub fn collect_route_listeners<'a>(
    routes: impl IntoIterator<Item = &'a Route>,
    namespace: &str,
    name: &str,
) -> Vec<RouteListener> {
    routes
        .into_iter()
        .filter(|route| route.metadata().deletion_timestamp.is_none())
        .filter(|route| route.references_gateway(namespace, name))
        .flat_map(|route| {
            let kind = route.kind();
            let route_namespace = route.namespace();
            route.hostnames().into_iter().map(move |hostname| RouteListener {
                hostname,
                namespace: route_namespace.clone(),
                group: kind.group().to_string(),
                kind: kind.kind().to_string(),
            })
        })
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn listener(index: usize, template: &ListenerTemplate, route_listener: &RouteListener) -> Value {
    json!({
        "name": format!("listener-{index}"),
        "hostname": route_listener.hostname,
        "port": template.port,
        "protocol": template.protocol,
        "tls": template.tls,
        "allowedRoutes": {
            "namespaces": {
                "from": "Selector",
                "selector": {
                    "matchLabels": {
                        NAMESPACE_NAME_LABEL: route_listener.namespace,
                    },
                },
            },
            "kinds": [{
                "group": route_listener.group,
                "kind": route_listener.kind,
            }],
        },
    })
}

/// The Gateway spec for `wrapped_gateway`: its own fields copied over, with the
/// listener list recomputed from scratch.
pub fn gateway_spec(
    wrapped_gateway: &WrappedGateway,
    route_listeners: &[RouteListener],
) -> Result<GatewaySpec, GatewayBuildError> {
    let spec = &wrapped_gateway.spec;
    let listeners = route_listeners
        .iter()
        .enumerate()
        .map(|(index, route_listener)| listener(index, &spec.listener_template, route_listener))
        .collect::<Vec<_>>();

    let mut value = json!({
        "gatewayClassName": spec.gateway_class_name,
        "listeners": listeners,
    });
    if let Some(object) = value.as_object_mut() {
        if let Some(addresses) = &spec.addresses {
            object.insert("addresses".to_string(), serde_json::to_value(addresses)?);
        }
        if let Some(backend_tls) = &spec.backend_tls {
            object.insert("backendTLS".to_string(), serde_json::to_value(backend_tls)?);
        }
        if let Some(infrastructure) = &spec.infrastructure {
            object.insert(
                "infrastructure".to_string(),
                serde_json::to_value(infrastructure)?,
            );
        }
    }

    Ok(serde_json::from_value(value)?)
}

fn copied_annotations(wrapped_gateway: &WrappedGateway) -> BTreeMap<String, String> {
    wrapped_gateway
        .annotations()
        .iter()
        .filter(|(key, _)| !key.starts_with(ANNOTATION_PREFIX))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// The full Gateway desired for `wrapped_gateway`, owned by it.
pub fn desired_gateway(
    wrapped_gateway: &WrappedGateway,
    route_listeners: &[RouteListener],
) -> Result<Gateway, GatewayBuildError> {
    let owner_reference = wrapped_gateway
        .controller_owner_ref(&())
        .ok_or(GatewayBuildError::MissingOwnerReference)?;

    Ok(Gateway {
        metadata: ObjectMeta {
            name: wrapped_gateway.metadata.name.clone(),
            namespace: wrapped_gateway.metadata.namespace.clone(),
            labels: Some(wrapped_gateway.labels().clone()),
            annotations: Some(copied_annotations(wrapped_gateway)),
            owner_references: Some(vec![owner_reference]),
            ..Default::default()
        },
        spec: gateway_spec(wrapped_gateway, route_listeners)?,
        status: None,
    })
}

/// Folds the desired labels, annotations, owner and spec into the existing
/// Gateway. Returns `None` when the existing Gateway already matches.
pub fn merge_gateway(existing: &Gateway, desired: Gateway) -> Result<Option<Gateway>, GatewayBuildError> {
    let same_spec = serde_json::to_value(&existing.spec)? == serde_json::to_value(&desired.spec)?;
    let same_metadata = existing.metadata.labels.clone().unwrap_or_default()
        == desired.metadata.labels.clone().unwrap_or_default()
        && existing.metadata.annotations.clone().unwrap_or_default()
            == desired.metadata.annotations.clone().unwrap_or_default()
        && existing.metadata.owner_references == desired.metadata.owner_references;

    if same_spec && same_metadata {
        return Ok(None);
    }

    let mut merged = existing.clone();
    merged.metadata.labels = desired.metadata.labels;
    merged.metadata.annotations = desired.metadata.annotations;
    merged.metadata.owner_references = desired.metadata.owner_references;
    merged.spec = desired.spec;
    Ok(Some(merged))
}
