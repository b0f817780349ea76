use crate::kubernetes::objects::ObjectRef;
use crate::kubernetes::routes::ParentRef;
use gwc_api::constants::ANNOTATION_PREVIOUS_PARENT_REFS;
use gwc_api::v1::WrappedGateway;
use itertools::Itertools;
use kube::api::ObjectMeta;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// The parent refs a route had the last time it was reconciled, persisted on
/// the route itself under [`ANNOTATION_PREVIOUS_PARENT_REFS`].
#[derive(Default, Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
pub struct DependencyIndex {
    #[serde(rename = "parentRefs", alias = "ParentRefs", default)]
    parent_refs: Vec<ParentRef>,
}

impl DependencyIndex {
    pub fn new(parent_refs: Vec<ParentRef>) -> Self {
        Self { parent_refs }
    }

    pub fn parent_refs(&self) -> &[ParentRef] {
        &self.parent_refs
    }

    /// A missing or unreadable annotation reads as an empty index.
    pub fn read(metadata: &ObjectMeta) -> Self {
        let Some(value) = metadata
            .annotations
            .as_ref()
            .and_then(|annotations| annotations.get(ANNOTATION_PREVIOUS_PARENT_REFS))
        else {
            return Self::default();
        };

        match serde_json::from_str(value) {
            Ok(index) => index,
            Err(err) => {
                warn!(
                    namespace = ?metadata.namespace,
                    name = ?metadata.name,
                    error = %err,
                    "Ignoring unreadable parent refs annotation"
                );
                Self::default()
            }
        }
    }

    pub fn write(&self, metadata: &mut ObjectMeta) -> Result<(), serde_json::Error> {
        let value = serde_json::to_string(self)?;
        metadata
            .annotations
            .get_or_insert_with(Default::default)
            .insert(ANNOTATION_PREVIOUS_PARENT_REFS.to_string(), value);
        Ok(())
    }

    /// Order-sensitive comparison against the live parent refs.
    pub fn matches(&self, parent_refs: &[ParentRef]) -> bool {
        self.parent_refs == parent_refs
    }

    /// Wrapped gateways named by either this index or `current`, resolved
    /// against `route_namespace` and deduplicated in first-seen order.
    pub fn affected_gateways(&self, current: &[ParentRef], route_namespace: &str) -> Vec<ObjectRef> {
        self.parent_refs
            .iter()
            .chain(current)
            .filter_map(|parent_ref| parent_ref.resolve(route_namespace))
            .map(|gateway_ref| gateway_ref.with_kind::<WrappedGateway>())
            .unique()
            .collect()
    }
}
