use strum::{Display, EnumString, IntoStaticStr};

pub const GROUP: &str = "gateway-controller.homelab-helper.benfiola.com";
pub const VERSION: &str = "v1";
pub const WRAPPED_GATEWAY_CRD_KIND: &str = "WrappedGateway";

/// Annotations under this prefix belong to the controller and are never copied
/// onto derived objects.
pub const ANNOTATION_PREFIX: &str = "gateway-controller.homelab-helper.benfiola.com/";

/// JSON-encoded `{"parentRefs": [...]}` recorded on every route the controller has seen.
pub const ANNOTATION_PREVIOUS_PARENT_REFS: &str =
    "gateway-controller.homelab-helper.benfiola.com/previous-parent-refs";

/// RFC3339 timestamp touched on a wrapped gateway to force a watch event. Only
/// its change carries meaning.
pub const ANNOTATION_CHILD_MODIFIED_AT: &str =
    "gateway-controller.homelab-helper.benfiola.com/child-modified-at";

pub const FINALIZER: &str = "gateway-controller.homelab-helper.benfiola.com/finalizer";

/// Lease held by the one replica allowed to run the controllers.
pub const LEADER_ELECTION_LEASE: &str = "gateway-controller.homelab-helper.benfiola.com";

pub const CONDITION_TYPE_READY: &str = "Ready";

pub const GATEWAY_API_GROUP: &str = "gateway.networking.k8s.io";
pub const GATEWAY_KIND: &str = "Gateway";

pub const NAMESPACE_NAME_LABEL: &str = "kubernetes.io/metadata.name";
pub const DEFAULT_NAMESPACE: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum Reason {
    FinalizerFailed,
    RoutesFetchFailed,
    GatewayFetchFailed,
    GatewayStatusFailed,
    GatewaySyncFailed,
    ReconciliationSucceeded,
}

impl Reason {
    pub fn is_success(self) -> bool {
        self == Reason::ReconciliationSucceeded
    }
}
