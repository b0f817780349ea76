//! CustomResourceDefinitions generated from `gwc_api` at build time, ready to
//! be applied to a cluster ahead of the controller.

pub const CRDS: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/crds.yaml"));
