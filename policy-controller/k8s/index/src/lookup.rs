use gateway_policy_controller_core::{ExtensionName, GatewayExtensionIr};
use std::{collections::BTreeMap, sync::Arc};

/// The contents of a `Secret`, keyed by data key.
pub type SecretData = Arc<BTreeMap<String, Vec<u8>>>;

/// Resolves the external references made by policies and extensions.
///
/// Lookups are read-only and synchronous. A reference that cannot be resolved
/// returns `None` and is reported by the caller as an error on the facet that
/// made it.
pub trait Lookup {
    /// Returns the name of the cluster that serves a service port.
    fn service_cluster(&self, namespace: &str, name: &str, port: u16) -> Option<String>;

    fn secret(&self, namespace: &str, name: &str) -> Option<SecretData>;

    fn extension(&self, name: &ExtensionName) -> Option<Arc<GatewayExtensionIr>>;
}

/// The name of the cluster generated for a service port.
pub(crate) fn cluster_name(namespace: &str, name: &str, port: u16) -> String {
    format!("kube_{namespace}_{name}_{port}")
}
