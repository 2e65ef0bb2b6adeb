use gateway_policy_controller_core::PolicyError;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId {
    pub namespace: String,
    pub name: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum StatusKind {
    TrafficPolicy,
    GatewayExtension,
}

/// The errors to report on a resource's status.
///
/// An empty error list means that the resource was accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusUpdate {
    pub kind: StatusKind,
    pub id: ResourceId,
    pub generation: Option<i64>,
    pub errors: Vec<PolicyError>,
}

// === impl ResourceId ===

impl ResourceId {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// === impl StatusKind ===

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TrafficPolicy => f.write_str("TrafficPolicy"),
            Self::GatewayExtension => f.write_str("GatewayExtension"),
        }
    }
}
