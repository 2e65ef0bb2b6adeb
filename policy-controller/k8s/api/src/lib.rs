#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod duration;
pub mod gateway_extension;
pub mod labels;
pub mod target_ref;
pub mod traffic_policy;

pub use self::{
    gateway_extension::{GatewayExtension, GatewayExtensionSpec, GatewayExtensionType},
    labels::Labels,
    traffic_policy::{TrafficPolicy, TrafficPolicySpec},
};
pub use k8s_openapi::{
    api::core::v1::{Secret, Service, ServicePort, ServiceSpec},
    apimachinery::pkg::apis::meta::v1::{Condition, Time},
};
pub use kube::{
    api::{Api, ObjectMeta, Patch, PatchParams, Resource, ResourceExt},
    Client, Error,
};

/// The API group of the policy resources.
pub const POLICY_API_GROUP: &str = "policy.gateway.dev";

/// An annotation on a policy that controls how it combines with the policies
/// attached beneath it.
pub const INHERITED_POLICY_PRIORITY_ANNOTATION: &str =
    "gateway.policy.dev/inherited-policy-priority";
