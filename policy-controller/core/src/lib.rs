#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod error;
pub mod extension;
pub mod facets;
pub mod merge;
mod policy;
pub mod xds;

pub use self::{
    error::{PolicyError, ValidationError},
    extension::{ExtensionKind, ExtensionName, GatewayExtensionIr},
    facets::SubIr,
    merge::{merge, InheritedPriority, MergeOptions, MergeStrategy, MergedPolicy},
    policy::{Facet, PolicyAttachment, PolicyRef, TargetRef, TrafficPolicy},
};

pub const POLICY_CONTROLLER_NAME: &str = "policy.gateway.dev/policy-controller";
