//! Gateway Policy Controller index
//!
//! The index holds the cluster state that policies are built from. It watches
//! the following resources:
//!
//! - Each `Service` provides the clusters that gateway extensions delegate to.
//! - Each `Secret` may hold credentials referenced by AI policies.
//! - Each `GatewayExtension` is resolved once into a reusable provider
//!   configuration, shared by every policy that references it.
//! - Each `TrafficPolicy` is constructed into a policy record with its
//!   construction and validation errors.
//!
//! ```text
//! [ Service ] <- [ GatewayExtension ] <- [ TrafficPolicy ] -> [ Secret ]
//! ```
//!
//! Whenever a resource changes, every derived record that may depend on it is
//! rebuilt and each policy whose configuration or errors changed is published
//! to the status controller. An index built with [`Index::shared_strict`]
//! attaches a policy to its targets only once the data plane has accepted its
//! current configuration.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod attachment;
mod gateway_extension;
mod index;
mod lookup;
mod resource;
mod traffic_policy;


pub use self::{
    attachment::Target,
    index::{Index, SharedIndex, Verdict},
    lookup::{Lookup, SecretData},
    resource::{ResourceId, StatusKind, StatusUpdate},
    traffic_policy::{construct, Constructed},
};
