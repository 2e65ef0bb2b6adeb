//! Gateway Policy Controller status
//!
//! Policies and extensions report an `Accepted` condition derived from the
//! errors the index found while building them. The controller persists each
//! update with a merge patch of `status.conditions`, retrying failed patches a
//! bounded number of times before giving up.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod conditions;
mod controller;
mod metrics;

#[cfg(test)]
mod tests;

pub use self::{
    conditions::{accepted, make_patch, ACCEPTED, REASON_ACCEPTED, REASON_INVALID},
    controller::{Controller, KubePatcher, Retry, StatusPatcher},
    metrics::ControllerMetrics,
};
