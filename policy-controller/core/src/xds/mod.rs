//! A typed model of the data plane's route and filter-chain configuration.
//!
//! Types serialize to the data plane's canonical JSON representation so that a
//! configuration fragment can be handed to an external validator verbatim.
//! Typed configs carry their `@type` URL as an internal serde tag.

pub mod config;
mod duration;
pub mod filter;
pub mod matcher;
pub mod route;

pub use self::{
    config::TypedConfig,
    filter::{FilterChain, FilterStage, HttpFilter, Predicate, StagedHttpFilter, WellKnownStage},
    matcher::{HeaderValue, HeaderValueOption, StringMatcher},
    route::{
        RateLimitAction, RateLimitDescriptor, Route, RouteAction, RouteConfiguration,
        TypedPerFilterConfig, VirtualHost,
    },
};
