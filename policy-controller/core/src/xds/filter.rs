use super::config::{Router, TypedConfig};
use serde::Serialize;

/// Well-known filter names.
pub mod names {
    pub const ROUTER: &str = "envoy.filters.http.router";
    pub const CORS: &str = "envoy.filters.http.cors";
    pub const CSRF: &str = "envoy.filters.http.csrf";
    pub const BUFFER: &str = "envoy.filters.http.buffer";
    pub const HEADER_MUTATION: &str = "envoy.filters.http.header_mutation";
    pub const LOCAL_RATELIMIT: &str = "envoy.filters.http.local_ratelimit";
    pub const TRANSFORMATION: &str = "io.gateway.transformation";
    pub const AI_EXT_PROC: &str = "io.gateway.ai.ext_proc";

    /// Sets the metadata that disables every external authorization filter in
    /// a chain.
    pub const DISABLE_EXT_AUTH: &str = "io.gateway.disable_ext_auth";

    pub const EXT_AUTHZ_PREFIX: &str = "ext_authz";
    pub const EXT_PROC_PREFIX: &str = "ext_proc";
    pub const RATELIMIT_PREFIX: &str = "ratelimit";
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HttpFilter {
    pub name: String,
    pub typed_config: TypedConfig,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FilterChain {
    pub name: String,
    pub http_filters: Vec<HttpFilter>,
}

/// Stages of request processing that filters are placed relative to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WellKnownStage {
    Fault,
    Cors,
    Waf,
    AuthN,
    AuthZ,
    RateLimit,
    Accepted,
    OutAuth,
    Route,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Predicate {
    Before,
    During,
    After,
}

/// Where a filter sits in a chain. Ordering is by stage, then predicate, then
/// weight.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FilterStage {
    pub stage: WellKnownStage,
    pub predicate: Predicate,
    pub weight: i32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagedHttpFilter {
    pub stage: FilterStage,
    pub filter: HttpFilter,
}

// === impl FilterStage ===

impl FilterStage {
    pub const fn before(stage: WellKnownStage) -> Self {
        Self {
            stage,
            predicate: Predicate::Before,
            weight: 0,
        }
    }

    pub const fn during(stage: WellKnownStage) -> Self {
        Self {
            stage,
            predicate: Predicate::During,
            weight: 0,
        }
    }

    pub const fn after(stage: WellKnownStage) -> Self {
        Self {
            stage,
            predicate: Predicate::After,
            weight: 0,
        }
    }

    pub const fn with_weight(self, weight: i32) -> Self {
        Self { weight, ..self }
    }
}

// === impl HttpFilter ===

impl HttpFilter {
    pub fn disabled(name: impl Into<String>, typed_config: TypedConfig) -> Self {
        Self {
            name: name.into(),
            typed_config,
            disabled: true,
        }
    }

    pub fn router() -> Self {
        Self {
            name: names::ROUTER.to_string(),
            typed_config: TypedConfig::Router(Router {}),
            disabled: false,
        }
    }
}

// === impl StagedHttpFilter ===

impl StagedHttpFilter {
    /// Orders staged filters and terminates the chain with the router.
    pub fn into_chain(mut filters: Vec<Self>) -> Vec<HttpFilter> {
        filters.sort_by(|a, b| {
            a.stage
                .cmp(&b.stage)
                .then_with(|| a.filter.name.cmp(&b.filter.name))
        });
        filters
            .into_iter()
            .map(|f| f.filter)
            .chain(Some(HttpFilter::router()))
            .collect()
    }
}
