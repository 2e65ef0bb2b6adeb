use super::{config::TypedConfig, duration, matcher::HeaderValueOption};
use serde::Serialize;
use std::{collections::BTreeMap, time::Duration};

/// Per-filter overrides keyed by filter name.
pub type TypedPerFilterConfig = BTreeMap<String, TypedConfig>;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RouteConfiguration {
    pub name: String,
    pub virtual_hosts: Vec<VirtualHost>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub typed_per_filter_config: TypedPerFilterConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub request_headers_to_add: Vec<HeaderValueOption>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct VirtualHost {
    pub name: String,
    pub domains: Vec<String>,
    pub routes: Vec<Route>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub typed_per_filter_config: TypedPerFilterConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub request_headers_to_add: Vec<HeaderValueOption>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rate_limits: Vec<RateLimitDescriptor>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Route {
    pub name: String,
    #[serde(rename = "match")]
    pub route_match: RouteMatch,
    pub route: RouteAction,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub typed_per_filter_config: TypedPerFilterConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub request_headers_to_add: Vec<HeaderValueOption>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RouteMatch {
    pub prefix: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RouteAction {
    pub cluster: String,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "duration::serialize_opt"
    )]
    pub timeout: Option<Duration>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "duration::serialize_opt"
    )]
    pub idle_timeout: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hash_policy: Vec<HashPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_host_rewrite: Option<bool>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rate_limits: Vec<RateLimitDescriptor>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RetryPolicy {
    pub retry_on: String,
    pub num_retries: u32,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "duration::serialize_opt"
    )]
    pub per_try_timeout: Option<Duration>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub retriable_status_codes: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_back_off: Option<RetryBackOff>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RetryBackOff {
    #[serde(serialize_with = "duration::serialize")]
    pub base_interval: Duration,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "duration::serialize_opt"
    )]
    pub max_interval: Option<Duration>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct HashPolicy {
    #[serde(flatten)]
    pub policy: HashPolicySpecifier,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub terminal: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HashPolicySpecifier {
    Header {
        header_name: String,
    },
    Cookie {
        name: String,
        #[serde(
            skip_serializing_if = "Option::is_none",
            serialize_with = "duration::serialize_opt"
        )]
        ttl: Option<Duration>,
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },
    ConnectionProperties {
        source_ip: bool,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct RateLimitDescriptor {
    pub actions: Vec<RateLimitAction>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitAction {
    RemoteAddress {},
    GenericKey {
        descriptor_key: String,
        descriptor_value: String,
    },
    RequestHeaders {
        header_name: String,
        descriptor_key: String,
    },
}

// === impl Route ===

impl Route {
    pub fn new(name: impl Into<String>, cluster: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            route_match: RouteMatch {
                prefix: "/".to_string(),
            },
            route: RouteAction {
                cluster: cluster.into(),
                ..RouteAction::default()
            },
            ..Route::default()
        }
    }
}
