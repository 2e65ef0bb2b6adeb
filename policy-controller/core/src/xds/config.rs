//! Typed filter configurations, both chain-level and per-route.

use super::{
    duration,
    matcher::{HeaderValue, HeaderValueOption, MetadataMatcher, RuntimeFractionalPercent, StringMatcher},
};
use serde::Serialize;
use std::{collections::BTreeMap, time::Duration};

/// A filter configuration tagged with its `@type` URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "@type")]
pub enum TypedConfig {
    #[serde(rename = "type.googleapis.com/envoy.extensions.filters.http.router.v3.Router")]
    Router(Router),

    #[serde(rename = "type.googleapis.com/envoy.config.route.v3.FilterConfig")]
    FilterConfig(FilterConfig),

    #[serde(rename = "type.googleapis.com/envoy.extensions.filters.http.cors.v3.Cors")]
    Cors(Cors),
    #[serde(rename = "type.googleapis.com/envoy.extensions.filters.http.cors.v3.CorsPolicy")]
    CorsPolicy(CorsPolicy),

    #[serde(rename = "type.googleapis.com/envoy.extensions.filters.http.csrf.v3.CsrfPolicy")]
    CsrfPolicy(CsrfPolicy),

    #[serde(rename = "type.googleapis.com/envoy.extensions.filters.http.buffer.v3.Buffer")]
    Buffer(Buffer),
    #[serde(rename = "type.googleapis.com/envoy.extensions.filters.http.buffer.v3.BufferPerRoute")]
    BufferPerRoute(BufferPerRoute),

    #[serde(
        rename = "type.googleapis.com/envoy.extensions.filters.http.header_mutation.v3.HeaderMutation"
    )]
    HeaderMutation(HeaderMutation),
    #[serde(
        rename = "type.googleapis.com/envoy.extensions.filters.http.header_mutation.v3.HeaderMutationPerRoute"
    )]
    HeaderMutationPerRoute(HeaderMutationPerRoute),

    #[serde(
        rename = "type.googleapis.com/envoy.extensions.filters.http.local_ratelimit.v3.LocalRateLimit"
    )]
    LocalRateLimit(LocalRateLimit),

    #[serde(rename = "type.googleapis.com/envoy.extensions.filters.http.ext_authz.v3.ExtAuthz")]
    ExtAuthz(ExtAuthz),
    #[serde(
        rename = "type.googleapis.com/envoy.extensions.filters.http.ext_authz.v3.ExtAuthzPerRoute"
    )]
    ExtAuthzPerRoute(ExtAuthzPerRoute),

    #[serde(rename = "type.googleapis.com/envoy.extensions.filters.http.ext_proc.v3.ExternalProcessor")]
    ExtProc(ExtProc),
    #[serde(rename = "type.googleapis.com/envoy.extensions.filters.http.ext_proc.v3.ExtProcPerRoute")]
    ExtProcPerRoute(ExtProcPerRoute),

    #[serde(rename = "type.googleapis.com/envoy.extensions.filters.http.ratelimit.v3.RateLimit")]
    RateLimit(RateLimit),

    #[serde(rename = "type.googleapis.com/envoy.api.v2.filter.http.FilterTransformations")]
    FilterTransformations(FilterTransformations),
    #[serde(rename = "type.googleapis.com/envoy.api.v2.filter.http.RouteTransformations")]
    RouteTransformations(RouteTransformations),

    #[serde(rename = "type.googleapis.com/envoy.extensions.filters.http.set_metadata.v3.Config")]
    SetMetadata(SetMetadata),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Router {}

/// Wraps a per-route config so that it also toggles a filter's enablement.
///
/// A filter that is disabled in the chain only runs for routes that carry a
/// `FilterConfig` with `disabled: false`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FilterConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<Box<TypedConfig>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_optional: bool,
}

// === CORS ===

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Cors {}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CorsPolicy {
    pub allow_origin_string_match: Vec<StringMatcher>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub allow_methods: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub allow_headers: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub expose_headers: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_credentials: Option<bool>,
}

// === CSRF ===

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CsrfPolicy {
    pub filter_enabled: RuntimeFractionalPercent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shadow_enabled: Option<RuntimeFractionalPercent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub additional_origins: Vec<StringMatcher>,
}

// === Buffer ===

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Buffer {
    pub max_request_bytes: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BufferPerRoute {
    pub buffer: Buffer,
}

// === Header mutation ===

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HeaderMutation {
    pub mutations: Mutations,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HeaderMutationPerRoute {
    pub mutations: Mutations,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Mutations {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub request_mutations: Vec<HeaderMutationRule>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub response_mutations: Vec<HeaderMutationRule>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderMutationRule {
    Append(HeaderValueOption),
    Remove(String),
}

// === Local rate limit ===

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LocalRateLimit {
    pub stat_prefix: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_bucket: Option<TokenBucket>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_enabled: Option<RuntimeFractionalPercent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_enforced: Option<RuntimeFractionalPercent>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TokenBucket {
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens_per_fill: Option<u32>,
    #[serde(serialize_with = "duration::serialize")]
    pub fill_interval: Duration,
}

// === gRPC services ===

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GrpcService {
    pub envoy_grpc: EnvoyGrpc,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "duration::serialize_opt"
    )]
    pub timeout: Option<Duration>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EnvoyGrpc {
    pub cluster_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authority: Option<String>,
}

// === External authorization ===

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExtAuthz {
    pub grpc_service: GrpcService,
    pub transport_api_version: &'static str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub failure_mode_allow: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_enabled_metadata: Option<MetadataMatcher>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExtAuthzPerRoute {
    pub check_settings: CheckSettings,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CheckSettings {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub context_extensions: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub with_request_body: Option<BufferSettings>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BufferSettings {
    pub max_request_bytes: u32,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub allow_partial_message: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub pack_as_bytes: bool,
}

// === External processing ===

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExtProc {
    pub grpc_service: GrpcService,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub failure_mode_allow: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_mode: Option<ProcessingMode>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExtProcPerRoute {
    pub overrides: ExtProcOverrides,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExtProcOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_mode: Option<ProcessingMode>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub grpc_initial_metadata: Vec<HeaderValue>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ProcessingMode {
    pub request_header_mode: HeaderSendMode,
    pub response_header_mode: HeaderSendMode,
    pub request_body_mode: BodySendMode,
    pub response_body_mode: BodySendMode,
    pub request_trailer_mode: HeaderSendMode,
    pub response_trailer_mode: HeaderSendMode,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HeaderSendMode {
    #[default]
    Default,
    Send,
    Skip,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BodySendMode {
    #[default]
    None,
    Streamed,
    Buffered,
    BufferedPartial,
}

// === Global rate limit ===

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RateLimit {
    pub domain: String,
    pub rate_limit_service: RateLimitServiceConfig,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub failure_mode_deny: bool,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "duration::serialize_opt"
    )]
    pub timeout: Option<Duration>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RateLimitServiceConfig {
    pub grpc_service: GrpcService,
    pub transport_api_version: &'static str,
}

// === Transformation ===

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FilterTransformations {}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RouteTransformations {
    pub transformations: Vec<RouteTransformation>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RouteTransformation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<Transformation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Transformation>,
}

/// A templated rewrite of a request or response.
///
/// Header values and the body are templates evaluated by the data plane.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Transformation {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub headers_to_append: Vec<HeaderValue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub headers_to_remove: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyTransformation>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyTransformation {
    Passthrough {},
    Template { text: String, parse_as_json: bool },
}

// === Set metadata ===

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SetMetadata {
    pub metadata: Vec<Metadata>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Metadata {
    pub metadata_namespace: String,
    pub value: serde_json::Value,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub allow_overwrite: bool,
}

// === impl TypedConfig ===

impl TypedConfig {
    /// Wraps this per-route config so that it also enables a filter that is
    /// disabled in the chain.
    pub fn enabling(self) -> Self {
        Self::FilterConfig(FilterConfig {
            config: Some(Box::new(self)),
            disabled: false,
            is_optional: false,
        })
    }

    /// Enables a disabled filter for a scope without parameterizing it.
    pub fn enable() -> Self {
        Self::FilterConfig(FilterConfig::default())
    }

    /// Disables a filter for a scope, overriding any enablement inherited from
    /// an enclosing scope.
    pub fn disable() -> Self {
        Self::FilterConfig(FilterConfig {
            config: None,
            disabled: true,
            is_optional: false,
        })
    }
}
