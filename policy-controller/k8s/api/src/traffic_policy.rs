use crate::{
    duration::Duration,
    target_ref::{LocalPolicyTargetRef, LocalPolicyTargetSelector},
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Condition;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configures traffic handling for the routes, listeners, and gateways it
/// targets.
///
/// Each field configures one independent facet of traffic handling; unset
/// fields leave that facet to be inherited from other policies.
#[derive(Clone, Debug, Default, PartialEq, CustomResource, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "policy.gateway.dev",
    version = "v1alpha1",
    kind = "TrafficPolicy",
    status = "TrafficPolicyStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct TrafficPolicySpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_refs: Vec<LocalPolicyTargetRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_selectors: Vec<LocalPolicyTargetSelector>,

    pub ai: Option<AiPolicy>,
    pub transformation: Option<TransformationPolicy>,
    pub auto_host_rewrite: Option<bool>,
    pub ext_proc: Option<ExtProcPolicy>,
    pub ext_auth: Option<ExtAuthPolicy>,
    pub rate_limit: Option<RateLimit>,
    pub cors: Option<CorsPolicy>,
    pub csrf: Option<CsrfPolicy>,
    pub buffer: Option<Buffer>,
    pub header_modifiers: Option<HeaderModifiers>,
    pub hash_policies: Option<Vec<HashPolicy>>,
    pub timeouts: Option<Timeouts>,
    pub retry: Option<Retry>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct TrafficPolicyStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Names a `GatewayExtension`, in the policy's namespace unless one is given.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct ExtensionRef {
    pub name: String,
    pub namespace: Option<String>,
}

// === AI ===

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AiPolicy {
    pub backend: Option<AiBackend>,
    #[serde(default)]
    pub route_type: AiRouteType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub defaults: Vec<FieldDefault>,
    pub prompt_enrichment: Option<PromptEnrichment>,
    pub prompt_guard: Option<PromptGuard>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AiBackend {
    pub provider: AiProvider,
    pub model: Option<String>,
    pub auth_token: Option<AuthToken>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum AiProvider {
    OpenAI,
    AzureOpenAI,
    Anthropic,
    Gemini,
    VertexAI,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum AiRouteType {
    #[default]
    Chat,
    ChatStreaming,
}

/// Where an AI backend's credential comes from.
///
/// `Passthrough` forwards the client's own credential unchanged.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthToken {
    pub kind: AuthTokenKind,
    pub inline: Option<String>,
    pub secret_ref: Option<SecretRef>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum AuthTokenKind {
    Inline,
    SecretRef,
    Passthrough,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct SecretRef {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct FieldDefault {
    pub field: String,
    pub value: serde_json::Value,
    #[serde(default, rename = "override")]
    pub override_: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct PromptEnrichment {
    #[serde(default)]
    pub prepend: Vec<Message>,
    #[serde(default)]
    pub append: Vec<Message>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct PromptGuard {
    pub request: Option<PromptGuardRequest>,
    pub response: Option<PromptGuardResponse>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PromptGuardRequest {
    pub custom_response: Option<CustomResponse>,
    pub regex: Option<Regex>,
    pub webhook: Option<Webhook>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct PromptGuardResponse {
    pub regex: Option<Regex>,
    pub webhook: Option<Webhook>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct CustomResponse {
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct Regex {
    #[serde(default)]
    pub matches: Vec<RegexMatch>,
    #[serde(default)]
    pub builtins: Vec<BuiltinRegex>,
    #[serde(default)]
    pub action: GuardAction,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct RegexMatch {
    pub pattern: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuiltinRegex {
    Ssn,
    CreditCard,
    PhoneNumber,
    Email,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuardAction {
    #[default]
    Mask,
    Reject,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Webhook {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub forward_headers: Vec<String>,
}

// === Transformation ===

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct TransformationPolicy {
    pub request: Option<Transform>,
    pub response: Option<Transform>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct Transform {
    #[serde(default)]
    pub set: Vec<HeaderTemplate>,
    #[serde(default)]
    pub add: Vec<HeaderTemplate>,
    #[serde(default)]
    pub remove: Vec<String>,
    pub body: Option<BodyTransformation>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct HeaderTemplate {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BodyTransformation {
    #[serde(default)]
    pub parse_as: BodyParseBehavior,
    pub value: Option<String>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum BodyParseBehavior {
    #[default]
    AsString,
    AsJson,
}

// === External processing ===

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtProcPolicy {
    pub extension_ref: ExtensionRef,
    pub processing_mode: Option<ProcessingMode>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingMode {
    pub request_header_mode: Option<HeaderSendMode>,
    pub response_header_mode: Option<HeaderSendMode>,
    pub request_body_mode: Option<BodySendMode>,
    pub response_body_mode: Option<BodySendMode>,
    pub request_trailer_mode: Option<HeaderSendMode>,
    pub response_trailer_mode: Option<HeaderSendMode>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HeaderSendMode {
    Default,
    Send,
    Skip,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BodySendMode {
    None,
    Streamed,
    Buffered,
    BufferedPartial,
}

// === External authorization ===

/// Either references an authorization extension or, with
/// `enablement: DisableAll`, turns off every authorization filter for the
/// targets.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExtAuthPolicy {
    pub extension_ref: Option<ExtensionRef>,
    pub enablement: Option<ExtAuthEnablement>,
    pub with_request_body: Option<BufferSettings>,
    #[serde(default)]
    pub context_extensions: BTreeMap<String, String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ExtAuthEnablement {
    DisableAll,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BufferSettings {
    pub max_request_bytes: u32,
    #[serde(default)]
    pub allow_partial_message: bool,
    #[serde(default)]
    pub pack_as_bytes: bool,
}

// === Rate limiting ===

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct RateLimit {
    pub local: Option<LocalRateLimit>,
    pub global: Option<GlobalRateLimit>,
}

/// A local rate limit. An empty policy disables local rate limiting that
/// would otherwise be inherited.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocalRateLimit {
    pub token_bucket: Option<TokenBucket>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenBucket {
    pub max_tokens: u32,
    pub tokens_per_fill: Option<u32>,
    pub fill_interval: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GlobalRateLimit {
    pub extension_ref: ExtensionRef,
    #[serde(default)]
    pub descriptors: Vec<RateLimitDescriptor>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct RateLimitDescriptor {
    #[serde(default)]
    pub entries: Vec<RateLimitDescriptorEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct RateLimitDescriptorEntry {
    #[serde(rename = "type")]
    pub type_: RateLimitDescriptorEntryType,
    pub generic: Option<GenericEntry>,
    pub header: Option<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum RateLimitDescriptorEntryType {
    Generic,
    Header,
    RemoteAddress,
    Path,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct GenericEntry {
    pub key: String,
    pub value: String,
}

// === CORS and CSRF ===

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CorsPolicy {
    #[serde(default)]
    pub allow_origins: Vec<String>,
    #[serde(default)]
    pub allow_methods: Vec<String>,
    #[serde(default)]
    pub allow_headers: Vec<String>,
    #[serde(default)]
    pub expose_headers: Vec<String>,
    pub max_age: Option<u32>,
    pub allow_credentials: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CsrfPolicy {
    pub percentage_enabled: Option<u32>,
    pub percentage_shadowed: Option<u32>,
    #[serde(default)]
    pub additional_origins: Vec<StringMatch>,
}

/// Matches a string by exactly one of its fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StringMatch {
    pub exact: Option<String>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub contains: Option<String>,
    pub safe_regex: Option<String>,
}

// === Buffering and headers ===

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Buffer {
    pub max_request_size: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct HeaderModifiers {
    pub request: Option<HeaderFilter>,
    pub response: Option<HeaderFilter>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct HeaderFilter {
    #[serde(default)]
    pub set: Vec<HeaderTemplate>,
    #[serde(default)]
    pub add: Vec<HeaderTemplate>,
    #[serde(default)]
    pub remove: Vec<String>,
}

// === Hashing, timeouts, and retries ===

/// Exactly one of `header`, `cookie`, and `sourceIP` must be set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct HashPolicy {
    pub header: Option<HeaderHash>,
    pub cookie: Option<CookieHash>,
    #[serde(rename = "sourceIP")]
    pub source_ip: Option<SourceIpHash>,
    #[serde(default)]
    pub terminal: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct HeaderHash {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct CookieHash {
    pub name: String,
    pub ttl: Option<Duration>,
    pub path: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct SourceIpHash {}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Timeouts {
    pub request: Option<Duration>,
    pub stream_idle: Option<Duration>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Retry {
    #[serde(default)]
    pub retry_on: Vec<String>,
    pub attempts: Option<u32>,
    pub per_try_timeout: Option<Duration>,
    #[serde(default)]
    pub status_codes: Vec<u32>,
    pub backoff_base_interval: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_policy() {
        let policy: TrafficPolicy = serde_yaml::from_str(
            r#"
apiVersion: policy.gateway.dev/v1alpha1
kind: TrafficPolicy
metadata:
  name: web
  namespace: apps
  annotations:
    gateway.policy.dev/inherited-policy-priority: DeepMergePreferParent
spec:
  targetRefs:
    - group: gateway.networking.k8s.io
      kind: HTTPRoute
      name: web
      sectionName: rule-1
  rateLimit:
    local:
      tokenBucket:
        maxTokens: 10
        tokensPerFill: 5
        fillInterval: 1s500ms
    global:
      extensionRef:
        name: limits
      descriptors:
        - entries:
            - type: Generic
              generic:
                key: team
                value: web
            - type: RemoteAddress
  extAuth:
    enablement: DisableAll
  hashPolicies:
    - sourceIP: {}
      terminal: true
  timeouts:
    request: 10s
"#,
        )
        .expect("policy must parse");

        let spec = &policy.spec;
        assert_eq!(spec.target_refs.len(), 1);
        assert_eq!(spec.target_refs[0].section_name.as_deref(), Some("rule-1"));

        let bucket = spec
            .rate_limit
            .as_ref()
            .and_then(|rl| rl.local.as_ref())
            .and_then(|l| l.token_bucket.as_ref())
            .expect("token bucket must be set");
        assert_eq!(bucket.max_tokens, 10);
        assert_eq!(bucket.fill_interval, Duration::from_millis(1_500));

        let global = spec
            .rate_limit
            .as_ref()
            .and_then(|rl| rl.global.as_ref())
            .expect("global rate limit must be set");
        assert_eq!(global.extension_ref.namespace, None);
        assert_eq!(
            global.descriptors[0]
                .entries
                .iter()
                .map(|e| e.type_)
                .collect::<Vec<_>>(),
            vec![
                RateLimitDescriptorEntryType::Generic,
                RateLimitDescriptorEntryType::RemoteAddress
            ]
        );

        assert_eq!(
            spec.ext_auth.as_ref().and_then(|a| a.enablement),
            Some(ExtAuthEnablement::DisableAll)
        );
        assert_eq!(
            spec.hash_policies,
            Some(vec![HashPolicy {
                source_ip: Some(SourceIpHash {}),
                terminal: true,
                ..Default::default()
            }])
        );
        assert_eq!(
            spec.timeouts.as_ref().and_then(|t| t.request),
            Some(Duration::from_secs(10))
        );
        assert!(spec.cors.is_none(), "unset facets must remain unset");
    }

    #[test]
    fn rejects_malformed_durations() {
        let res = serde_yaml::from_str::<TrafficPolicySpec>(
            r#"
timeouts:
  request: 10 seconds
"#,
        );
        assert!(res.is_err());
    }
}
