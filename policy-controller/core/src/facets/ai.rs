use super::{validate_regex, SubIr};
use crate::{
    xds::{
        config::{ExtProcOverrides, ExtProcPerRoute},
        HeaderValue, HeaderValueOption,
    },
    Facet, ValidationError,
};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Metadata keys consumed by the AI extension's processor.
mod keys {
    pub const PROVIDER: &str = "x-llm-provider";
    pub const MODEL: &str = "x-llm-model";
    pub const STREAMING: &str = "x-chat-streaming";
    pub const DEFAULTS: &str = "x-req-defaults";
    pub const ENRICHMENT: &str = "x-prompt-enrichment";
    pub const REQ_GUARD: &str = "x-req-guardrails-config";
    pub const REQ_GUARD_HASH: &str = "x-req-guardrails-config-hash";
    pub const RESP_GUARD: &str = "x-resp-guardrails-config";
    pub const RESP_GUARD_HASH: &str = "x-resp-guardrails-config-hash";
}

/// Headers evaluated by the data plane for each request.
const REQUEST_ID_HEADER: &str = "x-ai-request-id";
const REQUEST_ID_EXPR: &str = "%REQ(x-request-id)%";
const RESOLVED_MODEL_HEADER: &str = "x-ai-resolved-model";
const RESOLVED_MODEL_EXPR: &str = "%DYNAMIC_METADATA(io.gateway.ai:model)%";

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum AiProvider {
    OpenAi,
    AzureOpenAi,
    Anthropic,
    Gemini,
    VertexAi,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum AiRouteType {
    #[default]
    Chat,
    ChatStreaming,
}

/// The inputs to an AI route, with every external reference already resolved.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AiRoute {
    pub provider: Option<AiProvider>,
    pub model: Option<String>,
    pub auth_token: Option<String>,
    pub route_type: AiRouteType,
    pub defaults: Vec<FieldDefault>,
    pub prompt_enrichment: Option<PromptEnrichment>,
    pub prompt_guard: Option<PromptGuard>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FieldDefault {
    pub field: String,
    pub value: Value,
    #[serde(rename = "override")]
    pub override_: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PromptEnrichment {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub prepend: Vec<Message>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub append: Vec<Message>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PromptGuard {
    pub request: Option<GuardRequest>,
    pub response: Option<GuardResponse>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_response_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regex: Option<RegexGuard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<Webhook>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regex: Option<RegexGuard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<Webhook>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegexGuard {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub matches: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub builtins: Vec<BuiltinRegex>,
    pub action: GuardAction,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuiltinRegex {
    Ssn,
    CreditCard,
    PhoneNumber,
    Email,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuardAction {
    #[default]
    Mask,
    Reject,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Webhook {
    pub host: String,
    pub port: u16,
    #[serde(rename = "forwardHeaders", skip_serializing_if = "Vec::is_empty")]
    pub forward_headers: Vec<String>,
}

/// Routes a request to an AI backend through the AI extension's processor.
///
/// Everything known when the policy is built (provider, model, credential,
/// guardrails) is resolved into the processor override and request headers.
/// Only per-request values are left for the data plane to evaluate.
#[derive(Clone, Debug)]
pub struct AiIr {
    pub ext_proc: ExtProcPerRoute,
    pub request_headers: Vec<HeaderValueOption>,

    /// Guard patterns, retained for validation. These are already reflected in
    /// `ext_proc`'s metadata.
    guard_patterns: Vec<String>,
}

// === impl AiProvider ===

impl AiProvider {
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::AzureOpenAi => "azureopenai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::VertexAi => "vertex-ai",
        }
    }

    fn auth_header(&self, token: &str) -> HeaderValueOption {
        match self {
            Self::OpenAi | Self::VertexAi => {
                HeaderValueOption::overwrite("authorization", format!("Bearer {token}"))
            }
            Self::AzureOpenAi => HeaderValueOption::overwrite("api-key", token),
            Self::Anthropic => HeaderValueOption::overwrite("x-api-key", token),
            Self::Gemini => HeaderValueOption::overwrite("x-goog-api-key", token),
        }
    }
}

// === impl AiIr ===

impl AiIr {
    pub fn build(route: &AiRoute) -> Result<Self> {
        let mut metadata = Vec::new();
        let mut push = |key: &str, value: String| {
            metadata.push(HeaderValue {
                key: key.to_string(),
                value,
            })
        };

        if let Some(provider) = route.provider {
            push(keys::PROVIDER, provider.name().to_string());
        }
        if let Some(model) = &route.model {
            push(keys::MODEL, model.clone());
        }
        if route.route_type == AiRouteType::ChatStreaming {
            push(keys::STREAMING, "true".to_string());
        }
        if !route.defaults.is_empty() {
            let json = serde_json::to_string(&route.defaults).context("encoding field defaults")?;
            push(keys::DEFAULTS, json);
        }
        if let Some(enrichment) = &route.prompt_enrichment {
            let json = serde_json::to_string(enrichment).context("encoding prompt enrichment")?;
            push(keys::ENRICHMENT, json);
        }

        let mut guard_patterns = Vec::new();
        if let Some(guard) = &route.prompt_guard {
            if let Some(req) = &guard.request {
                let json = serde_json::to_string(req).context("encoding request guardrails")?;
                push(keys::REQ_GUARD, json);
                push(keys::REQ_GUARD_HASH, config_hash(req)?);
                guard_patterns.extend(req.regex.iter().flat_map(|r| r.matches.clone()));
            }
            if let Some(resp) = &guard.response {
                let json = serde_json::to_string(resp).context("encoding response guardrails")?;
                push(keys::RESP_GUARD, json);
                push(keys::RESP_GUARD_HASH, config_hash(resp)?);
                guard_patterns.extend(resp.regex.iter().flat_map(|r| r.matches.clone()));
            }
        }

        let mut request_headers = Vec::new();
        if let Some(token) = &route.auth_token {
            let provider = route
                .provider
                .context("a credential requires an AI provider")?;
            request_headers.push(provider.auth_header(token));
        }
        request_headers.push(HeaderValueOption::overwrite(
            REQUEST_ID_HEADER,
            REQUEST_ID_EXPR,
        ));
        if route.model.is_none() {
            request_headers.push(HeaderValueOption::overwrite(
                RESOLVED_MODEL_HEADER,
                RESOLVED_MODEL_EXPR,
            ));
        }

        Ok(Self {
            ext_proc: ExtProcPerRoute {
                overrides: ExtProcOverrides {
                    processing_mode: None,
                    grpc_initial_metadata: metadata,
                },
            },
            request_headers,
            guard_patterns,
        })
    }

    fn metadata(&self, key: &str) -> Option<&str> {
        self.ext_proc
            .overrides
            .grpc_initial_metadata
            .iter()
            .find(|h| h.key == key)
            .map(|h| h.value.as_str())
    }
}

/// Compares the produced processor override and headers only.
impl PartialEq for AiIr {
    fn eq(&self, other: &Self) -> bool {
        self.ext_proc == other.ext_proc && self.request_headers == other.request_headers
    }
}

impl SubIr for AiIr {
    const FACET: Facet = Facet::Ai;

    fn validate(&self) -> Result<(), ValidationError> {
        for pattern in &self.guard_patterns {
            validate_regex("ai.promptGuard.regex.matches", pattern)?;
        }
        if let Some(defaults) = self.metadata(keys::DEFAULTS) {
            serde_json::from_str::<Value>(defaults)
                .map_err(|e| ValidationError::invalid("ai.defaults", e))?;
        }
        Ok(())
    }
}

/// Hashes a configuration value so that equal configurations produce equal
/// keys regardless of how their maps were ordered.
///
/// The hash is prefixed with the encoding version so that a change in encoding
/// never collides with hashes produced by a previous version.
pub fn config_hash<T: Serialize>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value).context("encoding configuration")?;
    let bytes = serde_json::to_vec(&canonicalize(value)).context("encoding configuration")?;
    Ok(format!("v1:{:x}", Sha256::digest(&bytes)))
}

/// Rebuilds every object with its keys in lexicographic order.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted = map
                .into_iter()
                .map(|(k, v)| (k, canonicalize(v)))
                .collect::<std::collections::BTreeMap<_, _>>();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        v => v,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn route() -> AiRoute {
        AiRoute {
            provider: Some(AiProvider::OpenAi),
            model: Some("gpt-4o".to_string()),
            auth_token: Some("sk-test".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn static_inputs_are_resolved() {
        let ir = AiIr::build(&route()).unwrap();
        assert_eq!(ir.metadata(keys::PROVIDER), Some("openai"));
        assert_eq!(ir.metadata(keys::MODEL), Some("gpt-4o"));
        assert_eq!(
            ir.request_headers,
            vec![
                HeaderValueOption::overwrite("authorization", "Bearer sk-test"),
                HeaderValueOption::overwrite(REQUEST_ID_HEADER, REQUEST_ID_EXPR),
            ]
        );
    }

    #[test]
    fn model_is_deferred_when_unset() {
        let ir = AiIr::build(&AiRoute {
            model: None,
            ..route()
        })
        .unwrap();
        assert_eq!(ir.metadata(keys::MODEL), None);
        assert!(ir
            .request_headers
            .contains(&HeaderValueOption::overwrite(
                RESOLVED_MODEL_HEADER,
                RESOLVED_MODEL_EXPR
            )));
    }

    #[test]
    fn credential_without_provider_fails() {
        let err = AiIr::build(&AiRoute {
            provider: None,
            ..route()
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "a credential requires an AI provider");
    }

    #[test]
    fn guardrails_are_hashed() {
        let guard = GuardRequest {
            regex: Some(RegexGuard {
                matches: vec!["secret-[0-9]+".to_string()],
                builtins: vec![BuiltinRegex::Email],
                action: GuardAction::Reject,
            }),
            ..Default::default()
        };
        let ir = AiIr::build(&AiRoute {
            prompt_guard: Some(PromptGuard {
                request: Some(guard.clone()),
                response: None,
            }),
            ..route()
        })
        .unwrap();
        let hash = ir.metadata(keys::REQ_GUARD_HASH).unwrap();
        assert!(hash.starts_with("v1:"));
        assert_eq!(hash, config_hash(&guard).unwrap());
        assert_eq!(ir.validate(), Ok(()));
    }

    #[test]
    fn config_hash_ignores_key_order() {
        let a = json!({"a": 1, "b": {"c": 2, "d": [1, 2]}});
        let b = json!({"b": {"d": [1, 2], "c": 2}, "a": 1});
        let c = json!({"b": {"d": [2, 1], "c": 2}, "a": 1});
        assert_eq!(config_hash(&a).unwrap(), config_hash(&b).unwrap());
        assert_ne!(config_hash(&a).unwrap(), config_hash(&c).unwrap());
    }

    #[test]
    fn invalid_guard_regex_is_rejected() {
        let ir = AiIr::build(&AiRoute {
            prompt_guard: Some(PromptGuard {
                request: None,
                response: Some(GuardResponse {
                    regex: Some(RegexGuard {
                        matches: vec!["[".to_string()],
                        ..Default::default()
                    }),
                    webhook: None,
                }),
            }),
            ..route()
        })
        .unwrap();
        assert!(matches!(
            ir.validate(),
            Err(ValidationError::Invalid { field: "ai.promptGuard.regex.matches", .. })
        ));
    }
}
