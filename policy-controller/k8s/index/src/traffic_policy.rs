//! Builds policy records from `TrafficPolicy` specs.
//!
//! Each facet has its own constructor. A facet that fails to build is left
//! unset and its error is recorded; it never prevents the policy's other
//! facets from taking effect.

use crate::Lookup;
use anyhow::{anyhow, bail, Context, Result};
use chrono::{offset::Utc, DateTime};
use gateway_policy_controller_core::{
    facets::{
        self, AiIr, AiRoute, BufferIr, CorsIr, CsrfIr, ExtAuthIr, ExtProcIr, GlobalRateLimitIr,
        HashPolicyIr, HeaderMutationIr, HostRewriteIr, LocalRateLimitIr, TimeoutsIr,
        TransformationIr,
    },
    xds::{
        config::{
            self as xds, BodyTransformation, BufferSettings, CheckSettings, CorsPolicy,
            CsrfPolicy, ExtAuthzPerRoute, ExtProcOverrides, ExtProcPerRoute, HeaderMutationRule,
            Mutations, RouteTransformation, Transformation,
        },
        matcher::RuntimeFractionalPercent,
        route::{HashPolicy, HashPolicySpecifier, RetryBackOff, RetryPolicy},
        HeaderValue, HeaderValueOption, RateLimitAction, RateLimitDescriptor, StringMatcher,
    },
    ExtensionName, Facet, GatewayExtensionIr, PolicyError, TrafficPolicy,
};
use gateway_policy_controller_k8s_api::traffic_policy::{self as api, TrafficPolicySpec};
use std::sync::Arc;

/// The key in a credential `Secret` that holds an AI backend's token.
const AUTH_TOKEN_KEY: &str = "Authorization";

const RETRIABLE_STATUS_CODES: &str = "retriable-status-codes";

/// A constructed policy along with every error encountered while building and
/// validating it. Invalid facets are left unset.
#[derive(Clone, Debug, PartialEq)]
pub struct Constructed {
    pub policy: TrafficPolicy,
    pub errors: Vec<PolicyError>,
}

/// Builds a policy record from a spec, resolving its references through
/// `lookup`.
pub fn construct(
    namespace: &str,
    spec: &TrafficPolicySpec,
    created: Option<DateTime<Utc>>,
    lookup: &impl Lookup,
) -> Constructed {
    let mut errors = Vec::new();
    let mut policy = TrafficPolicy {
        creation_timestamp: created,
        ..Default::default()
    };

    policy.ai = build(Facet::Ai, spec.ai.as_ref(), &mut errors, |ai| {
        ai_route(namespace, ai, lookup)
    });
    policy.transformation = build(
        Facet::Transformation,
        spec.transformation.as_ref(),
        &mut errors,
        transformation,
    );
    policy.host_rewrite = build(
        Facet::HostRewrite,
        spec.auto_host_rewrite.as_ref(),
        &mut errors,
        |&auto_host_rewrite| Ok(HostRewriteIr { auto_host_rewrite }),
    );
    policy.ext_proc = build(Facet::ExtProc, spec.ext_proc.as_ref(), &mut errors, |p| {
        ext_proc(namespace, p, lookup)
    });
    policy.ext_auth = build(Facet::ExtAuth, spec.ext_auth.as_ref(), &mut errors, |p| {
        ext_auth(namespace, p, lookup)
    });

    let rate_limit = spec.rate_limit.as_ref();
    policy.local_rate_limit = build(
        Facet::LocalRateLimit,
        rate_limit.and_then(|rl| rl.local.as_ref()),
        &mut errors,
        local_rate_limit,
    );
    policy.global_rate_limit = build(
        Facet::GlobalRateLimit,
        rate_limit.and_then(|rl| rl.global.as_ref()),
        &mut errors,
        |rl| global_rate_limit(namespace, rl, lookup),
    );

    policy.cors = build(Facet::Cors, spec.cors.as_ref(), &mut errors, cors);
    policy.csrf = build(Facet::Csrf, spec.csrf.as_ref(), &mut errors, csrf);
    policy.buffer = build(Facet::Buffer, spec.buffer.as_ref(), &mut errors, buffer);
    policy.header_mutation = build(
        Facet::HeaderMutation,
        spec.header_modifiers.as_ref(),
        &mut errors,
        |h| Ok(header_mutation(h)),
    );
    policy.hash_policy = build(
        Facet::HashPolicy,
        spec.hash_policies.as_ref(),
        &mut errors,
        |hp| hash_policies(hp),
    );

    let timed = spec.timeouts.is_some() || spec.retry.is_some();
    policy.timeouts = build(Facet::Timeouts, timed.then_some(spec), &mut errors, |s| {
        timeouts(s.timeouts.as_ref(), s.retry.as_ref())
    });

    errors.extend(policy.retain_valid());
    Constructed { policy, errors }
}

fn build<S, T>(
    facet: Facet,
    spec: Option<&S>,
    errors: &mut Vec<PolicyError>,
    f: impl FnOnce(&S) -> Result<T>,
) -> Option<T> {
    let spec = spec?;
    match f(spec) {
        Ok(ir) => Some(ir),
        Err(error) => {
            tracing::debug!(%facet, error = %format_args!("{error:#}"), "Failed to build facet");
            // Resolution failures are reported as-is; anything else is a
            // construction error on the facet.
            let error = match error.downcast::<PolicyError>() {
                Ok(error) => error,
                Err(error) => PolicyError::construction(facet, error),
            };
            errors.push(error);
            None
        }
    }
}

fn extension(
    ns: &str,
    r: &api::ExtensionRef,
    lookup: &impl Lookup,
) -> Result<Arc<GatewayExtensionIr>> {
    let name = ExtensionName {
        namespace: r.namespace.clone().unwrap_or_else(|| ns.to_string()),
        name: r.name.clone(),
    };
    let ext = lookup
        .extension(&name)
        .ok_or_else(|| anyhow!("gateway extension {name} not found"))?;
    if let Err(error) = &ext.provider {
        return Err(PolicyError::Resolution {
            extension: name,
            message: error.to_string(),
        }
        .into());
    }
    Ok(ext)
}

// === AI ===

fn ai_route(ns: &str, spec: &api::AiPolicy, lookup: &impl Lookup) -> Result<AiIr> {
    let backend = spec.backend.as_ref();
    let auth_token = match backend.and_then(|b| b.auth_token.as_ref()) {
        Some(token) => auth_token(ns, token, lookup)?,
        None => None,
    };

    let route = AiRoute {
        provider: backend.map(|b| ai_provider(b.provider)),
        model: backend.and_then(|b| b.model.clone()),
        auth_token,
        route_type: match spec.route_type {
            api::AiRouteType::Chat => facets::AiRouteType::Chat,
            api::AiRouteType::ChatStreaming => facets::AiRouteType::ChatStreaming,
        },
        defaults: spec
            .defaults
            .iter()
            .map(|d| facets::FieldDefault {
                field: d.field.clone(),
                value: d.value.clone(),
                override_: d.override_,
            })
            .collect(),
        prompt_enrichment: spec
            .prompt_enrichment
            .as_ref()
            .map(|e| facets::PromptEnrichment {
                prepend: e.prepend.iter().map(message).collect(),
                append: e.append.iter().map(message).collect(),
            }),
        prompt_guard: spec.prompt_guard.as_ref().map(prompt_guard),
    };
    AiIr::build(&route)
}

fn ai_provider(p: api::AiProvider) -> facets::AiProvider {
    match p {
        api::AiProvider::OpenAI => facets::AiProvider::OpenAi,
        api::AiProvider::AzureOpenAI => facets::AiProvider::AzureOpenAi,
        api::AiProvider::Anthropic => facets::AiProvider::Anthropic,
        api::AiProvider::Gemini => facets::AiProvider::Gemini,
        api::AiProvider::VertexAI => facets::AiProvider::VertexAi,
    }
}

/// Resolves a backend credential. A passthrough credential is supplied by the
/// client, so there is nothing to resolve.
fn auth_token(ns: &str, token: &api::AuthToken, lookup: &impl Lookup) -> Result<Option<String>> {
    match token.kind {
        api::AuthTokenKind::Passthrough => Ok(None),
        api::AuthTokenKind::Inline => token
            .inline
            .clone()
            .map(Some)
            .ok_or_else(|| anyhow!("authToken.inline must be set")),
        api::AuthTokenKind::SecretRef => {
            let secret = token
                .secret_ref
                .as_ref()
                .ok_or_else(|| anyhow!("authToken.secretRef must be set"))?;
            let data = lookup
                .secret(ns, &secret.name)
                .ok_or_else(|| anyhow!("secret {ns}/{} not found", secret.name))?;
            let value = data.get(AUTH_TOKEN_KEY).ok_or_else(|| {
                anyhow!("secret {ns}/{} has no {AUTH_TOKEN_KEY} key", secret.name)
            })?;
            let value = std::str::from_utf8(value)
                .with_context(|| format!("secret {ns}/{}", secret.name))?
                .trim();
            let value = value.strip_prefix("Bearer ").unwrap_or(value);
            Ok(Some(value.to_string()))
        }
    }
}

fn message(m: &api::Message) -> facets::Message {
    facets::Message {
        role: m.role.clone(),
        content: m.content.clone(),
    }
}

fn prompt_guard(g: &api::PromptGuard) -> facets::PromptGuard {
    facets::PromptGuard {
        request: g.request.as_ref().map(|r| facets::GuardRequest {
            custom_response_message: r.custom_response.as_ref().map(|c| c.message.clone()),
            regex: r.regex.as_ref().map(regex_guard),
            webhook: r.webhook.as_ref().map(webhook),
        }),
        response: g.response.as_ref().map(|r| facets::GuardResponse {
            regex: r.regex.as_ref().map(regex_guard),
            webhook: r.webhook.as_ref().map(webhook),
        }),
    }
}

fn regex_guard(r: &api::Regex) -> facets::RegexGuard {
    facets::RegexGuard {
        matches: r.matches.iter().map(|m| m.pattern.clone()).collect(),
        builtins: r
            .builtins
            .iter()
            .map(|b| match b {
                api::BuiltinRegex::Ssn => facets::BuiltinRegex::Ssn,
                api::BuiltinRegex::CreditCard => facets::BuiltinRegex::CreditCard,
                api::BuiltinRegex::PhoneNumber => facets::BuiltinRegex::PhoneNumber,
                api::BuiltinRegex::Email => facets::BuiltinRegex::Email,
            })
            .collect(),
        action: match r.action {
            api::GuardAction::Mask => facets::GuardAction::Mask,
            api::GuardAction::Reject => facets::GuardAction::Reject,
        },
    }
}

fn webhook(w: &api::Webhook) -> facets::Webhook {
    facets::Webhook {
        host: w.host.clone(),
        port: w.port,
        forward_headers: w.forward_headers.clone(),
    }
}

// === Transformation ===

fn transformation(spec: &api::TransformationPolicy) -> Result<TransformationIr> {
    Ok(TransformationIr {
        transformations: vec![RouteTransformation {
            request: spec.request.as_ref().map(transform),
            response: spec.response.as_ref().map(transform),
        }],
    })
}

fn transform(t: &api::Transform) -> Transformation {
    Transformation {
        headers: t
            .set
            .iter()
            .map(|h| (h.name.clone(), h.value.clone()))
            .collect(),
        headers_to_append: t
            .add
            .iter()
            .map(|h| HeaderValue {
                key: h.name.clone(),
                value: h.value.clone(),
            })
            .collect(),
        headers_to_remove: t.remove.clone(),
        body: t.body.as_ref().map(|b| match &b.value {
            None => BodyTransformation::Passthrough {},
            Some(text) => BodyTransformation::Template {
                text: text.clone(),
                parse_as_json: b.parse_as == api::BodyParseBehavior::AsJson,
            },
        }),
    }
}

// === External services ===

fn ext_proc(ns: &str, spec: &api::ExtProcPolicy, lookup: &impl Lookup) -> Result<ExtProcIr> {
    let provider = extension(ns, &spec.extension_ref, lookup)?;
    Ok(ExtProcIr {
        provider,
        per_route: ExtProcPerRoute {
            overrides: ExtProcOverrides {
                processing_mode: spec.processing_mode.as_ref().map(processing_mode),
                grpc_initial_metadata: Vec::new(),
            },
        },
    })
}

fn processing_mode(m: &api::ProcessingMode) -> xds::ProcessingMode {
    let header = |mode: Option<api::HeaderSendMode>| match mode {
        None | Some(api::HeaderSendMode::Default) => xds::HeaderSendMode::Default,
        Some(api::HeaderSendMode::Send) => xds::HeaderSendMode::Send,
        Some(api::HeaderSendMode::Skip) => xds::HeaderSendMode::Skip,
    };
    let body = |mode: Option<api::BodySendMode>| match mode {
        None | Some(api::BodySendMode::None) => xds::BodySendMode::None,
        Some(api::BodySendMode::Streamed) => xds::BodySendMode::Streamed,
        Some(api::BodySendMode::Buffered) => xds::BodySendMode::Buffered,
        Some(api::BodySendMode::BufferedPartial) => xds::BodySendMode::BufferedPartial,
    };
    xds::ProcessingMode {
        request_header_mode: header(m.request_header_mode),
        response_header_mode: header(m.response_header_mode),
        request_body_mode: body(m.request_body_mode),
        response_body_mode: body(m.response_body_mode),
        request_trailer_mode: header(m.request_trailer_mode),
        response_trailer_mode: header(m.response_trailer_mode),
    }
}

fn ext_auth(ns: &str, spec: &api::ExtAuthPolicy, lookup: &impl Lookup) -> Result<ExtAuthIr> {
    match (&spec.enablement, &spec.extension_ref) {
        (Some(api::ExtAuthEnablement::DisableAll), None) => Ok(ExtAuthIr::DisableAll),
        (Some(api::ExtAuthEnablement::DisableAll), Some(_)) => {
            bail!("extensionRef may not be set when enablement is DisableAll")
        }
        (None, None) => bail!("one of extensionRef or enablement must be set"),
        (None, Some(r)) => {
            let provider = extension(ns, r, lookup)?;
            Ok(ExtAuthIr::Provider {
                provider,
                per_route: ExtAuthzPerRoute {
                    check_settings: CheckSettings {
                        context_extensions: spec.context_extensions.clone(),
                        with_request_body: spec.with_request_body.as_ref().map(|b| {
                            BufferSettings {
                                max_request_bytes: b.max_request_bytes,
                                allow_partial_message: b.allow_partial_message,
                                pack_as_bytes: b.pack_as_bytes,
                            }
                        }),
                    },
                },
            })
        }
    }
}

// === Rate limiting ===

fn local_rate_limit(spec: &api::LocalRateLimit) -> Result<LocalRateLimitIr> {
    Ok(match &spec.token_bucket {
        Some(bucket) => LocalRateLimitIr::token_bucket(
            bucket.max_tokens,
            bucket.tokens_per_fill,
            bucket.fill_interval.into(),
        ),
        None => LocalRateLimitIr::disabled(),
    })
}

fn global_rate_limit(
    ns: &str,
    spec: &api::GlobalRateLimit,
    lookup: &impl Lookup,
) -> Result<GlobalRateLimitIr> {
    let provider = extension(ns, &spec.extension_ref, lookup)?;
    let descriptors = spec
        .descriptors
        .iter()
        .map(|d| {
            let actions = d
                .entries
                .iter()
                .map(rate_limit_action)
                .collect::<Result<Vec<_>>>()?;
            Ok(RateLimitDescriptor { actions })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(GlobalRateLimitIr {
        provider,
        descriptors,
    })
}

fn rate_limit_action(entry: &api::RateLimitDescriptorEntry) -> Result<RateLimitAction> {
    use api::RateLimitDescriptorEntryType as Type;

    match entry.type_ {
        Type::Generic => {
            let generic = entry
                .generic
                .as_ref()
                .ok_or_else(|| anyhow!("a Generic descriptor entry requires generic"))?;
            Ok(RateLimitAction::GenericKey {
                descriptor_key: generic.key.clone(),
                descriptor_value: generic.value.clone(),
            })
        }
        Type::Header => {
            let header = entry
                .header
                .as_ref()
                .ok_or_else(|| anyhow!("a Header descriptor entry requires header"))?;
            Ok(RateLimitAction::RequestHeaders {
                header_name: header.clone(),
                descriptor_key: header.clone(),
            })
        }
        Type::RemoteAddress => Ok(RateLimitAction::RemoteAddress {}),
        Type::Path => Ok(RateLimitAction::RequestHeaders {
            header_name: ":path".to_string(),
            descriptor_key: "path".to_string(),
        }),
    }
}

// === CORS and CSRF ===

fn cors(spec: &api::CorsPolicy) -> Result<CorsIr> {
    Ok(CorsIr {
        policy: CorsPolicy {
            allow_origin_string_match: spec.allow_origins.iter().map(|o| origin(o)).collect(),
            allow_methods: spec.allow_methods.join(","),
            allow_headers: spec.allow_headers.join(","),
            expose_headers: spec.expose_headers.join(","),
            max_age: spec.max_age.map(|s| s.to_string()),
            allow_credentials: spec.allow_credentials,
        },
    })
}

/// A lone `*` matches every origin; otherwise each `*` matches one DNS label
/// or port.
fn origin(origin: &str) -> StringMatcher {
    if origin == "*" || !origin.contains('*') {
        return StringMatcher::Exact(origin.to_string());
    }
    let regex = origin
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join("[a-zA-Z0-9-]+");
    StringMatcher::SafeRegex {
        regex: format!("^{regex}$"),
    }
}

fn csrf(spec: &api::CsrfPolicy) -> Result<CsrfIr> {
    let additional_origins = spec
        .additional_origins
        .iter()
        .map(string_match)
        .collect::<Result<Vec<_>>>()?;
    Ok(CsrfIr {
        policy: CsrfPolicy {
            filter_enabled: RuntimeFractionalPercent::percent(
                spec.percentage_enabled.unwrap_or(0),
            ),
            shadow_enabled: spec
                .percentage_shadowed
                .map(RuntimeFractionalPercent::percent),
            additional_origins,
        },
    })
}

fn string_match(m: &api::StringMatch) -> Result<StringMatcher> {
    let arms = [
        m.exact.clone().map(StringMatcher::Exact),
        m.prefix.clone().map(StringMatcher::Prefix),
        m.suffix.clone().map(StringMatcher::Suffix),
        m.contains.clone().map(StringMatcher::Contains),
        m.safe_regex
            .clone()
            .map(|regex| StringMatcher::SafeRegex { regex }),
    ];
    let mut set = arms.into_iter().flatten();
    match (set.next(), set.next()) {
        (Some(matcher), None) => Ok(matcher),
        _ => bail!("a string match must set exactly one of exact, prefix, suffix, contains, or safeRegex"),
    }
}

// === Buffering and headers ===

fn buffer(spec: &api::Buffer) -> Result<BufferIr> {
    let max_request_bytes = u32::try_from(spec.max_request_size).with_context(|| {
        format!(
            "maxRequestSize {} exceeds the maximum of {}",
            spec.max_request_size,
            u32::MAX
        )
    })?;
    Ok(BufferIr { max_request_bytes })
}

fn header_mutation(spec: &api::HeaderModifiers) -> HeaderMutationIr {
    let rules = |filter: &Option<api::HeaderFilter>| {
        let Some(filter) = filter else {
            return Vec::new();
        };
        let set = filter
            .set
            .iter()
            .map(|h| HeaderMutationRule::Append(HeaderValueOption::overwrite(&h.name, &h.value)));
        let add = filter
            .add
            .iter()
            .map(|h| HeaderMutationRule::Append(HeaderValueOption::append(&h.name, &h.value)));
        let remove = filter
            .remove
            .iter()
            .map(|name| HeaderMutationRule::Remove(name.clone()));
        set.chain(add).chain(remove).collect()
    };
    HeaderMutationIr {
        mutations: Mutations {
            request_mutations: rules(&spec.request),
            response_mutations: rules(&spec.response),
        },
    }
}

// === Hashing, timeouts, and retries ===

fn hash_policies(spec: &[api::HashPolicy]) -> Result<HashPolicyIr> {
    let policies = spec
        .iter()
        .map(|hp| {
            let policy = match (&hp.header, &hp.cookie, &hp.source_ip) {
                (Some(header), None, None) => HashPolicySpecifier::Header {
                    header_name: header.name.clone(),
                },
                (None, Some(cookie), None) => HashPolicySpecifier::Cookie {
                    name: cookie.name.clone(),
                    ttl: cookie.ttl.map(Into::into),
                    path: cookie.path.clone(),
                },
                (None, None, Some(_)) => HashPolicySpecifier::ConnectionProperties { source_ip: true },
                _ => bail!("a hash policy must set exactly one of header, cookie, or sourceIP"),
            };
            Ok(HashPolicy {
                policy,
                terminal: hp.terminal,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(HashPolicyIr { policies })
}

fn timeouts(timeouts: Option<&api::Timeouts>, retry: Option<&api::Retry>) -> Result<TimeoutsIr> {
    let retry = retry.map(|r| {
        let mut retry_on = r.retry_on.clone();
        if !r.status_codes.is_empty() && !retry_on.iter().any(|c| c == RETRIABLE_STATUS_CODES) {
            retry_on.push(RETRIABLE_STATUS_CODES.to_string());
        }
        RetryPolicy {
            retry_on: retry_on.join(","),
            num_retries: r.attempts.unwrap_or(1),
            per_try_timeout: r.per_try_timeout.map(Into::into),
            retriable_status_codes: r.status_codes.clone(),
            retry_back_off: r.backoff_base_interval.map(|base| RetryBackOff {
                base_interval: base.into(),
                max_interval: None,
            }),
        }
    });
    Ok(TimeoutsIr {
        request: timeouts.and_then(|t| t.request).map(Into::into),
        stream_idle: timeouts.and_then(|t| t.stream_idle).map(Into::into),
        retry,
    })
}
