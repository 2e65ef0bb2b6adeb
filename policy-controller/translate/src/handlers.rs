//! One handler per facet. Handlers run in facet order, so a later facet that
//! writes the same override as an earlier one wins.

use crate::{
    pass::{TranslationPass, AI_EXT_PROC_CLUSTER, DISABLE_EXT_AUTH_KEY, DISABLE_EXT_AUTH_NAMESPACE},
    Scope,
};
use gateway_policy_controller_core::{
    facets::{
        AiIr, BufferIr, CorsIr, CsrfIr, ExtAuthIr, ExtProcIr, GlobalRateLimitIr, HashPolicyIr,
        HeaderMutationIr, HostRewriteIr, LocalRateLimitIr, TimeoutsIr, TransformationIr,
    },
    xds::{
        config::{
            Buffer, Cors, CsrfPolicy, EnvoyGrpc, ExtProc, FilterTransformations, GrpcService,
            HeaderMutation, HeaderMutationPerRoute, LocalRateLimit, Metadata,
            RouteTransformations, SetMetadata,
        },
        filter::names,
        matcher::RuntimeFractionalPercent,
        FilterStage, TypedConfig, WellKnownStage,
    },
    Facet, TrafficPolicy,
};

/// The request size limit of a disabled buffer filter. Scopes that enable the
/// filter always set their own limit.
const DEFAULT_MAX_REQUEST_BYTES: u32 = 1024 * 1024;

const AI_STAGE: FilterStage = FilterStage::before(WellKnownStage::Route);
const TRANSFORMATION_STAGE: FilterStage = FilterStage::after(WellKnownStage::AuthZ).with_weight(1);
const CORS_STAGE: FilterStage = FilterStage::during(WellKnownStage::Cors);
const CSRF_STAGE: FilterStage = FilterStage::after(WellKnownStage::Cors);
const LOCAL_RATELIMIT_STAGE: FilterStage = FilterStage::before(WellKnownStage::RateLimit);
const DISABLE_EXT_AUTH_STAGE: FilterStage = FilterStage::before(WellKnownStage::AuthZ);
const BUFFER_STAGE: FilterStage = FilterStage::before(WellKnownStage::AuthN);
const HEADER_MUTATION_STAGE: FilterStage = FilterStage::before(WellKnownStage::Route).with_weight(1);

// === impl TranslationPass ===

impl TranslationPass {
    pub(crate) fn apply<S: Scope>(&mut self, chain: &str, policy: &TrafficPolicy, scope: &mut S) {
        for facet in Facet::ALL {
            match facet {
                Facet::Ai => {
                    if let Some(ai) = &policy.ai {
                        self.handle_ai(chain, ai, scope);
                    }
                }
                Facet::Transformation => {
                    if let Some(t) = &policy.transformation {
                        self.handle_transformation(chain, t, scope);
                    }
                }
                Facet::HostRewrite => {
                    if let Some(hr) = &policy.host_rewrite {
                        handle_host_rewrite(hr, scope);
                    }
                }
                Facet::ExtProc => {
                    if let Some(ep) = &policy.ext_proc {
                        self.handle_ext_proc(chain, ep, scope);
                    }
                }
                Facet::ExtAuth => {
                    if let Some(ea) = &policy.ext_auth {
                        self.handle_ext_auth(chain, ea, scope);
                    }
                }
                Facet::LocalRateLimit => {
                    if let Some(rl) = &policy.local_rate_limit {
                        self.handle_local_rate_limit(chain, rl, scope);
                    }
                }
                Facet::GlobalRateLimit => {
                    if let Some(rl) = &policy.global_rate_limit {
                        self.handle_global_rate_limit(chain, rl, scope);
                    }
                }
                Facet::Cors => {
                    if let Some(cors) = &policy.cors {
                        self.handle_cors(chain, cors, scope);
                    }
                }
                Facet::Csrf => {
                    if let Some(csrf) = &policy.csrf {
                        self.handle_csrf(chain, csrf, scope);
                    }
                }
                Facet::Buffer => {
                    if let Some(buffer) = &policy.buffer {
                        self.handle_buffer(chain, buffer, scope);
                    }
                }
                Facet::HeaderMutation => {
                    if let Some(hm) = &policy.header_mutation {
                        self.handle_header_mutation(chain, hm, scope);
                    }
                }
                Facet::HashPolicy => {
                    if let Some(hp) = &policy.hash_policy {
                        handle_hash_policy(hp, scope);
                    }
                }
                Facet::Timeouts => {
                    if let Some(t) = &policy.timeouts {
                        handle_timeouts(t, scope);
                    }
                }
            }
        }
    }

    /// Applies a policy to every request handled by a chain.
    ///
    /// Only facets whose filters carry their complete configuration at the
    /// chain level take effect here; facets that are expressed as per-route
    /// overrides or route action settings must be applied to a route scope.
    pub fn apply_filter_chain(&mut self, chain: &str, policy: &TrafficPolicy) {
        for facet in policy.configured() {
            match facet {
                Facet::ExtProc => {
                    if let Some(ep) = &policy.ext_proc {
                        self.register_provider(chain, &ep.provider, true);
                    }
                }
                Facet::ExtAuth => match &policy.ext_auth {
                    Some(ExtAuthIr::Provider { provider, .. }) => {
                        self.register_provider(chain, provider, true);
                    }
                    Some(ExtAuthIr::DisableAll) => {
                        self.enable_filter(
                            chain,
                            names::DISABLE_EXT_AUTH,
                            DISABLE_EXT_AUTH_STAGE,
                            disable_ext_auth(),
                        );
                    }
                    None => {}
                },
                Facet::LocalRateLimit => {
                    if let Some(rl) = &policy.local_rate_limit {
                        self.enable_filter(
                            chain,
                            names::LOCAL_RATELIMIT,
                            LOCAL_RATELIMIT_STAGE,
                            TypedConfig::LocalRateLimit(rl.config.clone()),
                        );
                    }
                }
                Facet::Csrf => {
                    if let Some(csrf) = &policy.csrf {
                        self.enable_filter(
                            chain,
                            names::CSRF,
                            CSRF_STAGE,
                            TypedConfig::CsrfPolicy(csrf.policy.clone()),
                        );
                    }
                }
                Facet::Buffer => {
                    if let Some(buffer) = &policy.buffer {
                        self.enable_filter(
                            chain,
                            names::BUFFER,
                            BUFFER_STAGE,
                            TypedConfig::Buffer(Buffer {
                                max_request_bytes: buffer.max_request_bytes,
                            }),
                        );
                    }
                }
                Facet::HeaderMutation => {
                    if let Some(hm) = &policy.header_mutation {
                        self.enable_filter(
                            chain,
                            names::HEADER_MUTATION,
                            HEADER_MUTATION_STAGE,
                            TypedConfig::HeaderMutation(HeaderMutation {
                                mutations: hm.mutations.clone(),
                            }),
                        );
                    }
                }
                facet => {
                    tracing::debug!(%chain, %facet, "Facet has no chain-level form; skipping");
                }
            }
        }
    }

    fn handle_ai<S: Scope>(&mut self, chain: &str, ai: &AiIr, scope: &mut S) {
        self.register_companion(chain, names::AI_EXT_PROC, AI_STAGE, || {
            TypedConfig::ExtProc(ExtProc {
                grpc_service: GrpcService {
                    envoy_grpc: EnvoyGrpc {
                        cluster_name: AI_EXT_PROC_CLUSTER.to_string(),
                        authority: None,
                    },
                    timeout: None,
                },
                failure_mode_allow: false,
                processing_mode: None,
            })
        });
        scope.typed_per_filter_config().insert(
            names::AI_EXT_PROC.to_string(),
            TypedConfig::ExtProcPerRoute(ai.ext_proc.clone()).enabling(),
        );
        let headers = scope.request_headers_to_add();
        for header in &ai.request_headers {
            headers.retain(|h| h.header.key != header.header.key);
            headers.push(header.clone());
        }
    }

    fn handle_transformation<S: Scope>(
        &mut self,
        chain: &str,
        t: &TransformationIr,
        scope: &mut S,
    ) {
        self.register_companion(chain, names::TRANSFORMATION, TRANSFORMATION_STAGE, || {
            TypedConfig::FilterTransformations(FilterTransformations {})
        });
        scope.typed_per_filter_config().insert(
            names::TRANSFORMATION.to_string(),
            TypedConfig::RouteTransformations(RouteTransformations {
                transformations: t.transformations.clone(),
            })
            .enabling(),
        );
    }

    fn handle_ext_proc<S: Scope>(&mut self, chain: &str, ep: &ExtProcIr, scope: &mut S) {
        self.register_provider(chain, &ep.provider, false);
        scope.typed_per_filter_config().insert(
            ep.provider.filter_name(),
            TypedConfig::ExtProcPerRoute(ep.per_route.clone()).enabling(),
        );
    }

    fn handle_ext_auth<S: Scope>(&mut self, chain: &str, ea: &ExtAuthIr, scope: &mut S) {
        match ea {
            ExtAuthIr::Provider {
                provider,
                per_route,
            } => {
                self.register_provider(chain, provider, false);
                scope.typed_per_filter_config().insert(
                    provider.filter_name(),
                    TypedConfig::ExtAuthzPerRoute(per_route.clone()).enabling(),
                );
            }
            ExtAuthIr::DisableAll => {
                self.register_companion(
                    chain,
                    names::DISABLE_EXT_AUTH,
                    DISABLE_EXT_AUTH_STAGE,
                    disable_ext_auth,
                );
                scope
                    .typed_per_filter_config()
                    .insert(names::DISABLE_EXT_AUTH.to_string(), TypedConfig::enable());
            }
        }
    }

    fn handle_local_rate_limit<S: Scope>(
        &mut self,
        chain: &str,
        rl: &LocalRateLimitIr,
        scope: &mut S,
    ) {
        self.register_companion(chain, names::LOCAL_RATELIMIT, LOCAL_RATELIMIT_STAGE, || {
            TypedConfig::LocalRateLimit(LocalRateLimit {
                token_bucket: None,
                filter_enabled: None,
                filter_enforced: None,
                ..rl.config.clone()
            })
        });
        let config = if rl.config.token_bucket.is_some() {
            TypedConfig::LocalRateLimit(rl.config.clone()).enabling()
        } else {
            TypedConfig::disable()
        };
        scope
            .typed_per_filter_config()
            .insert(names::LOCAL_RATELIMIT.to_string(), config);
    }

    fn handle_global_rate_limit<S: Scope>(
        &mut self,
        chain: &str,
        rl: &GlobalRateLimitIr,
        scope: &mut S,
    ) {
        let Some(rate_limits) = scope.rate_limits() else {
            tracing::debug!(%chain, "Rate limit descriptors require a route or virtual host");
            return;
        };
        rate_limits.extend(rl.descriptors.iter().cloned());
        self.register_provider(chain, &rl.provider, false);
        scope
            .typed_per_filter_config()
            .insert(rl.provider.filter_name(), TypedConfig::enable());
    }

    fn handle_cors<S: Scope>(&mut self, chain: &str, cors: &CorsIr, scope: &mut S) {
        self.register_companion(chain, names::CORS, CORS_STAGE, || {
            TypedConfig::Cors(Cors {})
        });
        scope.typed_per_filter_config().insert(
            names::CORS.to_string(),
            TypedConfig::CorsPolicy(cors.policy.clone()).enabling(),
        );
    }

    fn handle_csrf<S: Scope>(&mut self, chain: &str, csrf: &CsrfIr, scope: &mut S) {
        self.register_companion(chain, names::CSRF, CSRF_STAGE, || {
            TypedConfig::CsrfPolicy(CsrfPolicy {
                filter_enabled: RuntimeFractionalPercent::percent(0),
                shadow_enabled: None,
                additional_origins: Vec::new(),
            })
        });
        scope.typed_per_filter_config().insert(
            names::CSRF.to_string(),
            TypedConfig::CsrfPolicy(csrf.policy.clone()).enabling(),
        );
    }

    fn handle_buffer<S: Scope>(&mut self, chain: &str, buffer: &BufferIr, scope: &mut S) {
        self.register_companion(chain, names::BUFFER, BUFFER_STAGE, || {
            TypedConfig::Buffer(Buffer {
                max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            })
        });
        scope.typed_per_filter_config().insert(
            names::BUFFER.to_string(),
            TypedConfig::BufferPerRoute(buffer.per_route()).enabling(),
        );
    }

    fn handle_header_mutation<S: Scope>(
        &mut self,
        chain: &str,
        hm: &HeaderMutationIr,
        scope: &mut S,
    ) {
        self.register_companion(chain, names::HEADER_MUTATION, HEADER_MUTATION_STAGE, || {
            TypedConfig::HeaderMutation(HeaderMutation::default())
        });
        scope.typed_per_filter_config().insert(
            names::HEADER_MUTATION.to_string(),
            TypedConfig::HeaderMutationPerRoute(HeaderMutationPerRoute {
                mutations: hm.mutations.clone(),
            })
            .enabling(),
        );
    }
}

fn handle_host_rewrite<S: Scope>(hr: &HostRewriteIr, scope: &mut S) {
    if let Some(action) = scope.route_action() {
        action.auto_host_rewrite = Some(hr.auto_host_rewrite);
    }
}

fn handle_hash_policy<S: Scope>(hp: &HashPolicyIr, scope: &mut S) {
    if let Some(action) = scope.route_action() {
        action.hash_policy = hp.policies.clone();
    }
}

fn handle_timeouts<S: Scope>(t: &TimeoutsIr, scope: &mut S) {
    let Some(action) = scope.route_action() else {
        return;
    };
    if let Some(request) = t.request {
        action.timeout = Some(request);
    }
    if let Some(idle) = t.stream_idle {
        action.idle_timeout = Some(idle);
    }
    if let Some(retry) = &t.retry {
        action.retry_policy = Some(retry.clone());
    }
}

/// The sentinel filter's configuration: when enabled for a scope, it marks
/// every request so that authorization filters skip it.
fn disable_ext_auth() -> TypedConfig {
    let mut value = serde_json::Map::new();
    value.insert(DISABLE_EXT_AUTH_KEY.to_string(), true.into());
    TypedConfig::SetMetadata(SetMetadata {
        metadata: vec![Metadata {
            metadata_namespace: DISABLE_EXT_AUTH_NAMESPACE.to_string(),
            value: value.into(),
            allow_overwrite: true,
        }],
    })
}
