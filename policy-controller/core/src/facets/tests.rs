use super::*;
use crate::{
    extension::ExtensionProvider,
    xds::{
        config::{
            CheckSettings, CorsPolicy, CsrfPolicy, EnvoyGrpc, ExtAuthz, ExtAuthzPerRoute,
            ExtProc, ExtProcPerRoute, GrpcService, HeaderMutationRule, Mutations, RateLimit,
            RateLimitServiceConfig, RouteTransformation, Transformation,
        },
        route::{HashPolicy, HashPolicySpecifier, RetryPolicy},
        HeaderValueOption, RateLimitAction, RateLimitDescriptor,
    },
    ExtensionName,
};
use std::{sync::Arc, time::Duration};

/// Checks that equality is an equivalence relation over `Option<T>`, given
/// two distinct but equal values and a third, different value.
fn assert_equivalence<T: SubIr>(x: T, y: T, other: T) {
    assert_ne!(x, other, "fixture values must differ");

    // Reflexive.
    assert_eq!(x, x.clone());

    // Symmetric.
    assert_eq!(x == y, y == x);
    assert_eq!(x == other, other == x);

    // Transitive.
    let z = y.clone();
    assert!(x == y && y == z);
    assert_eq!(x, z);

    // Absent facets.
    let none: Option<T> = None;
    assert_eq!(none, None);
    assert_ne!(none, Some(x.clone()));
    assert_ne!(Some(x), none);
}

fn grpc(cluster: &str) -> GrpcService {
    GrpcService {
        envoy_grpc: EnvoyGrpc {
            cluster_name: cluster.to_string(),
            authority: None,
        },
        timeout: None,
    }
}

fn extension(name: &str, provider: ExtensionProvider) -> Arc<GatewayExtensionIr> {
    Arc::new(GatewayExtensionIr::resolved(
        ExtensionName {
            namespace: "default".to_string(),
            name: name.to_string(),
        },
        provider,
    ))
}

fn ext_authz(cluster: &str) -> ExtensionProvider {
    ExtensionProvider::ExtAuth(ExtAuthz {
        grpc_service: grpc(cluster),
        transport_api_version: "V3",
        failure_mode_allow: false,
        filter_enabled_metadata: None,
    })
}

fn ext_proc(cluster: &str) -> ExtensionProvider {
    ExtensionProvider::ExtProc(ExtProc {
        grpc_service: grpc(cluster),
        failure_mode_allow: false,
        processing_mode: None,
    })
}

fn rate_limit(domain: &str) -> ExtensionProvider {
    ExtensionProvider::RateLimit(RateLimit {
        domain: domain.to_string(),
        rate_limit_service: RateLimitServiceConfig {
            grpc_service: grpc("kube_default_ratelimit_8081"),
            transport_api_version: "V3",
        },
        failure_mode_deny: false,
        timeout: None,
    })
}

#[test]
fn ai_equality() {
    let route = |model: &str| AiRoute {
        provider: Some(AiProvider::Anthropic),
        model: Some(model.to_string()),
        auth_token: Some("token".to_string()),
        ..Default::default()
    };
    assert_equivalence(
        AiIr::build(&route("claude")).unwrap(),
        AiIr::build(&route("claude")).unwrap(),
        AiIr::build(&route("other")).unwrap(),
    );
}

#[test]
fn transformation_equality() {
    let t = |value: &str| TransformationIr {
        transformations: vec![RouteTransformation {
            request: Some(Transformation {
                headers: maplit::btreemap! { "x-a".to_string() => value.to_string() },
                ..Default::default()
            }),
            response: None,
        }],
    };
    assert_equivalence(t("a"), t("a"), t("b"));
}

#[test]
fn host_rewrite_equality() {
    assert_equivalence(
        HostRewriteIr {
            auto_host_rewrite: true,
        },
        HostRewriteIr {
            auto_host_rewrite: true,
        },
        HostRewriteIr {
            auto_host_rewrite: false,
        },
    );
}

#[test]
fn ext_proc_equality() {
    let ir = |cluster: &str| ExtProcIr {
        provider: extension("proc", ext_proc(cluster)),
        per_route: ExtProcPerRoute::default(),
    };
    assert_equivalence(ir("a"), ir("a"), ir("b"));
}

#[test]
fn ext_auth_equality() {
    let ir = |cluster: &str| ExtAuthIr::Provider {
        provider: extension("authz", ext_authz(cluster)),
        per_route: ExtAuthzPerRoute::default(),
    };
    assert_equivalence(ir("a"), ir("a"), ir("b"));
    assert_equivalence(ExtAuthIr::DisableAll, ExtAuthIr::DisableAll, ir("a"));
}

#[test]
fn extension_names_distinguish_facets() {
    let auth = |name: &str| ExtAuthIr::Provider {
        provider: extension(name, ext_authz("kube_default_authz_9000")),
        per_route: ExtAuthzPerRoute::default(),
    };
    assert_equivalence(auth("authz-a"), auth("authz-a"), auth("authz-b"));

    let processor = |name: &str| ExtProcIr {
        provider: extension(name, ext_proc("kube_default_proc_9000")),
        per_route: ExtProcPerRoute::default(),
    };
    assert_equivalence(processor("proc-a"), processor("proc-a"), processor("proc-b"));

    let rl = |name: &str| GlobalRateLimitIr {
        provider: extension(name, rate_limit("default")),
        descriptors: vec![RateLimitDescriptor {
            actions: vec![RateLimitAction::RemoteAddress {}],
        }],
    };
    assert_equivalence(rl("rl-a"), rl("rl-a"), rl("rl-b"));

    // The extensions themselves remain interchangeable.
    assert_eq!(
        extension("authz-a", ext_authz("kube_default_authz_9000")),
        extension("authz-b", ext_authz("kube_default_authz_9000")),
    );
}

#[test]
fn ext_auth_validation() {
    let ir = ExtAuthIr::Provider {
        provider: extension("proc", ext_proc("a")),
        per_route: ExtAuthzPerRoute {
            check_settings: CheckSettings::default(),
        },
    };
    assert!(matches!(
        ir.validate(),
        Err(ValidationError::Invalid {
            field: "extAuth.extensionRef",
            ..
        })
    ));
    assert_eq!(ExtAuthIr::DisableAll.validate(), Ok(()));
}

#[test]
fn local_rate_limit_equality() {
    let ir = |n| LocalRateLimitIr::token_bucket(n, None, Duration::from_secs(1));
    assert_equivalence(ir(10), ir(10), ir(11));
    assert_equivalence(
        LocalRateLimitIr::disabled(),
        LocalRateLimitIr::disabled(),
        ir(1),
    );
}

#[test]
fn local_rate_limit_validation() {
    let ir = LocalRateLimitIr::token_bucket(10, None, Duration::from_millis(49));
    assert!(matches!(
        ir.validate(),
        Err(ValidationError::Invalid { .. })
    ));

    let ir = LocalRateLimitIr::token_bucket(0, None, Duration::from_secs(1));
    assert!(matches!(
        ir.validate(),
        Err(ValidationError::OutOfRange { .. })
    ));

    assert_eq!(LocalRateLimitIr::disabled().validate(), Ok(()));
    assert_eq!(
        LocalRateLimitIr::token_bucket(1, Some(1), MIN_FILL_INTERVAL).validate(),
        Ok(())
    );
}

#[test]
fn global_rate_limit_equality() {
    let ir = |domain: &str| GlobalRateLimitIr {
        provider: extension("rl", rate_limit(domain)),
        descriptors: vec![RateLimitDescriptor {
            actions: vec![RateLimitAction::RemoteAddress {}],
        }],
    };
    assert_equivalence(ir("a"), ir("a"), ir("b"));
}

#[test]
fn global_rate_limit_validation() {
    let mut ir = GlobalRateLimitIr {
        provider: extension("rl", rate_limit("a")),
        descriptors: vec![],
    };
    assert_eq!(
        ir.validate(),
        Err(ValidationError::Missing("rateLimit.global.descriptors"))
    );

    ir.descriptors = vec![RateLimitDescriptor {
        actions: vec![RateLimitAction::GenericKey {
            descriptor_key: String::new(),
            descriptor_value: "v".to_string(),
        }],
    }];
    assert!(matches!(ir.validate(), Err(ValidationError::Missing(_))));
}

#[test]
fn cors_equality() {
    let ir = |origin: &str| CorsIr {
        policy: CorsPolicy {
            allow_origin_string_match: vec![StringMatcher::Exact(origin.to_string())],
            ..Default::default()
        },
    };
    assert_equivalence(
        ir("https://a.example"),
        ir("https://a.example"),
        ir("https://b.example"),
    );
}

#[test]
fn csrf_validation() {
    let ir = |pct| CsrfIr {
        policy: CsrfPolicy {
            filter_enabled: RuntimeFractionalPercent::percent(pct),
            shadow_enabled: None,
            additional_origins: vec![],
        },
    };
    assert_equivalence(ir(10), ir(10), ir(20));
    assert_eq!(ir(100).validate(), Ok(()));
    assert_eq!(
        ir(101).validate(),
        Err(ValidationError::OutOfRange {
            field: "csrf.percentageEnabled",
            value: 101,
            min: 0,
            max: 100,
        })
    );
}

#[test]
fn buffer_equality() {
    assert_equivalence(
        BufferIr {
            max_request_bytes: 1024,
        },
        BufferIr {
            max_request_bytes: 1024,
        },
        BufferIr {
            max_request_bytes: 2048,
        },
    );
}

#[test]
fn header_mutation_validation() {
    let ir = |name: &str| HeaderMutationIr {
        mutations: Mutations {
            request_mutations: vec![HeaderMutationRule::Append(HeaderValueOption::overwrite(
                name, "v",
            ))],
            response_mutations: vec![HeaderMutationRule::Remove("server".to_string())],
        },
    };
    assert_equivalence(ir("x-a"), ir("x-a"), ir("x-b"));
    assert_eq!(ir("x-a").validate(), Ok(()));
    assert!(ir("not valid").validate().is_err());
}

#[test]
fn hash_policy_validation() {
    let ir = |name: &str| HashPolicyIr {
        policies: vec![HashPolicy {
            policy: HashPolicySpecifier::Cookie {
                name: name.to_string(),
                ttl: None,
                path: None,
            },
            terminal: false,
        }],
    };
    assert_equivalence(ir("session"), ir("session"), ir("other"));
    assert_eq!(ir("session").validate(), Ok(()));
    assert_eq!(
        ir("").validate(),
        Err(ValidationError::Missing("hashPolicies.cookie.name"))
    );
    assert_eq!(
        HashPolicyIr::default().validate(),
        Err(ValidationError::Missing("hashPolicies"))
    );
}

#[test]
fn timeouts_validation() {
    let ir = |per_try: u64| TimeoutsIr {
        request: Some(Duration::from_secs(5)),
        stream_idle: None,
        retry: Some(RetryPolicy {
            retry_on: "5xx".to_string(),
            num_retries: 3,
            per_try_timeout: Some(Duration::from_secs(per_try)),
            retriable_status_codes: vec![503],
            retry_back_off: None,
        }),
    };
    assert_equivalence(ir(1), ir(1), ir(2));
    assert_eq!(ir(5).validate(), Ok(()));
    assert!(matches!(
        ir(6).validate(),
        Err(ValidationError::Invalid {
            field: "retry.perTryTimeout",
            ..
        })
    ));
}
