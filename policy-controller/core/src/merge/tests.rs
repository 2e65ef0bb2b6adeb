use super::*;
use crate::{
    facets::{BufferIr, CorsIr, HostRewriteIr, LocalRateLimitIr, TransformationIr},
    xds::{
        config::{CorsPolicy, RouteTransformation, Transformation},
        StringMatcher,
    },
    PolicyAttachment, TargetRef, ValidationError,
};
use maplit::btreemap;
use std::{sync::Arc, time::Duration};

fn policy_ref(name: &str) -> PolicyRef {
    PolicyRef {
        group: "policy.gateway.dev".to_string(),
        kind: "TrafficPolicy".to_string(),
        namespace: "default".to_string(),
        name: name.to_string(),
    }
}

fn attachment(name: &str, depth: i32, policy: TrafficPolicy) -> PolicyAttachment {
    PolicyAttachment {
        target: TargetRef {
            group: "gateway.networking.k8s.io".to_string(),
            kind: "HTTPRoute".to_string(),
            namespace: "default".to_string(),
            name: "route".to_string(),
            section_name: None,
        },
        policy_ref: policy_ref(name),
        hierarchical_priority: depth,
        inherited_priority: InheritedPriority::default(),
        policy: Arc::new(policy),
        errors: vec![],
    }
}

fn with_priority(mut attachment: PolicyAttachment, p: InheritedPriority) -> PolicyAttachment {
    attachment.inherited_priority = p;
    attachment
}

fn buffer(bytes: u32) -> TrafficPolicy {
    TrafficPolicy {
        buffer: Some(BufferIr {
            max_request_bytes: bytes,
        }),
        ..Default::default()
    }
}

fn transformation(header: &str) -> TransformationIr {
    TransformationIr {
        transformations: vec![RouteTransformation {
            request: Some(Transformation {
                headers: btreemap! { header.to_string() => "v".to_string() },
                ..Default::default()
            }),
            response: None,
        }],
    }
}

fn transforming(header: &str) -> TrafficPolicy {
    TrafficPolicy {
        transformation: Some(transformation(header)),
        ..Default::default()
    }
}

fn headers(policy: &TrafficPolicy) -> Vec<String> {
    policy
        .transformation
        .iter()
        .flat_map(|t| &t.transformations)
        .flat_map(|t| t.request.iter())
        .flat_map(|t| t.headers.keys().cloned())
        .collect()
}

#[test]
fn merge_is_deterministic() {
    let attachments = vec![
        attachment("a", 1, buffer(10)),
        attachment("b", 1, transforming("x-b")),
        attachment("c", 0, buffer(20)),
    ];
    let first = merge(&attachments, MergeOptions::default());
    let second = merge(&attachments, MergeOptions::default());
    assert_eq!(first, second);
    assert_eq!(first.origins, second.origins);
}

#[test]
fn augmented_shallow_fills_gaps_only() {
    let p1 = attachment("p1", 0, buffer(10));
    let mut p2 = buffer(20);
    p2.host_rewrite = Some(HostRewriteIr {
        auto_host_rewrite: true,
    });
    let p2 = attachment("p2", 0, p2);

    let merged = merge_with_strategy([&p1, &p2], MergeStrategy::AugmentedShallow);
    assert_eq!(merged.policy.buffer, p1.policy.buffer);
    assert_eq!(merged.policy.host_rewrite, p2.policy.host_rewrite);
    assert_eq!(
        merged.origins.get(Facet::Buffer),
        Some(&Origin::One(policy_ref("p1")))
    );
    assert_eq!(
        merged.origins.get(Facet::HostRewrite),
        Some(&Origin::One(policy_ref("p2")))
    );
}

#[test]
fn overridable_shallow_takes_latest_value() {
    let p1 = attachment("p1", 0, buffer(10));
    let p2 = attachment("p2", 0, buffer(20));
    let p3 = attachment("p3", 0, TrafficPolicy::default());

    let merged = merge_with_strategy([&p1, &p2, &p3], MergeStrategy::OverridableShallow);
    assert_eq!(merged.policy.buffer, p2.policy.buffer);
    assert_eq!(
        merged.origins.get(Facet::Buffer),
        Some(&Origin::One(policy_ref("p2")))
    );
}

#[test]
fn deep_strategies_concatenate_transformations() {
    let p1 = attachment("p1", 0, transforming("x-p1"));
    let p2 = attachment("p2", 0, transforming("x-p2"));

    let augmented = merge_with_strategy([&p1, &p2], MergeStrategy::AugmentedDeep);
    assert_eq!(headers(&augmented.policy), vec!["x-p1", "x-p2"]);
    assert_eq!(
        augmented.origins.get(Facet::Transformation),
        Some(&Origin::Many(vec![policy_ref("p1"), policy_ref("p2")]))
    );

    let overridable = merge_with_strategy([&p1, &p2], MergeStrategy::OverridableDeep);
    assert_eq!(headers(&overridable.policy), vec!["x-p2", "x-p1"]);
    assert_eq!(
        overridable.origins.get(Facet::Transformation),
        Some(&Origin::Many(vec![policy_ref("p2"), policy_ref("p1")]))
    );
}

#[test]
fn deep_strategies_degrade_for_other_facets() {
    let p1 = attachment("p1", 0, buffer(10));
    let p2 = attachment("p2", 0, buffer(20));

    let augmented = merge_with_strategy([&p1, &p2], MergeStrategy::AugmentedDeep);
    assert_eq!(augmented.policy.buffer, p1.policy.buffer);

    let overridable = merge_with_strategy([&p1, &p2], MergeStrategy::OverridableDeep);
    assert_eq!(overridable.policy.buffer, p2.policy.buffer);
}

#[test]
fn shallow_strategies_do_not_concatenate() {
    let p1 = attachment("p1", 0, transforming("x-p1"));
    let p2 = attachment("p2", 0, transforming("x-p2"));

    let merged = merge_with_strategy([&p1, &p2], MergeStrategy::AugmentedShallow);
    assert_eq!(headers(&merged.policy), vec!["x-p1"]);
}

#[test]
fn errors_are_kept_for_policies_that_lost() {
    let cors_error = PolicyError::validation(Facet::Cors, ValidationError::Missing("cors"));
    let mut p2 = attachment("p2", 0, buffer(20));
    p2.errors.push(cors_error.clone());

    let merged = merge(
        &[attachment("p1", 0, buffer(10)), p2],
        MergeOptions::default(),
    );
    assert_eq!(merged.policy.buffer, buffer(10).buffer);
    assert_eq!(merged.errors, vec![cors_error]);
    assert!(!merged.is_accepted());
}

#[test]
fn deeper_levels_win_by_default() {
    // The route-level attachment is deeper than the gateway-level one.
    let gateway = attachment("gateway", 0, buffer(10));
    let route = attachment("route", 1, buffer(20));

    let merged = merge(&[gateway, route], MergeOptions::default());
    assert_eq!(merged.policy.buffer, buffer(20).buffer);
    assert_eq!(
        merged.origins.get(Facet::Buffer),
        Some(&Origin::One(policy_ref("route")))
    );
}

#[test]
fn parent_may_override_children() {
    let gateway = with_priority(
        attachment("gateway", 0, buffer(10)),
        InheritedPriority::ShallowMergePreferParent,
    );
    let route = attachment("route", 1, buffer(20));

    let merged = merge(&[route, gateway], MergeOptions::default());
    assert_eq!(merged.policy.buffer, buffer(10).buffer);
}

#[test]
fn parent_may_prepend_entries() {
    let gateway = with_priority(
        attachment("gateway", 0, transforming("x-gateway")),
        InheritedPriority::DeepMergePreferParent,
    );
    let route = attachment("route", 1, transforming("x-route"));
    let merged = merge(&[gateway.clone(), route.clone()], MergeOptions::default());
    assert_eq!(headers(&merged.policy), vec!["x-gateway", "x-route"]);

    let gateway = with_priority(gateway, InheritedPriority::DeepMergePreferChild);
    let merged = merge(&[gateway, route], MergeOptions::default());
    assert_eq!(headers(&merged.policy), vec!["x-route", "x-gateway"]);
}

#[test]
fn hierarchy_direction_is_configurable() {
    let a = attachment("a", 0, buffer(10));
    let b = attachment("b", 1, buffer(20));

    let merged = merge(
        &[a.clone(), b.clone()],
        MergeOptions {
            direction: HierarchyDirection::LowerIsDeeper,
        },
    );
    assert_eq!(merged.policy.buffer, a.policy.buffer);

    let merged = merge(
        &[a, b.clone()],
        MergeOptions {
            direction: HierarchyDirection::HigherIsDeeper,
        },
    );
    assert_eq!(merged.policy.buffer, b.policy.buffer);
}

#[test]
fn same_level_attachments_merge_in_order() {
    // Even if the first attachment asks to be overridden, attachments at the
    // same level never override each other.
    let first = with_priority(
        attachment("first", 1, buffer(10)),
        InheritedPriority::ShallowMergePreferParent,
    );
    let second = with_priority(
        attachment("second", 1, buffer(20)),
        InheritedPriority::ShallowMergePreferParent,
    );
    let merged = merge(&[first, second], MergeOptions::default());
    assert_eq!(merged.policy.buffer, buffer(10).buffer);
}

#[test]
fn level_provenance_is_carried_through() {
    let route_a = attachment("route-a", 1, transforming("x-a"));
    let route_b = attachment("route-b", 1, buffer(1));
    let gateway = with_priority(
        attachment("gateway", 0, transforming("x-gateway")),
        InheritedPriority::DeepMergePreferChild,
    );
    let merged = merge(&[route_a, route_b, gateway], MergeOptions::default());
    assert_eq!(
        merged.origins.get(Facet::Transformation),
        Some(&Origin::Many(vec![
            policy_ref("route-a"),
            policy_ref("gateway")
        ]))
    );
    assert_eq!(
        merged.origins.get(Facet::Buffer),
        Some(&Origin::One(policy_ref("route-b")))
    );
}

#[test]
fn invalid_cors_does_not_affect_rate_limit() {
    let rl = LocalRateLimitIr::token_bucket(10, None, Duration::from_secs(1));
    let mut policy = TrafficPolicy {
        cors: Some(CorsIr {
            policy: CorsPolicy {
                allow_origin_string_match: vec![StringMatcher::SafeRegex {
                    regex: "(".to_string(),
                }],
                ..Default::default()
            },
        }),
        local_rate_limit: Some(rl.clone()),
        ..Default::default()
    };
    let errors = policy.retain_valid();
    let mut attached = attachment("p", 0, policy);
    attached.errors = errors;

    let merged = merge(&[attached], MergeOptions::default());
    assert_eq!(merged.policy.local_rate_limit, Some(rl));
    assert_eq!(merged.policy.cors, None);
    assert_eq!(merged.errors.len(), 1);
    assert_eq!(merged.errors[0].facet(), Some(Facet::Cors));
}

#[test]
fn local_rate_limit_survives_sibling_without_one() {
    let rl = LocalRateLimitIr::token_bucket(10, None, Duration::from_secs(1));
    let p1 = attachment(
        "p1",
        1,
        TrafficPolicy {
            local_rate_limit: Some(rl.clone()),
            ..Default::default()
        },
    );
    let sibling = attachment("sibling", 0, TrafficPolicy::default());

    let merged = merge(&[p1, sibling.clone()], MergeOptions::default());
    assert_eq!(merged.policy.local_rate_limit, Some(rl));
    assert_eq!(sibling.policy.local_rate_limit, None);
}

#[test]
fn inherited_priority_parses() {
    for p in [
        InheritedPriority::ShallowMergePreferChild,
        InheritedPriority::ShallowMergePreferParent,
        InheritedPriority::DeepMergePreferChild,
        InheritedPriority::DeepMergePreferParent,
    ] {
        assert_eq!(p.as_str().parse::<InheritedPriority>().unwrap(), p);
    }
    assert!("PreferNobody".parse::<InheritedPriority>().is_err());
}
