use crate::{
    accepted, make_patch, Controller, ControllerMetrics, Retry, StatusPatcher, ACCEPTED,
    REASON_ACCEPTED, REASON_INVALID,
};
use async_trait::async_trait;
use gateway_policy_controller_core::{Facet, PolicyError};
use gateway_policy_controller_k8s_api as k8s;
use gateway_policy_controller_k8s_index::{ResourceId, StatusKind, StatusUpdate};
use parking_lot::Mutex;
use prometheus_client::registry::Registry;
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;

/// Fails the first `failures` patches, then records the rest.
#[derive(Clone, Default)]
struct FakePatcher {
    failures: Arc<Mutex<u32>>,
    attempts: Arc<Mutex<u32>>,
    patched: Arc<Mutex<Vec<(StatusKind, ResourceId, serde_json::Value)>>>,
}

#[async_trait]
impl StatusPatcher for FakePatcher {
    async fn patch(
        &self,
        kind: StatusKind,
        id: &ResourceId,
        patch: &k8s::Patch<serde_json::Value>,
    ) -> anyhow::Result<()> {
        *self.attempts.lock() += 1;
        {
            let mut failures = self.failures.lock();
            if *failures > 0 {
                *failures -= 1;
                anyhow::bail!("the object has been modified");
            }
        }
        let k8s::Patch::Merge(value) = patch else {
            anyhow::bail!("unexpected patch type");
        };
        self.patched.lock().push((kind, id.clone(), value.clone()));
        Ok(())
    }
}

fn at(secs: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp(secs, 0).expect("valid timestamp")
}

fn buffer_error() -> PolicyError {
    PolicyError::Construction {
        facet: Facet::Buffer,
        message: "maxRequestSize must be positive".to_string(),
    }
}

fn policy_update(name: &str, errors: Vec<PolicyError>) -> StatusUpdate {
    StatusUpdate {
        kind: StatusKind::TrafficPolicy,
        id: ResourceId::new("apps", name),
        generation: Some(3),
        errors,
    }
}

fn retry(retries: u32) -> Retry {
    Retry {
        retries,
        backoff: Duration::from_millis(100),
    }
}

async fn run(patcher: FakePatcher, retries: u32, updates: Vec<StatusUpdate>) -> ControllerMetrics {
    let _tracing = tracing::subscriber::set_default(
        tracing_subscriber::fmt().with_test_writer().finish(),
    );
    let (tx, rx) = mpsc::unbounded_channel();
    for update in updates {
        tx.send(update).expect("receiver must be open");
    }
    drop(tx);

    let metrics = ControllerMetrics::register(&mut Registry::default());
    Controller::new(patcher, rx, retry(retries), metrics.clone())
        .process_updates()
        .await;
    metrics
}

#[test]
fn accepted_without_errors() {
    let condition = accepted(&[], Some(2), at(10));
    assert_eq!(condition.type_, ACCEPTED);
    assert_eq!(condition.status, "True");
    assert_eq!(condition.reason, REASON_ACCEPTED);
    assert_eq!(condition.observed_generation, Some(2));
    assert_eq!(condition.last_transition_time, k8s::Time(at(10)));
}

#[test]
fn every_error_is_reported() {
    let errors = vec![
        buffer_error(),
        PolicyError::Rejected("unknown field".to_string()),
    ];
    let condition = accepted(&errors, None, at(10));
    assert_eq!(condition.status, "False");
    assert_eq!(condition.reason, REASON_INVALID);
    assert_eq!(
        condition.message,
        "failed to build buffer: maxRequestSize must be positive; \
         rejected by data plane validator: unknown field"
    );
}

#[test]
fn patches_replace_the_conditions() {
    let patch = make_patch(StatusKind::GatewayExtension, accepted(&[], None, at(0)));
    let k8s::Patch::Merge(value) = patch else {
        panic!("expected a merge patch");
    };
    assert_eq!(value["apiVersion"], "policy.gateway.dev/v1alpha1");
    assert_eq!(value["kind"], "GatewayExtension");
    let conditions = value["status"]["conditions"]
        .as_array()
        .expect("conditions must be a list");
    assert_eq!(conditions.len(), 1);
    assert_eq!(conditions[0]["type"], ACCEPTED);
    assert_eq!(conditions[0]["status"], "True");
}

#[tokio::test(start_paused = true)]
async fn updates_are_patched_in_order() {
    let patcher = FakePatcher::default();
    let metrics = run(
        patcher.clone(),
        3,
        vec![
            policy_update("first", vec![]),
            policy_update("second", vec![buffer_error()]),
        ],
    )
    .await;

    let patched = patcher.patched.lock();
    let names = patched
        .iter()
        .map(|(_, id, _)| id.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, ["first", "second"]);
    assert_eq!(patched[0].2["status"]["conditions"][0]["status"], "True");
    assert_eq!(patched[1].2["status"]["conditions"][0]["status"], "False");
    assert_eq!(patched[1].2["status"]["conditions"][0]["observedGeneration"], 3);
    assert_eq!(metrics.counts(StatusKind::TrafficPolicy), (2, 0, 0));
}

#[tokio::test(start_paused = true)]
async fn conflicts_are_retried_with_backoff() {
    let patcher = FakePatcher {
        failures: Arc::new(Mutex::new(2)),
        ..FakePatcher::default()
    };
    let start = tokio::time::Instant::now();
    let metrics = run(patcher.clone(), 3, vec![policy_update("web", vec![])]).await;

    assert_eq!(*patcher.attempts.lock(), 3);
    assert_eq!(patcher.patched.lock().len(), 1);
    // Two retries wait 100ms and then 200ms.
    assert!(start.elapsed() >= Duration::from_millis(300));
    assert_eq!(metrics.counts(StatusKind::TrafficPolicy), (1, 0, 2));
}

#[tokio::test(start_paused = true)]
async fn retries_are_bounded() {
    let patcher = FakePatcher {
        failures: Arc::new(Mutex::new(u32::MAX)),
        ..FakePatcher::default()
    };
    let metrics = run(
        patcher.clone(),
        2,
        vec![
            policy_update("web", vec![]),
            StatusUpdate {
                kind: StatusKind::GatewayExtension,
                id: ResourceId::new("apps", "authz"),
                generation: None,
                errors: vec![],
            },
        ],
    )
    .await;

    // Each update is attempted once and then retried twice. A failed update
    // does not prevent the next one from being attempted.
    assert_eq!(*patcher.attempts.lock(), 6);
    assert!(patcher.patched.lock().is_empty());
    assert_eq!(metrics.counts(StatusKind::TrafficPolicy), (0, 1, 2));
    assert_eq!(metrics.counts(StatusKind::GatewayExtension), (0, 1, 2));
}
