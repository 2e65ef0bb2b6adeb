use chrono::{DateTime, Utc};
use gateway_policy_controller_core::PolicyError;
use gateway_policy_controller_k8s_api::{self as k8s, POLICY_API_GROUP};
use gateway_policy_controller_k8s_index::StatusKind;

pub const ACCEPTED: &str = "Accepted";
pub const REASON_ACCEPTED: &str = "Accepted";
pub const REASON_INVALID: &str = "Invalid";

const POLICY_API_VERSION: &str = "v1alpha1";

/// Builds the `Accepted` condition for a resource with the given errors.
///
/// Every error is reported in the message, in the order it was found.
pub fn accepted(
    errors: &[PolicyError],
    generation: Option<i64>,
    now: DateTime<Utc>,
) -> k8s::Condition {
    let (status, reason, message) = if errors.is_empty() {
        ("True", REASON_ACCEPTED, "Policy accepted".to_string())
    } else {
        let message = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        ("False", REASON_INVALID, message)
    };
    k8s::Condition {
        last_transition_time: k8s::Time(now),
        message,
        observed_generation: generation,
        reason: reason.to_string(),
        status: status.to_string(),
        type_: ACCEPTED.to_string(),
    }
}

pub fn make_patch(kind: StatusKind, condition: k8s::Condition) -> k8s::Patch<serde_json::Value> {
    let value = serde_json::json!({
        "apiVersion": format!("{POLICY_API_GROUP}/{POLICY_API_VERSION}"),
        "kind": kind.to_string(),
        "status": {
            "conditions": [condition],
        },
    });
    k8s::Patch::Merge(value)
}
