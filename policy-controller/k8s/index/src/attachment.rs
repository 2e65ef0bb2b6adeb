use crate::{index::PolicyState, resource::ResourceId};
use gateway_policy_controller_core::{PolicyAttachment, PolicyRef, TargetRef};
use gateway_policy_controller_k8s_api::{
    target_ref::GroupKind, Labels, TrafficPolicy, POLICY_API_GROUP,
};
use std::cmp::Ordering;

/// An object that policies may attach to, at a given depth of the attachment
/// hierarchy (e.g. a gateway, one of its listeners, a route, a route rule).
#[derive(Clone, Debug)]
pub struct Target {
    pub group_kind: GroupKind,
    pub namespace: String,
    pub name: String,
    pub section_name: Option<String>,
    pub labels: Labels,
    pub hierarchical_priority: i32,
}

// === impl Target ===

impl Target {
    /// Policies may only target objects in their own namespace. A label
    /// selector selects whole objects, never their sections.
    pub(crate) fn is_targeted_by(&self, id: &ResourceId, policy: &PolicyState) -> bool {
        if id.namespace != self.namespace {
            return false;
        }
        let section = self.section_name.as_deref();
        policy
            .target_refs
            .iter()
            .any(|r| r.targets(&self.group_kind, &self.name, section))
            || (section.is_none()
                && policy
                    .target_selectors
                    .iter()
                    .any(|s| s.selects(&self.group_kind, &self.labels)))
    }

    pub(crate) fn attach(&self, id: &ResourceId, policy: &PolicyState) -> PolicyAttachment {
        PolicyAttachment {
            target: TargetRef {
                group: self.group_kind.group.clone(),
                kind: self.group_kind.kind.clone(),
                namespace: self.namespace.clone(),
                name: self.name.clone(),
                section_name: self.section_name.clone(),
            },
            policy_ref: PolicyRef {
                group: POLICY_API_GROUP.to_string(),
                kind: kind(),
                namespace: id.namespace.clone(),
                name: id.name.clone(),
            },
            hierarchical_priority: self.hierarchical_priority,
            inherited_priority: policy.inherited_priority,
            policy: policy.policy.clone(),
            errors: policy.errors.clone(),
        }
    }
}

fn kind() -> String {
    use gateway_policy_controller_k8s_api::Resource;
    TrafficPolicy::kind(&()).into_owned()
}

/// Orders policies attached at the same level: oldest first, then by
/// namespace and name. Policies without a creation time sort last.
pub(crate) fn by_age(a: (&ResourceId, &PolicyState), b: (&ResourceId, &PolicyState)) -> Ordering {
    let (a_id, a) = a;
    let (b_id, b) = b;
    let a_ts = a.policy.creation_timestamp;
    let b_ts = b.policy.creation_timestamp;
    (a_ts.is_none(), a_ts)
        .cmp(&(b_ts.is_none(), b_ts))
        .then_with(|| a_id.cmp(b_id))
}
