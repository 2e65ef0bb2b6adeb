use crate::labels::{Labels, Map};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// References an object in the policy's namespace, optionally narrowed to one
/// of its sections (e.g. a listener or a route rule).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocalPolicyTargetRef {
    pub group: String,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
}

/// Selects objects of a kind in the policy's namespace by label.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocalPolicyTargetSelector {
    pub group: String,
    pub kind: String,
    pub match_labels: Map,
}

/// Identifies a kind of object by group and kind.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupKind {
    pub group: String,
    pub kind: String,
}

// === impl LocalPolicyTargetRef ===

impl LocalPolicyTargetRef {
    pub fn group_kind(&self) -> GroupKind {
        GroupKind::new(&self.group, &self.kind)
    }

    /// Checks whether the reference targets the named object or, when
    /// `section` is set, one of its sections. A reference without a section
    /// targets the object as a whole and not each of its sections.
    pub fn targets(&self, gk: &GroupKind, name: &str, section: Option<&str>) -> bool {
        self.group_kind() == *gk && self.name == name && self.section_name.as_deref() == section
    }
}

// === impl LocalPolicyTargetSelector ===

impl LocalPolicyTargetSelector {
    pub fn group_kind(&self) -> GroupKind {
        GroupKind::new(&self.group, &self.kind)
    }

    pub fn selects(&self, gk: &GroupKind, labels: &Labels) -> bool {
        if self.group_kind() != *gk {
            return false;
        }
        labels.contains_all(&self.match_labels)
    }
}

// === impl GroupKind ===

impl GroupKind {
    /// The core API group may be written as either `""` or `"core"`.
    pub fn new(group: &str, kind: &str) -> Self {
        let group = if group == "core" { "" } else { group };
        Self {
            group: group.to_string(),
            kind: kind.to_string(),
        }
    }

    pub fn of<T>() -> Self
    where
        T: kube::Resource,
        T::DynamicType: Default,
    {
        let dt = Default::default();
        Self::new(&T::group(&dt), &T::kind(&dt))
    }
}

impl std::fmt::Display for GroupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.group.is_empty() {
            return f.write_str(&self.kind);
        }
        write!(f, "{}.{}", self.kind, self.group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::Service;

    fn route_gk() -> GroupKind {
        GroupKind::new("gateway.networking.k8s.io", "HTTPRoute")
    }

    #[test]
    fn targets_sections() {
        let whole = LocalPolicyTargetRef {
            group: "gateway.networking.k8s.io".to_string(),
            kind: "HTTPRoute".to_string(),
            name: "web".to_string(),
            section_name: None,
        };
        assert!(whole.targets(&route_gk(), "web", None));
        assert!(!whole.targets(&route_gk(), "web", Some("rule-1")));
        assert!(!whole.targets(&route_gk(), "api", None));

        let section = LocalPolicyTargetRef {
            section_name: Some("rule-1".to_string()),
            ..whole
        };
        assert!(section.targets(&route_gk(), "web", Some("rule-1")));
        assert!(!section.targets(&route_gk(), "web", Some("rule-2")));
        assert!(!section.targets(&route_gk(), "web", None));
    }

    #[test]
    fn core_group_aliases() {
        assert_eq!(GroupKind::of::<Service>(), GroupKind::new("core", "Service"));
        assert_eq!(GroupKind::of::<Service>().to_string(), "Service");
    }

    #[test]
    fn selects_by_labels() {
        let selector = LocalPolicyTargetSelector {
            group: "gateway.networking.k8s.io".to_string(),
            kind: "HTTPRoute".to_string(),
            match_labels: maplit::btreemap! { "app".to_string() => "web".to_string() },
        };
        assert!(selector.selects(&route_gk(), &Labels::from_iter(Some(("app", "web")))));
        assert!(!selector.selects(&route_gk(), &Labels::from_iter(Some(("app", "db")))));
        assert!(!selector.selects(
            &GroupKind::new("gateway.networking.k8s.io", "Gateway"),
            &Labels::from_iter(Some(("app", "web")))
        ));
    }
}
