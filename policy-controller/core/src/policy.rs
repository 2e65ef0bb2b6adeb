use crate::{
    facets::{
        AiIr, BufferIr, CorsIr, CsrfIr, ExtAuthIr, ExtProcIr, GlobalRateLimitIr, HashPolicyIr,
        HeaderMutationIr, HostRewriteIr, LocalRateLimitIr, SubIr, TimeoutsIr, TransformationIr,
    },
    merge::InheritedPriority,
    PolicyError, ValidationError,
};
use chrono::{offset::Utc, DateTime};
use std::{fmt, sync::Arc};

/// An independently configurable policy concern.
///
/// Variants are declared in construction order, which is also the order in
/// which facets are applied to a scope.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Facet {
    Ai,
    Transformation,
    HostRewrite,
    ExtProc,
    ExtAuth,
    LocalRateLimit,
    GlobalRateLimit,
    Cors,
    Csrf,
    Buffer,
    HeaderMutation,
    HashPolicy,
    Timeouts,
}

/// The constructed form of a single policy resource.
///
/// A facet is `None` when the policy does not configure it, which is distinct
/// from a facet that is configured but empty.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrafficPolicy {
    /// Used to order policies attached at the same scope.
    pub creation_timestamp: Option<DateTime<Utc>>,

    pub ai: Option<AiIr>,
    pub transformation: Option<TransformationIr>,
    pub host_rewrite: Option<HostRewriteIr>,
    pub ext_proc: Option<ExtProcIr>,
    pub ext_auth: Option<ExtAuthIr>,
    pub local_rate_limit: Option<LocalRateLimitIr>,
    pub global_rate_limit: Option<GlobalRateLimitIr>,
    pub cors: Option<CorsIr>,
    pub csrf: Option<CsrfIr>,
    pub buffer: Option<BufferIr>,
    pub header_mutation: Option<HeaderMutationIr>,
    pub hash_policy: Option<HashPolicyIr>,
    pub timeouts: Option<TimeoutsIr>,
}

/// Identifies the policy resource an attachment originates from.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PolicyRef {
    pub group: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

/// Identifies the object a policy is attached to.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetRef {
    pub group: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub section_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PolicyAttachment {
    pub target: TargetRef,
    pub policy_ref: PolicyRef,

    /// The depth of the target in the attachment hierarchy.
    pub hierarchical_priority: i32,
    pub inherited_priority: InheritedPriority,

    pub policy: Arc<TrafficPolicy>,

    /// Construction and validation errors for the policy.
    pub errors: Vec<PolicyError>,
}

// === impl Facet ===

impl Facet {
    pub const ALL: [Facet; 13] = [
        Facet::Ai,
        Facet::Transformation,
        Facet::HostRewrite,
        Facet::ExtProc,
        Facet::ExtAuth,
        Facet::LocalRateLimit,
        Facet::GlobalRateLimit,
        Facet::Cors,
        Facet::Csrf,
        Facet::Buffer,
        Facet::HeaderMutation,
        Facet::HashPolicy,
        Facet::Timeouts,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::Transformation => "transformation",
            Self::HostRewrite => "autoHostRewrite",
            Self::ExtProc => "extProc",
            Self::ExtAuth => "extAuth",
            Self::LocalRateLimit => "rateLimit.local",
            Self::GlobalRateLimit => "rateLimit.global",
            Self::Cors => "cors",
            Self::Csrf => "csrf",
            Self::Buffer => "buffer",
            Self::HeaderMutation => "headerModifiers",
            Self::HashPolicy => "hashPolicies",
            Self::Timeouts => "timeouts",
        }
    }
}

impl fmt::Display for Facet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// === impl TrafficPolicy ===

impl TrafficPolicy {
    pub fn is_set(&self, facet: Facet) -> bool {
        match facet {
            Facet::Ai => self.ai.is_some(),
            Facet::Transformation => self.transformation.is_some(),
            Facet::HostRewrite => self.host_rewrite.is_some(),
            Facet::ExtProc => self.ext_proc.is_some(),
            Facet::ExtAuth => self.ext_auth.is_some(),
            Facet::LocalRateLimit => self.local_rate_limit.is_some(),
            Facet::GlobalRateLimit => self.global_rate_limit.is_some(),
            Facet::Cors => self.cors.is_some(),
            Facet::Csrf => self.csrf.is_some(),
            Facet::Buffer => self.buffer.is_some(),
            Facet::HeaderMutation => self.header_mutation.is_some(),
            Facet::HashPolicy => self.hash_policy.is_some(),
            Facet::Timeouts => self.timeouts.is_some(),
        }
    }

    /// Iterates over the facets this policy configures, in construction order.
    pub fn configured(&self) -> impl Iterator<Item = Facet> + '_ {
        Facet::ALL.into_iter().filter(|f| self.is_set(*f))
    }

    pub fn is_empty(&self) -> bool {
        self.configured().next().is_none()
    }

    /// Validates a single facet. An unset facet is always valid.
    pub fn validate_facet(&self, facet: Facet) -> Result<(), ValidationError> {
        match facet {
            Facet::Ai => validate(&self.ai),
            Facet::Transformation => validate(&self.transformation),
            Facet::HostRewrite => validate(&self.host_rewrite),
            Facet::ExtProc => validate(&self.ext_proc),
            Facet::ExtAuth => validate(&self.ext_auth),
            Facet::LocalRateLimit => validate(&self.local_rate_limit),
            Facet::GlobalRateLimit => validate(&self.global_rate_limit),
            Facet::Cors => validate(&self.cors),
            Facet::Csrf => validate(&self.csrf),
            Facet::Buffer => validate(&self.buffer),
            Facet::HeaderMutation => validate(&self.header_mutation),
            Facet::HashPolicy => validate(&self.hash_policy),
            Facet::Timeouts => validate(&self.timeouts),
        }
    }

    /// Standard validation: fails on the first invalid facet.
    pub fn validate(&self) -> Result<(), PolicyError> {
        for facet in Facet::ALL {
            self.validate_facet(facet)
                .map_err(|e| PolicyError::validation(facet, e))?;
        }
        Ok(())
    }

    /// Returns an error for every invalid facet.
    pub fn validate_all(&self) -> Vec<PolicyError> {
        Facet::ALL
            .into_iter()
            .filter_map(|facet| {
                self.validate_facet(facet)
                    .err()
                    .map(|e| PolicyError::validation(facet, e))
            })
            .collect()
    }

    /// Drops every invalid facet, returning the errors that caused them to be
    /// dropped. Valid facets are left in place so that they still take effect.
    pub fn retain_valid(&mut self) -> Vec<PolicyError> {
        let errors = self.validate_all();
        for facet in errors.iter().filter_map(PolicyError::facet) {
            self.clear(facet);
        }
        errors
    }

    pub fn clear(&mut self, facet: Facet) {
        match facet {
            Facet::Ai => self.ai = None,
            Facet::Transformation => self.transformation = None,
            Facet::HostRewrite => self.host_rewrite = None,
            Facet::ExtProc => self.ext_proc = None,
            Facet::ExtAuth => self.ext_auth = None,
            Facet::LocalRateLimit => self.local_rate_limit = None,
            Facet::GlobalRateLimit => self.global_rate_limit = None,
            Facet::Cors => self.cors = None,
            Facet::Csrf => self.csrf = None,
            Facet::Buffer => self.buffer = None,
            Facet::HeaderMutation => self.header_mutation = None,
            Facet::HashPolicy => self.hash_policy = None,
            Facet::Timeouts => self.timeouts = None,
        }
    }
}

fn validate<T: SubIr>(ir: &Option<T>) -> Result<(), ValidationError> {
    ir.as_ref().map_or(Ok(()), SubIr::validate)
}

// === impl PolicyRef ===

impl fmt::Display for PolicyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

// === impl TargetRef ===

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)?;
        if let Some(section) = &self.section_name {
            write!(f, "#{section}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facets::{BufferIr, CorsIr, LocalRateLimitIr};
    use crate::xds::{config::CorsPolicy, StringMatcher};
    use std::time::Duration;

    fn invalid_cors() -> CorsIr {
        CorsIr {
            policy: CorsPolicy {
                allow_origin_string_match: vec![StringMatcher::SafeRegex {
                    regex: "(".to_string(),
                }],
                ..Default::default()
            },
        }
    }

    #[test]
    fn unset_facets_are_valid() {
        let policy = TrafficPolicy::default();
        assert!(policy.is_empty());
        assert_eq!(policy.validate(), Ok(()));
        assert!(policy.validate_all().is_empty());
    }

    #[test]
    fn validate_stops_at_first_invalid_facet() {
        let policy = TrafficPolicy {
            cors: Some(invalid_cors()),
            buffer: Some(BufferIr {
                max_request_bytes: 0,
            }),
            ..Default::default()
        };
        let err = policy.validate().expect_err("policy must be invalid");
        assert_eq!(err.facet(), Some(Facet::Cors));
        assert_eq!(policy.validate_all().len(), 2);
    }

    #[test]
    fn retain_valid_keeps_valid_facets() {
        let rl = LocalRateLimitIr::token_bucket(10, None, Duration::from_secs(1));
        let mut policy = TrafficPolicy {
            cors: Some(invalid_cors()),
            local_rate_limit: Some(rl.clone()),
            ..Default::default()
        };
        let errors = policy.retain_valid();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].facet(), Some(Facet::Cors));
        assert_eq!(policy.cors, None);
        assert_eq!(policy.local_rate_limit, Some(rl));
    }

    #[test]
    fn configured_facets_follow_construction_order() {
        let policy = TrafficPolicy {
            buffer: Some(BufferIr {
                max_request_bytes: 10,
            }),
            host_rewrite: Some(crate::facets::HostRewriteIr {
                auto_host_rewrite: true,
            }),
            ..Default::default()
        };
        assert_eq!(
            policy.configured().collect::<Vec<_>>(),
            vec![Facet::HostRewrite, Facet::Buffer]
        );
    }
}
