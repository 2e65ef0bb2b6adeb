use super::{validate_header_name, SubIr};
use crate::{
    xds::route::{HashPolicy, HashPolicySpecifier},
    Facet, ValidationError,
};

/// Hash policies used for consistent-hash load balancing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HashPolicyIr {
    pub policies: Vec<HashPolicy>,
}

impl SubIr for HashPolicyIr {
    const FACET: Facet = Facet::HashPolicy;

    fn validate(&self) -> Result<(), ValidationError> {
        if self.policies.is_empty() {
            return Err(ValidationError::Missing("hashPolicies"));
        }
        for policy in &self.policies {
            match &policy.policy {
                HashPolicySpecifier::Header { header_name } => {
                    validate_header_name("hashPolicies.header.name", header_name)?
                }
                HashPolicySpecifier::Cookie { name, .. } if name.is_empty() => {
                    return Err(ValidationError::Missing("hashPolicies.cookie.name"))
                }
                HashPolicySpecifier::Cookie { .. } => {}
                HashPolicySpecifier::ConnectionProperties { source_ip } => {
                    if !source_ip {
                        return Err(ValidationError::invalid(
                            "hashPolicies.sourceIP",
                            "must hash on the source address when set",
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}
