use super::{validate_matcher, validate_percent, SubIr};
use crate::{xds::config::CsrfPolicy, Facet, ValidationError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CsrfIr {
    pub policy: CsrfPolicy,
}

impl SubIr for CsrfIr {
    const FACET: Facet = Facet::Csrf;

    fn validate(&self) -> Result<(), ValidationError> {
        validate_percent("csrf.percentageEnabled", &self.policy.filter_enabled)?;
        if let Some(shadow) = &self.policy.shadow_enabled {
            validate_percent("csrf.percentageShadowed", shadow)?;
        }
        for origin in &self.policy.additional_origins {
            validate_matcher("csrf.additionalOrigins", origin)?;
        }
        Ok(())
    }
}
