use super::{validate_matcher, SubIr};
use crate::{
    xds::{config::CorsPolicy, StringMatcher},
    Facet, ValidationError,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorsIr {
    pub policy: CorsPolicy,
}

impl SubIr for CorsIr {
    const FACET: Facet = Facet::Cors;

    fn validate(&self) -> Result<(), ValidationError> {
        for matcher in &self.policy.allow_origin_string_match {
            validate_matcher("cors.allowOrigins", matcher)?;
        }

        // Browsers refuse credentialed responses to a wildcard origin.
        let wildcard = self
            .policy
            .allow_origin_string_match
            .iter()
            .any(|m| *m == StringMatcher::Exact("*".to_string()));
        if wildcard && self.policy.allow_credentials == Some(true) {
            return Err(ValidationError::invalid(
                "cors.allowCredentials",
                "credentials may not be allowed for a wildcard origin",
            ));
        }
        Ok(())
    }
}
