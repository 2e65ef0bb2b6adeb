use super::{same_provider, validate_provider, SubIr};
use crate::{
    xds::config::ExtAuthzPerRoute, ExtensionKind, Facet, GatewayExtensionIr, ValidationError,
};
use std::sync::Arc;

#[derive(Clone, Debug)]
pub enum ExtAuthIr {
    /// Authorizes requests with an external authorization extension.
    Provider {
        provider: Arc<GatewayExtensionIr>,
        per_route: ExtAuthzPerRoute,
    },

    /// Skips every external authorization filter in the chain.
    DisableAll,
}

impl PartialEq for ExtAuthIr {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Provider {
                    provider: a,
                    per_route: a_route,
                },
                Self::Provider {
                    provider: b,
                    per_route: b_route,
                },
            ) => same_provider(a, b) && a_route == b_route,
            (Self::DisableAll, Self::DisableAll) => true,
            _ => false,
        }
    }
}

impl Eq for ExtAuthIr {}

impl SubIr for ExtAuthIr {
    const FACET: Facet = Facet::ExtAuth;

    fn validate(&self) -> Result<(), ValidationError> {
        let Self::Provider {
            provider,
            per_route,
        } = self
        else {
            return Ok(());
        };
        validate_provider("extAuth.extensionRef", provider, ExtensionKind::ExtAuth)?;
        if let Some(body) = &per_route.check_settings.with_request_body {
            if body.max_request_bytes == 0 {
                return Err(ValidationError::out_of_range(
                    "extAuth.withRequestBody.maxRequestBytes",
                    0u32,
                    1u32,
                    u32::MAX,
                ));
            }
        }
        Ok(())
    }
}
