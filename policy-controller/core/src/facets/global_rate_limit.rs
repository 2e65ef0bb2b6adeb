use super::{same_provider, validate_header_name, validate_provider, SubIr};
use crate::{
    xds::{RateLimitAction, RateLimitDescriptor},
    ExtensionKind, Facet, GatewayExtensionIr, ValidationError,
};
use std::sync::Arc;

/// Rate limits requests through a shared rate limit service.
///
/// Only the descriptors are scoped to the route; the service itself is
/// configured once per chain.
#[derive(Clone, Debug)]
pub struct GlobalRateLimitIr {
    pub provider: Arc<GatewayExtensionIr>,
    pub descriptors: Vec<RateLimitDescriptor>,
}

impl PartialEq for GlobalRateLimitIr {
    fn eq(&self, other: &Self) -> bool {
        same_provider(&self.provider, &other.provider) && self.descriptors == other.descriptors
    }
}

impl Eq for GlobalRateLimitIr {}

impl SubIr for GlobalRateLimitIr {
    const FACET: Facet = Facet::GlobalRateLimit;

    fn validate(&self) -> Result<(), ValidationError> {
        validate_provider(
            "rateLimit.global.extensionRef",
            &self.provider,
            ExtensionKind::RateLimit,
        )?;
        if self.descriptors.is_empty() {
            return Err(ValidationError::Missing("rateLimit.global.descriptors"));
        }
        for descriptor in &self.descriptors {
            if descriptor.actions.is_empty() {
                return Err(ValidationError::Missing(
                    "rateLimit.global.descriptors.entries",
                ));
            }
            for action in &descriptor.actions {
                match action {
                    RateLimitAction::RemoteAddress {} => {}
                    RateLimitAction::GenericKey { descriptor_key, .. } => {
                        if descriptor_key.is_empty() {
                            return Err(ValidationError::Missing(
                                "rateLimit.global.descriptors.entries.generic.key",
                            ));
                        }
                    }
                    RateLimitAction::RequestHeaders {
                        header_name,
                        descriptor_key,
                    } => {
                        // Pseudo-headers such as `:path` are valid descriptor sources.
                        let name = header_name.strip_prefix(':').unwrap_or(header_name);
                        validate_header_name("rateLimit.global.descriptors.entries.header", name)?;
                        if descriptor_key.is_empty() {
                            return Err(ValidationError::Missing(
                                "rateLimit.global.descriptors.entries.header.key",
                            ));
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
