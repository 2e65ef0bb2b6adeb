use super::{same_provider, validate_provider, SubIr};
use crate::{xds::config::ExtProcPerRoute, ExtensionKind, Facet, GatewayExtensionIr, ValidationError};
use std::sync::Arc;

/// Sends requests through an external processing extension.
#[derive(Clone, Debug)]
pub struct ExtProcIr {
    pub provider: Arc<GatewayExtensionIr>,

    /// Overrides applied to the shared provider filter for this scope.
    pub per_route: ExtProcPerRoute,
}

impl PartialEq for ExtProcIr {
    fn eq(&self, other: &Self) -> bool {
        same_provider(&self.provider, &other.provider) && self.per_route == other.per_route
    }
}

impl Eq for ExtProcIr {}

impl SubIr for ExtProcIr {
    const FACET: Facet = Facet::ExtProc;

    fn validate(&self) -> Result<(), ValidationError> {
        validate_provider("extProc.extensionRef", &self.provider, ExtensionKind::ExtProc)
    }
}
