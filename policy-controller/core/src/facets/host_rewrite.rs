use super::SubIr;
use crate::{Facet, ValidationError};

/// Rewrites the host header to the upstream's hostname.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostRewriteIr {
    pub auto_host_rewrite: bool,
}

impl SubIr for HostRewriteIr {
    const FACET: Facet = Facet::HostRewrite;

    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}
