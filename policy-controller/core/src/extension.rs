//! Gateway extensions: externally-defined backends shared by many policies.

use crate::xds::{
    config::{ExtAuthz, ExtProc, RateLimit},
    filter::names,
    TypedConfig,
};
use std::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ExtensionKind {
    ExtAuth,
    ExtProc,
    RateLimit,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExtensionName {
    pub namespace: String,
    pub name: String,
}

/// The chain-level filter configuration for an extension's backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExtensionProvider {
    ExtAuth(ExtAuthz),
    ExtProc(ExtProc),
    RateLimit(RateLimit),
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ResolutionError(pub String);

/// A resolved gateway extension.
///
/// Extensions are resolved once, independently of the policies that reference
/// them. A failed resolution is retained so that referencing policies can
/// report it.
#[derive(Clone, Debug)]
pub struct GatewayExtensionIr {
    pub name: ExtensionName,
    pub kind: ExtensionKind,
    pub provider: Result<ExtensionProvider, ResolutionError>,
}

// === impl ExtensionKind ===

impl ExtensionKind {
    fn filter_prefix(&self) -> &'static str {
        match self {
            Self::ExtAuth => names::EXT_AUTHZ_PREFIX,
            Self::ExtProc => names::EXT_PROC_PREFIX,
            Self::RateLimit => names::RATELIMIT_PREFIX,
        }
    }
}

impl fmt::Display for ExtensionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExtAuth => f.write_str("ExtAuth"),
            Self::ExtProc => f.write_str("ExtProc"),
            Self::RateLimit => f.write_str("RateLimit"),
        }
    }
}

// === impl ExtensionName ===

impl fmt::Display for ExtensionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// === impl ExtensionProvider ===

impl ExtensionProvider {
    pub fn kind(&self) -> ExtensionKind {
        match self {
            Self::ExtAuth(_) => ExtensionKind::ExtAuth,
            Self::ExtProc(_) => ExtensionKind::ExtProc,
            Self::RateLimit(_) => ExtensionKind::RateLimit,
        }
    }

    pub fn typed_config(&self) -> TypedConfig {
        match self {
            Self::ExtAuth(c) => TypedConfig::ExtAuthz(c.clone()),
            Self::ExtProc(c) => TypedConfig::ExtProc(c.clone()),
            Self::RateLimit(c) => TypedConfig::RateLimit(c.clone()),
        }
    }
}

// === impl GatewayExtensionIr ===

impl GatewayExtensionIr {
    pub fn resolved(name: ExtensionName, provider: ExtensionProvider) -> Self {
        Self {
            name,
            kind: provider.kind(),
            provider: Ok(provider),
        }
    }

    pub fn failed(name: ExtensionName, kind: ExtensionKind, error: impl ToString) -> Self {
        Self {
            name,
            kind,
            provider: Err(ResolutionError(error.to_string())),
        }
    }

    /// The name of the filter that serves this extension in a filter chain.
    pub fn filter_name(&self) -> String {
        format!(
            "{}/{}/{}",
            self.kind.filter_prefix(),
            self.name.namespace,
            self.name.name
        )
    }

    /// Fails unless the extension resolved to the expected kind.
    pub fn require(&self, kind: ExtensionKind) -> Result<&ExtensionProvider, ResolutionError> {
        if self.kind != kind {
            return Err(ResolutionError(format!(
                "extension has type {}, expected {kind}",
                self.kind
            )));
        }
        self.provider.as_ref().map_err(Clone::clone)
    }
}

/// Extensions are compared by what they produce: two extensions with
/// different names but identical backends are interchangeable.
impl PartialEq for GatewayExtensionIr {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.provider == other.provider
    }
}

impl Eq for GatewayExtensionIr {}
