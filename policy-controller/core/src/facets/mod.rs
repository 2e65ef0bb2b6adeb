//! Constructed, wire-ready representations of each policy facet.
//!
//! Every type compares by the configuration it produces and validates itself
//! without consulting any other facet.

mod ai;
mod buffer;
mod cors;
mod csrf;
mod ext_auth;
mod ext_proc;
mod global_rate_limit;
mod hash_policy;
mod header_mutation;
mod host_rewrite;
mod local_rate_limit;
mod timeouts;
mod transformation;

pub use self::{
    ai::{
        config_hash, AiIr, AiProvider, AiRoute, AiRouteType, BuiltinRegex, FieldDefault,
        GuardAction, GuardRequest, GuardResponse, Message, PromptEnrichment, PromptGuard,
        RegexGuard, Webhook,
    },
    buffer::BufferIr,
    cors::CorsIr,
    csrf::CsrfIr,
    ext_auth::ExtAuthIr,
    ext_proc::ExtProcIr,
    global_rate_limit::GlobalRateLimitIr,
    hash_policy::HashPolicyIr,
    header_mutation::HeaderMutationIr,
    host_rewrite::HostRewriteIr,
    local_rate_limit::{LocalRateLimitIr, MIN_FILL_INTERVAL},
    timeouts::TimeoutsIr,
    transformation::TransformationIr,
};

use crate::{
    xds::{matcher::RuntimeFractionalPercent, StringMatcher},
    ExtensionKind, Facet, GatewayExtensionIr, ValidationError,
};

/// The contract shared by every facet's constructed representation.
pub trait SubIr: Clone + std::fmt::Debug + PartialEq {
    const FACET: Facet;

    /// Checks local well-formedness.
    fn validate(&self) -> Result<(), ValidationError>;
}

fn validate_header_name(field: &'static str, name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::Missing(field));
    }
    http::HeaderName::from_bytes(name.as_bytes())
        .map(|_| ())
        .map_err(|e| ValidationError::invalid(field, format!("{name:?}: {e}")))
}

fn validate_regex(field: &'static str, pattern: &str) -> Result<(), ValidationError> {
    regex::Regex::new(pattern)
        .map(|_| ())
        .map_err(|e| ValidationError::invalid(field, e))
}

fn validate_matcher(field: &'static str, matcher: &StringMatcher) -> Result<(), ValidationError> {
    match matcher.regex() {
        Some(regex) => validate_regex(field, regex),
        None => Ok(()),
    }
}

fn validate_percent(
    field: &'static str,
    percent: &RuntimeFractionalPercent,
) -> Result<(), ValidationError> {
    let n = percent.default_value.numerator;
    if n > 100 {
        return Err(ValidationError::out_of_range(field, n, 0, 100));
    }
    Ok(())
}

fn validate_provider(
    field: &'static str,
    provider: &GatewayExtensionIr,
    kind: ExtensionKind,
) -> Result<(), ValidationError> {
    if provider.kind != kind {
        return Err(ValidationError::invalid(
            field,
            format!(
                "extension {} has type {}, expected {kind}",
                provider.name, provider.kind
            ),
        ));
    }
    Ok(())
}

/// Compares the extensions referenced by two facets.
///
/// The extension's name keys the filter that serves it, so facets that
/// reference identical backends under different names are distinct.
fn same_provider(a: &GatewayExtensionIr, b: &GatewayExtensionIr) -> bool {
    a.name == b.name && a == b
}

#[cfg(test)]
mod tests;
