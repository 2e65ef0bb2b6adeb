//! Projects effective policies onto data plane configuration.
//!
//! A [`TranslationPass`] applies policies to routes, virtual hosts and route
//! configurations, remembering which filters each filter chain must contain
//! for those per-scope overrides to take effect. Once every scope has been
//! translated, the pass is consumed to build the filter chains.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod handlers;
mod pass;
mod scope;
pub mod validate;


pub use self::{
    pass::{TranslationPass, AI_EXT_PROC_CLUSTER, DISABLE_EXT_AUTH_KEY, DISABLE_EXT_AUTH_NAMESPACE},
    scope::Scope,
    validate::{ProcessValidator, ValidateError, ValidationMode, ValidationState, Validator},
};
