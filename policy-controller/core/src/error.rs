use crate::{extension::ExtensionName, Facet};

/// A locally-detected problem with a constructed facet.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field} must be between {min} and {max}; got {value}")]
    OutOfRange {
        field: &'static str,
        value: i128,
        min: i128,
        max: i128,
    },

    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// An error attached to a policy and reported through its status.
///
/// Errors are cloneable so that the same list can be carried by a policy's
/// attachments, its merged record and its status update.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("failed to build {facet}: {message}")]
    Construction { facet: Facet, message: String },

    #[error("invalid {facet}: {source}")]
    Validation {
        facet: Facet,
        #[source]
        source: ValidationError,
    },

    #[error("gateway extension {extension}: {message}")]
    Resolution {
        extension: ExtensionName,
        message: String,
    },

    #[error("rejected by data plane validator: {0}")]
    Rejected(String),

    /// A policy-wide setting carried in an annotation could not be parsed.
    #[error("invalid {annotation} annotation: {message}")]
    Annotation {
        annotation: &'static str,
        message: String,
    },
}

// === impl ValidationError ===

impl ValidationError {
    pub(crate) fn out_of_range(
        field: &'static str,
        value: impl Into<i128>,
        min: impl Into<i128>,
        max: impl Into<i128>,
    ) -> Self {
        Self::OutOfRange {
            field,
            value: value.into(),
            min: min.into(),
            max: max.into(),
        }
    }

    pub(crate) fn invalid(field: &'static str, reason: impl ToString) -> Self {
        Self::Invalid {
            field,
            reason: reason.to_string(),
        }
    }
}

// === impl PolicyError ===

impl PolicyError {
    pub fn construction(facet: Facet, error: anyhow::Error) -> Self {
        Self::Construction {
            facet,
            // Include the full chain of causes.
            message: format!("{error:#}"),
        }
    }

    pub fn validation(facet: Facet, source: ValidationError) -> Self {
        Self::Validation { facet, source }
    }

    /// The facet this error pertains to, if any.
    pub fn facet(&self) -> Option<Facet> {
        match self {
            Self::Construction { facet, .. } | Self::Validation { facet, .. } => Some(*facet),
            Self::Resolution { .. } | Self::Rejected(_) | Self::Annotation { .. } => None,
        }
    }
}
