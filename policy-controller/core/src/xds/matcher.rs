use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StringMatcher {
    Exact(String),
    Prefix(String),
    Suffix(String),
    Contains(String),
    SafeRegex { regex: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct HeaderValue {
    pub key: String,
    pub value: String,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppendAction {
    #[default]
    AppendIfExistsOrAdd,
    OverwriteIfExistsOrAdd,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct HeaderValueOption {
    pub header: HeaderValue,
    pub append_action: AppendAction,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Denominator {
    #[default]
    Hundred,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct FractionalPercent {
    pub numerator: u32,
    pub denominator: Denominator,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct RuntimeFractionalPercent {
    pub default_value: FractionalPercent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_key: Option<String>,
}

/// Matches a boolean value stored in a filter's dynamic metadata.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct MetadataMatcher {
    pub filter: String,
    pub path: Vec<PathSegment>,
    pub value: ValueMatcher,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub invert: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct PathSegment {
    pub key: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ValueMatcher {
    pub bool_match: bool,
}

// === impl HeaderValueOption ===

impl HeaderValueOption {
    pub fn overwrite(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            header: HeaderValue {
                key: key.into(),
                value: value.into(),
            },
            append_action: AppendAction::OverwriteIfExistsOrAdd,
        }
    }

    pub fn append(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            header: HeaderValue {
                key: key.into(),
                value: value.into(),
            },
            append_action: AppendAction::AppendIfExistsOrAdd,
        }
    }
}

// === impl RuntimeFractionalPercent ===

impl RuntimeFractionalPercent {
    pub fn percent(numerator: u32) -> Self {
        Self {
            default_value: FractionalPercent {
                numerator,
                denominator: Denominator::Hundred,
            },
            runtime_key: None,
        }
    }
}

// === impl StringMatcher ===

impl StringMatcher {
    /// Returns the regular expression this matcher carries, if any.
    pub fn regex(&self) -> Option<&str> {
        match self {
            Self::SafeRegex { regex } => Some(regex),
            _ => None,
        }
    }
}
