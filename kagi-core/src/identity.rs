//! Identity fields and their equality rule
//!
//! The identity field is the uniqueness anchor for accounts (usually `email`).
//! How two identity values compare is an explicit property of the field: the
//! same rule produces storage lookup keys, enforces uniqueness and decides
//! whether a token's claimed identity matches a resolved account.
//!
//! | Comparison        | `"Alice@X.com "` vs `"alice@x.com"` |
//! | ----------------- | ----------------------------------- |
//! | `Exact`           | different                           |
//! | `CaseInsensitive` | different (trailing space)          |
//! | `Normalized`      | equal                               |

use std::{borrow::Cow, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ValidationError};
use crate::validation::{validate_email, validate_identity};

/// Equality rule applied to identity values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityComparison {
    /// Byte-for-byte equality
    Exact,
    /// Unicode lowercase folding, whitespace significant
    #[default]
    CaseInsensitive,
    /// Surrounding whitespace trimmed, then lowercase folding
    Normalized,
}

impl IdentityComparison {
    /// Canonical form of `value` under this rule.
    ///
    /// Two values match exactly when their canonical forms are equal.
    pub fn normalize<'a>(&self, value: &'a str) -> Cow<'a, str> {
        match self {
            IdentityComparison::Exact => Cow::Borrowed(value),
            IdentityComparison::CaseInsensitive => lowercase(value),
            IdentityComparison::Normalized => lowercase(value.trim()),
        }
    }

    pub fn matches(&self, left: &str, right: &str) -> bool {
        self.normalize(left) == self.normalize(right)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityComparison::Exact => "exact",
            IdentityComparison::CaseInsensitive => "case_insensitive",
            IdentityComparison::Normalized => "normalized",
        }
    }
}

fn lowercase(value: &str) -> Cow<'_, str> {
    if value.chars().any(char::is_uppercase) {
        Cow::Owned(value.to_lowercase())
    } else {
        Cow::Borrowed(value)
    }
}

impl fmt::Display for IdentityComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentityComparison {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exact" => Ok(IdentityComparison::Exact),
            "case_insensitive" | "ci" => Ok(IdentityComparison::CaseInsensitive),
            "normalized" => Ok(IdentityComparison::Normalized),
            other => Err(ConfigError::InvalidValue {
                key: "identity_comparison".to_string(),
                message: format!("unknown comparison '{other}'"),
            }),
        }
    }
}

/// What kind of value the identity field holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    #[default]
    Email,
    Text,
}

/// The field used to look accounts up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityField {
    pub name: String,
    #[serde(default)]
    pub comparison: IdentityComparison,
    #[serde(default)]
    pub kind: IdentityKind,
}

impl IdentityField {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            comparison: IdentityComparison::default(),
            kind: IdentityKind::Text,
        }
    }

    /// The conventional `email` identity field, compared case-insensitively
    pub fn email() -> Self {
        Self {
            name: "email".to_string(),
            comparison: IdentityComparison::CaseInsensitive,
            kind: IdentityKind::Email,
        }
    }

    pub fn with_comparison(mut self, comparison: IdentityComparison) -> Self {
        self.comparison = comparison;
        self
    }

    pub fn with_kind(mut self, kind: IdentityKind) -> Self {
        self.kind = kind;
        self
    }

    /// Storage key for `value`: its canonical form under this field's comparison
    pub fn key(&self, value: &str) -> String {
        self.comparison.normalize(value).into_owned()
    }

    pub fn matches(&self, left: &str, right: &str) -> bool {
        self.comparison.matches(left, right)
    }

    /// Check that `value` is acceptable for this field
    pub fn validate(&self, value: &str) -> Result<(), ValidationError> {
        validate_identity(value)?;
        match self.kind {
            IdentityKind::Email => validate_email(value.trim()),
            IdentityKind::Text => Ok(()),
        }
    }
}

impl Default for IdentityField {
    fn default() -> Self {
        Self::email()
    }
}
