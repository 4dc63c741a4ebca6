pub mod utilities;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message shown to end users for every semantic rejection.
///
/// The precise [`Rejection`] is for logs and telemetry only; surfacing it would
/// tell an attacker which check a forged or replayed link tripped.
pub const PUBLIC_REJECTION_MESSAGE: &str = "link invalid or expired";

#[derive(Debug, Error)]
pub enum Error {
    #[error("Magic link rejected: {0}")]
    Rejected(#[from] Rejection),

    #[error("Token issuance failed: {0}")]
    Issuance(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Event error: {0}")]
    Event(#[from] EventError),
}

/// Terminal policy decisions made while redeeming a magic link.
///
/// None of these are retried; they are definitive answers about the presented token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    #[error("Token is invalid or expired")]
    InvalidOrExpired,

    #[error("Token was issued for a different action")]
    WrongAction,

    #[error("Token has already been used")]
    AlreadyUsed,

    #[error("No account matches the token identity")]
    IdentityNotFound,

    #[error("Token identity does not match the resolved account")]
    HijackPrevented,
}

impl Rejection {
    /// Stable machine-readable code, used in logs and events
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::InvalidOrExpired => "invalid_or_expired",
            Rejection::WrongAction => "wrong_action",
            Rejection::AlreadyUsed => "already_used",
            Rejection::IdentityNotFound => "identity_not_found",
            Rejection::HijackPrevented => "hijack_prevented",
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Record not found")]
    NotFound,

    #[error("Constraint violation: {0}")]
    Constraint(String),
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Token expired")]
    Expired,

    #[error("Invalid token: {0}")]
    Invalid(String),

    #[error("Token purpose mismatch: expected {expected}, got {actual}")]
    PurposeMismatch { expected: String, actual: String },

    #[error("Token signing failed: {0}")]
    Signing(String),

    #[error("Codec unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    MissingField(String),

    #[error("Identity field '{field}' does not exist on resource '{resource}'")]
    UnknownIdentityField { resource: String, field: String },

    #[error("Identity field '{field}' is not uniquely constrained on resource '{resource}'")]
    IdentityFieldNotUnique { resource: String, field: String },

    #[error("Token lifetime must be positive")]
    NonPositiveLifetime,

    #[error("Action '{action}' already exists on resource '{resource}'")]
    ActionCollision { resource: String, action: String },

    #[error("Invalid value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid email format: {0}")]
    InvalidEmail(String),

    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Debug, Error)]
pub enum EventError {
    #[error("Event bus error: {0}")]
    BusError(String),

    #[error("Event handler error: {0}")]
    HandlerError(String),
}

impl Error {
    /// The semantic rejection carried by this error, if any
    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            Error::Rejected(rejection) => Some(*rejection),
            _ => None,
        }
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, Error::Rejected(_))
    }

    /// Whether the caller may retry the operation.
    ///
    /// Only transient infrastructure faults qualify. Semantic rejections,
    /// configuration and validation errors are final.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Storage(StorageError::Database(_))
                | Error::Storage(StorageError::Connection(_))
                | Error::Storage(StorageError::Unavailable(_))
                | Error::Codec(CodecError::Unavailable(_))
        )
    }

    pub fn is_storage_error(&self) -> bool {
        matches!(self, Error::Storage(_))
    }

    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// Text suitable for an end-user response.
    pub fn public_message(&self) -> &'static str {
        match self {
            Error::Rejected(_) => PUBLIC_REJECTION_MESSAGE,
            _ if self.is_retryable() => "Sign-in is temporarily unavailable, please try again",
            _ => "Unable to process sign-in link",
        }
    }
}
