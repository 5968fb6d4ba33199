//! Error types for LARDER operations

use crate::EntityType;
use thiserror::Error;

/// Payload or input rejected, either locally or by the remote schema.
///
/// Never retried automatically; surfaced as a field-level or form-level
/// message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Rejected by server: {message}")]
    Rejected { message: String },

    #[error("{entity_type:?} {id} has not been saved yet")]
    UnsavedRecord { entity_type: EntityType, id: String },
}

impl ValidationError {
    /// Name of the offending field, when the error is field-level.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::RequiredFieldMissing { field } | Self::InvalidValue { field, .. } => {
                Some(field.as_str())
            }
            Self::Rejected { .. } | Self::UnsavedRecord { .. } => None,
        }
    }
}

/// Transport-level failures. The user may re-trigger the operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Request failed: {reason}")]
    Transport { reason: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Unexpected response: {reason}")]
    InvalidResponse { reason: String },
}

/// Authentication failures, handled at the boundary as a redirect to sign-in.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Not signed in")]
    NotSignedIn,

    #[error("Session expired")]
    SessionExpired,

    #[error("Authentication rejected: {message}")]
    Rejected { message: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all LARDER errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LarderError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Not found: {entity_type:?} with id {id}")]
    NotFound { entity_type: EntityType, id: String },

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Internal error: {reason}")]
    Internal { reason: String },
}

impl LarderError {
    /// Shorthand for a not-found error.
    pub fn not_found(entity_type: EntityType, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type,
            id: id.into(),
        }
    }

    /// Shorthand for a remote schema rejection.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Validation(ValidationError::Rejected {
            message: message.into(),
        })
    }

    /// Shorthand for an internal failure.
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Network failures may succeed if the user tries again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// The cache entry for the target id should be dropped.
    pub fn clears_cache_entry(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The caller should send the user back to sign-in.
    pub fn requires_sign_in(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

/// Result type alias for LARDER operations.
pub type LarderResult<T> = Result<T, LarderError>;

// =============================================================================
// TESTS
// =============================================================================
