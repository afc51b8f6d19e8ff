//! # Error Types
//!
//! Domain-specific error types for splitpay-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  splitpay-core errors (this file)                                      │
//! │  ├── CoreError        - Rule violations (state, conflicts, lookups)    │
//! │  ├── ValidationError  - Malformed input                                │
//! │  └── ErrorKind        - The caller-facing taxonomy                     │
//! │                                                                         │
//! │  splitpay-db errors (separate crate)                                   │
//! │  └── DbError          - Storage failures                               │
//! │                                                                         │
//! │  splitpay-engine errors                                                │
//! │  └── EngineError      - Everything above + Unavailable                 │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError → ApiError → caller   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

// =============================================================================
// Error Kind
// =============================================================================

/// The five failure categories callers program against.
///
/// | Kind           | Caller's move                                |
/// |----------------|----------------------------------------------|
/// | `Validation`   | fix the input, do not retry as-is            |
/// | `NotFound`     | the identifier is unknown                    |
/// | `InvalidState` | operation not allowed in the current state   |
/// | `Conflict`     | re-read current state, then retry            |
/// | `Unavailable`  | collaborator outage or timeout, back off     |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    NotFound,
    InvalidState,
    Conflict,
    Unavailable,
}

impl ErrorKind {
    /// Whether retrying the same call can succeed without changing the input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::Conflict | ErrorKind::Unavailable)
    }
}

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations raised by the pure rules in this crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Input failed validation (wraps ValidationError).
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// A referenced entity is unknown.
    ///
    /// ## When This Occurs
    /// - Line item id not on the receipt
    /// - Participant not a member of the session
    /// - Join code that resolves to no session
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The operation is not permitted in the entity's current state.
    ///
    /// ## When This Occurs
    /// - Adding members, receipts, items or assignments to a finalized session
    /// - Recording an outcome for a payment that is no longer pending
    /// - A non-creator trying to finalize a session
    #[error("{entity} {id} {reason}")]
    InvalidState {
        entity: String,
        id: String,
        reason: String,
    },

    /// A uniqueness rule would be broken.
    ///
    /// ## When This Occurs
    /// - Requesting payment while the payer already has a pending or paid record
    #[error("conflict: {0}")]
    Conflict(String),
}

impl CoreError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn invalid_state(
        entity: impl Into<String>,
        id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        CoreError::InvalidState {
            entity: entity.into(),
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Returns the caller-facing category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::InvalidState { .. } => ErrorKind::InvalidState,
            CoreError::Conflict(_) => ErrorKind::Conflict,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any rule runs; never retryable as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (bad join code, bad decimal string).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Duplicate value in a list that must be distinct.
    #[error("{field} '{value}' is listed more than once")]
    Duplicate { field: String, value: String },

    /// An assignment mode got the wrong number of participants.
    #[error("{mode} assignment needs {expected} participant(s), got {actual}")]
    WrongParticipantCount {
        mode: String,
        expected: String,
        actual: usize,
    },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::invalid_state("session", "s-1", "is already finalized");
        assert_eq!(err.to_string(), "session s-1 is already finalized");

        let err = CoreError::not_found("join code", "ABC123");
        assert_eq!(err.to_string(), "join code not found: ABC123");
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "name".to_string(),
        };
        assert_eq!(err.to_string(), "name is required");

        let err = ValidationError::WrongParticipantCount {
            mode: "exclusive".to_string(),
            expected: "exactly 1".to_string(),
            actual: 2,
        };
        assert_eq!(
            err.to_string(),
            "exclusive assignment needs exactly 1 participant(s), got 2"
        );
    }

    #[test]
    fn test_kinds_and_retryability() {
        let validation: CoreError = ValidationError::Required {
            field: "price".to_string(),
        }
        .into();
        assert_eq!(validation.kind(), ErrorKind::Validation);
        assert!(!validation.kind().is_retryable());

        let conflict = CoreError::Conflict("payer already has an active payment".to_string());
        assert_eq!(conflict.kind(), ErrorKind::Conflict);
        assert!(conflict.kind().is_retryable());

        assert!(ErrorKind::Unavailable.is_retryable());
        assert!(!ErrorKind::InvalidState.is_retryable());
        assert!(!ErrorKind::NotFound.is_retryable());
    }
}
