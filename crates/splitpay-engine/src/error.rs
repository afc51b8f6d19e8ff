//! # Engine Error Types
//!
//! The error taxonomy every engine operation reports, plus the serializable
//! form handed to transports.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in SplitPay                               │
//! │                                                                         │
//! │  splitpay-core rule ── CoreError ──┐                                   │
//! │                                    │                                   │
//! │  splitpay-db write ─── DbError ────┼──► EngineError ──► ApiError       │
//! │                                    │       │              { code,      │
//! │  tokio::time::timeout ─ Elapsed ───┤       │                message,   │
//! │                                    │       ▼                retryable }│
//! │  PaymentProvider ── ProviderError ─┘   ErrorKind                       │
//! │                                                                         │
//! │  VALIDATION     caller's fault, fix input                              │
//! │  NOT_FOUND      unknown identifier                                     │
//! │  INVALID_STATE  not allowed in the current state                       │
//! │  CONFLICT       stale version or uniqueness, re-read then retry        │
//! │  UNAVAILABLE    collaborator outage or timeout, retry with backoff     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No engine operation retries on its own; `is_retryable` tells the caller
//! whether it may.

use serde::Serialize;
use splitpay_core::{CoreError, ErrorKind, ValidationError};
use splitpay_db::DbError;
use thiserror::Error;
use ts_rs::TS;

use crate::provider::ProviderError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors returned by [`SplitEngine`](crate::SplitEngine) operations.
#[derive(Debug, Error)]
pub enum EngineError {
    // =========================================================================
    // Caller Errors
    // =========================================================================
    /// Malformed input.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// Unknown identifier.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Operation not permitted in the entity's current state.
    #[error("{entity} {id} {reason}")]
    InvalidState {
        entity: String,
        id: String,
        reason: String,
    },

    /// The payment provider refused the charge outright.
    #[error("Charge rejected by provider: {0}")]
    ChargeRejected(String),

    /// Configuration could not be loaded or is out of range.
    #[error("Invalid configuration: {0}")]
    Config(String),

    // =========================================================================
    // Concurrency Errors
    // =========================================================================
    /// Stale version token or uniqueness violation.
    #[error("Conflict: {0}")]
    Conflict(String),

    // =========================================================================
    // Collaborator Errors
    // =========================================================================
    /// A storage or provider call did not finish in time.
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    /// Storage failed for a reason the caller cannot fix.
    #[error("Storage unavailable: {0}")]
    Storage(#[source] DbError),

    /// The payment provider could not be reached.
    #[error("Payment provider unavailable: {0}")]
    ProviderUnavailable(String),
}

impl EngineError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        EngineError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, after_ms: u64) -> Self {
        EngineError::Timeout {
            operation: operation.into(),
            after_ms,
        }
    }

    /// Caller-facing category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_)
            | EngineError::ChargeRejected(_)
            | EngineError::Config(_) => ErrorKind::Validation,
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::InvalidState { .. } => ErrorKind::InvalidState,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::Timeout { .. }
            | EngineError::Storage(_)
            | EngineError::ProviderUnavailable(_) => ErrorKind::Unavailable,
        }
    }

    /// True only for `Conflict` and `Unavailable`.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<CoreError> for EngineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(e) => EngineError::Validation(e),
            CoreError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            CoreError::InvalidState { entity, id, reason } => {
                EngineError::InvalidState { entity, id, reason }
            }
            CoreError::Conflict(message) => EngineError::Conflict(message),
        }
    }
}

impl From<DbError> for EngineError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            DbError::InvalidState { entity, id, reason } => {
                EngineError::InvalidState { entity, id, reason }
            }
            DbError::UniqueViolation { field, value } => {
                EngineError::Conflict(format!("{} '{}' is already taken", field, value))
            }
            DbError::VersionConflict { entity, id } => EngineError::Conflict(format!(
                "{} {} changed since it was read; re-read and retry",
                entity, id
            )),
            DbError::Busy(message) => EngineError::Conflict(format!("storage busy: {}", message)),
            DbError::ForeignKeyViolation { message } => {
                EngineError::not_found("referenced row", message)
            }
            other => EngineError::Storage(other),
        }
    }
}

impl From<ProviderError> for EngineError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Rejected(reason) => EngineError::ChargeRejected(reason),
            ProviderError::Unavailable(reason) => EngineError::ProviderUnavailable(reason),
        }
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(err: toml::de::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for EngineError {
    fn from(err: toml::ser::Error) -> Self {
        EngineError::Config(err.to_string())
    }
}

// =============================================================================
// API Error
// =============================================================================

/// What a transport sends back when an operation fails.
///
/// ```json
/// {
///   "code": "INVALID_STATE",
///   "message": "session 5f0c... is already finalized",
///   "retryable": false
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    /// Machine-readable category for programmatic handling.
    pub code: ErrorKind,

    /// Human-readable message for display.
    pub message: String,

    /// Whether the client should offer a retry.
    pub retryable: bool,
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let code = err.kind();
        ApiError {
            code,
            message: err.to_string(),
            retryable: code.is_retryable(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_errors_map_into_taxonomy() {
        let cases = [
            (DbError::not_found("Session", "s-1"), ErrorKind::NotFound),
            (DbError::duplicate("sessions.join_code", "K7Q2ZD"), ErrorKind::Conflict),
            (DbError::version_conflict("line item", "i-1"), ErrorKind::Conflict),
            (
                DbError::invalid_state("session", "s-1", "is already finalized"),
                ErrorKind::InvalidState,
            ),
            (DbError::Busy("database is locked".into()), ErrorKind::Conflict),
            (DbError::PoolExhausted, ErrorKind::Unavailable),
            (DbError::ConnectionFailed("disk full".into()), ErrorKind::Unavailable),
        ];

        for (db_err, expected) in cases {
            let err = EngineError::from(db_err);
            assert_eq!(err.kind(), expected, "{}", err);
        }
    }

    #[test]
    fn test_retryable_only_for_conflict_and_unavailable() {
        assert!(EngineError::Conflict("stale".into()).is_retryable());
        assert!(EngineError::timeout("request_payment", 5000).is_retryable());
        assert!(!EngineError::not_found("Session", "s-1").is_retryable());
        assert!(!EngineError::ChargeRejected("insufficient funds".into()).is_retryable());
    }

    #[test]
    fn test_provider_errors() {
        let rejected = EngineError::from(ProviderError::Rejected("invalid wallet".into()));
        assert_eq!(rejected.kind(), ErrorKind::Validation);

        let down = EngineError::from(ProviderError::Unavailable("503".into()));
        assert_eq!(down.kind(), ErrorKind::Unavailable);
    }

    #[test]
    fn test_api_error_serialization() {
        let err = EngineError::InvalidState {
            entity: "session".into(),
            id: "s-1".into(),
            reason: "is already finalized".into(),
        };
        let api = ApiError::from(err);
        let json = serde_json::to_value(&api).unwrap();

        assert_eq!(json["code"], "INVALID_STATE");
        assert_eq!(json["message"], "session s-1 is already finalized");
        assert_eq!(json["retryable"], false);
    }
}
