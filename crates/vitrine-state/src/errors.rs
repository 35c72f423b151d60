//! Error types for the state engine.
//!
//! [`StateError`] is returned by every store and repository operation.
//! [`StateError::kind`] collapses it onto the small [`ErrorKind`] taxonomy
//! callers branch on.

use std::fmt;

use thiserror::Error;

/// Errors that can occur during state operations.
#[derive(Debug, Error)]
pub enum StateError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// JSON serialization error on the write path.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Which migration failed and why.
        message: String,
    },

    /// No state exists for the session.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// A payload failed validation, or stored JSON failed to decode.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Step allocation kept colliding with concurrent writers.
    #[error("concurrent write conflict on session {session_id} after {attempts} attempts")]
    ConcurrentWriteConflict {
        /// Contended session.
        session_id: String,
        /// Attempts made.
        attempts: u32,
    },

    /// Operation not valid in the current state.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Internal invariant violated.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias for state results.
pub type Result<T> = std::result::Result<T, StateError>;

/// Coarse error taxonomy exposed to callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No state for the session.
    SessionNotFound,
    /// Bounded retry on step allocation exhausted.
    ConcurrentWriteConflict,
    /// Storage layer failed; nothing was committed.
    PersistenceFailure,
    /// Payload rejected or stored value undecodable.
    InvalidPayload,
    /// Operation not valid in the current state.
    InvalidOperation,
}

impl ErrorKind {
    /// Stable snake-case label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionNotFound => "session_not_found",
            Self::ConcurrentWriteConflict => "concurrent_write_conflict",
            Self::PersistenceFailure => "persistence_failure",
            Self::InvalidPayload => "invalid_payload",
            Self::InvalidOperation => "invalid_operation",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StateError {
    /// Taxonomy bucket for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SessionNotFound(_) => ErrorKind::SessionNotFound,
            Self::ConcurrentWriteConflict { .. } => ErrorKind::ConcurrentWriteConflict,
            Self::InvalidPayload(_) | Self::Serde(_) => ErrorKind::InvalidPayload,
            Self::InvalidOperation(_) => ErrorKind::InvalidOperation,
            Self::Sqlite(_) | Self::Pool(_) | Self::Migration { .. } | Self::Internal(_) => {
                ErrorKind::PersistenceFailure
            }
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConcurrentWriteConflict { .. } | Self::Pool(_) => true,
            Self::Sqlite(e) => is_contention(e),
            _ => false,
        }
    }
}

/// Whether a `SQLite` error is lock contention or a step collision.
pub(crate) fn is_contention(err: &rusqlite::Error) -> bool {
    use rusqlite::ErrorCode;

    match err.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => true,
        Some(ErrorCode::ConstraintViolation) => matches!(
            err,
            rusqlite::Error::SqliteFailure(f, _)
                if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                    || f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(code), None)
    }

    #[test]
    fn session_not_found_display() {
        let err = StateError::SessionNotFound("sess-123".into());
        assert_eq!(err.to_string(), "session not found: sess-123");
        assert_eq!(err.kind(), ErrorKind::SessionNotFound);
    }

    #[test]
    fn conflict_display_and_kind() {
        let err = StateError::ConcurrentWriteConflict {
            session_id: "s1".into(),
            attempts: 5,
        };
        assert_eq!(
            err.to_string(),
            "concurrent write conflict on session s1 after 5 attempts"
        );
        assert_eq!(err.kind(), ErrorKind::ConcurrentWriteConflict);
        assert!(err.is_retryable());
    }

    #[test]
    fn migration_error_display() {
        let err = StateError::Migration {
            message: "v001 failed".into(),
        };
        assert_eq!(err.to_string(), "migration error: v001 failed");
        assert_eq!(err.kind(), ErrorKind::PersistenceFailure);
    }

    #[test]
    fn serde_errors_are_invalid_payload() {
        let serde_err = serde_json::from_str::<String>("bad").unwrap_err();
        let err: StateError = serde_err.into();
        assert!(matches!(err, StateError::Serde(_)));
        assert_eq!(err.kind(), ErrorKind::InvalidPayload);
        assert!(!err.is_retryable());
    }

    #[test]
    fn busy_is_retryable() {
        let err = StateError::Sqlite(sqlite_failure(rusqlite::ffi::SQLITE_BUSY));
        assert!(err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::PersistenceFailure);
    }

    #[test]
    fn unique_violation_is_contention() {
        assert!(is_contention(&sqlite_failure(
            rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        )));
        assert!(!is_contention(&sqlite_failure(
            rusqlite::ffi::SQLITE_CONSTRAINT_NOTNULL
        )));
        assert!(!is_contention(&rusqlite::Error::QueryReturnedNoRows));
    }

    #[test]
    fn kind_labels() {
        assert_eq!(ErrorKind::InvalidPayload.to_string(), "invalid_payload");
        assert_eq!(ErrorKind::PersistenceFailure.as_str(), "persistence_failure");
    }

    #[test]
    fn invalid_operation_not_retryable() {
        let err = StateError::InvalidOperation("already exists".into());
        assert_eq!(err.kind(), ErrorKind::InvalidOperation);
        assert!(!err.is_retryable());
    }
}
