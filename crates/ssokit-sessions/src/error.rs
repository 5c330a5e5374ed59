//! Session lifecycle error types.
//!
//! This module defines all error types that can occur during session
//! creation, validation, refresh, and revocation.

use crate::refresher::RefreshError;

/// Errors that can occur during session lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The operation was attempted against a session in the wrong state
    /// (unauthenticated result, revoked session, etc.).
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Description of the state violation.
        message: String,
    },

    /// The per-user concurrent session limit was reached and the
    /// configured policy is to reject new sessions.
    #[error("Session limit exceeded for user {user_id} (limit {limit})")]
    LimitExceeded {
        /// The user whose limit was hit.
        user_id: String,
        /// The configured maximum.
        limit: u32,
    },

    /// The session does not exist in the store.
    #[error("Session not found: {session_id}")]
    SessionNotFound {
        /// The requested session ID.
        session_id: String,
    },

    /// The session has no refresh token and cannot be refreshed.
    #[error("Session has no refresh token: {session_id}")]
    NoRefreshToken {
        /// The session lacking a refresh token.
        session_id: String,
    },

    /// The credential refresher reported a failure.
    #[error("Refresh failed: {reason}")]
    RefreshFailed {
        /// The underlying refresher error.
        #[source]
        reason: RefreshError,
    },

    /// No credential refresher is registered for the session's directory type.
    #[error("No refresher registered for directory type: {directory_type}")]
    NoRefresher {
        /// The directory type lacking a refresher.
        directory_type: String,
    },

    /// An error occurred while reading or writing session data.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },

    /// The session configuration is invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration error.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl SessionError {
    /// Creates a new `InvalidState` error.
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates a new `LimitExceeded` error.
    #[must_use]
    pub fn limit_exceeded(user_id: impl Into<String>, limit: u32) -> Self {
        Self::LimitExceeded {
            user_id: user_id.into(),
            limit,
        }
    }

    /// Creates a new `SessionNotFound` error.
    #[must_use]
    pub fn not_found(session_id: impl Into<String>) -> Self {
        Self::SessionNotFound {
            session_id: session_id.into(),
        }
    }

    /// Creates a new `NoRefreshToken` error.
    #[must_use]
    pub fn no_refresh_token(session_id: impl Into<String>) -> Self {
        Self::NoRefreshToken {
            session_id: session_id.into(),
        }
    }

    /// Creates a new `NoRefresher` error.
    #[must_use]
    pub fn no_refresher(directory_type: impl Into<String>) -> Self {
        Self::NoRefresher {
            directory_type: directory_type.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this error was caused by the caller (bad argument
    /// or an operation that requires a different session state).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidState { .. }
                | Self::LimitExceeded { .. }
                | Self::SessionNotFound { .. }
                | Self::NoRefreshToken { .. }
        )
    }

    /// Returns `true` if retrying the operation later may succeed.
    ///
    /// Transient errors are recorded in scheduler statistics and retried on
    /// the next tick; they never escalate to revocation by themselves.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RefreshFailed { reason } => reason.is_transient(),
            Self::Storage { .. } => true,
            _ => false,
        }
    }
}

impl From<RefreshError> for SessionError {
    fn from(reason: RefreshError) -> Self {
        Self::RefreshFailed { reason }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SessionError::invalid_state("authentication result not authenticated");
        assert_eq!(
            err.to_string(),
            "Invalid state: authentication result not authenticated"
        );

        let err = SessionError::limit_exceeded("alice", 5);
        assert_eq!(
            err.to_string(),
            "Session limit exceeded for user alice (limit 5)"
        );

        let err = SessionError::not_found("sess-1");
        assert_eq!(err.to_string(), "Session not found: sess-1");

        let err = SessionError::from(RefreshError::ExpiredRefreshToken);
        assert_eq!(err.to_string(), "Refresh failed: Refresh token expired");
    }

    #[test]
    fn test_error_predicates() {
        let err = SessionError::invalid_state("test");
        assert!(err.is_client_error());
        assert!(!err.is_transient());

        let err = SessionError::limit_exceeded("alice", 3);
        assert!(err.is_client_error());

        let err = SessionError::storage("connection lost");
        assert!(!err.is_client_error());
        assert!(err.is_transient());

        let err = SessionError::from(RefreshError::backend_unavailable("timeout"));
        assert!(err.is_transient());

        let err = SessionError::from(RefreshError::ExpiredRefreshToken);
        assert!(!err.is_transient());
    }
}
