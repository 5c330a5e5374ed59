//! Credential refresher trait and per-backend registry.
//!
//! The credential refresher is the outbound seam of this subsystem: given a
//! session's refresh token, it performs the actual backend call to obtain
//! new tokens. One refresher is registered per directory type by whichever
//! identity backend created the session.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::types::{DirectoryType, Session, TokenSet};

/// Errors returned by a credential refresher.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    /// The refresh token itself has expired or been invalidated; a retry
    /// with the same token cannot succeed.
    #[error("Refresh token expired")]
    ExpiredRefreshToken,

    /// The identity backend could not be reached or returned a transient
    /// error. Retried on the next scheduled tick.
    #[error("Backend unavailable: {message}")]
    BackendUnavailable {
        /// Description of the backend failure.
        message: String,
    },

    /// The backend rejected the refresh for a non-transient reason.
    #[error("Refresh rejected: {message}")]
    Rejected {
        /// Description of the rejection.
        message: String,
    },
}

impl RefreshError {
    /// Creates a new `BackendUnavailable` error.
    #[must_use]
    pub fn backend_unavailable(message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            message: message.into(),
        }
    }

    /// Creates a new `Rejected` error.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: message.into(),
        }
    }

    /// Returns `true` if a retry may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::BackendUnavailable { .. })
    }
}

/// Performs the backend call that exchanges a refresh token for new tokens.
///
/// Implementations wrap whatever protocol the identity backend speaks
/// (OAuth refresh grant, Kerberos renewal, a proprietary API); this
/// subsystem only decides when to call them.
///
/// Refresh calls may block on network I/O and should be time-boxed by the
/// implementation.
#[async_trait]
pub trait CredentialRefresher: Send + Sync {
    /// Obtains new tokens for the given session.
    ///
    /// The session is passed read-only; the caller applies the returned
    /// token set under its own exclusion.
    ///
    /// # Errors
    ///
    /// Returns a [`RefreshError`] describing why new tokens could not be
    /// obtained.
    async fn refresh(&self, session: &Session) -> Result<TokenSet, RefreshError>;
}

/// Registry mapping directory types to their credential refreshers.
///
/// Built once at startup and shared immutably afterwards.
#[derive(Default)]
pub struct RefresherRegistry {
    refreshers: HashMap<DirectoryType, Arc<dyn CredentialRefresher>>,
}

impl RefresherRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a refresher for a directory type, replacing any previous
    /// registration.
    pub fn register(
        &mut self,
        directory_type: DirectoryType,
        refresher: Arc<dyn CredentialRefresher>,
    ) {
        self.refreshers.insert(directory_type, refresher);
    }

    /// Builder-style registration.
    #[must_use]
    pub fn with(
        mut self,
        directory_type: DirectoryType,
        refresher: Arc<dyn CredentialRefresher>,
    ) -> Self {
        self.register(directory_type, refresher);
        self
    }

    /// Looks up the refresher for a directory type.
    #[must_use]
    pub fn get(&self, directory_type: &DirectoryType) -> Option<Arc<dyn CredentialRefresher>> {
        self.refreshers.get(directory_type).cloned()
    }

    /// Returns the number of registered refreshers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.refreshers.len()
    }

    /// Returns `true` if no refreshers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.refreshers.is_empty()
    }
}

impl std::fmt::Debug for RefresherRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefresherRegistry")
            .field("directory_types", &self.refreshers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    struct StaticRefresher;

    #[async_trait]
    impl CredentialRefresher for StaticRefresher {
        async fn refresh(&self, _session: &Session) -> Result<TokenSet, RefreshError> {
            Ok(TokenSet {
                access_token: "new-token".to_string(),
                refresh_token: None,
                expires_at: OffsetDateTime::now_utc() + time::Duration::hours(1),
            })
        }
    }

    #[test]
    fn test_registry_lookup() {
        let registry = RefresherRegistry::new()
            .with(DirectoryType::Ldap, Arc::new(StaticRefresher));

        assert_eq!(registry.len(), 1);
        assert!(registry.get(&DirectoryType::Ldap).is_some());
        assert!(registry.get(&DirectoryType::AzureAd).is_none());
    }

    #[test]
    fn test_refresh_error_transience() {
        assert!(RefreshError::backend_unavailable("timeout").is_transient());
        assert!(!RefreshError::ExpiredRefreshToken.is_transient());
        assert!(!RefreshError::rejected("bad token").is_transient());
    }
}
