//! Session lifecycle management.
//!
//! The [`SessionManager`] is the single source of truth for session CRUD
//! and policy enforcement: it creates sessions from authentication results,
//! validates them against expiry and device/IP binding, refreshes their
//! tokens through the per-backend credential refreshers, and revokes them.
//! Every lifecycle change is announced on the event broadcaster.
//!
//! # Concurrency
//!
//! All mutations of a given session run under the same per-session lock,
//! so a touch, refresh, and revoke racing on one session serialize instead
//! of clobbering each other's writes. Refresh additionally single-flights:
//! a caller that waited on the lock re-reads the session and skips the
//! backend call when a concurrent refresh already advanced the expiry.
//! Creation holds a per-user lock across the limit check and the store
//! write, so concurrent creates for one user cannot overshoot the
//! configured maximum.
//!
//! Each operation persists through a single store write, so a future
//! dropped mid-flight leaves either the old or the new record, never a
//! partial one. Registry bookkeeping around that write converges through
//! the scheduler: an entry whose session is gone is dropped on the next
//! scan, and a session whose entry kept a stale due time is simply picked
//! up again.

use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::SessionResult;
use crate::config::{BindingMode, LimitPolicy, SessionConfig};
use crate::error::SessionError;
use crate::events::SessionEventBroadcaster;
use crate::locks::SessionLocks;
use crate::refresher::RefresherRegistry;
use crate::registry::{RegistryEntry, SessionRegistry};
use crate::store::SessionStore;
use crate::types::{
    AuthenticationResult, Session, SessionBinding, SessionValidationResult,
    ValidationFailureReason,
};

/// Result of one refresh attempt that did not fail.
#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    /// The credential refresher was called and new tokens were applied.
    Refreshed(Session),
    /// A concurrent refresh finished first; the backend was not called and
    /// the already-fresh session is returned.
    AlreadyFresh(Session),
}

impl RefreshOutcome {
    /// The session after the refresh attempt, regardless of who performed
    /// it.
    #[must_use]
    pub fn into_session(self) -> Session {
        match self {
            Self::Refreshed(session) | Self::AlreadyFresh(session) => session,
        }
    }

    /// Returns `true` if this attempt actually called the backend.
    #[must_use]
    pub fn did_refresh(&self) -> bool {
        matches!(self, Self::Refreshed(_))
    }
}

/// Owns the full session lifecycle: create, validate, refresh, touch,
/// revoke, and query.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    refreshers: Arc<RefresherRegistry>,
    registry: Arc<SessionRegistry>,
    events: SessionEventBroadcaster,
    locks: SessionLocks,
    user_locks: SessionLocks,
    config: SessionConfig,
}

impl SessionManager {
    /// Creates a new session manager.
    ///
    /// # Errors
    ///
    /// Returns a `Configuration` error if the config fails validation.
    pub fn new(
        store: Arc<dyn SessionStore>,
        refreshers: Arc<RefresherRegistry>,
        config: SessionConfig,
    ) -> SessionResult<Self> {
        config
            .validate()
            .map_err(|e| SessionError::configuration(e.to_string()))?;

        Ok(Self {
            store,
            refreshers,
            registry: Arc::new(SessionRegistry::new()),
            events: SessionEventBroadcaster::with_capacity(config.event_buffer_size),
            locks: SessionLocks::new(),
            user_locks: SessionLocks::new(),
            config,
        })
    }

    /// The lifecycle event broadcaster. Subscribe here to observe
    /// creations, refreshes, expirations, and revocations.
    #[must_use]
    pub fn events(&self) -> &SessionEventBroadcaster {
        &self.events
    }

    /// The shared refresh registry (scanned by the scheduler).
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Creates a session from a completed authentication result.
    ///
    /// This is the only path that creates sessions. The per-user session
    /// limit is enforced here: depending on [`LimitPolicy`], either the
    /// user's oldest session is evicted (with a normal `SessionRevoked`
    /// event) or creation fails with `LimitExceeded`.
    ///
    /// Sessions are always registered for refresh; sessions without a
    /// refresh token sit inert in the registry and are never selected.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if the result is not authenticated or the user ID
    ///   is empty
    /// - `LimitExceeded` under [`LimitPolicy::Reject`] when the user is at
    ///   the configured maximum
    /// - `Storage` if persistence fails
    pub async fn create_session(
        &self,
        auth_result: &AuthenticationResult,
        binding: Option<SessionBinding>,
    ) -> SessionResult<Session> {
        if !auth_result.is_authenticated {
            return Err(SessionError::invalid_state(
                "cannot create a session from an unauthenticated result",
            ));
        }
        if auth_result.user_id.is_empty() {
            return Err(SessionError::invalid_state("user ID is empty"));
        }

        // The limit check and the insert must not interleave with another
        // create for the same user
        let _user_guard = self.user_locks.lock(&auth_result.user_id).await;

        self.enforce_session_limit(&auth_result.user_id).await?;

        let now = OffsetDateTime::now_utc();
        let session = Session {
            session_id: Session::generate_id(),
            user_id: auth_result.user_id.clone(),
            directory_type: auth_result.directory_type.clone(),
            access_token: auth_result.access_token.clone(),
            refresh_token: auth_result.refresh_token.clone(),
            access_token_expires_at: auth_result.expires_at,
            binding: binding.filter(|b| !b.is_empty()),
            created_at: now,
            last_activity_at: now,
            last_refreshed_at: None,
            revoked: false,
        };

        // Registered before the write: a stray entry for a session that
        // never reached the store is dropped by the scheduler's next scan,
        // while a stored session missing its entry would never refresh
        self.registry
            .upsert(RegistryEntry::for_session(&session, self.config.refresh_threshold));
        if let Err(e) = self.store.put(&session).await {
            self.registry.remove(&session.session_id);
            return Err(e);
        }
        self.events.send_created(&session);

        info!(
            session_id = %session.session_id,
            user_id = %session.user_id,
            directory_type = %session.directory_type,
            refresh_eligible = session.has_refresh_token(),
            "Session created"
        );

        Ok(session)
    }

    /// Validates a session against expiry, revocation, and binding.
    ///
    /// Read-only: neither state nor expiry is mutated. Checks run in
    /// order: not-found, revoked, expired, device binding, IP binding.
    /// Discovering a passively expired session emits `SessionExpired`.
    ///
    /// With [`BindingMode::Advisory`], binding mismatches are logged but
    /// validation succeeds.
    ///
    /// # Errors
    ///
    /// - `InvalidState` for an empty session ID
    /// - `Storage` if the lookup fails
    pub async fn validate_session(
        &self,
        session_id: &str,
        presented: Option<&SessionBinding>,
    ) -> SessionResult<SessionValidationResult> {
        require_session_id(session_id)?;

        let Some(session) = self.store.get(session_id).await? else {
            return Ok(SessionValidationResult::invalid(
                ValidationFailureReason::NotFound,
            ));
        };

        if session.revoked {
            return Ok(SessionValidationResult::invalid(
                ValidationFailureReason::Revoked,
            ));
        }

        let now = OffsetDateTime::now_utc();
        if session.is_expired(now) {
            self.events.send_expired(&session);
            debug!(session_id = %session.session_id, "Session discovered expired during validation");
            return Ok(SessionValidationResult::invalid(
                ValidationFailureReason::Expired,
            ));
        }

        if let Some(reason) = self.check_binding(&session, presented) {
            match self.config.binding_mode {
                BindingMode::Enforced => {
                    return Ok(SessionValidationResult::invalid(reason));
                }
                BindingMode::Advisory => {
                    warn!(
                        session_id = %session.session_id,
                        reason = %reason,
                        "Binding mismatch (advisory mode, validation allowed)"
                    );
                }
            }
        }

        Ok(SessionValidationResult::valid(session))
    }

    /// Refreshes a session's tokens through its credential refresher.
    ///
    /// Runs under the per-session lock with single-flight semantics: when
    /// a concurrent refresh already advanced the expiry, the backend is
    /// not called again and the fresh session is returned. A failed
    /// refresh leaves the session unchanged and is never escalated to
    /// revocation here; the scheduler simply retries on its next tick.
    ///
    /// # Errors
    ///
    /// - `SessionNotFound` / `InvalidState` / `NoRefreshToken` when the
    ///   session is absent, revoked, or not refresh-eligible
    /// - `NoRefresher` when no refresher covers the directory type
    /// - `RefreshFailed` when the backend call fails
    pub async fn refresh_session(&self, session_id: &str) -> SessionResult<Session> {
        let outcome = self.refresh_session_outcome(session_id).await?;
        Ok(outcome.into_session())
    }

    /// Like [`refresh_session`](Self::refresh_session) but reports whether
    /// this call performed the backend refresh or lost the race to a
    /// concurrent one.
    pub async fn refresh_session_outcome(
        &self,
        session_id: &str,
    ) -> SessionResult<RefreshOutcome> {
        require_session_id(session_id)?;

        // Observe the expiry before taking the lock; if it advanced by the
        // time the lock is held, another caller refreshed meanwhile.
        let observed_expiry = match self.store.get(session_id).await? {
            Some(session) => session.access_token_expires_at,
            None => return Err(SessionError::not_found(session_id)),
        };

        let _guard = self.locks.lock(session_id).await;

        let Some(mut session) = self.store.get(session_id).await? else {
            return Err(SessionError::not_found(session_id));
        };
        if session.revoked {
            return Err(SessionError::invalid_state(format!(
                "session {session_id} is revoked"
            )));
        }
        if session.access_token_expires_at > observed_expiry {
            debug!(
                session_id = %session.session_id,
                "Skipping refresh: concurrent refresh already completed"
            );
            return Ok(RefreshOutcome::AlreadyFresh(session));
        }
        if !session.has_refresh_token() {
            return Err(SessionError::no_refresh_token(session_id));
        }

        let refresher = self
            .refreshers
            .get(&session.directory_type)
            .ok_or_else(|| SessionError::no_refresher(session.directory_type.to_string()))?;

        let tokens = refresher.refresh(&session).await?;

        // Expiry only moves forward; a backend handing back an earlier
        // expiry keeps the current one.
        if tokens.expires_at > session.access_token_expires_at {
            session.access_token_expires_at = tokens.expires_at;
        } else {
            warn!(
                session_id = %session.session_id,
                "Refresher returned a non-advancing expiry; keeping current expiry"
            );
        }
        session.access_token = tokens.access_token;
        if tokens.refresh_token.is_some() {
            session.refresh_token = tokens.refresh_token;
        }
        session.last_refreshed_at = Some(OffsetDateTime::now_utc());

        self.store.put(&session).await?;
        self.registry
            .upsert(RegistryEntry::for_session(&session, self.config.refresh_threshold));
        self.events.send_refreshed(&session);

        info!(
            session_id = %session.session_id,
            user_id = %session.user_id,
            expires_at = %session.access_token_expires_at,
            "Session refreshed"
        );

        Ok(RefreshOutcome::Refreshed(session))
    }

    /// Updates a session's last-activity timestamp.
    ///
    /// Intentionally lenient: touching an absent or revoked session is a
    /// no-op, not an error, since callers touch opportunistically.
    ///
    /// # Errors
    ///
    /// - `InvalidState` for an empty session ID
    /// - `Storage` if persistence fails
    pub async fn touch_session(&self, session_id: &str) -> SessionResult<()> {
        require_session_id(session_id)?;

        let _guard = self.locks.lock(session_id).await;

        let Some(mut session) = self.store.get(session_id).await? else {
            return Ok(());
        };
        if session.revoked {
            return Ok(());
        }

        session.last_activity_at = OffsetDateTime::now_utc();
        self.store.put(&session).await
    }

    /// Revokes a session.
    ///
    /// Idempotent: revoking an absent or already-revoked session succeeds
    /// silently. Returns whether a live session was actually revoked (used
    /// by the bulk operations to avoid double-counting).
    ///
    /// # Errors
    ///
    /// - `InvalidState` for an empty session ID
    /// - `Storage` if the store operation fails
    pub async fn revoke_session(&self, session_id: &str) -> SessionResult<bool> {
        require_session_id(session_id)?;

        let _guard = self.locks.lock(session_id).await;

        let Some(mut session) = self.store.get(session_id).await? else {
            self.registry.remove(session_id);
            return Ok(false);
        };

        let was_live = !session.revoked;
        session.revoked = true;

        self.store.delete(session_id).await?;
        self.registry.remove(session_id);

        if was_live {
            self.events.send_revoked(&session);
            info!(
                session_id = %session.session_id,
                user_id = %session.user_id,
                "Session revoked"
            );
        }

        Ok(was_live)
    }

    /// Revokes every session belonging to a user.
    ///
    /// Returns the number of sessions actually revoked; already-revoked
    /// entries are not counted.
    ///
    /// # Errors
    ///
    /// Returns a `Storage` error if listing or deletion fails.
    pub async fn revoke_all_user_sessions(&self, user_id: &str) -> SessionResult<u64> {
        self.revoke_user_sessions_except(user_id, None).await
    }

    /// Revokes every session belonging to a user except one.
    ///
    /// Used for "log out everywhere else." Returns the number of sessions
    /// actually revoked.
    ///
    /// # Errors
    ///
    /// Returns a `Storage` error if listing or deletion fails.
    pub async fn revoke_other_sessions(
        &self,
        user_id: &str,
        except_session_id: &str,
    ) -> SessionResult<u64> {
        self.revoke_user_sessions_except(user_id, Some(except_session_id))
            .await
    }

    /// Looks up a session by ID. Read-only snapshot.
    ///
    /// # Errors
    ///
    /// Returns a `Storage` error if the lookup fails.
    pub async fn get_session(&self, session_id: &str) -> SessionResult<Option<Session>> {
        require_session_id(session_id)?;
        self.store.get(session_id).await
    }

    /// Lists a user's sessions. Read-only snapshot.
    ///
    /// # Errors
    ///
    /// Returns a `Storage` error if the lookup fails.
    pub async fn get_user_sessions(&self, user_id: &str) -> SessionResult<Vec<Session>> {
        self.store.list_by_user(user_id).await
    }

    /// Counts a user's live sessions.
    ///
    /// # Errors
    ///
    /// Returns a `Storage` error if the lookup fails.
    pub async fn get_user_session_count(&self, user_id: &str) -> SessionResult<u64> {
        let sessions = self.store.list_by_user(user_id).await?;
        Ok(sessions.iter().filter(|s| !s.revoked).count() as u64)
    }

    /// Counts all stored sessions.
    ///
    /// Revoked sessions are removed from the store, so this counts live
    /// sessions; passively expired sessions not yet discovered by
    /// validation are included.
    ///
    /// # Errors
    ///
    /// Returns a `Storage` error if the count fails.
    pub async fn get_active_session_count(&self) -> SessionResult<u64> {
        self.store.count().await
    }

    async fn revoke_user_sessions_except(
        &self,
        user_id: &str,
        except_session_id: Option<&str>,
    ) -> SessionResult<u64> {
        let sessions = self.store.list_by_user(user_id).await?;
        let mut revoked = 0u64;

        for session in sessions {
            if except_session_id == Some(session.session_id.as_str()) {
                continue;
            }
            if self.revoke_session(&session.session_id).await? {
                revoked += 1;
            }
        }

        info!(user_id = %user_id, count = revoked, "Bulk session revocation");
        Ok(revoked)
    }

    async fn enforce_session_limit(&self, user_id: &str) -> SessionResult<()> {
        let limit = self.config.max_sessions_per_user;
        if limit == 0 {
            return Ok(());
        }

        let sessions = self.store.list_by_user(user_id).await?;
        let mut live: Vec<&Session> = sessions.iter().filter(|s| !s.revoked).collect();
        if (live.len() as u32) < limit {
            return Ok(());
        }

        match self.config.limit_policy {
            LimitPolicy::Reject => Err(SessionError::limit_exceeded(user_id, limit)),
            LimitPolicy::EvictOldest => {
                live.sort_by_key(|s| s.created_at);
                // Evict enough to leave room for the new session
                let excess = live.len() as u32 - (limit - 1);
                let to_evict: Vec<String> = live
                    .iter()
                    .take(excess as usize)
                    .map(|s| s.session_id.clone())
                    .collect();
                for session_id in to_evict {
                    info!(
                        user_id = %user_id,
                        session_id = %session_id,
                        "Evicting oldest session to honor per-user limit"
                    );
                    self.revoke_session(&session_id).await?;
                }
                Ok(())
            }
        }
    }

    fn check_binding(
        &self,
        session: &Session,
        presented: Option<&SessionBinding>,
    ) -> Option<ValidationFailureReason> {
        let bound = session.binding.as_ref()?;

        if let Some(bound_device) = &bound.device_id {
            let presented_device = presented.and_then(|p| p.device_id.as_ref());
            if presented_device != Some(bound_device) {
                return Some(ValidationFailureReason::DeviceMismatch);
            }
        }
        if let Some(bound_ip) = &bound.ip_address {
            let presented_ip = presented.and_then(|p| p.ip_address.as_ref());
            if presented_ip != Some(bound_ip) {
                return Some(ValidationFailureReason::IpMismatch);
            }
        }
        // User agents drift across client updates; never a hard failure
        if let Some(bound_agent) = &bound.user_agent {
            let presented_agent = presented.and_then(|p| p.user_agent.as_ref());
            if presented_agent != Some(bound_agent) {
                debug!(
                    session_id = %session.session_id,
                    "User agent changed since session creation"
                );
            }
        }

        None
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("registered_sessions", &self.registry.len())
            .field("config", &self.config)
            .finish()
    }
}

fn require_session_id(session_id: &str) -> SessionResult<()> {
    if session_id.is_empty() {
        return Err(SessionError::invalid_state("session ID is empty"));
    }
    Ok(())
}
