//! In-memory index of sessions eligible for automatic refresh.
//!
//! The registry is pure bookkeeping: it maps session IDs to refresh due
//! times and user IDs to session sets, with no business logic and no I/O.
//! It exists apart from the scheduler so the "what is due" computation is
//! unit-testable without any background task.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use time::OffsetDateTime;

use crate::types::Session;

/// Bookkeeping entry for one registered session.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryEntry {
    /// The registered session.
    pub session_id: String,

    /// The owning user.
    pub user_id: String,

    /// When the session becomes due for automatic refresh. `None` for
    /// sessions without a refresh token; they sit inert and are never
    /// selected by the scan.
    pub next_refresh_due_at: Option<OffsetDateTime>,

    /// Whether the session carries a refresh token.
    pub has_refresh_token: bool,

    /// Whether the `Expiring` event has already fired for the current
    /// refresh window. Re-armed by a successful refresh.
    pub expiring_notified: bool,

    /// Consecutive failed refresh attempts since the last success.
    pub consecutive_failures: u32,
}

impl RegistryEntry {
    /// Builds an entry from a session snapshot and the configured refresh
    /// threshold.
    ///
    /// The due time is the threshold fraction of the token's lifetime past
    /// its issuance: a token issued at T living L becomes due at
    /// `T + L * threshold`.
    #[must_use]
    pub fn for_session(session: &Session, refresh_threshold: f64) -> Self {
        let next_refresh_due_at = session.refresh_token.as_ref().map(|_| {
            let issued_at = session.token_issued_at();
            let lifetime = session.access_token_expires_at - issued_at;
            issued_at + time::Duration::seconds_f64(lifetime.as_seconds_f64() * refresh_threshold)
        });

        Self {
            session_id: session.session_id.clone(),
            user_id: session.user_id.clone(),
            next_refresh_due_at,
            has_refresh_token: session.has_refresh_token(),
            expiring_notified: false,
            consecutive_failures: 0,
        }
    }

    /// Returns `true` if the entry is due for refresh at `now`.
    #[must_use]
    pub fn is_due(&self, now: OffsetDateTime) -> bool {
        self.next_refresh_due_at.is_some_and(|due| due <= now)
    }
}

/// Thread-safe map of sessions currently registered for automatic refresh.
///
/// All operations are synchronous and non-blocking apart from the internal
/// lock; registration and unregistration are safe to call while the
/// scheduler loop is running.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    inner: RwLock<RegistryInner>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    entries: HashMap<String, RegistryEntry>,
    by_user: HashMap<String, HashSet<String>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the entry for a session.
    ///
    /// Replacing an entry resets its failure count and re-arms the
    /// `Expiring` notification, since a new due time means a new window.
    pub fn upsert(&self, entry: RegistryEntry) {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        inner
            .by_user
            .entry(entry.user_id.clone())
            .or_default()
            .insert(entry.session_id.clone());
        inner.entries.insert(entry.session_id.clone(), entry);
    }

    /// Removes the entry for a session.
    ///
    /// Returns whether an entry existed.
    pub fn remove(&self, session_id: &str) -> bool {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        match inner.entries.remove(session_id) {
            Some(entry) => {
                if let Some(set) = inner.by_user.get_mut(&entry.user_id) {
                    set.remove(session_id);
                    if set.is_empty() {
                        inner.by_user.remove(&entry.user_id);
                    }
                }
                true
            }
            None => false,
        }
    }

    /// Returns whether a session is registered.
    #[must_use]
    pub fn contains(&self, session_id: &str) -> bool {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .entries
            .contains_key(session_id)
    }

    /// Returns a snapshot of the entry for a session.
    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<RegistryEntry> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .entries
            .get(session_id)
            .cloned()
    }

    /// Returns snapshots of all entries due for refresh at `now`.
    ///
    /// Entries without a refresh token are never returned.
    #[must_use]
    pub fn due_sessions(&self, now: OffsetDateTime) -> Vec<RegistryEntry> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .entries
            .values()
            .filter(|entry| entry.is_due(now))
            .cloned()
            .collect()
    }

    /// Marks the `Expiring` event as fired for the session's current
    /// refresh window. Returns `false` if it was already marked (or the
    /// session is not registered), so callers can fire at most once.
    pub fn mark_expiring_notified(&self, session_id: &str) -> bool {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        match inner.entries.get_mut(session_id) {
            Some(entry) if !entry.expiring_notified => {
                entry.expiring_notified = true;
                true
            }
            _ => false,
        }
    }

    /// Records a failed refresh attempt; returns the new consecutive
    /// failure count (0 if the session is no longer registered).
    pub fn record_failure(&self, session_id: &str) -> u32 {
        let mut inner = self.inner.write().expect("registry lock poisoned");
        match inner.entries.get_mut(session_id) {
            Some(entry) => {
                entry.consecutive_failures += 1;
                entry.consecutive_failures
            }
            None => 0,
        }
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .entries
            .len()
    }

    /// Returns `true` if no sessions are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of registered sessions for a user.
    #[must_use]
    pub fn user_session_count(&self, user_id: &str) -> usize {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .by_user
            .get(user_id)
            .map_or(0, HashSet::len)
    }

    /// Snapshot of all registered session IDs.
    #[must_use]
    pub fn session_ids(&self) -> Vec<String> {
        self.inner
            .read()
            .expect("registry lock poisoned")
            .entries
            .keys()
            .cloned()
            .collect()
    }
}
