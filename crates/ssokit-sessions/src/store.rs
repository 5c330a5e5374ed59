//! Session storage trait.
//!
//! This module defines the storage interface for durable session records.
//! Persistence is an external collaborator: the core never assumes a
//! particular backend, only this contract. An in-memory implementation is
//! provided by the `ssokit-store-memory` crate.

use async_trait::async_trait;

use crate::SessionResult;
use crate::types::Session;

/// Storage trait for session records.
///
/// Implementations must be safe for concurrent access by their own
/// contract; the session manager serializes writes to a given session
/// through its per-session locks, but reads may happen at any time.
///
/// # Implementations
///
/// - `ssokit-store-memory` — bundled in-memory backend for tests and
///   embedding without an external database
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Looks up a session by ID.
    ///
    /// Returns `None` if no session with the given ID exists. Revoked
    /// sessions that have been deleted are also `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn get(&self, session_id: &str) -> SessionResult<Option<Session>>;

    /// Stores or replaces a session record.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be persisted.
    async fn put(&self, session: &Session) -> SessionResult<()>;

    /// Deletes a session record.
    ///
    /// Deleting a nonexistent session is not an error; returns whether a
    /// record was actually removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn delete(&self, session_id: &str) -> SessionResult<bool>;

    /// Lists all sessions belonging to a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn list_by_user(&self, user_id: &str) -> SessionResult<Vec<Session>>;

    /// Counts all stored sessions.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    async fn count(&self) -> SessionResult<u64>;
}
