//! Session lifecycle events.
//!
//! The [`SessionEventBroadcaster`] is the only notification mechanism of
//! this subsystem. It uses tokio's broadcast channel for multi-subscriber
//! fan-out: emitting never blocks on subscribers, and a slow subscriber
//! lags and drops events instead of stalling lifecycle operations.

use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::broadcast;

use crate::types::Session;

/// Default buffer size for the broadcast channel.
/// A subscriber that falls further behind than this drops older events.
const DEFAULT_BUFFER_SIZE: usize = 1024;

/// A session lifecycle event.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A session was created.
    Created(SessionEventData),
    /// A session entered its refresh window but has not been refreshed yet.
    /// Fired at most once per entry into the window.
    Expiring(SessionEventData),
    /// A session's tokens were refreshed.
    Refreshed(SessionEventData),
    /// Validation discovered a session past its expiry.
    Expired(SessionEventData),
    /// A session was revoked.
    Revoked(SessionEventData),
}

impl SessionEvent {
    /// The session this event refers to.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.data().session_id
    }

    /// The owning user.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.data().user_id
    }

    /// The event payload.
    #[must_use]
    pub fn data(&self) -> &SessionEventData {
        match self {
            Self::Created(data)
            | Self::Expiring(data)
            | Self::Refreshed(data)
            | Self::Expired(data)
            | Self::Revoked(data) => data,
        }
    }

    /// Event kind as a static string, for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Expiring(_) => "expiring",
            Self::Refreshed(_) => "refreshed",
            Self::Expired(_) => "expired",
            Self::Revoked(_) => "revoked",
        }
    }
}

/// Payload common to all session events.
#[derive(Debug, Clone)]
pub struct SessionEventData {
    /// The session the event refers to.
    pub session_id: String,
    /// The owning user.
    pub user_id: String,
    /// When the event was emitted.
    pub occurred_at: OffsetDateTime,
}

impl SessionEventData {
    /// Builds an event payload from a session snapshot.
    #[must_use]
    pub fn from_session(session: &Session) -> Self {
        Self {
            session_id: session.session_id.clone(),
            user_id: session.user_id.clone(),
            occurred_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Broadcaster for session lifecycle events.
///
/// Thread-safe and cheap to clone; multiple subscribers receive every event
/// emitted after they subscribe. Emission is fire-and-forget: send errors
/// (no subscribers) are ignored and never propagate to the caller that
/// triggered the lifecycle change.
#[derive(Clone)]
pub struct SessionEventBroadcaster {
    sender: broadcast::Sender<SessionEvent>,
}

impl SessionEventBroadcaster {
    /// Create a new broadcaster with the default buffer size.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }

    /// Create a new broadcaster with a custom buffer size.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Create a new broadcaster wrapped in an Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Send an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event; 0 if
    /// there are none.
    pub fn send(&self, event: SessionEvent) -> usize {
        self.sender.send(event).unwrap_or_default()
    }

    /// Send a `Created` event for a session.
    pub fn send_created(&self, session: &Session) -> usize {
        self.send(SessionEvent::Created(SessionEventData::from_session(
            session,
        )))
    }

    /// Send an `Expiring` event for a session.
    pub fn send_expiring(&self, session: &Session) -> usize {
        self.send(SessionEvent::Expiring(SessionEventData::from_session(
            session,
        )))
    }

    /// Send a `Refreshed` event for a session.
    pub fn send_refreshed(&self, session: &Session) -> usize {
        self.send(SessionEvent::Refreshed(SessionEventData::from_session(
            session,
        )))
    }

    /// Send an `Expired` event for a session.
    pub fn send_expired(&self, session: &Session) -> usize {
        self.send(SessionEvent::Expired(SessionEventData::from_session(
            session,
        )))
    }

    /// Send a `Revoked` event for a session.
    pub fn send_revoked(&self, session: &Session) -> usize {
        self.send(SessionEvent::Revoked(SessionEventData::from_session(
            session,
        )))
    }

    /// Subscribe to events.
    ///
    /// Returns a receiver for all events broadcast after subscription.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SessionEventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionEventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionEventBroadcaster")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DirectoryType;

    #[test]
    fn test_broadcaster_no_subscribers() {
        let broadcaster = SessionEventBroadcaster::new();
        assert_eq!(broadcaster.subscriber_count(), 0);

        let session = create_test_session();
        // No subscribers: send succeeds and reports 0 receivers
        assert_eq!(broadcaster.send_created(&session), 0);
    }

    #[tokio::test]
    async fn test_broadcaster_send_receive() {
        let broadcaster = SessionEventBroadcaster::new();
        let mut receiver = broadcaster.subscribe();

        let session = create_test_session();
        broadcaster.send_created(&session);

        let event = receiver.recv().await.unwrap();
        assert!(matches!(event, SessionEvent::Created(_)));
        assert_eq!(event.session_id(), session.session_id);
        assert_eq!(event.user_id(), "alice");
        assert_eq!(event.kind(), "created");
    }

    #[tokio::test]
    async fn test_broadcaster_multiple_subscribers() {
        let broadcaster = SessionEventBroadcaster::new();
        let mut receiver1 = broadcaster.subscribe();
        let mut receiver2 = broadcaster.subscribe();

        let session = create_test_session();
        let count = broadcaster.send_revoked(&session);
        assert_eq!(count, 2);

        assert!(matches!(
            receiver1.recv().await.unwrap(),
            SessionEvent::Revoked(_)
        ));
        assert!(matches!(
            receiver2.recv().await.unwrap(),
            SessionEvent::Revoked(_)
        ));
    }

    fn create_test_session() -> Session {
        let now = OffsetDateTime::now_utc();
        Session {
            session_id: Session::generate_id(),
            user_id: "alice".to_string(),
            directory_type: DirectoryType::Local,
            access_token: "token".to_string(),
            refresh_token: None,
            access_token_expires_at: now + time::Duration::hours(1),
            binding: None,
            created_at: now,
            last_activity_at: now,
            last_refreshed_at: None,
            revoked: false,
        }
    }
}
