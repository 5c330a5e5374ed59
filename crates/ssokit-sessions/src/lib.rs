//! # ssokit-sessions
//!
//! SSO session lifecycle management with automatic background token
//! refresh.
//!
//! This crate provides:
//! - Session creation, validation, refresh, and revocation with per-user
//!   session limits and device/IP binding
//! - A background scheduler that keeps session credentials fresh without
//!   caller intervention
//! - Lifecycle events over a broadcast channel
//! - Storage and credential-refresher traits for pluggable backends
//!
//! ## Overview
//!
//! The [`SessionManager`] owns the session lifecycle; the
//! [`RefreshScheduler`] runs a tick loop over the shared
//! [`SessionRegistry`] and calls back into the manager's refresh path.
//! Identity backends plug in through [`CredentialRefresher`] (one per
//! [`DirectoryType`]); durable persistence plugs in through
//! [`SessionStore`] (an in-memory backend ships in `ssokit-store-memory`).
//!
//! ```ignore
//! use std::sync::Arc;
//! use ssokit_sessions::prelude::*;
//!
//! let refreshers = Arc::new(RefresherRegistry::new()
//!     .with(DirectoryType::Ldap, my_ldap_refresher));
//! let manager = Arc::new(SessionManager::new(store, refreshers, SessionConfig::default())?);
//! let scheduler = RefreshScheduler::new(Arc::clone(&manager));
//! scheduler.start();
//!
//! let session = manager.create_session(&auth_result, None).await?;
//! // ... tokens stay fresh in the background ...
//! scheduler.stop().await;
//! ```
//!
//! ## Modules
//!
//! - [`config`] - Refresh threshold, tick interval, limits, binding mode
//! - [`types`] - Session, authentication result, and validation types
//! - [`events`] - Lifecycle event broadcaster
//! - [`store`] - Session storage trait
//! - [`refresher`] - Credential refresher trait and per-backend registry
//! - [`registry`] - Refresh-eligibility bookkeeping
//! - [`manager`] - Session lifecycle operations
//! - [`scheduler`] - Background refresh loop

pub mod config;
pub mod error;
pub mod events;
mod locks;
pub mod manager;
pub mod refresher;
pub mod registry;
pub mod scheduler;
pub mod store;
pub mod types;

pub use config::{BindingMode, ConfigError, LimitPolicy, SessionConfig};
pub use error::SessionError;
pub use events::{SessionEvent, SessionEventBroadcaster, SessionEventData};
pub use manager::{RefreshOutcome, SessionManager};
pub use refresher::{CredentialRefresher, RefreshError, RefresherRegistry};
pub use registry::{RegistryEntry, SessionRegistry};
pub use scheduler::{RefreshScheduler, SchedulerStats};
pub use store::SessionStore;
pub use types::{
    AuthenticationResult, DirectoryType, Session, SessionBinding, SessionValidationResult,
    TokenSet, ValidationFailureReason,
};

/// Type alias for session lifecycle results.
pub type SessionResult<T> = Result<T, SessionError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use ssokit_sessions::prelude::*;
/// ```
pub mod prelude {
    pub use crate::SessionResult;
    pub use crate::config::{BindingMode, ConfigError, LimitPolicy, SessionConfig};
    pub use crate::error::SessionError;
    pub use crate::events::{SessionEvent, SessionEventBroadcaster, SessionEventData};
    pub use crate::manager::{RefreshOutcome, SessionManager};
    pub use crate::refresher::{CredentialRefresher, RefreshError, RefresherRegistry};
    pub use crate::registry::{RegistryEntry, SessionRegistry};
    pub use crate::scheduler::{RefreshScheduler, SchedulerStats};
    pub use crate::store::SessionStore;
    pub use crate::types::{
        AuthenticationResult, DirectoryType, Session, SessionBinding, SessionValidationResult,
        TokenSet, ValidationFailureReason,
    };
}
