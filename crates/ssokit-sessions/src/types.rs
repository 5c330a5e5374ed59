//! Session domain types.
//!
//! This module defines the central [`Session`] entity together with the
//! inbound authentication-result contract, device/IP binding metadata, and
//! the validation result value type.
//!
//! # Lifecycle
//!
//! 1. Session created by the manager from a completed authentication result
//! 2. Tokens and expiry updated in place by refresh
//! 3. `last_activity_at` updated by touch (sliding expiration)
//! 4. Terminated by revoke or discovered expired during validation
//!
//! # Security
//!
//! - Session identifiers are cryptographically random (256 bits)
//! - A revoked session is terminal; no operation re-activates it

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use time::OffsetDateTime;

/// Directory backend that authenticated a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirectoryType {
    /// Generic LDAP directory.
    Ldap,
    /// On-premises Active Directory.
    ActiveDirectory,
    /// Azure Active Directory / Entra ID.
    AzureAd,
    /// Local account database.
    Local,
    /// Custom backend identified by name.
    Other(String),
}

impl fmt::Display for DirectoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ldap => write!(f, "ldap"),
            Self::ActiveDirectory => write!(f, "activedirectory"),
            Self::AzureAd => write!(f, "azuread"),
            Self::Local => write!(f, "local"),
            Self::Other(name) => write!(f, "{name}"),
        }
    }
}

/// Completed authentication result from an identity backend.
///
/// This is the inbound contract: the directory/authentication layer
/// produces it, the session manager consumes it. Sessions can only be
/// created from results with `is_authenticated == true`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationResult {
    /// Whether authentication succeeded.
    pub is_authenticated: bool,

    /// The authenticated principal.
    pub user_id: String,

    /// Which backend authenticated the principal.
    pub directory_type: DirectoryType,

    /// Group memberships reported by the backend.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,

    /// Additional claims reported by the backend.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub claims: HashMap<String, String>,

    /// Access token issued by the backend.
    pub access_token: String,

    /// Refresh token, if the backend issued one. Sessions without one are
    /// valid but never refreshed automatically.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// When the access token expires.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// Optional client fingerprint tying a session to its origin.
///
/// Fields left `None` at creation are never checked; fields set at
/// creation must match exactly on later validations (when binding is
/// enforced).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionBinding {
    /// Client device identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,

    /// Client IP address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,

    /// Client user agent string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl SessionBinding {
    /// Returns `true` if no binding field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.device_id.is_none() && self.ip_address.is_none() && self.user_agent.is_none()
    }
}

/// Server-side record of an authenticated principal's ongoing access.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Opaque unique identifier, generated at creation, immutable.
    pub session_id: String,

    /// The authenticated principal. Never changes after creation.
    pub user_id: String,

    /// Which backend authenticated this session.
    pub directory_type: DirectoryType,

    /// Current access token.
    pub access_token: String,

    /// Refresh token; absent sessions are not eligible for automatic
    /// refresh.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// When the access token expires. Only ever moves forward.
    #[serde(with = "time::serde::rfc3339")]
    pub access_token_expires_at: OffsetDateTime,

    /// Device/IP binding captured at creation, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binding: Option<SessionBinding>,

    /// When the session was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// Last observed activity (updated by touch).
    #[serde(with = "time::serde::rfc3339")]
    pub last_activity_at: OffsetDateTime,

    /// When the tokens were last refreshed. None until the first refresh.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub last_refreshed_at: Option<OffsetDateTime>,

    /// Terminal lifecycle flag. Once set, no validation, refresh, or touch
    /// succeeds.
    #[serde(default)]
    pub revoked: bool,
}

impl Session {
    /// Generates a new cryptographically secure session identifier.
    ///
    /// The identifier is 256 bits of random data encoded as base64url
    /// without padding (43 characters).
    #[must_use]
    pub fn generate_id() -> String {
        let mut bytes = [0u8; 32];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Returns `true` if the access token has expired.
    ///
    /// Expiry is exclusive: a session is expired at or after its expiry
    /// instant.
    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.access_token_expires_at
    }

    /// Returns `true` if this session carries a refresh token.
    #[must_use]
    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// When the current tokens were issued: the last refresh, or session
    /// creation if never refreshed. Used to compute the refresh window.
    #[must_use]
    pub fn token_issued_at(&self) -> OffsetDateTime {
        self.last_refreshed_at.unwrap_or(self.created_at)
    }
}

/// Why a session failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationFailureReason {
    /// No session with the given ID exists.
    NotFound,
    /// The access token has expired.
    Expired,
    /// The session was explicitly revoked.
    Revoked,
    /// The presented device ID does not match the bound device.
    DeviceMismatch,
    /// The presented IP address does not match the bound address.
    IpMismatch,
}

impl fmt::Display for ValidationFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not-found"),
            Self::Expired => write!(f, "expired"),
            Self::Revoked => write!(f, "revoked"),
            Self::DeviceMismatch => write!(f, "device-mismatch"),
            Self::IpMismatch => write!(f, "ip-mismatch"),
        }
    }
}

/// Result of a session validation check.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionValidationResult {
    /// Whether the session is valid.
    pub is_valid: bool,

    /// The validated session; present only when valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<Session>,

    /// Why validation failed; present only when invalid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<ValidationFailureReason>,
}

impl SessionValidationResult {
    /// Creates a successful validation result.
    #[must_use]
    pub fn valid(session: Session) -> Self {
        Self {
            is_valid: true,
            session: Some(session),
            failure_reason: None,
        }
    }

    /// Creates a failed validation result.
    #[must_use]
    pub fn invalid(reason: ValidationFailureReason) -> Self {
        Self {
            is_valid: false,
            session: None,
            failure_reason: Some(reason),
        }
    }
}

/// New tokens returned by a credential refresher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSet {
    /// The new access token.
    pub access_token: String,

    /// A rotated refresh token, if the backend issued one. When absent,
    /// the session keeps its current refresh token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// When the new access token expires.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}
