//! Session lifecycle configuration.
//!
//! This module provides configuration types for the session manager and the
//! refresh scheduler: refresh threshold, tick interval, per-user session
//! limits, binding strictness, and shutdown behavior.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root session lifecycle configuration.
///
/// Consumed by [`SessionManager`](crate::manager::SessionManager) and
/// [`RefreshScheduler`](crate::scheduler::RefreshScheduler). All fields have
/// sensible defaults; call [`SessionConfig::validate`] after deserializing
/// external input.
///
/// # Example (TOML)
///
/// ```toml
/// [sessions]
/// refresh_threshold = 0.8
/// tick_interval = "30s"
/// max_sessions_per_user = 5
/// limit_policy = "evict-oldest"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Fraction of a token's lifetime after which automatic refresh is
    /// attempted. A session whose token lives 10 minutes with a threshold
    /// of 0.8 becomes due for refresh 8 minutes after issuance.
    /// Must be strictly between 0 and 1.
    pub refresh_threshold: f64,

    /// How often the background loop scans for due sessions.
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,

    /// Maximum concurrent sessions per user. 0 disables the limit.
    pub max_sessions_per_user: u32,

    /// What happens when a user hits `max_sessions_per_user`.
    pub limit_policy: LimitPolicy,

    /// Whether device/IP binding mismatches fail validation or are only
    /// logged.
    pub binding_mode: BindingMode,

    /// Revoke a session after this many consecutive failed scheduled
    /// refreshes. `None` (the default) retries unboundedly; a failed
    /// refresh is never escalated to revocation unless this is set.
    pub revoke_after_failures: Option<u32>,

    /// How long `stop()` waits for in-flight refreshes before aborting the
    /// background loop.
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,

    /// Buffer size of the lifecycle event channel. Slow subscribers drop
    /// events beyond this depth rather than blocking lifecycle operations.
    pub event_buffer_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_threshold: 0.8,
            tick_interval: Duration::from_secs(30),
            max_sessions_per_user: 5,
            limit_policy: LimitPolicy::EvictOldest,
            binding_mode: BindingMode::Enforced,
            revoke_after_failures: None,
            shutdown_grace: Duration::from_secs(10),
            event_buffer_size: 1024,
        }
    }
}

impl SessionConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if any field is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.refresh_threshold > 0.0 && self.refresh_threshold < 1.0) {
            return Err(ConfigError::InvalidValue {
                field: "refresh_threshold",
                message: format!(
                    "must be strictly between 0 and 1, got {}",
                    self.refresh_threshold
                ),
            });
        }
        if self.tick_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "tick_interval",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.event_buffer_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "event_buffer_size",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.revoke_after_failures == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "revoke_after_failures",
                message: "must be at least 1 when set".to_string(),
            });
        }
        Ok(())
    }
}

/// Policy applied when a user reaches `max_sessions_per_user`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LimitPolicy {
    /// Revoke the user's oldest session (by creation time) to make room.
    /// The evicted session receives a normal `SessionRevoked` event.
    EvictOldest,
    /// Reject the new session with a `LimitExceeded` error.
    Reject,
}

/// Strictness of device/IP binding checks during validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BindingMode {
    /// A binding mismatch fails validation.
    Enforced,
    /// A binding mismatch is logged but validation succeeds.
    Advisory,
}

/// Error type for configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A configuration field has an invalid value.
    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        /// The offending field.
        field: &'static str,
        /// Why the value is invalid.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.refresh_threshold, 0.8);
        assert_eq!(config.tick_interval, Duration::from_secs(30));
        assert_eq!(config.max_sessions_per_user, 5);
        assert_eq!(config.limit_policy, LimitPolicy::EvictOldest);
        assert_eq!(config.binding_mode, BindingMode::Enforced);
        assert!(config.revoke_after_failures.is_none());
    }

    #[test]
    fn test_invalid_threshold() {
        for threshold in [0.0, 1.0, 1.5, -0.1] {
            let config = SessionConfig {
                refresh_threshold: threshold,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "should reject {threshold}");
        }
    }

    #[test]
    fn test_invalid_tick_interval() {
        let config = SessionConfig {
            tick_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_revoke_after_failures_rejected() {
        let config = SessionConfig {
            revoke_after_failures: Some(0),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SessionConfig {
            revoke_after_failures: Some(3),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialization_with_humantime() {
        let config: SessionConfig = serde_json::from_value(serde_json::json!({
            "refresh_threshold": 0.75,
            "tick_interval": "10s",
            "limit_policy": "reject",
            "binding_mode": "advisory",
        }))
        .unwrap();

        assert_eq!(config.refresh_threshold, 0.75);
        assert_eq!(config.tick_interval, Duration::from_secs(10));
        assert_eq!(config.limit_policy, LimitPolicy::Reject);
        assert_eq!(config.binding_mode, BindingMode::Advisory);
        // Unspecified fields fall back to defaults
        assert_eq!(config.max_sessions_per_user, 5);
    }
}
