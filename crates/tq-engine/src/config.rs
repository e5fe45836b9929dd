//! Engine configuration
//!
//! Loaded from TOML. Every section and field is optional; omitted values
//! fall back to [`EngineConfig::default`].
//!
//! ```toml
//! [store]
//! path = "tq.db"
//! busy_timeout_ms = 5000
//!
//! [escalation.pole]
//! threshold = 3
//! time_window_days = 30
//!
//! [locks]
//! ttl_minutes = 30
//!
//! [logging]
//! filter = "info"
//!
//! [notifications]
//! escalation_recipient = "operations"
//! ```

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tq_core::{EscalationPolicy, ScopeThreshold, ScopeType};
use tq_store::StoreOptions;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Storage
    pub store: StoreConfig,
    /// Default escalation thresholds per scope
    pub escalation: EscalationPolicy,
    /// Edit locks
    pub locks: LockConfig,
    /// Logging
    pub logging: LoggingConfig,
    /// Notification routing
    pub notifications: NotificationConfig,
}

/// `[store]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file
    pub path: PathBuf,
    /// Bound on lock waits
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("tq.db"),
            busy_timeout_ms: 5000,
        }
    }
}

impl StoreConfig {
    /// Options for opening the store
    #[must_use]
    pub fn options(&self) -> StoreOptions {
        StoreOptions {
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
        }
    }
}

/// `[locks]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Lifetime of an edit lock without refresh
    pub ttl_minutes: u32,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self { ttl_minutes: 30 }
    }
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` wins when set
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

/// `[notifications]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Channel that receives escalation alerts
    pub escalation_recipient: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            escalation_recipient: "operations".to_string(),
        }
    }
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(text: &str) -> EngineResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Reject values that would make the engine misbehave
    pub fn validate(&self) -> EngineResult<()> {
        self.escalation
            .validate()
            .map_err(|e| EngineError::Config(e.to_string()))?;
        if self.locks.ttl_minutes == 0 {
            return Err(EngineError::Config("locks.ttl_minutes must be at least 1".into()));
        }
        if self.store.busy_timeout_ms == 0 {
            return Err(EngineError::Config(
                "store.busy_timeout_ms must be at least 1".into(),
            ));
        }
        if self.notifications.escalation_recipient.trim().is_empty() {
            return Err(EngineError::Config(
                "notifications.escalation_recipient must not be blank".into(),
            ));
        }
        Ok(())
    }

    /// With database path
    #[inline]
    #[must_use]
    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store.path = path.into();
        self
    }

    /// With busy timeout
    #[inline]
    #[must_use]
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.store.busy_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With threshold for one scope kind
    #[inline]
    #[must_use]
    pub fn with_threshold(mut self, scope_type: ScopeType, limits: ScopeThreshold) -> Self {
        match scope_type {
            ScopeType::Pole => self.escalation.pole = limits,
            ScopeType::Pon => self.escalation.pon = limits,
            ScopeType::Zone => self.escalation.zone = limits,
            ScopeType::Dr => self.escalation.dr = limits,
        }
        self
    }

    /// With edit lock lifetime
    #[inline]
    #[must_use]
    pub fn with_lock_ttl(mut self, minutes: u32) -> Self {
        self.locks.ttl_minutes = minutes;
        self
    }

    /// With escalation alert channel
    #[inline]
    #[must_use]
    pub fn with_escalation_recipient(mut self, channel: impl Into<String>) -> Self {
        self.notifications.escalation_recipient = channel.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_gives_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.escalation.pole.threshold, 3);
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [store]
            path = "/var/lib/tq/tickets.db"

            [escalation.pole]
            threshold = 4
            time_window_days = 14

            [locks]
            ttl_minutes = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.store.path, PathBuf::from("/var/lib/tq/tickets.db"));
        assert_eq!(config.store.busy_timeout_ms, 5000);
        assert_eq!(config.escalation.pole, ScopeThreshold::new(4, 14));
        assert_eq!(config.escalation.dr, ScopeThreshold::new(2, 30));
        assert_eq!(config.locks.ttl_minutes, 10);
    }

    #[test]
    fn single_threshold_field_keeps_the_default_window() {
        let config = EngineConfig::from_toml_str("[escalation.pole]\nthreshold = 4\n").unwrap();
        assert_eq!(config.escalation.pole, ScopeThreshold::new(4, 30));
        assert_eq!(config.escalation.pon, ScopeThreshold::new(5, 30));

        let config = EngineConfig::from_toml_str("[escalation.dr]\ntime_window_days = 7\n").unwrap();
        assert_eq!(config.escalation.dr, ScopeThreshold::new(2, 7));
        assert_eq!(config.escalation.pole, ScopeThreshold::new(3, 30));
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let err = EngineConfig::from_toml_str("[escalation.zone]\nthreshold = 0\ntime_window_days = 30\n")
            .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }
}
