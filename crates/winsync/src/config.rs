// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Window sync configuration.
//!
//! Every cooperating process of one logical application must derive the
//! same segment names, so the names are computed from `app_id` and the
//! user session rather than configured directly.
//!
//! # Environment
//!
//! | Variable | Field |
//! |----------|-------|
//! | `WINSYNC_APP_ID` | `app_id` |
//! | `WINSYNC_RESET_MODE` | `reset_mode` (`manual` / `auto`) |
//! | `WINSYNC_WAIT_TIMEOUT_MS` | `wait_timeout` |
//! | `WINSYNC_ATTACH_TIMEOUT_MS` | `attach_timeout` |
//! | `WINSYNC_MAX_SUBSCRIBERS` | `max_subscribers` |

use crate::error::{Result, SyncError};
use crate::shm;
use crate::signal::ResetMode;
use std::time::Duration;

/// Default application id
pub const DEFAULT_APP_ID: &str = "winsync";

/// Default listener wait timeout, only used to re-check the running flag
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default time an attacher waits for the creator to size a segment
pub const DEFAULT_ATTACH_TIMEOUT: Duration = Duration::from_millis(100);

/// Default subscriber registry capacity
pub const DEFAULT_MAX_SUBSCRIBERS: usize = 64;

/// Configuration shared by the counter, the listener and the registry
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config-file", derive(serde::Deserialize))]
#[cfg_attr(feature = "config-file", serde(default))]
pub struct SyncConfig {
    /// Logical application id; identical across cooperating processes
    pub app_id: String,

    /// Reset policy of the change signal (only the creator's choice sticks)
    pub reset_mode: ResetMode,

    /// Bounded wait of the listener thread
    #[cfg_attr(feature = "config-file", serde(with = "millis"))]
    pub wait_timeout: Duration,

    /// How long an attaching process waits for the creator
    #[cfg_attr(feature = "config-file", serde(with = "millis"))]
    pub attach_timeout: Duration,

    /// Maximum number of registered subscriber handles
    pub max_subscribers: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            app_id: DEFAULT_APP_ID.to_string(),
            reset_mode: ResetMode::Manual,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            attach_timeout: DEFAULT_ATTACH_TIMEOUT,
            max_subscribers: DEFAULT_MAX_SUBSCRIBERS,
        }
    }
}

impl SyncConfig {
    /// Create a config for an application id.
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            ..Default::default()
        }
    }

    /// Defaults overlaid with `WINSYNC_*` environment variables.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::default().overlay_env(|key| std::env::var(key).ok())
    }

    fn overlay_env(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(app_id) = var("WINSYNC_APP_ID") {
            self.app_id = app_id;
        }
        if let Some(raw) = var("WINSYNC_RESET_MODE") {
            match raw.parse() {
                Ok(mode) => self.reset_mode = mode,
                Err(e) => log::warn!("[CONFIG] ignoring WINSYNC_RESET_MODE: {}", e),
            }
        }
        if let Some(ms) = parse_env_number::<u64>(&var, "WINSYNC_WAIT_TIMEOUT_MS") {
            self.wait_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_env_number::<u64>(&var, "WINSYNC_ATTACH_TIMEOUT_MS") {
            self.attach_timeout = Duration::from_millis(ms);
        }
        if let Some(n) = parse_env_number::<usize>(&var, "WINSYNC_MAX_SUBSCRIBERS") {
            self.max_subscribers = n;
        }
        self
    }

    /// Set the reset mode.
    pub fn with_reset_mode(mut self, mode: ResetMode) -> Self {
        self.reset_mode = mode;
        self
    }

    /// Set the listener wait timeout.
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Set the attach timeout.
    pub fn with_attach_timeout(mut self, timeout: Duration) -> Self {
        self.attach_timeout = timeout;
        self
    }

    /// Set the registry capacity.
    pub fn with_max_subscribers(mut self, max: usize) -> Self {
        self.max_subscribers = max;
        self
    }

    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<()> {
        if shm::sanitize_component(&self.app_id).is_empty() {
            return Err(SyncError::InvalidConfig("app_id is empty".into()));
        }
        if self.wait_timeout.is_zero() {
            return Err(SyncError::InvalidConfig("wait_timeout must be > 0".into()));
        }
        if self.max_subscribers == 0 {
            return Err(SyncError::InvalidConfig("max_subscribers must be > 0".into()));
        }
        Ok(())
    }

    /// Name of the counter segment
    #[must_use]
    pub fn counter_segment_name(&self) -> String {
        shm::segment_name(&self.app_id, "count")
    }

    /// Name of the change signal segment
    #[must_use]
    pub fn signal_segment_name(&self) -> String {
        shm::segment_name(&self.app_id, "signal")
    }

    /// Parse a YAML document; missing keys keep their defaults.
    ///
    /// ```yaml
    /// app_id: my_editor
    /// reset_mode: auto
    /// wait_timeout: 2000   # milliseconds
    /// max_subscribers: 16
    /// ```
    #[cfg(feature = "config-file")]
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| SyncError::InvalidConfig(format!("YAML parse error: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a YAML config file.
    #[cfg(feature = "config-file")]
    pub fn from_yaml_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SyncError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&content)
    }
}

fn parse_env_number<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = var(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("[CONFIG] ignoring {}={:?}: not a number", key, raw);
            None
        }
    }
}

#[cfg(feature = "config-file")]
mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
