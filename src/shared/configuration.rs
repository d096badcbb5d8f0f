// Copyright 2025-Present AIVory, Inc. https://www.aivory.net/
// SPDX-License-Identifier: Apache-2.0

use crate::shared::constants::*;
use serde::{Deserialize, Serialize};

/// Agent configuration. Immutable once handed to [`crate::init`].
///
/// Construct with [`MonitorConfig::default`] (documented defaults) or
/// [`MonitorConfig::from_env`] (defaults overridden by `AIVORY_*` environment
/// variables), then set any field explicitly before calling `init`. Explicit
/// host values always win over the environment because the environment is
/// only read at construction time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Backend API key. Required, non-empty.
    pub api_key: String,
    /// Backend WebSocket endpoint, `ws://` or `wss://`.
    pub backend_url: String,
    /// Environment label attached to every report.
    pub environment: String,
    /// Sampling rate for explicit error reports, clamped to \[0, 1\] at use.
    /// Fatal-signal reports bypass sampling.
    pub sampling_rate: f64,
    /// Maximum depth when capturing nested values. Reserved for runtimes
    /// that capture locals; carried on the wire contract.
    pub max_capture_depth: u32,
    /// Strings longer than this are clamped and marked as truncated.
    pub max_string_length: usize,
    /// Maximum elements captured per collection. Reserved, see
    /// `max_capture_depth`.
    pub max_collection_size: usize,
    /// Emit per-connection diagnostics at debug level.
    pub debug: bool,
    /// Install handlers for fatal signals at init.
    pub capture_signals: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            environment: DEFAULT_ENVIRONMENT.to_string(),
            sampling_rate: DEFAULT_SAMPLING_RATE,
            max_capture_depth: DEFAULT_MAX_CAPTURE_DEPTH,
            max_string_length: DEFAULT_MAX_STRING_LENGTH,
            max_collection_size: DEFAULT_MAX_COLLECTION_SIZE,
            debug: false,
            capture_signals: true,
        }
    }
}

impl MonitorConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(key) = std::env::var(ENV_API_KEY) {
            config.api_key = key;
        }
        if let Ok(url) = std::env::var(ENV_BACKEND_URL) {
            config.backend_url = url;
        }
        if let Ok(environment) = std::env::var(ENV_ENVIRONMENT) {
            config.environment = environment;
        }
        if let Ok(rate) = std::env::var(ENV_SAMPLING_RATE) {
            if let Ok(rate) = rate.parse::<f64>() {
                config.sampling_rate = rate;
            }
        }
        if let Ok(debug) = std::env::var(ENV_DEBUG) {
            config.debug = debug == "true";
        }
        config
    }

    /// Checks the invariants `init` relies on. The URL grammar itself is
    /// validated by the transport when it parses the endpoint.
    pub(crate) fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!self.api_key.is_empty(), "API key is required");
        anyhow::ensure!(!self.backend_url.is_empty(), "backend URL is required");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.backend_url, DEFAULT_BACKEND_URL);
        assert_eq!(config.environment, "production");
        assert_eq!(config.sampling_rate, 1.0);
        assert_eq!(config.max_string_length, 1000);
        assert!(!config.debug);
        assert!(config.capture_signals);
    }

    #[test]
    fn test_validate_requires_api_key() {
        let config = MonitorConfig::default();
        assert!(config.validate().is_err());

        let config = MonitorConfig {
            api_key: "test-key-123".to_string(),
            ..Default::default()
        };
        config.validate().unwrap();
    }

    #[test]
    fn test_explicit_values_survive_env_construction() {
        // from_env reads the environment exactly once; fields assigned
        // afterwards are never overridden.
        let mut config = MonitorConfig::from_env();
        config.environment = "staging".to_string();
        config.sampling_rate = 0.25;
        assert_eq!(config.environment, "staging");
        assert_eq!(config.sampling_rate, 0.25);
    }
}
