//! Configuration structures.
//!
//! Configuration is built from defaults and can be overlaid from a JSON file.

use crate::types::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Global configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// In-process bus configuration.
    #[serde(default)]
    pub bus: BusConfig,

    /// Registry behaviour.
    #[serde(default)]
    pub registry: RegistryConfig,
}

impl Config {
    /// Parse a JSON document. Missing sections fall back to defaults.
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable JSON log formatting.
    pub json_logs: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// In-process bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Deadline applied to each method call routed through the bus.
    #[serde(with = "humantime_serde")]
    pub call_timeout: Duration,

    /// Bounded channel capacity per signal subscriber. Signals to a full
    /// subscriber are dropped.
    pub signal_channel_capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(25),
            signal_channel_capacity: 64,
        }
    }
}

/// What a multi-registry does when an interface name is added twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateInterfacePolicy {
    /// Fail the second `add` with `DuplicateInterface`.
    #[default]
    Reject,
    /// Silently replace the existing child registry.
    Replace,
}

/// Registry behaviour.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Duplicate interface handling in multi-registries.
    #[serde(default)]
    pub duplicate_interfaces: DuplicateInterfacePolicy,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.bus.call_timeout, Duration::from_secs(25));
        assert_eq!(config.bus.signal_channel_capacity, 64);
        assert_eq!(
            config.registry.duplicate_interfaces,
            DuplicateInterfacePolicy::Reject
        );
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = Config::from_json_str(
            r#"{"bus": {"call_timeout": "2s", "signal_channel_capacity": 8},
                "registry": {"duplicate_interfaces": "replace"}}"#,
        )
        .unwrap();
        assert_eq!(config.bus.call_timeout, Duration::from_secs(2));
        assert_eq!(config.bus.signal_channel_capacity, 8);
        assert_eq!(
            config.registry.duplicate_interfaces,
            DuplicateInterfacePolicy::Replace
        );
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"observability": {{"log_level": "debug", "json_logs": true}}}}"#).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.observability.log_level, "debug");
        assert!(config.observability.json_logs);
    }

    #[test]
    fn test_invalid_json_is_serialization_error() {
        let err = Config::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, crate::types::Error::Serialization(_)));
    }
}
