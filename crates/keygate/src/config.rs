//! Gateway configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use keygate_core::EncryptionContext;

use crate::error::{GatewayError, Result};

/// Retry settings for transport faults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    /// Total attempts per remote call, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_backoff_ms: u64,
    /// Upper bound on any single delay.
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 50,
            max_backoff_ms: 2000,
        }
    }
}

/// Configuration for a [`Gateway`](crate::Gateway).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    /// Region clients are created in. Defaults to the key handle's region.
    pub region: Option<String>,
    /// Retry settings.
    pub retry: RetryConfig,
    /// Context pairs applied under every caller-supplied context.
    pub default_context: EncryptionContext,
}

impl GatewayConfig {
    /// Parse a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| GatewayError::Configuration(format!("invalid config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| GatewayError::Configuration(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if let Some(region) = &self.region {
            if region.trim().is_empty() {
                return Err(GatewayError::Configuration("region is empty".into()));
            }
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(GatewayError::Configuration(
                "initial_backoff_ms exceeds max_backoff_ms".into(),
            ));
        }
        self.default_context.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.region, None);
        assert_eq!(config.retry.max_attempts, 4);
        assert!(config.default_context.is_empty());
    }

    #[test]
    fn test_partial_json() {
        let config = GatewayConfig::from_json_str(
            r#"{"region": "us-west-1", "retry": {"max_attempts": 3}, "default_context": {"app": "billing"}}"#,
        )
        .unwrap();
        assert_eq!(config.region.as_deref(), Some("us-west-1"));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_backoff_ms, 50);
        assert_eq!(config.default_context.get("app"), Some("billing"));
    }

    #[test]
    fn test_invalid_json_is_configuration_error() {
        for bad in [
            "not json",
            r#"{"regoin": "typo"}"#,
            r#"{"region": ""}"#,
            r#"{"retry": {"initial_backoff_ms": 10, "max_backoff_ms": 1}}"#,
            r#"{"default_context": {"keygate:reserved": "x"}}"#,
        ] {
            let err = GatewayConfig::from_json_str(bad).unwrap_err();
            assert!(matches!(err, GatewayError::Configuration(_)), "{bad}");
        }
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"region": "eu-west-1"}}"#).unwrap();

        let config = GatewayConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.region.as_deref(), Some("eu-west-1"));

        let missing = GatewayConfig::from_json_file("/nonexistent/keygate.json").unwrap_err();
        assert!(matches!(missing, GatewayError::Configuration(_)));
    }
}
