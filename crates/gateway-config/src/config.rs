//! Configuration schema.

use gateway_telemetry::{LogFormat, LoggingConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::ConfigError;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP listener
    pub server: ServerSection,
    /// Inference backend
    pub backend: BackendSection,
    /// Admission control
    pub limits: LimitsSection,
    /// Logging
    pub logging: LoggingSection,
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
    /// How long to wait for open connections during shutdown
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerSection {
    /// `host:port`
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Inference backend settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSection {
    /// Model name passed to the backend
    pub model: String,
    /// Backend base URL
    pub base_url: String,
    /// Timeout for establishing a backend connection
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            model: "llama3".to_string(),
            base_url: "http://ollama:11434".to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Admission control settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsSection {
    /// Queries admitted per window, across all connections
    pub max_requests: u32,
    /// Rate limit window
    #[serde(with = "humantime_serde")]
    pub rate_limit_period: Duration,
    /// Inference executions allowed in flight at once
    pub max_concurrency: u32,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_requests: 10,
            rate_limit_period: Duration::from_secs(60),
            max_concurrency: 100,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Default filter directive
    pub level: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl LoggingSection {
    /// Build the subscriber configuration
    #[must_use]
    pub fn to_logging_config(&self) -> LoggingConfig {
        LoggingConfig::new()
            .with_level(self.level.clone())
            .with_format(self.format)
    }
}

impl GatewayConfig {
    /// Check the configuration for values the gateway cannot run with
    ///
    /// # Errors
    /// Returns the first problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port must be non-zero".to_string(),
            ));
        }

        if self.backend.model.trim().is_empty() {
            return Err(ConfigError::Validation(
                "backend.model must not be empty".to_string(),
            ));
        }

        let url = Url::parse(&self.backend.base_url).map_err(|e| {
            ConfigError::Validation(format!(
                "backend.base_url '{}' is not a valid URL: {e}",
                self.backend.base_url
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Validation(format!(
                "backend.base_url must use http or https, got '{}'",
                url.scheme()
            )));
        }

        if self.limits.max_requests == 0 {
            return Err(ConfigError::Validation(
                "limits.max_requests must be non-zero".to_string(),
            ));
        }
        if self.limits.rate_limit_period.is_zero() {
            return Err(ConfigError::Validation(
                "limits.rate_limit_period must be non-zero".to_string(),
            ));
        }
        if self.limits.max_concurrency == 0 {
            return Err(ConfigError::Validation(
                "limits.max_concurrency must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();

        assert_eq!(config.backend.model, "llama3");
        assert_eq!(config.backend.base_url, "http://ollama:11434");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.limits.max_requests, 10);
        assert_eq!(config.limits.rate_limit_period, Duration::from_secs(60));
        assert_eq!(config.limits.max_concurrency, 100);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bind_address() {
        assert_eq!(ServerSection::default().bind_address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_validation_rejects_zero_limits() {
        let mut config = GatewayConfig::default();
        config.limits.max_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.limits.rate_limit_period = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.limits.max_requests = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_url() {
        let mut config = GatewayConfig::default();
        config.backend.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.backend.base_url = "ftp://ollama:11434".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let config: GatewayConfig =
            serde_json::from_str(r#"{"limits": {"rate_limit_period": "30s"}}"#).unwrap();

        assert_eq!(config.limits.rate_limit_period, Duration::from_secs(30));
        assert_eq!(config.limits.max_requests, 10);
        assert_eq!(config.backend.model, "llama3");
    }
}
