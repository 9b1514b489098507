//! # Gateway Config
//!
//! Configuration for the LLM Chat Gateway.
//!
//! Values come from built-in defaults, an optional YAML or TOML file named by
//! `GATEWAY_CONFIG`, and environment overrides, applied in that order.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod loader;

pub use config::{BackendSection, GatewayConfig, LimitsSection, LoggingSection, ServerSection};
pub use loader::{apply_env_overrides, load_config, ConfigLoader, CONFIG_PATH_ENV};

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("Failed to read config file {path}: {message}")]
    Io {
        /// File path
        path: String,
        /// Underlying error
        message: String,
    },

    /// File could not be parsed
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// File extension not recognized
    #[error("Unsupported config format '{0}', expected yaml, yml, or toml")]
    UnsupportedFormat(String),

    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    Validation(String),
}
