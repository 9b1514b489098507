//! Configuration loading: defaults, then an optional file, then environment.

use crate::config::GatewayConfig;
use crate::ConfigError;
use gateway_telemetry::LogFormat;
use humantime_serde::re::humantime;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "GATEWAY_CONFIG";

/// Loads a [`GatewayConfig`] from its sources
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    path: Option<PathBuf>,
    apply_env: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self {
            path: None,
            apply_env: true,
        }
    }
}

impl ConfigLoader {
    /// Create a loader that reads only defaults and the environment
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a YAML or TOML file before applying the environment
    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Skip environment overrides
    #[must_use]
    pub fn without_env(mut self) -> Self {
        self.apply_env = false;
        self
    }

    /// Load and validate the configuration
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed, or validation fails
    pub async fn load(&self) -> Result<GatewayConfig, ConfigError> {
        let mut config = match &self.path {
            Some(path) => load_file(path).await?,
            None => GatewayConfig::default(),
        };

        if self.apply_env {
            apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        }

        config.validate()?;
        Ok(config)
    }
}

async fn load_file(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    let config = match extension.as_deref() {
        Some("yaml" | "yml") => {
            serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?
        }
        Some("toml") => toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?,
        other => {
            return Err(ConfigError::UnsupportedFormat(
                other.unwrap_or_default().to_string(),
            ))
        }
    };

    info!(path = %path.display(), "Loaded configuration file");
    Ok(config)
}

/// Apply environment overrides using `lookup` to read variables.
///
/// Unparsable values are skipped with a warning and the previous value kept.
pub fn apply_env_overrides<F>(config: &mut GatewayConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(model) = lookup("OLLAMA_MODEL").filter(|v| !v.trim().is_empty()) {
        config.backend.model = model;
    }
    if let Some(url) = lookup("OLLAMA_SERVER_URL").filter(|v| !v.trim().is_empty()) {
        config.backend.base_url = url;
    }
    if let Some(port) = parsed(&lookup, "API_PORT") {
        config.server.port = port;
    }
    if let Some(max) = parsed(&lookup, "MAX_REQUESTS") {
        config.limits.max_requests = max;
    }
    if let Some(period) = lookup("RATE_LIMIT_PERIOD") {
        match parse_duration(&period) {
            Some(period) => config.limits.rate_limit_period = period,
            None => warn!(
                variable = "RATE_LIMIT_PERIOD",
                value = %period,
                "Ignoring invalid environment value"
            ),
        }
    }
    // MAX_CONCURRENCY wins when both are set
    if let Some(max) = parsed(&lookup, "MAX_GOROUTINES") {
        config.limits.max_concurrency = max;
    }
    if let Some(max) = parsed(&lookup, "MAX_CONCURRENCY") {
        config.limits.max_concurrency = max;
    }
    if let Some(level) = lookup("LOG_LEVEL").filter(|v| !v.trim().is_empty()) {
        config.logging.level = level;
    }
    if let Some(format) = parsed::<LogFormat, _>(&lookup, "LOG_FORMAT") {
        config.logging.format = format;
    }
}

fn parsed<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => {
            debug!(variable = key, "Applied environment override");
            Some(value)
        }
        Err(_) => {
            warn!(variable = key, value = %raw, "Ignoring invalid environment value");
            None
        }
    }
}

/// Parse `90s`, `1m30s`, or a bare number of seconds
fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    raw.parse::<u64>()
        .ok()
        .map(Duration::from_secs)
        .or_else(|| humantime::parse_duration(raw).ok())
}

/// Load configuration from the file named by `GATEWAY_CONFIG`, if set, then
/// apply environment overrides
///
/// # Errors
/// Returns error if the configuration cannot be loaded or is invalid
pub async fn load_config() -> Result<GatewayConfig, ConfigError> {
    let loader = match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) if !path.trim().is_empty() => ConfigLoader::new().with_file(path),
        _ => ConfigLoader::new(),
    };
    loader.load().await
}
