//! Service configuration, loaded from TOML.
//!
//! Every section falls back to its defaults, so an empty file is a valid configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::metrics::DEFAULT_BUCKETS;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// How this instance announces itself to the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub name: String,
    pub address: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { name: "srv-profile".to_owned(), address: "127.0.0.1".to_owned(), port: 8081 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Upper bounds of the latency histogram buckets, in seconds.
    pub latency_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { latency_buckets: DEFAULT_BUCKETS.to_vec() }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: "profile_lookup=info".to_owned(), format: LogFormat::Pretty }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("server.name must not be empty")]
    EmptyName,
    #[error("server.port must be set")]
    MissingPort,
    #[error("metrics.latency_buckets must be positive and finite, got {0}")]
    InvalidBucket(String),
    #[error("metrics.latency_buckets must not be empty")]
    NoBuckets,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

impl ServiceConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: ServiceConfig = toml::from_str(content)?;
        config.validate().map_err(ConfigError::Validation)?;
        Ok(config)
    }

    /// Returns every problem found, not just the first.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        if self.server.name.trim().is_empty() {
            errors.push(ValidationError::EmptyName);
        }
        if self.server.port == 0 {
            errors.push(ValidationError::MissingPort);
        }
        if self.metrics.latency_buckets.is_empty() {
            errors.push(ValidationError::NoBuckets);
        }
        for bucket in &self.metrics.latency_buckets {
            if !bucket.is_finite() || *bucket <= 0.0 {
                errors.push(ValidationError::InvalidBucket(bucket.to_string()));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Loads and validates configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    ServiceConfig::from_toml(&content)
}
