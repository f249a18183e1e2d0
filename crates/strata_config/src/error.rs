//! Error types for configuration loading.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while loading or reading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration source not set: environment variable {0} is empty or missing")]
    SourceNotSet(String),

    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Unsupported configuration format: {0}")]
    UnsupportedFormat(String),

    #[error("Missing configuration section: {0}")]
    MissingSection(String),

    #[error("Missing required field {field} in {section}")]
    MissingField { section: String, field: String },

    #[error("Invalid value for {section}.{field}: {message}")]
    InvalidValue {
        section: String,
        field: String,
        message: String,
    },

    #[error("Environment variable {variable} referenced at {path} is not set")]
    MissingEnvironmentVariable { variable: String, path: String },

    #[error("Invalid override: {0}")]
    InvalidOverride(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ConfigError {
    pub(crate) fn missing_field(section: impl Into<String>, field: impl Into<String>) -> Self {
        Self::MissingField {
            section: section.into(),
            field: field.into(),
        }
    }

    pub(crate) fn invalid_value(
        section: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            section: section.into(),
            field: field.into(),
            message: message.into(),
        }
    }
}
