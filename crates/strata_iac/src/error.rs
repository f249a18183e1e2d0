//! Error types for the network and template stacks.

use std::path::PathBuf;

use thiserror::Error;

use strata_config::ConfigError;
use strata_core::CoreError;

/// Result type alias for IaC operations.
pub type IacResult<T> = Result<T, IacError>;

/// Errors that can occur while building network or template stacks.
#[derive(Error, Debug)]
pub enum IacError {
    #[error("Fatal topology error: {0}")]
    FatalTopology(String),

    #[error("Ambiguous network import: {0}")]
    AmbiguousImport(String),

    #[error("Network not found: {0}")]
    NetworkNotFound(String),

    #[error("Template not found: {0}")]
    TemplateNotFound(PathBuf),

    #[error("Invalid template {path}: {message}")]
    InvalidTemplate { path: PathBuf, message: String },

    #[error("Template {path} declares no parameter named {key}")]
    UnknownTemplateParameter { path: PathBuf, key: String },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
