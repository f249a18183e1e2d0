//! Error types for the core module.

use thiserror::Error;

use strata_config::ConfigError;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur while composing stacks.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Unresolved variable: {0} was never exported in this run and is not in the parameter store")]
    UnresolvedVariable(String),

    #[error("Invalid stack name: {0}")]
    InvalidStackName(String),

    #[error("Stack already registered: {0}")]
    DuplicateStack(String),

    #[error("Duplicate logical id {logical_id} in stack {stack}")]
    DuplicateLogicalId { stack: String, logical_id: String },

    #[error("Parameter store error: {0}")]
    ParameterStore(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
