//! CLI command definitions.
//!
//! Every subcommand loads the same configuration tree; [`ConfigArgs`] holds
//! the options that locate and adjust it.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::debug;

use strata_config::{AppConfig, ConfigLoader, DEFAULT_CONFIG_KEY};
use strata_core::{AppContext, FileParameterStore, InMemoryParameterStore, ParameterStore};

pub mod stacks;
pub mod synth;
pub mod validate;

/// Strata - layered infrastructure composition
#[derive(Parser)]
#[command(name = "strata")]
#[command(version, about = "Strata - layered infrastructure composition")]
#[command(long_about = r#"
Strata composes deployable infrastructure stacks from one configuration
file. Stacks run in a fixed order and share values through a variable
store; synthesis writes one template per stack plus a manifest.

COMMANDS:
  synth     → Construct every configured stack and write templates
  validate  → Load and validate configuration without synthesizing
  stacks    → List canonical stack names in instantiation order

EXIT CODES:
  0 - Success
  1 - General error
  2 - Configuration error
  3 - Network topology error
  4 - Unresolved variable
  5 - Template error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Construct all stacks and write templates
    Synth(synth::SynthArgs),

    /// Validate configuration
    Validate(validate::ValidateArgs),

    /// List stacks in instantiation order
    Stacks(stacks::StacksArgs),
}

/// Options locating the configuration file.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Configuration file (takes precedence over --config-env)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Environment variable naming the configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_KEY)]
    pub config_env: String,

    /// Override a configuration value (dotted.path=value)
    #[arg(short = 'c', long = "context", value_name = "KEY=VALUE")]
    pub overrides: Vec<String>,

    /// File backing the durable parameter store (in-memory when absent)
    #[arg(long, env = "STRATA_PARAMETERS")]
    pub parameters: Option<PathBuf>,
}

impl ConfigArgs {
    /// Load, override and validate the configuration.
    pub fn load_config(&self) -> Result<AppConfig> {
        let loader = ConfigLoader::new();
        let mut tree = match &self.config {
            Some(path) => loader.load_file(path)?,
            None => loader.load_from_env(&self.config_env)?,
        };

        for assignment in &self.overrides {
            tree.apply_override(assignment)?;
            debug!("Applied override {}", assignment);
        }

        Ok(AppConfig::from_tree(tree)?)
    }

    pub fn parameter_store(&self) -> Arc<dyn ParameterStore> {
        match &self.parameters {
            Some(path) => Arc::new(FileParameterStore::new(path)),
            None => Arc::new(InMemoryParameterStore::new()),
        }
    }

    /// Build a fresh context for one run.
    pub fn context(&self) -> Result<AppContext> {
        let config = self.load_config().context("Failed to load configuration")?;
        Ok(AppContext::new(config, self.parameter_store()))
    }
}
