//! Application context for one synthesis run.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use strata_config::{AppConfig, ConfigLoader, StackConfig};

use crate::environment::DeploymentEnvironment;
use crate::error::{CoreError, CoreResult};
use crate::parameters::ParameterStore;
use crate::stack::StackArtifact;
use crate::variables::VariableStore;

/// Owns the configuration, the variable store and the committed stacks of a
/// synthesis run. Every stack construction receives it explicitly.
pub struct AppContext {
    run_id: Uuid,
    started_at: DateTime<Utc>,
    config: AppConfig,
    environment: DeploymentEnvironment,
    variables: VariableStore,
    parameters: VariableStore,
    store: Arc<dyn ParameterStore>,
    stacks: Vec<StackArtifact>,
}

impl AppContext {
    pub fn new(config: AppConfig, store: Arc<dyn ParameterStore>) -> Self {
        let environment = DeploymentEnvironment::from_project(config.project());
        let run_id = Uuid::new_v4();

        info!(
            "Starting synthesis run {} for {} in {} (parameter store: {})",
            run_id,
            config.project().prefix(),
            environment,
            store.describe()
        );

        Self {
            run_id,
            started_at: Utc::now(),
            config,
            environment,
            variables: VariableStore::new(),
            parameters: VariableStore::new(),
            store,
            stacks: Vec::new(),
        }
    }

    /// Build a context from the file named by environment variable `key`.
    pub fn from_env(key: &str, store: Arc<dyn ParameterStore>) -> CoreResult<Self> {
        let tree = ConfigLoader::new().load_from_env(key)?;
        Ok(Self::new(AppConfig::from_tree(tree)?, store))
    }

    /// Build a context from an explicit configuration file.
    pub fn from_file(path: &Path, store: Arc<dyn ParameterStore>) -> CoreResult<Self> {
        let tree = ConfigLoader::new().load_file(path)?;
        Ok(Self::new(AppConfig::from_tree(tree)?, store))
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Project-wide naming prefix.
    pub fn project_prefix(&self) -> String {
        self.config.project().prefix()
    }

    pub fn environment(&self) -> &DeploymentEnvironment {
        &self.environment
    }

    pub fn stack_config(&self, section: &str) -> CoreResult<StackConfig> {
        Ok(self.config.stack(section)?)
    }

    pub fn parameter_store(&self) -> &dyn ParameterStore {
        self.store.as_ref()
    }

    /// Write a variable directly. Last write wins.
    pub fn put_variable(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        debug!("Variable {} set", key);
        self.variables.put(key, value);
    }

    /// Read a variable written in this run, falling back to the durable
    /// store for keys this run never wrote.
    pub fn get_variable(&self, key: &str) -> CoreResult<String> {
        if let Some(value) = self.variables.get(key) {
            return Ok(value.to_string());
        }
        self.durable(key)
    }

    /// Read a published parameter or export, with the same fallback as
    /// [`AppContext::get_variable`].
    pub fn get_parameter(&self, key: &str) -> CoreResult<String> {
        if let Some(value) = self.parameters.get(key) {
            return Ok(value.to_string());
        }
        self.durable(key)
    }

    fn durable(&self, key: &str) -> CoreResult<String> {
        match self.store.get(key)? {
            Some(value) => {
                debug!("Resolved {} from {}", key, self.store.describe());
                Ok(value)
            }
            None => Err(CoreError::UnresolvedVariable(key.to_string())),
        }
    }

    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    pub fn parameters(&self) -> &VariableStore {
        &self.parameters
    }

    /// Register a constructed stack and make its staged values visible.
    pub fn commit(&mut self, artifact: StackArtifact) -> CoreResult<()> {
        if self.stack(artifact.canonical_name()).is_some() {
            return Err(CoreError::DuplicateStack(artifact.canonical_name().to_string()));
        }

        self.variables.merge(artifact.variables());
        self.parameters.merge(artifact.parameters());
        debug!(
            "Committed {} ({} variables, {} parameters)",
            artifact.canonical_name(),
            artifact.variables().len(),
            artifact.parameters().len()
        );
        self.stacks.push(artifact);
        Ok(())
    }

    /// Committed stacks in instantiation order.
    pub fn stacks(&self) -> &[StackArtifact] {
        &self.stacks
    }

    pub fn stack(&self, canonical_name: &str) -> Option<&StackArtifact> {
        self.stacks
            .iter()
            .find(|s| s.canonical_name() == canonical_name)
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("run_id", &self.run_id)
            .field("project", &self.config.project().prefix())
            .field("environment", &self.environment)
            .field("stacks", &self.stacks.len())
            .finish()
    }
}
