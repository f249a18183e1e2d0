//! Stack lifecycle.
//!
//! A stack is built in three steps: [`BaseStack::new`] freezes the stack
//! identity from the context and the stack's configuration slice, a
//! [`StackBody`] declares resources against it, and [`BaseStack::finish`]
//! turns the result into a [`StackArtifact`] that the context commits.
//!
//! Variables and parameters written during construction are staged on the
//! stack. Other stacks only see them once the artifact has been committed,
//! so a stack that fails half way leaves nothing behind.

use serde_json::{json, Value};
use tracing::{debug, info};

use strata_config::StackConfig;

use crate::context::AppContext;
use crate::environment::DeploymentEnvironment;
use crate::error::{CoreError, CoreResult};
use crate::graph::{logical_id, Output, Resource, ResourceGraph};
use crate::variables::{qualify, VariableStore};

const MAX_STACK_NAME_LEN: usize = 128;

/// Resource type used for project parameters.
pub const PARAMETER_RESOURCE_TYPE: &str = "AWS::SSM::Parameter";

/// Frozen identity of one stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackDescriptor {
    short_name: String,
    prefix: String,
    canonical_name: String,
    environment: DeploymentEnvironment,
}

impl StackDescriptor {
    /// Build a descriptor, validating the canonical name.
    ///
    /// Canonical names must start with a letter, contain only ASCII
    /// alphanumerics and hyphens, and stay within 128 characters.
    pub fn new(
        prefix: impl Into<String>,
        short_name: impl Into<String>,
        environment: DeploymentEnvironment,
    ) -> CoreResult<Self> {
        let prefix = prefix.into();
        let short_name = short_name.into();
        let canonical_name = format!("{}-{}", prefix, short_name);

        let starts_with_letter = canonical_name
            .chars()
            .next()
            .map(|c| c.is_ascii_alphabetic())
            .unwrap_or(false);
        let valid_chars = canonical_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');

        if prefix.is_empty()
            || short_name.is_empty()
            || !starts_with_letter
            || !valid_chars
            || canonical_name.len() > MAX_STACK_NAME_LEN
        {
            return Err(CoreError::InvalidStackName(canonical_name));
        }

        Ok(Self {
            short_name,
            prefix,
            canonical_name,
            environment,
        })
    }

    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `<prefix>-<shortName>`.
    pub fn canonical_name(&self) -> &str {
        &self.canonical_name
    }

    pub fn environment(&self) -> &DeploymentEnvironment {
        &self.environment
    }

    /// In-run variable key `<canonical>/<name>`.
    pub fn variable_key(&self, name: &str) -> String {
        qualify(&self.canonical_name, name)
    }

    /// Durable export key `<canonical>-<name>`.
    pub fn export_name(&self, name: &str) -> String {
        format!("{}-{}", self.canonical_name, name)
    }

    /// Project-wide parameter key `<prefix>-<name>`.
    pub fn parameter_name(&self, name: &str) -> String {
        format!("{}-{}", self.prefix, name)
    }
}

impl std::fmt::Display for StackDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.canonical_name, self.environment)
    }
}

/// A stack under construction.
pub struct BaseStack<'a> {
    ctx: &'a AppContext,
    descriptor: StackDescriptor,
    config: StackConfig,
    graph: ResourceGraph,
    variables: VariableStore,
    parameters: VariableStore,
}

impl<'a> BaseStack<'a> {
    /// Freeze the stack identity. The region comes from the project unless
    /// the slice carries an `UpdateRegionName` override.
    pub fn new(ctx: &'a AppContext, config: StackConfig) -> CoreResult<Self> {
        let environment = match config.update_region() {
            Some(region) => ctx.environment().with_region(region),
            None => ctx.environment().clone(),
        };
        let descriptor = StackDescriptor::new(ctx.project_prefix(), config.name(), environment)?;
        let graph = ResourceGraph::new(descriptor.canonical_name());

        debug!("Constructing stack {}", descriptor);

        Ok(Self {
            ctx,
            descriptor,
            config,
            graph,
            variables: VariableStore::new(),
            parameters: VariableStore::new(),
        })
    }

    pub fn context(&self) -> &'a AppContext {
        self.ctx
    }

    pub fn descriptor(&self) -> &StackDescriptor {
        &self.descriptor
    }

    pub fn canonical_name(&self) -> &str {
        self.descriptor.canonical_name()
    }

    pub fn environment(&self) -> &DeploymentEnvironment {
        self.descriptor.environment()
    }

    /// This stack's configuration slice.
    pub fn config(&self) -> &StackConfig {
        &self.config
    }

    pub fn graph(&self) -> &ResourceGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut ResourceGraph {
        &mut self.graph
    }

    /// Declare a resource under a logical id derived from `path`.
    pub fn declare(&mut self, path: &[&str], resource: Resource) -> CoreResult<String> {
        let id = logical_id(path);
        debug!("{}: declare {} ({})", self.canonical_name(), id, resource.resource_type);
        self.graph.add_resource(id.clone(), resource)?;
        Ok(id)
    }

    /// Declare a resource under an explicit logical id.
    pub fn declare_as(&mut self, logical_id: &str, resource: Resource) -> CoreResult<()> {
        debug!("{}: declare {} ({})", self.canonical_name(), logical_id, resource.resource_type);
        self.graph.add_resource(logical_id, resource)
    }

    /// Stage a variable under `<canonical>/<name>`, returning the key.
    pub fn put_variable(&mut self, name: &str, value: impl Into<String>) -> String {
        let key = self.descriptor.variable_key(name);
        self.variables.put(key.clone(), value);
        key
    }

    /// Read one of this stack's own variables.
    pub fn get_variable(&self, name: &str) -> CoreResult<String> {
        self.get_qualified_variable(&self.descriptor.variable_key(name))
    }

    /// Read any variable by qualified key, staged values first.
    pub fn get_qualified_variable(&self, key: &str) -> CoreResult<String> {
        match self.variables.get(key) {
            Some(value) => Ok(value.to_string()),
            None => self.ctx.get_variable(key),
        }
    }

    /// Publish a value under `<canonical>-<name>` for later stacks and later
    /// runs. The value is also declared as an exported output.
    pub fn export_output(&mut self, name: &str, value: impl Into<String>) -> CoreResult<String> {
        let value = value.into();
        let key = self.descriptor.export_name(name);

        self.graph
            .add_output(name, Output::new(json!(value)).exported_as(key.clone()))?;
        self.parameters.put(key.clone(), value);

        debug!("{}: export {}", self.canonical_name(), key);
        Ok(key)
    }

    /// Publish a project-wide parameter under `<prefix>-<name>` and declare
    /// the parameter resource that carries it.
    pub fn put_parameter(&mut self, name: &str, value: impl Into<String>) -> CoreResult<String> {
        let value = value.into();
        let key = self.descriptor.parameter_name(name);

        let resource = Resource::new(PARAMETER_RESOURCE_TYPE)
            .property("Name", json!(key))
            .property("Type", json!("String"))
            .property("Value", json!(value));
        self.declare(&[name, "Parameter"], resource)?;
        self.parameters.put(key.clone(), value);

        Ok(key)
    }

    /// Read a published value by fully qualified key.
    pub fn get_parameter(&self, key: &str) -> CoreResult<String> {
        match self.parameters.get(key) {
            Some(value) => Ok(value.to_string()),
            None => self.ctx.get_parameter(key),
        }
    }

    /// Render a reference to an attribute of a resource in this stack.
    pub fn token(&self, logical_id: &str, attribute: &str) -> String {
        format!("${{Token[{}.{}.{}]}}", self.canonical_name(), logical_id, attribute)
    }

    /// Close construction.
    pub fn finish(self) -> StackArtifact {
        StackArtifact {
            descriptor: self.descriptor,
            graph: self.graph,
            variables: self.variables,
            parameters: self.parameters,
        }
    }
}

/// A fully constructed stack, ready to be committed to the context.
#[derive(Debug, Clone)]
pub struct StackArtifact {
    descriptor: StackDescriptor,
    graph: ResourceGraph,
    variables: VariableStore,
    parameters: VariableStore,
}

impl StackArtifact {
    pub fn descriptor(&self) -> &StackDescriptor {
        &self.descriptor
    }

    pub fn canonical_name(&self) -> &str {
        self.descriptor.canonical_name()
    }

    pub fn graph(&self) -> &ResourceGraph {
        &self.graph
    }

    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    pub fn parameters(&self) -> &VariableStore {
        &self.parameters
    }

    /// Rendered template document.
    pub fn template(&self) -> CoreResult<Value> {
        self.graph.to_template()
    }
}

/// Caller-supplied construction logic for a stack.
pub trait StackBody {
    type Error: From<CoreError>;

    /// Declare resources. Runs exactly once per construction.
    fn build(&mut self, stack: &mut BaseStack<'_>) -> Result<(), Self::Error>;
}

/// Construct the stack configured under `Stack.<section>` and commit it.
///
/// Nothing is registered on the context unless `body` succeeds.
pub fn construct_stack<B: StackBody>(
    ctx: &mut AppContext,
    section: &str,
    body: &mut B,
) -> Result<StackDescriptor, B::Error> {
    let config = ctx.stack_config(section)?;

    let artifact = {
        let mut stack = BaseStack::new(ctx, config)?;
        body.build(&mut stack)?;
        stack.finish()
    };

    let descriptor = artifact.descriptor().clone();
    ctx.commit(artifact)?;

    info!(
        "Constructed stack {} ({} resources)",
        descriptor.canonical_name(),
        ctx.stack(descriptor.canonical_name())
            .map(|s| s.graph().resource_count())
            .unwrap_or(0)
    );
    Ok(descriptor)
}
