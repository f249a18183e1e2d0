//! # strata_core
//!
//! Application context and stack lifecycle for Strata.
//!
//! This crate provides the shared state of a synthesis run and the base
//! lifecycle every stack goes through.
//!
//! # Architecture
//!
//! - **AppContext**: configuration, variable store and committed stacks of one run
//! - **BaseStack**: frozen stack identity, staged variables and exports
//! - **StackBody**: caller-supplied construction logic
//! - **ResourceGraph**: resources, parameters and outputs declared by a stack
//! - **ParameterStore**: durable values shared across runs
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use strata_core::{construct_stack, AppContext, BaseStack, CoreResult, CoreError,
//!     InMemoryParameterStore, StackBody};
//!
//! struct Repo;
//!
//! impl StackBody for Repo {
//!     type Error = CoreError;
//!
//!     fn build(&mut self, stack: &mut BaseStack<'_>) -> CoreResult<()> {
//!         let name = stack.config().require_str("RepoName")?.to_string();
//!         stack.put_parameter("repo", name)?;
//!         Ok(())
//!     }
//! }
//!
//! let mut ctx = AppContext::from_env("APP_CONFIG", Arc::new(InMemoryParameterStore::new()))?;
//! construct_stack(&mut ctx, "Repository", &mut Repo)?;
//! ctx.synthesize("cdk.out".as_ref())?;
//! ```

pub mod context;
pub mod environment;
pub mod error;
pub mod graph;
pub mod parameters;
pub mod stack;
pub mod synth;
pub mod variables;

pub use context::AppContext;
pub use environment::DeploymentEnvironment;
pub use error::{CoreError, CoreResult};
pub use graph::{logical_id, Output, OutputExport, Resource, ResourceGraph};
pub use parameters::{FileParameterStore, InMemoryParameterStore, ParameterStore};
pub use stack::{
    construct_stack, BaseStack, StackArtifact, StackBody, StackDescriptor, PARAMETER_RESOURCE_TYPE,
};
pub use synth::{Manifest, ManifestStack, SynthReport, MANIFEST_FILE};
pub use variables::{qualify, VariableStore};
