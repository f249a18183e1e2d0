//! Synthesis output.
//!
//! Writes one template per committed stack and a manifest describing the
//! run, then flushes every committed variable and parameter to the durable
//! store so that later runs can resolve them.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::context::AppContext;
use crate::error::CoreResult;

/// Manifest file name inside the output directory.
pub const MANIFEST_FILE: &str = "manifest.json";

const MANIFEST_VERSION: &str = "1";

/// Description of one synthesis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub version: String,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub synthesized_at: DateTime<Utc>,
    pub project: String,
    pub environment: String,
    pub stacks: Vec<ManifestStack>,
}

/// Manifest entry of one stack, in instantiation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestStack {
    pub stack_name: String,
    pub short_name: String,
    pub environment: String,
    pub template_file: String,
    pub resource_count: usize,
    pub exports: Vec<String>,
}

/// What a synthesis call produced.
#[derive(Debug, Clone)]
pub struct SynthReport {
    pub out_dir: PathBuf,
    pub manifest: Manifest,
    pub templates: Vec<PathBuf>,
    pub flushed: usize,
}

impl AppContext {
    /// Write templates and the manifest to `out_dir`, then persist durable
    /// values.
    pub fn synthesize(&self, out_dir: &Path) -> CoreResult<SynthReport> {
        fs::create_dir_all(out_dir)?;

        let mut templates = Vec::new();
        let mut entries = Vec::new();

        for stack in self.stacks() {
            let file_name = format!("{}.template.json", stack.canonical_name());
            let path = out_dir.join(&file_name);
            fs::write(&path, serde_json::to_string_pretty(&stack.template()?)?)?;
            debug!("Wrote {:?}", path);

            entries.push(ManifestStack {
                stack_name: stack.canonical_name().to_string(),
                short_name: stack.descriptor().short_name().to_string(),
                environment: stack.descriptor().environment().to_string(),
                template_file: file_name,
                resource_count: stack.graph().resource_count(),
                exports: stack.parameters().iter().map(|(k, _)| k.to_string()).collect(),
            });
            templates.push(path);
        }

        let manifest = Manifest {
            version: MANIFEST_VERSION.to_string(),
            run_id: self.run_id(),
            started_at: self.started_at(),
            synthesized_at: Utc::now(),
            project: self.project_prefix(),
            environment: self.environment().to_string(),
            stacks: entries,
        };
        fs::write(out_dir.join(MANIFEST_FILE), serde_json::to_string_pretty(&manifest)?)?;

        let flushed = self.flush_durable()?;

        info!(
            "Synthesized {} stacks into {:?} ({} durable values)",
            templates.len(),
            out_dir,
            flushed
        );

        Ok(SynthReport {
            out_dir: out_dir.to_path_buf(),
            manifest,
            templates,
            flushed,
        })
    }

    fn flush_durable(&self) -> CoreResult<usize> {
        let store = self.parameter_store();
        let mut count = 0;
        for (key, value) in self.variables().iter().chain(self.parameters().iter()) {
            store.put(key, value)?;
            count += 1;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use serde_json::json;
    use strata_config::{AppConfig, ConfigTree};
    use tempfile::tempdir;

    use crate::parameters::{InMemoryParameterStore, ParameterStore};
    use crate::stack::{construct_stack, BaseStack, StackBody};
    use crate::error::CoreError;

    struct Repo;

    impl StackBody for Repo {
        type Error = CoreError;

        fn build(&mut self, stack: &mut BaseStack<'_>) -> CoreResult<()> {
            stack.put_variable("RepoName", "demo-app");
            stack.put_parameter("repo", "demo-app")?;
            Ok(())
        }
    }

    #[test]
    fn test_synthesize_writes_templates_and_flushes() {
        let tree = ConfigTree::new(json!({
            "Project": {"Name": "P", "Stage": "Dev", "Account": "1", "Region": "eu-west-1"},
            "Stack": {"Repository": {"Name": "RepositoryStack"}}
        }));
        let store = InMemoryParameterStore::new();
        let mut ctx = AppContext::new(AppConfig::from_tree(tree).unwrap(), Arc::new(store.clone()));
        construct_stack(&mut ctx, "Repository", &mut Repo).unwrap();

        let dir = tempdir().unwrap();
        let report = ctx.synthesize(dir.path()).unwrap();

        assert_eq!(report.templates.len(), 1);
        assert!(dir.path().join("PDev-RepositoryStack.template.json").exists());
        assert!(dir.path().join(MANIFEST_FILE).exists());
        assert_eq!(report.manifest.stacks[0].exports, vec!["PDev-repo".to_string()]);
        assert_eq!(report.flushed, 2);

        assert_eq!(store.get("PDev-repo").unwrap(), Some("demo-app".to_string()));
        assert_eq!(
            store.get("PDev-RepositoryStack/RepoName").unwrap(),
            Some("demo-app".to_string())
        );
    }
}
