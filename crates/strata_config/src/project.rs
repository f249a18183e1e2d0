//! Project section and the validated application configuration.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::tree::{ConfigTree, StackConfig};

/// Top-level section describing the project and its target environment.
pub const PROJECT_SECTION: &str = "Project";

/// Top-level section holding one entry per stack.
pub const STACK_SECTION: &str = "Stack";

const REQUIRED_PROJECT_FIELDS: [&str; 4] = ["Name", "Stage", "Account", "Region"];

/// Project identity and deployment target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProjectConfig {
    pub name: String,
    pub stage: String,
    pub account: String,
    pub region: String,
    #[serde(default)]
    pub profile: Option<String>,
}

impl ProjectConfig {
    /// Project-wide naming prefix (`<Name><Stage>`).
    pub fn prefix(&self) -> String {
        format!("{}{}", self.name, self.stage)
    }
}

/// Validated configuration for one synthesis run.
#[derive(Debug, Clone)]
pub struct AppConfig {
    project: ProjectConfig,
    tree: ConfigTree,
}

impl AppConfig {
    /// Validate the structure of a tree and extract the project section.
    pub fn from_tree(tree: ConfigTree) -> ConfigResult<Self> {
        let mut project = tree.section(PROJECT_SECTION)?.clone();

        for field in REQUIRED_PROJECT_FIELDS {
            match project.get(field) {
                Some(Value::String(s)) if !s.trim().is_empty() => {}
                Some(Value::String(_)) | Some(Value::Null) | None => {
                    return Err(ConfigError::MissingField {
                        section: PROJECT_SECTION.to_string(),
                        field: field.to_string(),
                    })
                }
                // Account ids arrive as numbers from `-c` overrides and unquoted YAML.
                Some(Value::Number(n)) => {
                    let text = n.to_string();
                    project.insert(field.to_string(), Value::String(text));
                }
                Some(other) => {
                    return Err(ConfigError::InvalidValue {
                        section: PROJECT_SECTION.to_string(),
                        field: field.to_string(),
                        message: format!("expected a string, found {}", other),
                    })
                }
            }
        }

        let project: ProjectConfig = serde_json::from_value(Value::Object(project))?;
        tree.section(STACK_SECTION)?;

        debug!(
            "Validated configuration for project {} ({} stacks)",
            project.prefix(),
            tree.section(STACK_SECTION).map(|s| s.len()).unwrap_or(0)
        );

        Ok(Self { project, tree })
    }

    /// Project section.
    pub fn project(&self) -> &ProjectConfig {
        &self.project
    }

    /// Full configuration tree.
    pub fn tree(&self) -> &ConfigTree {
        &self.tree
    }

    /// Stack section keys in declaration order.
    pub fn stack_sections(&self) -> Vec<&str> {
        self.tree
            .section(STACK_SECTION)
            .map(|stacks| stacks.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Check whether a stack section is configured.
    pub fn has_stack(&self, section: &str) -> bool {
        self.tree
            .section(STACK_SECTION)
            .map(|stacks| stacks.contains_key(section))
            .unwrap_or(false)
    }

    /// Extract the configuration slice of one stack.
    pub fn stack(&self, section: &str) -> ConfigResult<StackConfig> {
        let value = self
            .tree
            .section(STACK_SECTION)?
            .get(section)
            .ok_or_else(|| ConfigError::MissingSection(format!("{}.{}", STACK_SECTION, section)))?;

        StackConfig::from_value(section, value)
    }
}
