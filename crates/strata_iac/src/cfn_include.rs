//! Template inclusion stacks.
//!
//! [`TemplateStackHooks::load_template_descriptor`] either skips inclusion
//! or names a template plus parameter overrides. When present, the template
//! is loaded, each override replaces the `Default` of the matching
//! parameter, and the template's sections are merged into the stack graph
//! under their original logical ids. [`TemplateStackHooks::on_ready`] always
//! runs afterwards.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info};

use strata_core::{BaseStack, Output, Resource, StackBody};

use crate::error::{IacError, IacResult};
use crate::template::CfnTemplate;

/// Mapping sections merged entry by entry.
const MERGED_SECTIONS: [&str; 3] = ["Conditions", "Mappings", "Rules"];

/// One parameter override.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateParameter {
    pub key: String,
    pub value: Value,
}

/// Template path plus ordered parameter overrides.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TemplateDescriptor {
    pub template_path: PathBuf,
    #[serde(default)]
    pub parameters: Vec<TemplateParameter>,
}

impl TemplateDescriptor {
    pub fn new(template_path: impl Into<PathBuf>) -> Self {
        Self {
            template_path: template_path.into(),
            parameters: Vec::new(),
        }
    }

    /// Append an override. Later overrides of the same key win.
    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.push(TemplateParameter {
            key: key.into(),
            value: value.into(),
        });
        self
    }
}

/// Result of [`TemplateStackHooks::load_template_descriptor`].
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateSource {
    /// Skip inclusion.
    Absent,
    Include(TemplateDescriptor),
}

/// Handle to an included template, after overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct IncludedTemplate {
    path: PathBuf,
    parameters: Map<String, Value>,
    resources: Map<String, Value>,
    outputs: Map<String, Value>,
}

impl IncludedTemplate {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn parameter(&self, logical_id: &str) -> Option<&Value> {
        self.parameters.get(logical_id)
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Value> {
        self.resources.get(logical_id)
    }

    pub fn output(&self, logical_id: &str) -> Option<&Value> {
        self.outputs.get(logical_id)
    }

    pub fn resource_ids(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }
}

/// Extension points of a template inclusion stack.
pub trait TemplateStackHooks {
    fn load_template_descriptor(&mut self, stack: &BaseStack<'_>) -> IacResult<TemplateSource>;

    /// Runs once, with the included template when there is one.
    fn on_ready(&mut self, stack: &mut BaseStack<'_>, template: Option<&IncludedTemplate>) -> IacResult<()>;
}

/// Load a template, apply overrides and merge it into `stack`.
pub fn include_template(stack: &mut BaseStack<'_>, descriptor: &TemplateDescriptor) -> IacResult<IncludedTemplate> {
    let mut template = CfnTemplate::load(&descriptor.template_path)?;

    for parameter in &descriptor.parameters {
        template.set_parameter_default(&parameter.key, parameter.value.clone())?;
        debug!("{}: parameter {} overridden", stack.canonical_name(), parameter.key);
    }

    merge_into(stack, &template)?;

    let included = IncludedTemplate {
        path: template.path().to_path_buf(),
        parameters: template.parameters(),
        resources: template.resources(),
        outputs: template.outputs(),
    };

    info!(
        "{}: included {} ({} resources, {} overrides)",
        stack.canonical_name(),
        included.path.display(),
        included.resource_count(),
        descriptor.parameters.len()
    );
    Ok(included)
}

fn merge_into(stack: &mut BaseStack<'_>, template: &CfnTemplate) -> IacResult<()> {
    let path = template.path();
    let graph = stack.graph_mut();

    if let Some(Value::String(description)) = template.body().get("Description") {
        graph.set_description(description.clone());
    }

    if let Some(Value::Object(metadata)) = template.body().get("Metadata") {
        for (key, value) in metadata {
            graph.set_metadata(key.clone(), value.clone());
        }
    }

    if let Some(transform) = template.body().get("Transform") {
        graph.set_section("Transform", transform.clone())?;
    }

    for section in MERGED_SECTIONS {
        for (key, value) in template.section(section) {
            graph.add_section_entry(section, key, value)?;
        }
    }

    for (id, definition) in template.parameters() {
        graph.add_parameter(id, definition)?;
    }

    for (id, definition) in template.resources() {
        let resource = parse_resource(path, &id, definition)?;
        graph.add_resource(id, resource)?;
    }

    for (id, definition) in template.outputs() {
        let output: Output = serde_json::from_value(definition).map_err(|e| IacError::InvalidTemplate {
            path: path.to_path_buf(),
            message: format!("output {}: {}", id, e),
        })?;
        graph.add_output(id, output)?;
    }

    Ok(())
}

fn parse_resource(path: &Path, id: &str, mut definition: Value) -> IacResult<Resource> {
    // DependsOn may be a single id.
    if let Some(Value::String(single)) = definition.get("DependsOn").cloned() {
        definition["DependsOn"] = json!([single]);
    }

    serde_json::from_value(definition).map_err(|e| IacError::InvalidTemplate {
        path: path.to_path_buf(),
        message: format!("resource {}: {}", id, e),
    })
}

/// Template stack body driving a set of hooks.
pub struct TemplateStack<H> {
    hooks: H,
    included: Option<IncludedTemplate>,
}

impl<H: TemplateStackHooks> TemplateStack<H> {
    pub fn new(hooks: H) -> Self {
        Self { hooks, included: None }
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn included(&self) -> Option<&IncludedTemplate> {
        self.included.as_ref()
    }
}

impl<H: TemplateStackHooks> StackBody for TemplateStack<H> {
    type Error = IacError;

    fn build(&mut self, stack: &mut BaseStack<'_>) -> IacResult<()> {
        let included = match self.hooks.load_template_descriptor(stack)? {
            TemplateSource::Absent => {
                debug!("{}: no template to include", stack.canonical_name());
                None
            }
            TemplateSource::Include(descriptor) => Some(include_template(stack, &descriptor)?),
        };

        self.hooks.on_ready(stack, included.as_ref())?;
        self.included = included;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_from_config() {
        let descriptor: TemplateDescriptor = serde_json::from_value(json!({
            "TemplatePath": "templates/bucket.yaml",
            "Parameters": [
                {"Key": "Env", "Value": "prod"},
                {"Key": "Retention", "Value": 30}
            ]
        }))
        .unwrap();
        assert_eq!(descriptor.template_path, PathBuf::from("templates/bucket.yaml"));
        assert_eq!(descriptor.parameters.len(), 2);
        assert_eq!(descriptor.parameters[1].value, json!(30));
    }

    #[test]
    fn test_single_depends_on_normalized() {
        let resource = parse_resource(
            Path::new("t.json"),
            "Topic",
            json!({"Type": "AWS::SNS::Topic", "DependsOn": "Bucket", "Condition": "IsProd"}),
        )
        .unwrap();
        assert_eq!(resource.depends_on, vec!["Bucket".to_string()]);
        assert_eq!(resource.attributes.get("Condition"), Some(&json!("IsProd")));
    }
}
