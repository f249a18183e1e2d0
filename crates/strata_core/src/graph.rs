//! Resource graph declared by a stack.
//!
//! The graph is the hand-off format to the provisioning engine. It renders
//! as a CloudFormation-style template: parameters, resources, outputs and
//! any extra top-level sections (conditions, mappings) carried over from
//! included templates.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{CoreError, CoreResult};

const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// Build a logical id from a construct path.
///
/// Segments are reduced to alphanumerics, PascalCased and concatenated, then
/// suffixed with eight hex digits of a SHA-256 over the full path. The same
/// path always produces the same id.
pub fn logical_id(path: &[&str]) -> String {
    let human: String = path.iter().map(|segment| pascal_case(segment)).collect();
    let digest = Sha256::digest(path.join("/").as_bytes());
    let suffix: String = digest.iter().take(4).map(|b| format!("{:02X}", b)).collect();
    format!("{}{}", human, suffix)
}

fn pascal_case(segment: &str) -> String {
    segment
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

/// A declared resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "Type")]
    pub resource_type: String,
    #[serde(rename = "Properties", default, skip_serializing_if = "Map::is_empty")]
    pub properties: Map<String, Value>,
    #[serde(rename = "DependsOn", default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Other resource attributes (`Condition`, `DeletionPolicy`, ...).
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            properties: Map::new(),
            depends_on: Vec::new(),
            attributes: Map::new(),
        }
    }

    /// Set a property.
    pub fn property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Add a dependency on another logical id.
    pub fn depends_on(mut self, logical_id: impl Into<String>) -> Self {
        self.depends_on.push(logical_id.into());
        self
    }

    /// Set a resource attribute outside `Properties`.
    pub fn attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

/// A stack output, optionally exported under a global name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Output {
    #[serde(rename = "Value")]
    pub value: Value,
    #[serde(rename = "Description", default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "Export", default, skip_serializing_if = "Option::is_none")]
    pub export: Option<OutputExport>,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// Export block of an output. The name may be an intrinsic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputExport {
    #[serde(rename = "Name")]
    pub name: Value,
}

impl Output {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            description: None,
            export: None,
            attributes: Map::new(),
        }
    }

    pub fn exported_as(mut self, name: impl Into<String>) -> Self {
        self.export = Some(OutputExport {
            name: Value::String(name.into()),
        });
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Resource graph of one stack.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceGraph {
    stack_name: String,
    description: Option<String>,
    parameters: Vec<(String, Value)>,
    resources: Vec<(String, Resource)>,
    outputs: Vec<(String, Output)>,
    sections: Map<String, Value>,
    metadata: Map<String, Value>,
}

impl ResourceGraph {
    pub fn new(stack_name: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            ..Self::default()
        }
    }

    pub fn stack_name(&self) -> &str {
        &self.stack_name
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = Some(description.into());
    }

    fn duplicate(&self, logical_id: &str) -> CoreError {
        CoreError::DuplicateLogicalId {
            stack: self.stack_name.clone(),
            logical_id: logical_id.to_string(),
        }
    }

    /// Declare a resource under an explicit logical id.
    pub fn add_resource(&mut self, logical_id: impl Into<String>, resource: Resource) -> CoreResult<()> {
        let logical_id = logical_id.into();
        if self.resource(&logical_id).is_some() {
            return Err(self.duplicate(&logical_id));
        }
        self.resources.push((logical_id, resource));
        Ok(())
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.resources
            .iter()
            .find(|(id, _)| id == logical_id)
            .map(|(_, r)| r)
    }

    pub fn resources(&self) -> impl Iterator<Item = (&str, &Resource)> {
        self.resources.iter().map(|(id, r)| (id.as_str(), r))
    }

    /// Resources of one type, in declaration order.
    pub fn resources_of_type<'a>(&'a self, resource_type: &'a str) -> impl Iterator<Item = (&'a str, &'a Resource)> {
        self.resources()
            .filter(move |(_, r)| r.resource_type == resource_type)
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    /// Declare a template parameter.
    pub fn add_parameter(&mut self, logical_id: impl Into<String>, definition: Value) -> CoreResult<()> {
        let logical_id = logical_id.into();
        if self.parameter(&logical_id).is_some() {
            return Err(self.duplicate(&logical_id));
        }
        self.parameters.push((logical_id, definition));
        Ok(())
    }

    pub fn parameter(&self, logical_id: &str) -> Option<&Value> {
        self.parameters
            .iter()
            .find(|(id, _)| id == logical_id)
            .map(|(_, p)| p)
    }

    /// Declare an output.
    pub fn add_output(&mut self, logical_id: impl Into<String>, output: Output) -> CoreResult<()> {
        let logical_id = logical_id.into();
        if self.output(&logical_id).is_some() {
            return Err(self.duplicate(&logical_id));
        }
        self.outputs.push((logical_id, output));
        Ok(())
    }

    pub fn output(&self, logical_id: &str) -> Option<&Output> {
        self.outputs
            .iter()
            .find(|(id, _)| id == logical_id)
            .map(|(_, o)| o)
    }

    pub fn outputs(&self) -> impl Iterator<Item = (&str, &Output)> {
        self.outputs.iter().map(|(id, o)| (id.as_str(), o))
    }

    /// Add an entry to an extra top-level section (`Conditions`, `Mappings`, ...).
    pub fn add_section_entry(&mut self, section: &str, key: impl Into<String>, value: Value) -> CoreResult<()> {
        let key = key.into();
        let entries = self
            .sections
            .entry(section.to_string())
            .or_insert_with(|| Value::Object(Map::new()));

        match entries.as_object_mut() {
            Some(map) if map.contains_key(&key) => Err(CoreError::DuplicateLogicalId {
                stack: self.stack_name.clone(),
                logical_id: format!("{}.{}", section, key),
            }),
            Some(map) => {
                map.insert(key, value);
                Ok(())
            }
            None => Err(CoreError::DuplicateLogicalId {
                stack: self.stack_name.clone(),
                logical_id: section.to_string(),
            }),
        }
    }

    /// Set a whole top-level section that is not a mapping (`Transform`).
    pub fn set_section(&mut self, section: &str, value: Value) -> CoreResult<()> {
        if self.sections.contains_key(section) {
            return Err(self.duplicate(section));
        }
        self.sections.insert(section.to_string(), value);
        Ok(())
    }

    pub fn section(&self, section: &str) -> Option<&Value> {
        self.sections.get(section)
    }

    /// Attach template-level metadata. Later writes replace earlier ones.
    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.metadata.insert(key.into(), value);
    }

    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Render the graph as a template document.
    pub fn to_template(&self) -> CoreResult<Value> {
        let mut template = Map::new();
        template.insert("AWSTemplateFormatVersion".to_string(), json!(TEMPLATE_FORMAT_VERSION));

        if let Some(description) = &self.description {
            template.insert("Description".to_string(), json!(description));
        }

        if !self.metadata.is_empty() {
            template.insert("Metadata".to_string(), Value::Object(self.metadata.clone()));
        }

        for (section, entries) in &self.sections {
            template.insert(section.clone(), entries.clone());
        }

        if !self.parameters.is_empty() {
            let params: Map<String, Value> = self.parameters.iter().cloned().collect();
            template.insert("Parameters".to_string(), Value::Object(params));
        }

        let mut resources = Map::new();
        for (id, resource) in &self.resources {
            resources.insert(id.clone(), serde_json::to_value(resource)?);
        }
        template.insert("Resources".to_string(), Value::Object(resources));

        if !self.outputs.is_empty() {
            let mut outputs = Map::new();
            for (id, output) in &self.outputs {
                outputs.insert(id.clone(), serde_json::to_value(output)?);
            }
            template.insert("Outputs".to_string(), Value::Object(outputs));
        }

        Ok(Value::Object(template))
    }
}
