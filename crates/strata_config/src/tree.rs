//! Typed access to the configuration tree and per-stack slices.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{ConfigError, ConfigResult};

/// Field holding the short stack name in every stack section.
pub const STACK_NAME_FIELD: &str = "Name";

/// Optional field overriding the deployment region of one stack.
pub const UPDATE_REGION_FIELD: &str = "UpdateRegionName";

/// Parsed configuration tree.
///
/// The tree is a plain JSON value regardless of the source format. Paths are
/// dotted (`Stack.VpcInfra.VPCCIDR`).
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigTree {
    root: Value,
}

impl ConfigTree {
    /// Wrap an already parsed value.
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    /// Get the root value.
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Look up a value by dotted path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .filter(|segment| !segment.is_empty())
            .try_fold(&self.root, |node, segment| node.get(segment))
    }

    /// Check whether a path exists.
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Get a mapping by dotted path, failing if absent or not a mapping.
    pub fn section(&self, path: &str) -> ConfigResult<&Map<String, Value>> {
        self.get(path)
            .and_then(Value::as_object)
            .ok_or_else(|| ConfigError::MissingSection(path.to_string()))
    }

    /// Set a value at a dotted path, creating intermediate mappings.
    pub fn set_path(&mut self, path: &str, value: Value) -> ConfigResult<()> {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(ConfigError::InvalidOverride(format!(
                "empty segment in path '{}'",
                path
            )));
        }

        let (last, parents) = segments
            .split_last()
            .ok_or_else(|| ConfigError::InvalidOverride("empty path".to_string()))?;

        let mut node = &mut self.root;
        for segment in parents {
            if !node.is_object() {
                return Err(ConfigError::InvalidOverride(format!(
                    "'{}' crosses a non-mapping value at '{}'",
                    path, segment
                )));
            }
            node = node
                .as_object_mut()
                .map(|map| {
                    map.entry(segment.to_string())
                        .or_insert_with(|| Value::Object(Map::new()))
                })
                .ok_or_else(|| ConfigError::InvalidOverride(path.to_string()))?;
        }

        match node.as_object_mut() {
            Some(map) => {
                map.insert(last.to_string(), value);
                Ok(())
            }
            None => Err(ConfigError::InvalidOverride(format!(
                "parent of '{}' is not a mapping",
                path
            ))),
        }
    }

    /// Apply a `key=value` override. The value is parsed as JSON when
    /// possible and kept as a string otherwise.
    pub fn apply_override(&mut self, assignment: &str) -> ConfigResult<()> {
        let (path, raw) = assignment.split_once('=').ok_or_else(|| {
            ConfigError::InvalidOverride(format!("expected key=value, got '{}'", assignment))
        })?;

        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        self.set_path(path.trim(), value)
    }
}

/// Configuration slice of one stack (`Stack.<Section>`).
#[derive(Debug, Clone, PartialEq)]
pub struct StackConfig {
    section: String,
    name: String,
    values: Map<String, Value>,
}

impl StackConfig {
    /// Build a slice from the value found under `Stack.<section>`.
    pub fn from_value(section: impl Into<String>, value: &Value) -> ConfigResult<Self> {
        let section = section.into();
        let values = value
            .as_object()
            .cloned()
            .ok_or_else(|| ConfigError::MissingSection(format!("Stack.{}", section)))?;

        let name = match values.get(STACK_NAME_FIELD) {
            Some(Value::String(name)) if !name.trim().is_empty() => name.trim().to_string(),
            Some(_) => {
                return Err(ConfigError::invalid_value(
                    &section,
                    STACK_NAME_FIELD,
                    "must be a non-empty string",
                ))
            }
            None => return Err(ConfigError::missing_field(&section, STACK_NAME_FIELD)),
        };

        Ok(Self {
            section,
            name,
            values,
        })
    }

    /// Section key under `Stack` (e.g. `VpcInfra`).
    pub fn section(&self) -> &str {
        &self.section
    }

    /// Short stack name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Region override for this stack, if configured.
    pub fn update_region(&self) -> Option<&str> {
        self.optional_str(UPDATE_REGION_FIELD)
    }

    /// Raw field map.
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Get a raw field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Check whether a field is present and not null.
    pub fn has(&self, field: &str) -> bool {
        matches!(self.values.get(field), Some(v) if !v.is_null())
    }

    /// Get a required string field.
    pub fn require_str(&self, field: &str) -> ConfigResult<&str> {
        match self.values.get(field) {
            Some(Value::String(s)) => Ok(s.as_str()),
            Some(Value::Null) | None => Err(ConfigError::missing_field(&self.section, field)),
            Some(other) => Err(ConfigError::invalid_value(
                &self.section,
                field,
                format!("expected a string, found {}", other),
            )),
        }
    }

    /// Get an optional, non-empty string field.
    pub fn optional_str(&self, field: &str) -> Option<&str> {
        self.values
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Get a required unsigned integer field. Numeric strings are accepted
    /// so that interpolated values work.
    pub fn require_u32(&self, field: &str) -> ConfigResult<u32> {
        self.optional_u32(field)?
            .ok_or_else(|| ConfigError::missing_field(&self.section, field))
    }

    /// Get an optional unsigned integer field.
    pub fn optional_u32(&self, field: &str) -> ConfigResult<Option<u32>> {
        let value = match self.values.get(field) {
            None | Some(Value::Null) => return Ok(None),
            Some(value) => value,
        };

        let parsed = match value {
            Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
            Value::String(s) => s.trim().parse::<u32>().ok(),
            _ => None,
        };

        parsed.map(Some).ok_or_else(|| {
            ConfigError::invalid_value(
                &self.section,
                field,
                format!("expected an unsigned integer, found {}", value),
            )
        })
    }

    /// Deserialize an optional nested field into a typed value.
    pub fn deserialize<T: DeserializeOwned>(&self, field: &str) -> ConfigResult<Option<T>> {
        match self.values.get(field) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| ConfigError::invalid_value(&self.section, field, e.to_string())),
        }
    }

    /// Deserialize a required nested field into a typed value.
    pub fn require<T: DeserializeOwned>(&self, field: &str) -> ConfigResult<T> {
        self.deserialize(field)?
            .ok_or_else(|| ConfigError::missing_field(&self.section, field))
    }
}
