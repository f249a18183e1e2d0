//! Configuration source resolution and parsing.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{ConfigError, ConfigResult};
use crate::tree::ConfigTree;

/// Environment variable naming the configuration file by default.
pub const DEFAULT_CONFIG_KEY: &str = "APP_CONFIG";

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

fn interpolation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Match ${VARIABLE_NAME}
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("interpolation pattern is valid")
    })
}

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// Detect the format from a file extension.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            "toml" => Ok(Self::Toml),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Loads configuration trees from files named through the environment.
#[derive(Clone)]
pub struct ConfigLoader {
    env: EnvLookup,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a loader reading the process environment.
    pub fn new() -> Self {
        Self {
            env: Arc::new(|key| std::env::var(key).ok()),
        }
    }

    /// Replace the environment lookup (used for interpolation and source
    /// resolution).
    pub fn with_env_lookup(
        mut self,
        lookup: impl Fn(&str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.env = Arc::new(lookup);
        self
    }

    /// Resolve the configuration file path from the environment variable `key`.
    pub fn resolve_source(&self, key: &str) -> ConfigResult<PathBuf> {
        match (self.env)(key) {
            Some(path) if !path.trim().is_empty() => Ok(PathBuf::from(path.trim())),
            _ => Err(ConfigError::SourceNotSet(key.to_string())),
        }
    }

    /// Load the file named by the environment variable `key`.
    pub fn load_from_env(&self, key: &str) -> ConfigResult<ConfigTree> {
        let path = self.resolve_source(key)?;
        debug!("Configuration source {} resolved to {:?}", key, path);
        self.load_file(&path)
    }

    /// Load and interpolate a configuration file.
    pub fn load_file(&self, path: &Path) -> ConfigResult<ConfigTree> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let format = ConfigFormat::from_path(path)?;
        let content = fs::read_to_string(path)?;
        let tree = self.parse_str(&content, format)?;

        info!("Loaded configuration from {:?}", path);
        Ok(tree)
    }

    /// Parse and interpolate configuration content.
    pub fn parse_str(&self, content: &str, format: ConfigFormat) -> ConfigResult<ConfigTree> {
        let raw: Value = match format {
            ConfigFormat::Json => serde_json::from_str(content)?,
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Toml => toml::from_str(content)?,
        };

        let mut path = Vec::new();
        let root = self.interpolate(raw, &mut path)?;
        Ok(ConfigTree::new(root))
    }

    /// Walk the tree and substitute `${VAR}` placeholders in string leaves.
    fn interpolate(&self, value: Value, path: &mut Vec<String>) -> ConfigResult<Value> {
        match value {
            Value::String(s) => self.interpolate_str(&s, path).map(Value::String),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    path.push(index.to_string());
                    out.push(self.interpolate(item, path)?);
                    path.pop();
                }
                Ok(Value::Array(out))
            }
            Value::Object(map) => {
                let mut out = Map::with_capacity(map.len());
                for (key, item) in map {
                    path.push(key.clone());
                    let item = self.interpolate(item, path)?;
                    path.pop();
                    out.insert(key, item);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other),
        }
    }

    fn interpolate_str(&self, input: &str, path: &[String]) -> ConfigResult<String> {
        let pattern = interpolation_pattern();
        if !pattern.is_match(input) {
            return Ok(input.to_string());
        }

        let mut result = String::with_capacity(input.len());
        let mut last = 0;
        for caps in pattern.captures_iter(input) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let value = (self.env)(name.as_str()).ok_or_else(|| {
                ConfigError::MissingEnvironmentVariable {
                    variable: name.as_str().to_string(),
                    path: path.join("."),
                }
            })?;
            result.push_str(&input[last..whole.start()]);
            result.push_str(&value);
            last = whole.end();
        }
        result.push_str(&input[last..]);

        debug!("Interpolated configuration value at {}", path.join("."));
        Ok(result)
    }
}

impl std::fmt::Debug for ConfigLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigLoader").finish_non_exhaustive()
    }
}
