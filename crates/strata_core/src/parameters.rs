//! Durable parameter stores.
//!
//! A parameter store is the only channel between independent synthesis runs.
//! Values are written at synthesis time and read back by name when a key was
//! not produced in the current run.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::{CoreError, CoreResult};

/// Key/value store reachable by name across synthesis runs.
#[cfg_attr(test, mockall::automock)]
pub trait ParameterStore: Send + Sync {
    /// Read a value by fully qualified key.
    fn get(&self, key: &str) -> CoreResult<Option<String>>;

    /// Write a value. Keys are never deleted; a later write replaces the value.
    fn put(&self, key: &str, value: &str) -> CoreResult<()>;

    /// Human readable description used in logs.
    fn describe(&self) -> String;
}

/// In-memory parameter store, for tests and dry runs.
#[derive(Clone, Default)]
pub struct InMemoryParameterStore {
    entries: Arc<RwLock<BTreeMap<String, String>>>,
}

impl InMemoryParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value, as if written by an earlier run.
    pub fn with_value(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.write().insert(key.into(), value.into());
        self
    }

    /// Snapshot of all stored values.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl ParameterStore for InMemoryParameterStore {
    fn get(&self, key: &str) -> CoreResult<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> CoreResult<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn describe(&self) -> String {
        "in-memory".to_string()
    }
}

impl std::fmt::Debug for InMemoryParameterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryParameterStore")
            .field("entries", &self.entries.read().len())
            .finish()
    }
}

/// Parameter store persisted as a JSON object on disk.
///
/// The file is read on first access and rewritten through a temporary file
/// on every `put`.
pub struct FileParameterStore {
    path: PathBuf,
    cache: RwLock<Option<BTreeMap<String, String>>>,
}

impl FileParameterStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> CoreResult<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&content).map_err(|e| {
            CoreError::ParameterStore(format!("{} is not a valid parameter file: {}", self.path.display(), e))
        })
    }

    /// Run `f` against the cached entries, loading them on first use.
    fn with_entries<R>(&self, f: impl FnOnce(&BTreeMap<String, String>) -> R) -> CoreResult<R> {
        if let Some(entries) = self.cache.read().as_ref() {
            return Ok(f(entries));
        }

        let mut cache = self.cache.write();
        if cache.is_none() {
            *cache = Some(self.load()?);
        }
        Ok(f(cache.get_or_insert_with(BTreeMap::new)))
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> CoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, serde_json::to_string_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl ParameterStore for FileParameterStore {
    fn get(&self, key: &str) -> CoreResult<Option<String>> {
        self.with_entries(|entries| entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> CoreResult<()> {
        let mut cache = self.cache.write();
        if cache.is_none() {
            *cache = Some(self.load()?);
        }
        let entries = cache.get_or_insert_with(BTreeMap::new);

        let previous = entries.insert(key.to_string(), value.to_string());
        if let Err(e) = self.persist(entries) {
            match previous {
                Some(previous) => entries.insert(key.to_string(), previous),
                None => entries.remove(key),
            };
            return Err(e);
        }

        debug!("Stored parameter {} in {:?}", key, self.path);
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

impl std::fmt::Debug for FileParameterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileParameterStore")
            .field("path", &self.path)
            .finish()
    }
}
