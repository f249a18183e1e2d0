//! In-run variable store.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Build the qualified key `<stackName>/<variableName>`.
pub fn qualify(stack_name: &str, variable: &str) -> String {
    format!("{}/{}", stack_name, variable)
}

/// Mapping from qualified names to values for one synthesis run.
///
/// Keys are unique, the last write wins and nothing is ever removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableStore {
    entries: BTreeMap<String, String>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a value, returning the previous one if the key existed.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copy every entry of `other` into this store.
    pub fn merge(&mut self, other: &VariableStore) {
        for (key, value) in other.iter() {
            self.entries.insert(key.to_string(), value.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualify() {
        assert_eq!(qualify("DevSecOpsDemo-VpcInfraStack", "VpcName"), "DevSecOpsDemo-VpcInfraStack/VpcName");
    }

    #[test]
    fn test_last_write_wins() {
        let mut store = VariableStore::new();
        assert_eq!(store.put("a/x", "1"), None);
        assert_eq!(store.put("a/x", "2"), Some("1".to_string()));
        assert_eq!(store.get("a/x"), Some("2"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_merge() {
        let mut left = VariableStore::new();
        left.put("a/x", "1");
        let mut right = VariableStore::new();
        right.put("a/x", "3");
        right.put("b/y", "2");

        left.merge(&right);
        assert_eq!(left.get("a/x"), Some("3"));
        assert_eq!(left.get("b/y"), Some("2"));
    }
}
