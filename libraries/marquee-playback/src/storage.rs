//! Persisted player settings
//!
//! The facade reads previously saved settings (volume, mute, ...) during
//! setup when the configuration enables it. Writing is the embedder's job.

use crate::error::{PlayerError, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Read-only source of persisted settings
pub trait SettingsStore {
    /// Every stored setting, keyed by attribute wire name
    fn load_all(&self) -> Result<BTreeMap<String, Value>>;
}

/// In-memory settings, mostly for tests and embedders with their own persistence
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    items: BTreeMap<String, Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.items.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.items.insert(key.into(), value.into());
    }
}

impl SettingsStore for MemoryStore {
    fn load_all(&self) -> Result<BTreeMap<String, Value>> {
        Ok(self.items.clone())
    }
}

/// Settings stored as a single JSON object in a file
///
/// A missing file holds no settings.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for JsonFileStore {
    fn load_all(&self) -> Result<BTreeMap<String, Value>> {
        if !self.path.exists() {
            debug!("No settings file at {:?}", self.path);
            return Ok(BTreeMap::new());
        }

        let content = std::fs::read_to_string(&self.path)?;
        match serde_json::from_str::<Value>(&content)? {
            Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(PlayerError::storage(format!(
                "expected a JSON object in {:?}, found {}",
                self.path,
                json_type_name(&other)
            ))),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn memory_store_returns_items() {
        let store = MemoryStore::new().with("volume", 30).with("mute", true);
        let items = store.load_all().unwrap();

        assert_eq!(items.get("volume"), Some(&json!(30)));
        assert_eq!(items.get("mute"), Some(&json!(true)));
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path().join("settings.json"));

        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn reads_json_object() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"volume": 12, "captionLabel": "English"}"#).unwrap();

        let items = JsonFileStore::new(&path).load_all().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items.get("captionLabel"), Some(&json!("English")));
    }

    #[test]
    fn rejects_non_object() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "[1, 2]").unwrap();

        let err = JsonFileStore::new(&path).load_all().unwrap_err();
        assert!(matches!(err, PlayerError::Storage(_)));
    }

    #[test]
    fn malformed_json_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            JsonFileStore::new(&path).load_all(),
            Err(PlayerError::Json(_))
        ));
    }
}
