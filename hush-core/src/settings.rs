//! Host settings store: a persisted key/value map that skills mutate in place.
//!
//! Values are JSON. The store is saved atomically (write `*.tmp`, then rename)
//! and a missing or unreadable file loads as an empty store.

use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::SettingsError;

/// Key/value settings owned by the host and lent to a skill.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsStore {
    values: Map<String, Value>,
    path: Option<PathBuf>,
    dirty: bool,
}

impl SettingsStore {
    /// Create an empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store from existing values (not backed by a file).
    pub fn from_map(values: Map<String, Value>) -> Self {
        Self {
            values,
            path: None,
            dirty: false,
        }
    }

    /// Load a store from `path`, starting empty if the file is missing or invalid.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = if path.exists() {
            match Self::read_map(&path) {
                Ok(values) => {
                    info!("Loaded {} settings from {:?}", values.len(), path);
                    values
                }
                Err(e) => {
                    warn!("Failed to load settings: {}, starting fresh", e);
                    Map::new()
                }
            }
        } else {
            debug!("No settings file at {:?}, starting fresh", path);
            Map::new()
        };
        Self {
            values,
            path: Some(path),
            dirty: false,
        }
    }

    fn read_map(path: &Path) -> Result<Map<String, Value>, SettingsError> {
        let text =
            std::fs::read_to_string(path).map_err(|e| SettingsError::PersistenceError {
                message: format!("Failed to read {}: {}", path.display(), e),
            })?;
        let value: Value =
            serde_json::from_str(&text).map_err(|e| SettingsError::PersistenceError {
                message: format!("Failed to parse {}: {}", path.display(), e),
            })?;
        match value {
            Value::Object(map) => Ok(map),
            _ => Err(SettingsError::NotAnObject {
                path: path.to_path_buf(),
            }),
        }
    }

    /// Re-read the backing file, replacing the in-memory values.
    pub fn reload(&mut self) -> Result<(), SettingsError> {
        let path = self.path.clone().ok_or(SettingsError::NoBackingFile)?;
        self.values = if path.exists() {
            Self::read_map(&path)?
        } else {
            Map::new()
        };
        self.dirty = false;
        Ok(())
    }

    /// Persist the store to its backing file.
    pub fn save(&mut self) -> Result<(), SettingsError> {
        let path = self.path.clone().ok_or(SettingsError::NoBackingFile)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SettingsError::PersistenceError {
                message: format!("Failed to create settings directory: {}", e),
            })?;
        }

        let json = serde_json::to_string_pretty(&self.values).map_err(|e| {
            SettingsError::PersistenceError {
                message: e.to_string(),
            }
        })?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| SettingsError::PersistenceError {
            message: format!("Failed to write settings: {}", e),
        })?;
        std::fs::rename(&tmp, &path).map_err(|e| SettingsError::PersistenceError {
            message: format!("Failed to rename settings file: {}", e),
        })?;

        self.dirty = false;
        debug!("Settings saved to {:?}", path);
        Ok(())
    }

    /// Insert `value` under `key` only if the key is absent.
    pub fn setdefault(&mut self, key: &str, value: impl Into<Value>) {
        if !self.values.contains_key(key) {
            self.values.insert(key.to_string(), value.into());
            self.dirty = true;
        }
    }

    /// Set `key` to `value`, replacing any previous value.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        if self.values.get(key) != Some(&value) {
            self.values.insert(key.to_string(), value);
            self.dirty = true;
        }
    }

    /// Remove a key, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.values.remove(key);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Truthiness of a value: missing, null, false, 0 and "" are false.
    pub fn get_bool(&self, key: &str) -> bool {
        match self.values.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
        }
    }

    /// Integer view of a value. Whole floats and numeric strings are accepted.
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.values.get(key)? {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// All values, for display.
    pub fn values(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether the store changed since it was loaded or saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
