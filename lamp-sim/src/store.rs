//! TOML-file-backed implementation of the threshold store contract.

use std::{collections::BTreeMap, fs, path::PathBuf};

use lamp_core::{StoreError, ThresholdStore};

/// Stores named floats in a small TOML file, e.g.
///
/// ```toml
/// th1 = 48.5
/// th2 = 29.0
/// th3 = 9.9
/// ```
pub struct TomlStore {
    path: PathBuf,
    values: BTreeMap<String, f32>,
}

impl TomlStore {
    /// Open the store, reading existing values if the file is present.
    /// An unreadable or malformed file is treated as empty.
    pub fn open(path: PathBuf) -> Self {
        let values = fs::read_to_string(&path)
            .ok()
            .and_then(|contents| toml::from_str(&contents).ok())
            .unwrap_or_default();
        Self { path, values }
    }
}

impl ThresholdStore for TomlStore {
    fn get(&mut self, key: &str) -> Option<f32> {
        self.values.get(key).copied()
    }

    fn put(&mut self, key: &str, value: f32) -> Result<(), StoreError> {
        self.values.insert(key.to_string(), value);
        let serialized = toml::to_string(&self.values).map_err(|_| StoreError)?;
        fs::write(&self.path, serialized).map_err(|_| StoreError)
    }
}
