//! Persisted per-device settings.
//!
//! The handoff records what it learned about the device (hardware code,
//! flash layout) through a [`ConfigSink`]. [`HwParamStore`] keeps them in a
//! flat TOML table.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use tracing::{debug, info};

/// Receives key/value settings discovered during the handoff.
pub trait ConfigSink {
    fn write_setting(&mut self, key: &str, value: &str);
}

/// Settings table backed by an optional TOML file.
#[derive(Debug, Default)]
pub struct HwParamStore {
    path: Option<PathBuf>,
    values: BTreeMap<String, String>,
}

impl HwParamStore {
    /// Store that is never written to disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open the store at `path`, loading existing settings if the file exists.
    pub fn open<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let values = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            toml::from_str(&content)?
        } else {
            BTreeMap::new()
        };
        debug!(path = %path.display(), count = values.len(), "Loaded hwparam");
        Ok(Self {
            path: Some(path),
            values,
        })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Write the table back to its file. No-op for in-memory stores.
    pub fn save(&self) -> Result<()> {
        if let Some(path) = &self.path {
            let content = toml::to_string_pretty(&self.values)?;
            std::fs::write(path, content)?;
            info!(path = %path.display(), "Saved hwparam");
        }
        Ok(())
    }
}

impl ConfigSink for HwParamStore {
    fn write_setting(&mut self, key: &str, value: &str) {
        debug!(key = %key, value = %value, "hwparam");
        self.values.insert(key.to_string(), value.to_string());
    }
}
