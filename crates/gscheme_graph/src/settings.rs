// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph settings, stored as RON.

use crate::id::MAX_NODES;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of node slots
pub const DEFAULT_CAPACITY: u16 = 16;

/// Parameters used to create a graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    /// Graph name
    pub name: String,
    /// Number of node slots
    pub capacity: u16,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            name: "Untitled".to_string(),
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl GraphSettings {
    /// Settings with a name and the default capacity
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Reject capacities a graph cannot address
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.capacity == 0 || self.capacity > MAX_NODES {
            return Err(SettingsError::InvalidCapacity(self.capacity));
        }
        Ok(())
    }

    /// Serialize to RON format
    pub fn to_ron(&self) -> Result<String, SettingsError> {
        let config = ron::ser::PrettyConfig::default().struct_names(true);
        Ok(ron::ser::to_string_pretty(self, config)?)
    }

    /// Deserialize from RON format and validate
    pub fn from_ron(s: &str) -> Result<Self, SettingsError> {
        let settings: Self = ron::from_str(s)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a file
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        let settings = Self::from_ron(&content)?;
        tracing::debug!(path = %path.display(), capacity = settings.capacity, "Loaded graph settings");
        Ok(settings)
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        std::fs::write(path, self.to_ron()?)?;
        Ok(())
    }
}

/// Error raised while loading or validating settings
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// Malformed RON document
    #[error("Failed to parse settings: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Serialization failed
    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] ron::Error),

    /// File access failed
    #[error("Settings I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Capacity outside `1..=MAX_NODES`
    #[error("Invalid graph capacity: {0}")]
    InvalidCapacity(u16),
}
