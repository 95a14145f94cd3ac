//! Application configuration toggles.
//!
//! Toggles are persisted one property row each and handled as a single unit.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Named boolean switches.
pub type Toggles = BTreeMap<String, bool>;

/// Full application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Configuration id.
    pub id: i64,
    /// All toggles.
    pub toggles: Toggles,
}

impl ApplicationConfig {
    /// Rebuilds a configuration from its property rows.
    #[must_use]
    pub fn from_properties(id: i64, properties: &[AppConfigProperty]) -> Self {
        Self {
            id,
            toggles: properties
                .iter()
                .map(|p| (p.name.clone(), p.value))
                .collect(),
        }
    }

    /// One property row per toggle.
    #[must_use]
    pub fn to_properties(&self) -> Vec<AppConfigProperty> {
        self.toggles
            .iter()
            .map(|(name, value)| AppConfigProperty {
                app_config_id: self.id,
                name: name.clone(),
                value: *value,
            })
            .collect()
    }

    /// Value of a toggle, false when unset.
    #[must_use]
    pub fn is_enabled(&self, name: &str) -> bool {
        self.toggles.get(name).copied().unwrap_or(false)
    }
}

/// Persisted shape of one toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfigProperty {
    /// Owning configuration id.
    pub app_config_id: i64,
    /// Toggle name.
    pub name: String,
    /// Toggle value.
    pub value: bool,
}
