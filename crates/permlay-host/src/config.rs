//! Host configuration: static defaults and reusable overlay presets.
//!
//! A `HostConfig` is deserialized from TOML. Permission names are validated
//! and folded to lowercase at load time, so a loaded config only ever holds
//! canonical keys.
//!
//! Example:
//! ```toml
//! [defaults]
//! "perms.chat" = true
//!
//! [[presets]]
//! id = "flight"
//! description = "Temporary flight access"
//! [presets.grants]
//! "perms.fly" = true
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use permlay_contracts::{
    error::{PermsError, PermsResult},
    permission::PermissionName,
};

/// A named set of grants that can be attached to a host in one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayPreset {
    /// Stable identifier used to look the preset up.
    pub id: String,

    /// Human-readable explanation of what the preset grants.
    #[serde(default)]
    pub description: String,

    /// Permission name → value. Applied in name order.
    #[serde(default)]
    pub grants: BTreeMap<String, bool>,
}

/// The top-level structure deserialized from a TOML host configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostConfig {
    /// Statically declared permissions. Attachments override these.
    #[serde(default)]
    pub defaults: BTreeMap<String, bool>,

    /// Overlay presets, looked up by `id`.
    #[serde(default)]
    pub presets: Vec<OverlayPreset>,
}

impl HostConfig {
    /// Parse `s` as TOML and normalize every permission name.
    ///
    /// Returns `PermsError::ConfigError` if the TOML is malformed, a
    /// permission name is empty, or two presets share an `id`.
    pub fn from_toml_str(s: &str) -> PermsResult<Self> {
        let raw: HostConfig = toml::from_str(s).map_err(|e| PermsError::ConfigError {
            reason: format!("failed to parse host config TOML: {}", e),
        })?;
        raw.normalized()
    }

    /// Read the file at `path` and parse it as a host configuration.
    pub fn from_file(path: &Path) -> PermsResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| PermsError::ConfigError {
            reason: format!("failed to read host config '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Find a preset by `id`.
    pub fn preset(&self, id: &str) -> Option<&OverlayPreset> {
        self.presets.iter().find(|p| p.id == id)
    }

    fn normalized(self) -> PermsResult<Self> {
        let defaults = normalize_grants(self.defaults, "defaults")?;

        let mut seen = HashSet::new();
        let mut presets = Vec::with_capacity(self.presets.len());
        for preset in self.presets {
            if !seen.insert(preset.id.clone()) {
                return Err(PermsError::ConfigError {
                    reason: format!("duplicate preset id '{}'", preset.id),
                });
            }
            let grants = normalize_grants(preset.grants, &format!("preset '{}'", preset.id))?;
            presets.push(OverlayPreset { grants, ..preset });
        }

        Ok(Self { defaults, presets })
    }
}

/// Fold every key of `grants` to its canonical form.
///
/// Two keys that differ only by case collapse into one entry; the value of
/// the key that sorts last wins, which keeps loading deterministic.
fn normalize_grants(
    grants: BTreeMap<String, bool>,
    section: &str,
) -> PermsResult<BTreeMap<String, bool>> {
    grants
        .into_iter()
        .map(|(name, value)| {
            PermissionName::parse(&name)
                .map(|name| (name.into_string(), value))
                .map_err(|e| PermsError::ConfigError {
                    reason: format!("{}: {}", section, e),
                })
        })
        .collect()
}
