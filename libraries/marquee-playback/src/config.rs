//! Player configuration
//!
//! Embedders usually build a [`PlayerConfig`] in code. It can also be loaded
//! from a file with `MARQUEE__*` environment overrides (for example
//! `MARQUEE__VOLUME=40`).

use crate::attributes::{AttrKey, AttrValue};
use crate::error::{PlayerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PlayerConfig {
    /// Player instance id, handed to providers
    #[serde(default)]
    pub id: Option<String>,

    /// Initial volume (0-100)
    #[serde(default = "default_volume")]
    pub volume: u8,

    #[serde(default)]
    pub mute: bool,

    #[serde(default)]
    pub autostart: bool,

    /// Merge persisted settings over this configuration during setup
    #[serde(default)]
    pub cookies: bool,

    /// Provider to try first when several support a source
    #[serde(default)]
    pub primary: Option<String>,

    /// Every other key, stored as a custom attribute
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            id: None,
            volume: default_volume(),
            mute: false,
            autostart: false,
            cookies: false,
            primary: None,
            extra: BTreeMap::new(),
        }
    }
}

impl PlayerConfig {
    /// Config with an instance id and every other value at its default
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Load configuration from a file and the environment
    ///
    /// The file is optional; `MARQUEE__*` variables override it.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        if let Some(path) = path {
            if path.exists() {
                settings = settings.add_source(config::File::from(path));
            }
        }

        // Override with environment variables (MARQUEE__VOLUME etc.)
        settings = settings.add_source(
            config::Environment::with_prefix("MARQUEE")
                .separator("__")
                .try_parsing(true),
        );

        let config = settings
            .build()
            .map_err(|e| PlayerError::Config(e.to_string()))?;

        let loaded: Self = config
            .try_deserialize()
            .map_err(|e| PlayerError::Config(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.volume > 100 {
            return Err(PlayerError::Config(format!(
                "volume must be between 0 and 100, got {}",
                self.volume
            )));
        }

        if self.id.as_deref().is_some_and(str::is_empty) {
            return Err(PlayerError::Config("id must not be empty".to_string()));
        }

        Ok(())
    }

    /// Attribute entries for this configuration, in a stable order
    pub fn to_attributes(&self) -> Vec<(AttrKey, AttrValue)> {
        let mut entries = Vec::with_capacity(self.extra.len() + 6);

        if let Some(id) = &self.id {
            entries.push((AttrKey::Id, AttrValue::from(id.as_str())));
        }
        entries.push((AttrKey::Volume, AttrValue::from(self.volume)));
        entries.push((AttrKey::Mute, AttrValue::from(self.mute)));
        entries.push((AttrKey::Autostart, AttrValue::from(self.autostart)));
        entries.push((AttrKey::Cookies, AttrValue::from(self.cookies)));
        if let Some(primary) = &self.primary {
            entries.push((AttrKey::Primary, AttrValue::from(primary.as_str())));
        }

        for (name, value) in &self.extra {
            entries.push((AttrKey::from_name(name), AttrValue::from(value.clone())));
        }

        entries
    }
}

fn default_volume() -> u8 {
    90
}
