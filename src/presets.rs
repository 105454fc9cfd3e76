use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PresetError;
use crate::settings::AudioSettings;
use crate::store::{KeyValueStore, PRESETS_KEY};

/// Quick-pick prompts offered next to the free-text generator.
pub const PRESET_PROMPTS: [&str; 4] = ["Warm Podcast Voice", "Clear & Bright", "Radio DJ", "Intimate ASMR"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreset {
    pub name: String,
    pub settings: AudioSettings,
}

/// Named settings snapshots, persisted as one JSON array under
/// [`PRESETS_KEY`]. Names are unique ignoring case.
#[derive(Debug, Default)]
pub struct PresetLibrary {
    presets: Vec<UserPreset>,
}

impl PresetLibrary {
    /// Read stored presets. Entries that fail validation are skipped; the rest
    /// are clamped into range. Unreadable storage yields an empty library.
    pub fn load(store: &dyn KeyValueStore) -> Self {
        let raw = match store.get(PRESETS_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Self::default(),
            Err(e) => {
                log::warn!("could not read presets: {e}");
                return Self::default();
            }
        };
        let entries: Vec<Value> = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("stored presets are not a list: {e}");
                return Self::default();
            }
        };
        let mut presets: Vec<UserPreset> = Vec::with_capacity(entries.len());
        for entry in &entries {
            let name = entry.get("name").and_then(Value::as_str).map(str::trim).unwrap_or_default();
            let settings = entry.get("settings").map(AudioSettings::parse_external);
            match settings {
                Some(Ok(settings)) if !name.is_empty() && !presets.iter().any(|p| same_name(&p.name, name)) => {
                    presets.push(UserPreset { name: name.to_string(), settings });
                }
                Some(Err(e)) => log::warn!("skipping stored preset `{name}`: {e}"),
                _ => log::warn!("skipping stored preset `{name}`"),
            }
        }
        log::debug!("loaded {} presets", presets.len());
        Self { presets }
    }

    pub fn list(&self) -> &[UserPreset] {
        &self.presets
    }

    pub fn get(&self, name: &str) -> Option<&UserPreset> {
        self.presets.iter().find(|p| p.name == name)
    }

    /// Add a preset under the trimmed `name`. Name checks happen before any
    /// write; a failed write keeps the preset in memory and reports
    /// [`PresetError::Persistence`].
    pub fn save(&mut self, name: &str, settings: AudioSettings, store: &dyn KeyValueStore) -> Result<(), PresetError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(PresetError::EmptyName);
        }
        if self.presets.iter().any(|p| same_name(&p.name, name)) {
            return Err(PresetError::Duplicate(name.to_string()));
        }
        self.presets.push(UserPreset { name: name.to_string(), settings: settings.clamped() });
        self.persist(store)
    }

    /// Remove the preset with exactly this name.
    pub fn delete(&mut self, name: &str, store: &dyn KeyValueStore) -> Result<(), PresetError> {
        let before = self.presets.len();
        self.presets.retain(|p| p.name != name);
        if self.presets.len() == before {
            return Err(PresetError::NotFound(name.to_string()));
        }
        self.persist(store)
    }

    fn persist(&self, store: &dyn KeyValueStore) -> Result<(), PresetError> {
        let json = serde_json::to_string(&self.presets).map_err(crate::error::PersistenceError::from)?;
        store.set(PRESETS_KEY, &json).map_err(|e| {
            log::warn!("presets not persisted: {e}");
            PresetError::from(e)
        })
    }
}

fn same_name(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}
