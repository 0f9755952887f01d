// SPDX-License-Identifier: MIT OR Apache-2.0
//! Application settings, stored as RON.

use crate::workspace::AppError;
use egui::Vec2;
use patchbay_graph::{DuplicateDirection, DEFAULT_PASTE_OFFSET};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Settings file looked up next to the working directory
pub const SETTINGS_FILE_NAME: &str = "patchbay.ron";

/// Editor behaviour that is not part of a patch document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    /// Offset applied to pasted nodes
    pub paste_offset: [f32; 2],
    /// Placement of duplicated patches
    pub duplicate_direction: DuplicateDirection,
    /// Update ticks run after loading a patch so delayed connections settle
    pub ticks_per_load: u32,
    /// Default tracing directive, combined with `RUST_LOG`
    pub log_directive: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            paste_offset: [DEFAULT_PASTE_OFFSET.x, DEFAULT_PASTE_OFFSET.y],
            duplicate_direction: DuplicateDirection::Down,
            ticks_per_load: 1,
            log_directive: "patchbay_app=info,patchbay_graph=info".to_string(),
        }
    }
}

impl AppSettings {
    /// Load settings from a file
    pub fn load(path: &Path) -> Result<Self, AppError> {
        let content = std::fs::read_to_string(path)?;
        Ok(ron::from_str(&content)?)
    }

    /// Load settings from `path` if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self, AppError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> Result<(), AppError> {
        let config = ron::ser::PrettyConfig::default()
            .struct_names(true)
            .enumerate_arrays(false);
        let content = ron::ser::to_string_pretty(self, config)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Paste offset as a canvas vector
    pub fn paste_offset(&self) -> Vec2 {
        Vec2::new(self.paste_offset[0], self.paste_offset[1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = AppSettings::default();
        assert_eq!(settings.paste_offset(), Vec2::new(20.0, 20.0));
        assert_eq!(settings.duplicate_direction, DuplicateDirection::Down);
        assert_eq!(settings.ticks_per_load, 1);
    }

    #[test]
    fn test_serialization() {
        let settings = AppSettings {
            paste_offset: [5.0, 7.5],
            duplicate_direction: DuplicateDirection::Right,
            ..AppSettings::default()
        };
        let ron_str = ron::ser::to_string_pretty(&settings, ron::ser::PrettyConfig::default()).unwrap();
        let loaded: AppSettings = ron::from_str(&ron_str).unwrap();
        assert_eq!(loaded, settings);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let loaded: AppSettings = ron::from_str("(ticks_per_load: 3)").unwrap();
        assert_eq!(loaded.ticks_per_load, 3);
        assert_eq!(loaded.paste_offset, [20.0, 20.0]);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("patchbay_settings_{}.ron", std::process::id()));
        let settings = AppSettings {
            ticks_per_load: 4,
            ..AppSettings::default()
        };
        settings.save(&path).unwrap();
        let loaded = AppSettings::load_or_default(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, settings);

        let missing = AppSettings::load_or_default(&path).unwrap();
        assert_eq!(missing, AppSettings::default());
    }
}
