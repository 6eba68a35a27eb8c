//! Persisted configuration.
//!
//! The settings file is written by the UI layer; this daemon reads it at
//! startup and on demand, and writes back only the screensaver layout
//! list it mutates itself. Writes replace the whole file.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::arrangement::ArrangementMode;

#[derive(Debug, PartialEq, Error)]
pub enum SettingsError {
    #[error("cannot read settings file")]
    Unreadable,
    #[error("settings file is not valid JSON")]
    Invalid,
    #[error("cannot write settings file")]
    WriteFailed,
}

/// One screensaver layout choice: which wallpaper a monitor (or the
/// span/duplicate group) shows while the saver presents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaverLayoutEntry {
    pub mode: ArrangementMode,
    /// Required for `per`, ignored for `span`/`duplicate`.
    pub device_id: Option<String>,
    /// Wallpaper root directory.
    pub wallpaper: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SaverSettings {
    #[serde(default)]
    pub layout: Vec<SaverLayoutEntry>,
    /// Idle threshold, `duration-str` syntax ("5m", "300s", ...).
    #[serde(default)]
    pub timeout: Option<String>,
    /// Mirror the live desktop instead of using the layout list.
    #[serde(default)]
    pub mirror: bool,
    #[serde(default)]
    pub lock_on_exit: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub mode: ArrangementMode,
    /// Per-monitor wallpaper roots keyed by device id. Device ids are the
    /// only persisted monitor key; ordinal indices are never stored.
    #[serde(default)]
    pub assignments: HashMap<String, PathBuf>,
    #[serde(default = "default_volume")]
    pub volume: u8,
    #[serde(default)]
    pub saver: SaverSettings,
}

fn default_volume() -> u8 {
    50
}

impl Settings {
    /// Reads the settings file, or defaults when it does not exist yet.
    ///
    /// # Errors
    /// [`SettingsError::Invalid`] for a present but malformed file.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.is_file() {
            return Ok(Self {
                volume: default_volume(),
                ..Self::default()
            });
        }
        let raw = std::fs::read_to_string(path).map_err(|_| SettingsError::Unreadable)?;
        serde_json::from_str(&raw).map_err(|_| SettingsError::Invalid)
    }

    /// Writes the settings back, whole-file.
    ///
    /// # Errors
    /// [`SettingsError::WriteFailed`] on I/O failure.
    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let raw = serde_json::to_string_pretty(self).map_err(|_| SettingsError::WriteFailed)?;
        std::fs::write(path, raw).map_err(|_| SettingsError::WriteFailed)
    }

    /// The configured saver idle threshold, if parseable.
    #[must_use]
    pub fn saver_timeout(&self) -> Option<Duration> {
        self.saver
            .timeout
            .as_deref()
            .and_then(|raw| duration_str::parse(raw).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let settings = Settings::load(Path::new("/nonexistent/fresco.json")).unwrap();
        assert_eq!(settings.mode, ArrangementMode::Per);
        assert_eq!(settings.volume, 50);
        assert!(settings.assignments.is_empty());
    }

    #[test]
    fn round_trip() {
        let path = std::env::temp_dir().join(format!("fresco-settings-{}.json", std::process::id()));
        let mut settings = Settings::default();
        settings.mode = ArrangementMode::Duplicate;
        settings.volume = 80;
        settings.assignments.insert("DP-1".to_string(), PathBuf::from("/w/x"));
        settings.saver.layout.push(SaverLayoutEntry {
            mode: ArrangementMode::Per,
            device_id: Some("DP-1".to_string()),
            wallpaper: PathBuf::from("/w/night"),
        });
        settings.saver.timeout = Some("5m".to_string());
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, settings);
        assert_eq!(loaded.saver_timeout(), Some(Duration::from_secs(300)));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let path = std::env::temp_dir().join(format!("fresco-bad-{}.json", std::process::id()));
        std::fs::write(&path, "{ not json").unwrap();
        let result = Settings::load(&path);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(result, Err(SettingsError::Invalid));
    }
}
