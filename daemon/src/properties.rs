//! Per-wallpaper property customization.
//!
//! The canonical schema shipped with a wallpaper is never written to.
//! The first customization of a binding copies it into the cache; edits
//! go through an in-memory shadow and only actual changes are written
//! back and forwarded to the player. Writes replace the whole file.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::arrangement::ArrangementMode;
use crate::player::protocol::HostMessage;

#[derive(Debug, PartialEq, Error)]
pub enum PropertyError {
    #[error("cannot read property schema")]
    SchemaUnreadable,
    #[error("property schema is not a JSON object")]
    SchemaInvalid,
    #[error("cannot write instance copy")]
    CopyFailed,
    #[error("no such control `{0}`")]
    UnknownControl(String),
    #[error("no customization open for this binding")]
    NotCustomized,
}

/// Typed view of a known control. Control names are unique per schema by
/// construction (the schema is a JSON object keyed by name). Types this
/// daemon does not know stay as raw JSON and are forwarded opaquely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PropertyControl {
    Slider {
        value: f64,
        min: f64,
        max: f64,
        #[serde(default)]
        step: Option<f64>,
    },
    Textbox {
        value: String,
    },
    Dropdown {
        value: Value,
        #[serde(default)]
        items: Vec<Value>,
    },
    Checkbox {
        value: bool,
    },
    ColorPicker {
        value: String,
    },
    FolderDropdown {
        value: String,
        folder: String,
        #[serde(default)]
        filter: Option<String>,
    },
    Button {},
}

impl PropertyControl {
    /// Typed parse of one schema entry; `None` for unknown control types.
    #[must_use]
    pub fn parse(raw: &Value) -> Option<Self> {
        serde_json::from_value(raw.clone()).ok()
    }
}

/// Key identifying the instance copy a binding uses: one copy per monitor
/// in `per`, a single shared copy in `span`/`duplicate`.
#[must_use]
pub fn copy_key(mode: ArrangementMode, device_id: &str) -> String {
    match mode {
        ArrangementMode::Per => device_id.to_string(),
        ArrangementMode::Span | ArrangementMode::Duplicate => "shared".to_string(),
    }
}

struct Shadow {
    copy_path: PathBuf,
    controls: Map<String, Value>,
}

/// Open customization sessions, one shadow per copy key.
#[derive(Default)]
pub struct PropertyStore {
    cache_dir: PathBuf,
    shadows: HashMap<String, Shadow>,
}

impl PropertyStore {
    #[must_use]
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            shadows: HashMap::new(),
        }
    }

    /// Path of the instance copy for a key, whether or not it exists yet.
    #[must_use]
    pub fn copy_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{key}.properties.json"))
    }

    /// Opens a customization session: creates the instance copy from the
    /// canonical schema on first use, reuses the existing copy otherwise.
    /// Returns the copy path for the launch contract.
    ///
    /// # Errors
    /// [`PropertyError`] if the canonical schema cannot be read or the
    /// copy cannot be created.
    pub fn customize(&mut self, key: &str, canonical: &Path) -> Result<PathBuf, PropertyError> {
        let copy_path = self.copy_path(key);
        if !copy_path.is_file() {
            let raw = std::fs::read_to_string(canonical)
                .map_err(|_| PropertyError::SchemaUnreadable)?;
            // Validate before copying so a broken schema never becomes an
            // instance copy.
            parse_object(&raw)?;
            std::fs::write(&copy_path, raw).map_err(|_| PropertyError::CopyFailed)?;
        }
        let raw = std::fs::read_to_string(&copy_path)
            .map_err(|_| PropertyError::SchemaUnreadable)?;
        let controls = parse_object(&raw)?;
        self.shadows.insert(
            key.to_string(),
            Shadow {
                copy_path: copy_path.clone(),
                controls,
            },
        );
        Ok(copy_path)
    }

    /// Applies one UI edit.
    ///
    /// Returns the `set-property` message to forward, or `None` when the
    /// value equals the shadow and nothing must be sent or written.
    ///
    /// # Errors
    /// [`PropertyError::NotCustomized`] without an open session,
    /// [`PropertyError::UnknownControl`] for a name the schema lacks.
    pub fn apply_edit(
        &mut self,
        key: &str,
        name: &str,
        value: Value,
    ) -> Result<Option<HostMessage>, PropertyError> {
        let shadow = self
            .shadows
            .get_mut(key)
            .ok_or(PropertyError::NotCustomized)?;
        let control = shadow
            .controls
            .get_mut(name)
            .ok_or_else(|| PropertyError::UnknownControl(name.to_string()))?;
        let value = clamp_for(control, value);
        if control.get("value") == Some(&value) {
            return Ok(None);
        }
        if let Some(obj) = control.as_object_mut() {
            obj.insert("value".to_string(), value.clone());
        }
        let body = control.clone();
        write_whole(&shadow.copy_path, &shadow.controls)?;
        Ok(Some(HostMessage::SetProperty {
            name: name.to_string(),
            body,
        }))
    }

    /// Overwrites the instance copy from the canonical schema and returns
    /// the synthetic default-reload button event for the player.
    ///
    /// # Errors
    /// [`PropertyError`] if the canonical schema cannot be read or the
    /// copy cannot be replaced.
    pub fn restore_defaults(
        &mut self,
        key: &str,
        canonical: &Path,
    ) -> Result<HostMessage, PropertyError> {
        let raw =
            std::fs::read_to_string(canonical).map_err(|_| PropertyError::SchemaUnreadable)?;
        let controls = parse_object(&raw)?;
        let copy_path = self.copy_path(key);
        std::fs::write(&copy_path, raw).map_err(|_| PropertyError::CopyFailed)?;
        self.shadows.insert(
            key.to_string(),
            Shadow {
                copy_path,
                controls,
            },
        );
        Ok(HostMessage::SetProperty {
            name: "restore-defaults".to_string(),
            body: serde_json::json!({"control": "button"}),
        })
    }

    /// Drops the in-memory session; the on-disk copy stays for reuse.
    pub fn close(&mut self, key: &str) {
        self.shadows.remove(key);
    }
}

fn parse_object(raw: &str) -> Result<Map<String, Value>, PropertyError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(PropertyError::SchemaInvalid),
    }
}

/// Sliders are clamped to their declared bounds; everything else passes
/// through untouched, including fields of unknown control types.
fn clamp_for(control: &Value, value: Value) -> Value {
    if control.get("type").and_then(Value::as_str) != Some("slider") {
        return value;
    }
    let Some(new) = value.as_f64() else {
        return value;
    };
    let min = control.get("min").and_then(Value::as_f64).unwrap_or(f64::MIN);
    let max = control.get("max").and_then(Value::as_f64).unwrap_or(f64::MAX);
    serde_json::Number::from_f64(new.clamp(min, max))
        .map_or(value, Value::Number)
}

fn write_whole(path: &Path, controls: &Map<String, Value>) -> Result<(), PropertyError> {
    let raw = serde_json::to_string_pretty(&Value::Object(controls.clone()))
        .map_err(|_| PropertyError::CopyFailed)?;
    std::fs::write(path, raw).map_err(|_| PropertyError::CopyFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("fresco-props-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_canonical(dir: &Path) -> PathBuf {
        let schema = json!({
            "speed": {"type": "slider", "value": 1.0, "min": 0.0, "max": 10.0, "step": 0.5},
            "caption": {"type": "textbox", "value": "hello"},
            "glow": {"type": "futureControl", "value": 3, "mystery": [1, 2]}
        });
        let path = dir.join("properties.json");
        std::fs::write(&path, serde_json::to_string(&schema).unwrap()).unwrap();
        path
    }

    #[test]
    fn copy_on_first_use_then_reuse() {
        let dir = temp_dir("copy");
        let canonical = write_canonical(&dir);
        let mut store = PropertyStore::new(dir.clone());

        let copy = store.customize("DP-1", &canonical).unwrap();
        assert!(copy.is_file());
        assert_ne!(copy, canonical);

        // Edit, reopen: the edited copy must be reused, not re-copied.
        store
            .apply_edit("DP-1", "speed", json!(4.0))
            .unwrap()
            .unwrap();
        let mut store2 = PropertyStore::new(dir);
        store2.customize("DP-1", &canonical).unwrap();
        let again = store2.apply_edit("DP-1", "speed", json!(4.0)).unwrap();
        assert_eq!(again, None);
    }

    #[test]
    fn diff_gating_emits_exactly_once() {
        let dir = temp_dir("diff");
        let canonical = write_canonical(&dir);
        let mut store = PropertyStore::new(dir);
        store.customize("shared", &canonical).unwrap();

        let first = store.apply_edit("shared", "caption", json!("bye")).unwrap();
        assert!(first.is_some());
        let second = store.apply_edit("shared", "caption", json!("bye")).unwrap();
        assert_eq!(second, None);
    }

    #[test]
    fn slider_edits_are_clamped() {
        let dir = temp_dir("clamp");
        let canonical = write_canonical(&dir);
        let mut store = PropertyStore::new(dir);
        store.customize("DP-1", &canonical).unwrap();

        let msg = store
            .apply_edit("DP-1", "speed", json!(99.0))
            .unwrap()
            .unwrap();
        let HostMessage::SetProperty { body, .. } = msg else {
            panic!("expected set-property");
        };
        assert_eq!(body["value"], json!(10.0));
    }

    #[test]
    fn unknown_control_types_are_kept_and_forwarded() {
        let dir = temp_dir("unknown");
        let canonical = write_canonical(&dir);
        let mut store = PropertyStore::new(dir);
        store.customize("DP-1", &canonical).unwrap();

        let msg = store
            .apply_edit("DP-1", "glow", json!(7))
            .unwrap()
            .unwrap();
        let HostMessage::SetProperty { name, body } = msg else {
            panic!("expected set-property");
        };
        assert_eq!(name, "glow");
        // Opaque metadata travels with the edit.
        assert_eq!(body["mystery"], json!([1, 2]));
        assert_eq!(body["value"], json!(7));
    }

    #[test]
    fn unknown_name_is_an_error() {
        let dir = temp_dir("name");
        let canonical = write_canonical(&dir);
        let mut store = PropertyStore::new(dir);
        store.customize("DP-1", &canonical).unwrap();
        assert_eq!(
            store.apply_edit("DP-1", "nope", json!(1)),
            Err(PropertyError::UnknownControl("nope".to_string()))
        );
    }

    #[test]
    fn restore_defaults_resets_copy_and_emits_button() {
        let dir = temp_dir("restore");
        let canonical = write_canonical(&dir);
        let mut store = PropertyStore::new(dir);
        store.customize("DP-1", &canonical).unwrap();
        store
            .apply_edit("DP-1", "speed", json!(7.5))
            .unwrap()
            .unwrap();

        let msg = store.restore_defaults("DP-1", &canonical).unwrap();
        assert!(matches!(msg, HostMessage::SetProperty { ref name, .. } if name == "restore-defaults"));

        // The canonical value is back, so re-sending it is gated out.
        assert_eq!(store.apply_edit("DP-1", "speed", json!(1.0)).unwrap(), None);
    }

    #[test]
    fn copy_key_per_vs_shared() {
        assert_eq!(copy_key(ArrangementMode::Per, "DP-1"), "DP-1");
        assert_eq!(copy_key(ArrangementMode::Span, "DP-1"), "shared");
        assert_eq!(copy_key(ArrangementMode::Duplicate, "HDMI-1"), "shared");
    }

    #[test]
    fn typed_parse_ignores_unknown_types() {
        let known = json!({"type": "slider", "value": 1.0, "min": 0.0, "max": 2.0});
        assert!(PropertyControl::parse(&known).is_some());
        let unknown = json!({"type": "futureControl", "value": 1});
        assert!(PropertyControl::parse(&unknown).is_none());
    }
}
