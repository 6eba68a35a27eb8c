//! Wallpaper descriptors.
//!
//! A wallpaper is a directory with a `wallpaper.json` manifest describing
//! what the player should render. The descriptor is the immutable identity
//! of a content item; per-binding mutable state lives elsewhere.

use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, PartialEq, Error)]
pub enum WallpaperError {
    #[error("cannot read wallpaper manifest")]
    ManifestUnreadable,
    #[error("wallpaper manifest is not valid JSON")]
    ManifestInvalid,
    #[error("unknown wallpaper kind `{0}`")]
    UnknownKind(String),
}

/// Declared content type of a wallpaper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WallpaperKind {
    Web,
    Video,
    Image,
    App,
    Stream,
}

impl FromStr for WallpaperKind {
    type Err = WallpaperError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "web" => Ok(Self::Web),
            "video" => Ok(Self::Video),
            "image" => Ok(Self::Image),
            "app" => Ok(Self::App),
            "stream" => Ok(Self::Stream),
            other => Err(WallpaperError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for WallpaperKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Web => "web",
            Self::Video => "video",
            Self::Image => "image",
            Self::App => "app",
            Self::Stream => "stream",
        };
        write!(f, "{name}")
    }
}

#[derive(Deserialize)]
struct Manifest {
    #[serde(rename = "type")]
    kind: String,
    file: Option<PathBuf>,
    schema: Option<PathBuf>,
    #[serde(default)]
    args: Vec<String>,
}

/// Immutable identity of a content item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WallpaperDescriptor {
    /// Root directory of the wallpaper.
    pub root: PathBuf,
    pub kind: WallpaperKind,
    /// What the player should open, resolved against `root`.
    pub entry: PathBuf,
    /// Canonical property schema shipped with the content, if any.
    pub schema_path: Option<PathBuf>,
    /// Extra player arguments declared by the manifest.
    pub extra_args: Vec<String>,
}

impl WallpaperDescriptor {
    /// Reads the manifest under `root` and builds the descriptor.
    ///
    /// # Errors
    /// [`WallpaperError`] if the manifest is missing, malformed, or declares
    /// an unknown content kind.
    pub fn load(root: &Path) -> Result<Self, WallpaperError> {
        let raw = std::fs::read_to_string(root.join("wallpaper.json"))
            .map_err(|_| WallpaperError::ManifestUnreadable)?;
        let manifest: Manifest =
            serde_json::from_str(&raw).map_err(|_| WallpaperError::ManifestInvalid)?;
        Self::from_manifest(root, &manifest)
    }

    fn from_manifest(root: &Path, manifest: &Manifest) -> Result<Self, WallpaperError> {
        let kind = manifest.kind.parse::<WallpaperKind>()?;
        let entry = match (&manifest.file, kind) {
            (Some(file), _) => root.join(file),
            (None, WallpaperKind::Web) => root.join("index.html"),
            (None, _) => root.to_path_buf(),
        };
        let schema_path = match &manifest.schema {
            Some(schema) => Some(root.join(schema)),
            None => {
                let default = root.join("properties.json");
                default.is_file().then_some(default)
            }
        };
        Ok(Self {
            root: root.to_path_buf(),
            kind,
            entry,
            schema_path,
            extra_args: manifest.args.clone(),
        })
    }
}
