//! Builds the command line for player subprocesses.
//!
//! The argument contract is deterministic: a restarted instance is
//! always respawned with exactly the same parameters.

use smol::process::{Command, Stdio};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::display::Rect;
use crate::wallpaper::WallpaperDescriptor;

/// Optional player capabilities toggled per launch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureToggles {
    pub system_info: bool,
    pub now_playing: bool,
    pub audio_visualizer: bool,
    pub pause_events: bool,
    pub verbose_log: bool,
}

/// Everything a player needs besides the wallpaper itself.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub binary: PathBuf,
    pub volume: u8,
    pub toggles: FeatureToggles,
    pub debug_port: Option<u16>,
    pub cache_dir: PathBuf,
    /// Instance copy of the property schema, if one exists for the binding.
    pub property_copy: Option<PathBuf>,
}

/// Gets the [`Command`] to start a player for the given wallpaper and
/// target geometry.
#[must_use]
pub fn get_cmd(descriptor: &WallpaperDescriptor, geometry: Rect, opts: &LaunchOptions) -> Command {
    let mut cmd = Command::new(&opts.binary);
    cmd.args(build_args(descriptor, geometry, opts));
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .current_dir(&opts.cache_dir);
    cmd
}

/// The full argument vector of the launch contract.
#[must_use]
pub fn build_args(
    descriptor: &WallpaperDescriptor,
    geometry: Rect,
    opts: &LaunchOptions,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    args.push("--content".into());
    args.push(descriptor.entry.clone().into());
    args.push("--kind".into());
    args.push(descriptor.kind.to_string().into());
    if let Some(schema) = schema_for(descriptor, opts) {
        args.push("--schema".into());
        args.push(schema.to_path_buf().into());
    }
    args.push("--geometry".into());
    args.push(format!("{}x{}", geometry.width, geometry.height).into());
    args.push("--volume".into());
    args.push(opts.volume.to_string().into());

    map_toggles(opts.toggles, &mut args);
    if let Some(port) = opts.debug_port {
        args.push("--debug-port".into());
        args.push(port.to_string().into());
    }
    args.push("--cache".into());
    args.push(opts.cache_dir.clone().into());
    for extra in &descriptor.extra_args {
        args.push(extra.into());
    }
    args
}

/// The instance copy takes precedence over the canonical schema so user
/// edits survive restarts.
fn schema_for<'a>(descriptor: &'a WallpaperDescriptor, opts: &'a LaunchOptions) -> Option<&'a Path> {
    opts.property_copy
        .as_deref()
        .or(descriptor.schema_path.as_deref())
}

fn map_toggles(toggles: FeatureToggles, args: &mut Vec<OsString>) {
    if toggles.system_info {
        args.push("--system-info".into());
    }
    if toggles.now_playing {
        args.push("--now-playing".into());
    }
    if toggles.audio_visualizer {
        args.push("--audio-visualizer".into());
    }
    if toggles.pause_events {
        args.push("--pause-events".into());
    }
    if toggles.verbose_log {
        args.push("--verbose".into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallpaper::WallpaperKind;

    fn descriptor() -> WallpaperDescriptor {
        WallpaperDescriptor {
            root: PathBuf::from("/w/clock"),
            kind: WallpaperKind::Web,
            entry: PathBuf::from("/w/clock/index.html"),
            schema_path: Some(PathBuf::from("/w/clock/properties.json")),
            extra_args: vec!["--transparent".to_string()],
        }
    }

    fn opts() -> LaunchOptions {
        LaunchOptions {
            binary: PathBuf::from("fresco-player"),
            volume: 35,
            toggles: FeatureToggles {
                pause_events: true,
                ..FeatureToggles::default()
            },
            debug_port: None,
            cache_dir: PathBuf::from("/tmp/fresco-cache"),
            property_copy: None,
        }
    }

    fn has(args: &[OsString], value: &str) -> bool {
        args.iter().any(|a| a == value)
    }

    #[test]
    fn argument_contract() {
        let args = build_args(&descriptor(), Rect::new(0, 0, 3200, 1080), &opts());
        assert!(has(&args, "--content"));
        assert!(has(&args, "/w/clock/index.html"));
        assert!(has(&args, "--kind"));
        assert!(has(&args, "web"));
        assert!(has(&args, "--geometry"));
        assert!(has(&args, "3200x1080"));
        assert!(has(&args, "--volume"));
        assert!(has(&args, "35"));
        assert!(has(&args, "--pause-events"));
        assert!(!has(&args, "--now-playing"));
        assert!(has(&args, "--transparent"));
    }

    #[test]
    fn restart_arguments_are_identical() {
        let first = build_args(&descriptor(), Rect::new(0, 0, 1920, 1080), &opts());
        let second = build_args(&descriptor(), Rect::new(0, 0, 1920, 1080), &opts());
        assert_eq!(first, second);
    }

    #[test]
    fn instance_copy_overrides_canonical_schema() {
        let mut options = opts();
        options.property_copy = Some(PathBuf::from("/cache/DP-1.properties.json"));
        let args = build_args(&descriptor(), Rect::new(0, 0, 1920, 1080), &options);
        assert!(has(&args, "/cache/DP-1.properties.json"));
        assert!(!has(&args, "/w/clock/properties.json"));
    }
}
