//! cli parameters

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    version,
    about = "CLI tool for controlling the frescod wallpaper daemon.",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Show daemon status and recent events")]
    Status,
    #[command(about = "Switch arrangement mode (per, span, duplicate)")]
    Mode { mode: String },
    #[command(about = "Bind a wallpaper directory to a monitor")]
    Load { monitor: String, path: PathBuf },
    #[command(about = "Remove the wallpaper of a monitor")]
    Unload { monitor: String },
    #[command(about = "Pause playback (all monitors when none given)")]
    Pause { monitor: Option<String> },
    #[command(about = "Resume playback (all monitors when none given)")]
    Resume { monitor: Option<String> },
    #[command(about = "Set the global volume, 0-100")]
    Volume { volume: u8 },
    #[command(about = "Capture a screenshot of a monitor's wallpaper")]
    Screenshot { monitor: String, path: PathBuf },
    #[command(about = "Edit a wallpaper property")]
    Property {
        monitor: String,
        name: String,
        #[arg(trailing_var_arg = true, required = true)]
        value: Vec<String>,
    },
    #[command(about = "Reset all property edits of a monitor's wallpaper")]
    Defaults { monitor: String },
    #[command(subcommand, about = "Control the screensaver")]
    Saver(SaverCommands),
    #[command(about = "List connected monitors")]
    Monitors,
    #[command(about = "Quit the daemon")]
    Quit,
}

#[derive(Subcommand)]
pub enum SaverCommands {
    #[command(about = "Force screensaver presentation now")]
    Start,
    #[command(about = "End screensaver presentation")]
    Stop,
    #[command(about = "Set the idle threshold, e.g. 5m or 300s")]
    Timeout { duration: String },
}

impl Commands {
    /// The wire line for the daemon; `None` for purely local commands.
    #[must_use]
    pub fn to_line(&self) -> Option<String> {
        match self {
            Self::Status => Some("status".to_string()),
            Self::Mode { mode } => Some(format!("mode {mode}")),
            Self::Load { monitor, path } => {
                Some(format!("load {monitor} {}", path.display()))
            }
            Self::Unload { monitor } => Some(format!("unload {monitor}")),
            Self::Pause { monitor } => Some(match monitor {
                Some(monitor) => format!("pause {monitor}"),
                None => "pause".to_string(),
            }),
            Self::Resume { monitor } => Some(match monitor {
                Some(monitor) => format!("resume {monitor}"),
                None => "resume".to_string(),
            }),
            Self::Volume { volume } => Some(format!("volume {volume}")),
            Self::Screenshot { monitor, path } => {
                Some(format!("screenshot {monitor} {}", path.display()))
            }
            Self::Property {
                monitor,
                name,
                value,
            } => Some(format!("property {monitor} {name} {}", value.join(" "))),
            Self::Defaults { monitor } => Some(format!("defaults {monitor}")),
            Self::Saver(SaverCommands::Start) => Some("saver start".to_string()),
            Self::Saver(SaverCommands::Stop) => Some("saver stop".to_string()),
            Self::Saver(SaverCommands::Timeout { duration }) => {
                Some(format!("saver-timeout {duration}"))
            }
            Self::Monitors => None,
            Self::Quit => Some("quit".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_lines() {
        let cmd = Commands::Load {
            monitor: "DP-1".to_string(),
            path: PathBuf::from("/wallpapers/aurora"),
        };
        assert_eq!(cmd.to_line().unwrap(), "load DP-1 /wallpapers/aurora");

        let cmd = Commands::Property {
            monitor: "DP-1".to_string(),
            name: "schemecolor".to_string(),
            value: vec!["0.1".to_string(), "0.2".to_string(), "0.3".to_string()],
        };
        assert_eq!(cmd.to_line().unwrap(), "property DP-1 schemecolor 0.1 0.2 0.3");

        assert_eq!(Commands::Monitors.to_line(), None);
        assert_eq!(
            Commands::Saver(SaverCommands::Timeout {
                duration: "5m".to_string()
            })
            .to_line()
            .unwrap(),
            "saver-timeout 5m"
        );
    }
}
