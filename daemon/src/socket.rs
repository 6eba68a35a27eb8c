//! Control socket and its command grammar.
//!
//! One line per connection: the client writes a command, the daemon
//! writes a reply and shuts the connection down. The grammar is plain
//! words and arguments so `frescoctl` stays a thin formatter.

use nom::branch::alt;
use nom::bytes::complete::{tag, take_till1};
use nom::character::complete::space0;
use nom::combinator::{map, map_res, opt, rest};
use nom::{IResult, Parser};

use smol::net::unix::{UnixListener, UnixStream};
use smol::stream::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::arrangement::ArrangementMode;

/// Commands accepted over the control socket.
///
/// `Option<String>` monitors mean the command applies to every live
/// instance when omitted.
#[derive(Debug, PartialEq)]
pub enum DaemonCmd {
    /// Report daemon state and recent events.
    Status,
    /// Switch the arrangement mode.
    Mode(ArrangementMode),
    /// Bind a wallpaper directory to a monitor.
    Load { monitor: String, path: PathBuf },
    /// Remove the binding of a monitor.
    Unload { monitor: String },
    Pause { monitor: Option<String> },
    Resume { monitor: Option<String> },
    /// Set the global volume, 0-100.
    Volume(u8),
    /// Ask one player for a screenshot into the given file.
    Screenshot { monitor: String, path: PathBuf },
    /// Edit one property of one monitor's wallpaper.
    Property {
        monitor: String,
        name: String,
        value: String,
    },
    /// Reset all property edits of a monitor's wallpaper.
    Defaults { monitor: String },
    /// Force screensaver presentation on or off.
    SaverStart,
    SaverStop,
    /// Change the saver idle threshold.
    SaverTimeout(Duration),
    /// Quit the daemon.
    Quit,
}

#[derive(Debug, PartialEq, Error)]
pub enum SocketError {
    #[error("failed to initialise socket")]
    InitFailed,
    #[error("unrecognised command")]
    UnknownCmd,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("socket internal error")]
    InternalError,
}

pub struct Socket {
    listener: UnixListener,
}

impl Socket {
    /// Binds the control socket, replacing a stale file from a previous
    /// run.
    ///
    /// # Errors
    /// [`SocketError::InitFailed`] when the path cannot be bound.
    pub fn new(path: &Path) -> Result<Self, SocketError> {
        let _ = std::fs::remove_file(path);
        Ok(Self {
            listener: UnixListener::bind(path).map_err(|_| SocketError::InitFailed)?,
        })
    }

    /// Waits for the next client connection.
    pub async fn accept(&self) -> Option<UnixStream> {
        let mut incoming = self.listener.incoming();
        match incoming.next().await {
            Some(Ok(conn)) => Some(conn),
            Some(Err(err)) => {
                log::warn!("control connection failed: {err}");
                None
            }
            None => None,
        }
    }
}

/// Parses one client line into a [`DaemonCmd`].
///
/// # Errors
/// [`SocketError::UnknownCmd`] when no command matches,
/// [`SocketError::InvalidArgument`] when a command matches but its
/// arguments do not.
pub fn parse(input: &str) -> Result<DaemonCmd, SocketError> {
    match parse_cmd(input.trim()) {
        Ok((rest, cmd)) if rest.trim().is_empty() => Ok(cmd),
        Ok(_) => Err(SocketError::InvalidArgument),
        Err(_) => {
            if known_verb(input.trim()) {
                Err(SocketError::InvalidArgument)
            } else {
                Err(SocketError::UnknownCmd)
            }
        }
    }
}

fn known_verb(input: &str) -> bool {
    let verb = input.split_whitespace().next().unwrap_or("");
    matches!(
        verb,
        "mode"
            | "load"
            | "unload"
            | "pause"
            | "resume"
            | "volume"
            | "screenshot"
            | "property"
            | "defaults"
            | "saver"
            | "saver-timeout"
    )
}

fn word(input: &str) -> IResult<&str, &str> {
    take_till1(|c: char| c.is_whitespace())(input)
}

fn parse_status(input: &str) -> IResult<&str, DaemonCmd> {
    map(tag("status"), |_| DaemonCmd::Status).parse(input)
}
fn parse_quit(input: &str) -> IResult<&str, DaemonCmd> {
    map(tag("quit"), |_| DaemonCmd::Quit).parse(input)
}

fn parse_mode(input: &str) -> IResult<&str, DaemonCmd> {
    let (input, _) = tag("mode")(input)?;
    let (input, _) = space0(input)?;
    map(
        map_res(word, str::parse::<ArrangementMode>),
        DaemonCmd::Mode,
    )
    .parse(input)
}

fn parse_load(input: &str) -> IResult<&str, DaemonCmd> {
    let (input, _) = tag("load")(input)?;
    let (input, _) = space0(input)?;
    let (input, monitor) = word(input)?;
    let (input, _) = space0(input)?;
    let (input, path) = map_res(word, str::parse::<PathBuf>).parse(input)?;
    Ok((
        input,
        DaemonCmd::Load {
            monitor: monitor.to_string(),
            path,
        },
    ))
}

fn parse_unload(input: &str) -> IResult<&str, DaemonCmd> {
    let (input, _) = tag("unload")(input)?;
    let (input, _) = space0(input)?;
    map(word, |monitor: &str| DaemonCmd::Unload {
        monitor: monitor.to_string(),
    })
    .parse(input)
}

fn parse_pause(input: &str) -> IResult<&str, DaemonCmd> {
    let (input, _) = tag("pause")(input)?;
    let (input, _) = space0(input)?;
    map(opt(word), |monitor: Option<&str>| DaemonCmd::Pause {
        monitor: monitor.map(String::from),
    })
    .parse(input)
}

fn parse_resume(input: &str) -> IResult<&str, DaemonCmd> {
    let (input, _) = tag("resume")(input)?;
    let (input, _) = space0(input)?;
    map(opt(word), |monitor: Option<&str>| DaemonCmd::Resume {
        monitor: monitor.map(String::from),
    })
    .parse(input)
}

fn parse_volume(input: &str) -> IResult<&str, DaemonCmd> {
    let (input, _) = tag("volume")(input)?;
    let (input, _) = space0(input)?;
    map(
        map_res(word, |raw: &str| match raw.parse::<u8>() {
            Ok(v) if v <= 100 => Ok(v),
            _ => Err(SocketError::InvalidArgument),
        }),
        DaemonCmd::Volume,
    )
    .parse(input)
}

fn parse_screenshot(input: &str) -> IResult<&str, DaemonCmd> {
    let (input, _) = tag("screenshot")(input)?;
    let (input, _) = space0(input)?;
    let (input, monitor) = word(input)?;
    let (input, _) = space0(input)?;
    let (input, path) = map_res(word, str::parse::<PathBuf>).parse(input)?;
    Ok((
        input,
        DaemonCmd::Screenshot {
            monitor: monitor.to_string(),
            path,
        },
    ))
}

fn parse_property(input: &str) -> IResult<&str, DaemonCmd> {
    let (input, _) = tag("property")(input)?;
    let (input, _) = space0(input)?;
    let (input, monitor) = word(input)?;
    let (input, _) = space0(input)?;
    let (input, name) = word(input)?;
    let (input, _) = space0(input)?;
    // The value is the rest of the line; colors and text may contain
    // spaces.
    map_res(rest, |value: &str| {
        if value.trim().is_empty() {
            Err(SocketError::InvalidArgument)
        } else {
            Ok(DaemonCmd::Property {
                monitor: monitor.to_string(),
                name: name.to_string(),
                value: value.trim().to_string(),
            })
        }
    })
    .parse(input)
}

fn parse_defaults(input: &str) -> IResult<&str, DaemonCmd> {
    let (input, _) = tag("defaults")(input)?;
    let (input, _) = space0(input)?;
    map(word, |monitor: &str| DaemonCmd::Defaults {
        monitor: monitor.to_string(),
    })
    .parse(input)
}

fn parse_saver(input: &str) -> IResult<&str, DaemonCmd> {
    let (input, _) = tag("saver")(input)?;
    let (input, _) = space0(input)?;
    map_res(word, |action: &str| match action {
        "start" => Ok(DaemonCmd::SaverStart),
        "stop" => Ok(DaemonCmd::SaverStop),
        _ => Err(SocketError::InvalidArgument),
    })
    .parse(input)
}

fn parse_saver_timeout(input: &str) -> IResult<&str, DaemonCmd> {
    let (input, _) = tag("saver-timeout")(input)?;
    let (input, _) = space0(input)?;
    map(map_res(word, duration_str::parse), DaemonCmd::SaverTimeout).parse(input)
}

fn parse_cmd(input: &str) -> IResult<&str, DaemonCmd> {
    alt((
        parse_status,
        parse_saver_timeout,
        parse_saver,
        parse_mode,
        parse_load,
        parse_unload,
        parse_pause,
        parse_resume,
        parse_volume,
        parse_screenshot,
        parse_property,
        parse_defaults,
        parse_quit,
    ))
    .parse(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cmd() {
        assert_eq!(parse("status"), Ok(DaemonCmd::Status));
        assert_eq!(
            parse("mode span"),
            Ok(DaemonCmd::Mode(ArrangementMode::Span))
        );
        assert_eq!(
            parse("load DP-1 /wallpapers/aurora"),
            Ok(DaemonCmd::Load {
                monitor: "DP-1".to_string(),
                path: PathBuf::from("/wallpapers/aurora"),
            })
        );
        assert_eq!(
            parse("unload DP-1"),
            Ok(DaemonCmd::Unload {
                monitor: "DP-1".to_string()
            })
        );
        assert_eq!(parse("pause"), Ok(DaemonCmd::Pause { monitor: None }));
        assert_eq!(
            parse("resume HDMI-1"),
            Ok(DaemonCmd::Resume {
                monitor: Some("HDMI-1".to_string())
            })
        );
        assert_eq!(parse("volume 35"), Ok(DaemonCmd::Volume(35)));
        assert_eq!(parse("quit"), Ok(DaemonCmd::Quit));
    }

    #[test]
    fn property_value_is_the_rest_of_the_line() {
        assert_eq!(
            parse("property DP-1 schemecolor 0.1 0.2 0.3"),
            Ok(DaemonCmd::Property {
                monitor: "DP-1".to_string(),
                name: "schemecolor".to_string(),
                value: "0.1 0.2 0.3".to_string(),
            })
        );
    }

    #[test]
    fn saver_commands() {
        assert_eq!(parse("saver start"), Ok(DaemonCmd::SaverStart));
        assert_eq!(parse("saver stop"), Ok(DaemonCmd::SaverStop));
        assert_eq!(
            parse("saver-timeout 5m"),
            Ok(DaemonCmd::SaverTimeout(Duration::from_secs(300)))
        );
    }

    #[test]
    fn bad_arguments_are_distinguished_from_unknown_commands() {
        assert_eq!(parse("volume 150"), Err(SocketError::InvalidArgument));
        assert_eq!(parse("mode diagonal"), Err(SocketError::InvalidArgument));
        assert_eq!(parse("saver sideways"), Err(SocketError::InvalidArgument));
        assert_eq!(parse("frobnicate"), Err(SocketError::UnknownCmd));
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        assert_eq!(parse("quit now"), Err(SocketError::InvalidArgument));
    }
}
