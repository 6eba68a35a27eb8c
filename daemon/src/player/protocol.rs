//! The line protocol spoken with player subprocesses.
//!
//! One JSON object per line, tagged by `type`, UTF-8, no embedded
//! newlines. The protocol is one-way per direction; there are no
//! correlation ids and every message is idempotent fire-and-forget.
//! Unknown `type` values are ignored rather than treated as errors, so
//! players and daemon can evolve independently.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, PartialEq, Error)]
pub enum ProtocolError {
    #[error("malformed message line")]
    Malformed,
    #[error("message may not contain a newline")]
    EmbeddedNewline,
}

/// Messages the daemon sends to a player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HostMessage {
    Reload,
    Suspend,
    Resume,
    SetVolume {
        volume: u8,
    },
    CaptureScreenshot {
        format: String,
        path: String,
    },
    SetProperty {
        name: String,
        /// The control body is forwarded opaquely; the daemon does not
        /// interpret type-specific fields.
        #[serde(flatten)]
        body: Value,
    },
    Close,
}

/// Messages a player sends to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PlayerMessage {
    /// The handshake: reported once the player has created its native
    /// window. Nothing is placed before this arrives.
    WindowHandle {
        id: u32,
    },
    WallpaperLoaded {
        success: bool,
    },
    Console {
        category: String,
        message: String,
    },
    ScreenshotResult {
        #[serde(rename = "file-name")]
        file_name: String,
        success: bool,
    },
    /// Any `type` this daemon does not know. Skipped by the read loop.
    #[serde(other)]
    Unknown,
}

/// Encodes a host message as one protocol line, newline included.
///
/// # Errors
/// [`ProtocolError::EmbeddedNewline`] if a field value would smuggle a
/// newline into the frame.
pub fn encode(msg: &HostMessage) -> Result<String, ProtocolError> {
    let mut line = serde_json::to_string(msg).map_err(|_| ProtocolError::Malformed)?;
    if line.contains('\n') {
        return Err(ProtocolError::EmbeddedNewline);
    }
    line.push('\n');
    Ok(line)
}

/// Decodes one player line.
///
/// # Errors
/// [`ProtocolError::Malformed`] for anything that is not a JSON object
/// with a `type` tag. Callers log and skip; a bad line never kills the
/// read loop.
pub fn decode(line: &str) -> Result<PlayerMessage, ProtocolError> {
    serde_json::from_str(line.trim_end()).map_err(|_| ProtocolError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn host_messages_use_kebab_case_tags() {
        let line = encode(&HostMessage::SetVolume { volume: 40 }).unwrap();
        assert_eq!(line, "{\"type\":\"set-volume\",\"volume\":40}\n");
        let line = encode(&HostMessage::CaptureScreenshot {
            format: "png".to_string(),
            path: "/tmp/shot.png".to_string(),
        })
        .unwrap();
        assert!(line.starts_with("{\"type\":\"capture-screenshot\""));
    }

    #[test]
    fn set_property_flattens_the_control_body() {
        let msg = HostMessage::SetProperty {
            name: "speed".to_string(),
            body: json!({"value": 2.5, "min": 0.0, "max": 10.0}),
        };
        let line = encode(&msg).unwrap();
        let parsed: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed["type"], "set-property");
        assert_eq!(parsed["name"], "speed");
        assert_eq!(parsed["value"], 2.5);
        assert_eq!(parsed["max"], 10.0);
    }

    #[test]
    fn decode_handshake() {
        let msg = decode("{\"type\":\"window-handle\",\"id\":77594624}\n").unwrap();
        assert_eq!(msg, PlayerMessage::WindowHandle { id: 77_594_624 });
    }

    #[test]
    fn decode_unknown_type_is_not_fatal() {
        let msg = decode("{\"type\":\"now-playing\",\"track\":\"x\"}").unwrap();
        assert_eq!(msg, PlayerMessage::Unknown);
    }

    #[test]
    fn decode_garbage_is_malformed() {
        assert_eq!(decode("not json at all"), Err(ProtocolError::Malformed));
        assert_eq!(decode("[1,2,3]"), Err(ProtocolError::Malformed));
    }

    #[test]
    fn screenshot_result_field_naming() {
        let msg =
            decode("{\"type\":\"screenshot-result\",\"file-name\":\"a.png\",\"success\":true}")
                .unwrap();
        assert_eq!(
            msg,
            PlayerMessage::ScreenshotResult {
                file_name: "a.png".to_string(),
                success: true
            }
        );
    }
}
