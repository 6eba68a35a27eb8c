//! Async channel over a player's standard I/O.
//!
//! Each instance owns one read loop as an independent background task;
//! a stuck player never blocks its siblings or the supervisor. The loop
//! only ends on genuine stream closure (EOF or an empty line) or when
//! the supervisor drops the process. Malformed lines are logged and
//! skipped.

use smol::Timer;
use smol::channel::Sender;
use smol::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use smol::process::{ChildStdin, ChildStdout};
use std::time::Duration;
use thiserror::Error;

use crate::player::InstanceId;
use crate::player::protocol::{self, HostMessage, PlayerMessage};

/// A write that has not completed within this budget indicates a player
/// that stopped draining its stdin; the supervisor treats it as hung.
const SEND_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, PartialEq, Error)]
pub enum ChannelError {
    #[error("player stdin is closed")]
    Closed,
    #[error("player did not accept the message in time")]
    Timeout,
    #[error("message could not be encoded")]
    Encode,
}

/// An event surfaced from one player's read loop.
#[derive(Debug, PartialEq)]
pub struct PlayerEvent {
    pub id: InstanceId,
    pub kind: PlayerEventKind,
}

#[derive(Debug, PartialEq)]
pub enum PlayerEventKind {
    Message(PlayerMessage),
    /// The stream closed; the player exited or shut its stdout.
    Closed,
}

/// Writing half of one player channel.
pub struct ChannelWriter {
    stdin: ChildStdin,
}

impl ChannelWriter {
    #[must_use]
    pub fn new(stdin: ChildStdin) -> Self {
        Self { stdin }
    }

    /// Sends one message, bounded by [`SEND_TIMEOUT`].
    ///
    /// # Errors
    /// [`ChannelError::Closed`] if the pipe is gone, [`ChannelError::Timeout`]
    /// if the player stopped reading.
    pub async fn send(&mut self, msg: &HostMessage) -> Result<(), ChannelError> {
        let line = protocol::encode(msg).map_err(|_| ChannelError::Encode)?;
        let write = async {
            self.stdin
                .write_all(line.as_bytes())
                .await
                .map_err(|_| ChannelError::Closed)?;
            self.stdin.flush().await.map_err(|_| ChannelError::Closed)
        };
        smol::future::race(write, async {
            Timer::after(SEND_TIMEOUT).await;
            Err(ChannelError::Timeout)
        })
        .await
    }
}

/// Drives one player's read loop until the stream closes.
///
/// Every decoded message is forwarded as a [`PlayerEvent`]; a final
/// `Closed` event is always emitted so the supervisor observes the death.
pub async fn read_loop(id: InstanceId, stdout: ChildStdout, events: Sender<PlayerEvent>) {
    read_lines(id, stdout, events).await;
}

/// Generic over the reader so tests can feed canned bytes.
pub(crate) async fn read_lines<R: AsyncRead + Unpin>(
    id: InstanceId,
    reader: R,
    events: Sender<PlayerEvent>,
) {
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            // EOF, or an empty line: the player signalled closure.
            Ok(0) => break,
            Ok(_) if line.trim().is_empty() => break,
            Ok(_) => match protocol::decode(&line) {
                Ok(PlayerMessage::Unknown) => {
                    log::debug!("player {id}: ignoring unknown message type");
                }
                Ok(msg) => {
                    if events
                        .send(PlayerEvent {
                            id,
                            kind: PlayerEventKind::Message(msg),
                        })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(err) => {
                    log::warn!("player {id}: skipping bad line: {err}");
                }
            },
            Err(err) => {
                log::warn!("player {id}: read failed: {err}");
                break;
            }
        }
    }
    let _ = events
        .send(PlayerEvent {
            id,
            kind: PlayerEventKind::Closed,
        })
        .await;
}
