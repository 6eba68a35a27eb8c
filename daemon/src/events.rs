//! Events surfaced to the UI layer.
//!
//! The daemon keeps a bounded ring of recent events; `status` reports
//! drain from it so a client can catch up without a push channel.

use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::fmt;

const EVENT_CAP: usize = 64;

/// Something the UI may want to reflect.
#[derive(Debug, Clone, PartialEq)]
pub enum DaemonEvent {
    /// A binding was (re)realized and its wallpaper is showing.
    WallpaperChanged { monitor: String },
    /// A binding failed and is left unfulfilled.
    WallpaperError { monitor: String, reason: String },
    /// Something about a running wallpaper changed (property edit,
    /// screenshot, volume).
    WallpaperUpdated { monitor: String },
}

impl fmt::Display for DaemonEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WallpaperChanged { monitor } => write!(f, "changed {monitor}"),
            Self::WallpaperError { monitor, reason } => {
                write!(f, "error {monitor}: {reason}")
            }
            Self::WallpaperUpdated { monitor } => write!(f, "updated {monitor}"),
        }
    }
}

#[derive(Default)]
pub struct EventLog {
    recent: VecDeque<(DateTime<Local>, DaemonEvent)>,
}

impl EventLog {
    pub fn push(&mut self, event: DaemonEvent) {
        log::info!("{event}");
        if self.recent.len() == EVENT_CAP {
            self.recent.pop_front();
        }
        self.recent.push_back((Local::now(), event));
    }

    /// Formats the retained events, oldest first.
    #[must_use]
    pub fn report(&self) -> String {
        let mut out = String::new();
        for (stamp, event) in &self.recent {
            out.push_str(&format!("[{}] {event}\n", stamp.format("%H:%M:%S")));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_is_bounded() {
        let mut log = EventLog::default();
        for i in 0..(EVENT_CAP + 10) {
            log.push(DaemonEvent::WallpaperUpdated {
                monitor: format!("DP-{i}"),
            });
        }
        assert_eq!(log.recent.len(), EVENT_CAP);
        assert!(log.report().contains("DP-73"));
        assert!(!log.report().contains("DP-9\n"));
    }
}
