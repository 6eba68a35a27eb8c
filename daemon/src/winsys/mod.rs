//! Window-system seam.
//!
//! Everything that touches the display server goes through the
//! [`WindowSystem`] trait so attachment and screensaver logic can be
//! exercised against a recording fake.

mod x11;

pub use x11::X11WindowSystem;

use std::time::Duration;
use thiserror::Error;

use crate::display::{DisplayMonitor, Rect};

/// A native window id as reported by a player's handshake.
pub type WindowHandle = u32;

/// Where a surface sits in the stacking order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stacking {
    /// Below everything, behind desktop icons.
    Bottom,
    /// Above everything, for screensaver presentation.
    TopMost,
}

#[derive(Debug, Error)]
pub enum WinsysError {
    #[error("cannot connect to display server")]
    Connect(#[from] x11rb::errors::ConnectError),
    #[error("display connection failed")]
    Connection(#[from] x11rb::errors::ConnectionError),
    #[error("display request failed")]
    Reply(#[from] x11rb::errors::ReplyError),
    #[error("display id allocation failed")]
    Id(#[from] x11rb::errors::ReplyOrIdError),
    /// The target window no longer exists; the owning process is dead.
    #[error("window is gone")]
    BadWindow,
}

pub trait WindowSystem {
    /// Enumerates connected monitors, normalized to screen coordinates.
    ///
    /// # Errors
    /// [`WinsysError`] if the display server cannot be queried.
    fn monitors(&self) -> Result<Vec<DisplayMonitor>, WinsysError>;

    /// Drains pending display events and reports whether the monitor
    /// topology changed since the last call.
    ///
    /// # Errors
    /// [`WinsysError`] on a broken display connection.
    fn topology_changed(&self) -> Result<bool, WinsysError>;

    /// The persistent background container wallpaper windows are
    /// reparented into. Created lazily on first use.
    ///
    /// # Errors
    /// [`WinsysError`] if the surface cannot be created.
    fn desktop_surface(&self) -> Result<WindowHandle, WinsysError>;

    /// Origin of a surface in screen coordinates. The desktop container's
    /// origin may differ from `(0, 0)`.
    ///
    /// # Errors
    /// [`WinsysError::BadWindow`] if the surface no longer exists.
    fn surface_origin(&self, surface: WindowHandle) -> Result<(i32, i32), WinsysError>;

    /// Reparents `window` under `parent` (top-level when `None`) and
    /// applies position, size and stacking in one atomic placement.
    ///
    /// # Errors
    /// [`WinsysError::BadWindow`] if `window` is already gone, which the
    /// caller treats as evidence of a crashed instance.
    fn adopt(
        &self,
        window: WindowHandle,
        parent: Option<WindowHandle>,
        rect: Rect,
        stacking: Stacking,
    ) -> Result<(), WinsysError>;

    /// Re-applies position and size together without changing the parent.
    ///
    /// # Errors
    /// [`WinsysError::BadWindow`] if the window no longer exists.
    fn place(&self, window: WindowHandle, rect: Rect) -> Result<(), WinsysError>;

    /// Creates a mapped, black, topmost surface covering `rect`. Used to
    /// protect monitors with no screensaver content.
    ///
    /// # Errors
    /// [`WinsysError`] if the surface cannot be created.
    fn create_blank_surface(&self, rect: Rect) -> Result<WindowHandle, WinsysError>;

    /// # Errors
    /// [`WinsysError`] on a broken display connection.
    fn destroy_surface(&self, surface: WindowHandle) -> Result<(), WinsysError>;

    /// Time since the last user input.
    ///
    /// # Errors
    /// [`WinsysError`] if the idle counter cannot be queried.
    fn idle(&self) -> Result<Duration, WinsysError>;

    /// Current pointer position in screen coordinates.
    ///
    /// # Errors
    /// [`WinsysError`] on a broken display connection.
    fn pointer(&self) -> Result<(i32, i32), WinsysError>;

    /// Whether the foreground application holds an exclusive fullscreen
    /// window. The screensaver never triggers over one.
    ///
    /// # Errors
    /// [`WinsysError`] on a broken display connection.
    fn fullscreen_app_active(&self) -> Result<bool, WinsysError>;
}
