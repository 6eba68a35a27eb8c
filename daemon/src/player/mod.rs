//! Runtime state of one player subprocess.

pub mod channel;
pub mod launch;
pub mod protocol;

use smol::process::Child;
use std::path::PathBuf;
use std::time::Instant;

use crate::arrangement::Binding;
use crate::player::channel::ChannelWriter;
use crate::player::launch::LaunchOptions;
use crate::winsys::WindowHandle;

pub type InstanceId = u64;

/// Which container surface currently owns the instance's window.
///
/// One enum rather than two flags: a window attached to both the desktop
/// and the screensaver surface is unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentState {
    /// Spawned, handshake not yet acted upon.
    Unattached,
    /// Reparented under the desktop host surface, stacked at the bottom.
    DesktopAttached,
    /// Top-level and topmost for screensaver presentation.
    ScreensaverDetached,
    /// Torn down; the window dies with the process.
    Destroyed,
}

/// Why the instance exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceRole {
    /// Live desktop wallpaper.
    Desktop,
    /// Dedicated screensaver preview, torn down when presentation ends.
    SaverPreview,
}

/// A realized binding: one supervised subprocess and its window.
pub struct PlayerInstance {
    pub id: InstanceId,
    pub binding: Binding,
    pub role: InstanceRole,
    pub launch: LaunchOptions,
    /// Taken out of the instance when teardown moves it into a kill task.
    pub child: Option<Child>,
    pub pid: u32,
    pub writer: Option<ChannelWriter>,
    /// Populated asynchronously by the handshake.
    pub window: Option<WindowHandle>,
    pub attach: AttachmentState,
    /// Whether the player reported `wallpaper-loaded`.
    pub loaded: bool,
    /// A suspend requested before load is recorded here and replayed
    /// once the player is ready.
    pub is_paused: bool,
    pub property_copy: Option<PathBuf>,
    /// Handshake must arrive before this instant.
    pub handshake_deadline: Instant,
    /// A missed handshake is retried exactly once.
    pub handshake_retried: bool,
    /// A crashed player is respawned at most once without user action.
    pub crash_restarted: bool,
}

impl PlayerInstance {
    /// Whether the handshake is still outstanding.
    #[must_use]
    pub fn pending(&self) -> bool {
        self.window.is_none() && self.attach == AttachmentState::Unattached
    }
}
