//! Moves player windows between the desktop host surface and the
//! screensaver presentation.
//!
//! Transitions are only valid along
//! `Unattached -> DesktopAttached <-> ScreensaverDetached`; teardown may
//! happen from any state. Geometry is always applied as position and
//! size together so a resize never flashes stale content.

use thiserror::Error;

use crate::display::Rect;
use crate::player::{AttachmentState, PlayerInstance};
use crate::winsys::{Stacking, WindowSystem, WinsysError};

#[derive(Debug, Error)]
pub enum AttachError {
    #[error("instance has not completed its handshake")]
    NoWindow,
    #[error("invalid attachment transition from {0:?}")]
    WrongState(AttachmentState),
    /// The window vanished under us: the process is dead. The caller
    /// must hand the instance to supervisor cleanup, not retry.
    #[error("window placement failed, instance presumed dead")]
    InstanceDead,
    #[error(transparent)]
    Winsys(WinsysError),
}

fn map_winsys(err: WinsysError) -> AttachError {
    match err {
        WinsysError::BadWindow => AttachError::InstanceDead,
        other => AttachError::Winsys(other),
    }
}

/// Attaches a freshly handshaken (or saver-released) window under the
/// desktop host surface, covering its group bounds, z-ordered to the
/// bottom.
///
/// # Errors
/// [`AttachError`]; `InstanceDead` means the supervisor should clean up.
pub fn attach_desktop<W: WindowSystem>(
    instance: &mut PlayerInstance,
    ws: &W,
) -> Result<(), AttachError> {
    let window = instance.window.ok_or(AttachError::NoWindow)?;
    if !matches!(
        instance.attach,
        AttachmentState::Unattached | AttachmentState::ScreensaverDetached
    ) {
        return Err(AttachError::WrongState(instance.attach));
    }
    let host = ws.desktop_surface().map_err(map_winsys)?;
    let rect = host_relative(instance.binding.group.bounds(), ws, host)?;
    ws.adopt(window, Some(host), rect, Stacking::Bottom)
        .map_err(map_winsys)?;
    instance.attach = AttachmentState::DesktopAttached;
    Ok(())
}

/// Lifts the window out of the desktop for screensaver presentation:
/// top-level, same screen bounds, raised topmost.
///
/// # Errors
/// [`AttachError`] as for [`attach_desktop`].
pub fn detach_for_saver<W: WindowSystem>(
    instance: &mut PlayerInstance,
    ws: &W,
) -> Result<(), AttachError> {
    let window = instance.window.ok_or(AttachError::NoWindow)?;
    if instance.attach != AttachmentState::DesktopAttached {
        return Err(AttachError::WrongState(instance.attach));
    }
    ws.adopt(
        window,
        None,
        instance.binding.group.bounds(),
        Stacking::TopMost,
    )
    .map_err(map_winsys)?;
    instance.attach = AttachmentState::ScreensaverDetached;
    Ok(())
}

/// Places a dedicated saver preview directly topmost; it never touches
/// the desktop surface.
///
/// # Errors
/// [`AttachError`] as for [`attach_desktop`].
pub fn attach_saver_preview<W: WindowSystem>(
    instance: &mut PlayerInstance,
    ws: &W,
) -> Result<(), AttachError> {
    let window = instance.window.ok_or(AttachError::NoWindow)?;
    if instance.attach != AttachmentState::Unattached {
        return Err(AttachError::WrongState(instance.attach));
    }
    ws.adopt(
        window,
        None,
        instance.binding.group.bounds(),
        Stacking::TopMost,
    )
    .map_err(map_winsys)?;
    instance.attach = AttachmentState::ScreensaverDetached;
    Ok(())
}

/// Re-applies the group geometry after a topology or arrangement change
/// without moving the window between containers.
///
/// # Errors
/// [`AttachError`] as for [`attach_desktop`].
pub fn update_geometry<W: WindowSystem>(
    instance: &PlayerInstance,
    ws: &W,
) -> Result<(), AttachError> {
    let window = instance.window.ok_or(AttachError::NoWindow)?;
    let bounds = instance.binding.group.bounds();
    let rect = match instance.attach {
        AttachmentState::DesktopAttached => {
            let host = ws.desktop_surface().map_err(map_winsys)?;
            host_relative(bounds, ws, host)?
        }
        AttachmentState::ScreensaverDetached => bounds,
        state => return Err(AttachError::WrongState(state)),
    };
    ws.place(window, rect).map_err(map_winsys)
}

/// The desktop container's origin may differ from screen coordinates;
/// recompute the offset against the host's own coordinate space.
fn host_relative<W: WindowSystem>(bounds: Rect, ws: &W, host: u32) -> Result<Rect, AttachError> {
    let (ox, oy) = ws.surface_origin(host).map_err(map_winsys)?;
    Ok(Rect::new(
        bounds.x - ox,
        bounds.y - oy,
        bounds.width,
        bounds.height,
    ))
}
