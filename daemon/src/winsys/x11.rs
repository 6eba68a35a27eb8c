//! X11 implementation of [`WindowSystem`] via `x11rb`.
//!
//! Monitors come from RandR, idle time from the MIT-SCREEN-SAVER
//! extension, and the desktop host surface is an override-redirect
//! window kept at the bottom of the stacking order.

use std::cell::Cell;
use std::time::Duration;

use x11rb::COPY_DEPTH_FROM_PARENT;
use x11rb::connection::Connection;
use x11rb::protocol::Event;
use x11rb::protocol::randr::{self, ConnectionExt as _};
use x11rb::protocol::screensaver::ConnectionExt as _;
use x11rb::protocol::xproto::{
    Atom, AtomEnum, ConfigureWindowAux, ConnectionExt as _, CreateWindowAux, EventMask, StackMode,
    Window, WindowClass,
};
use x11rb::rust_connection::RustConnection;

use crate::display::{DisplayMonitor, Rect};
use crate::winsys::{Stacking, WindowHandle, WindowSystem, WinsysError};

/// Atoms interned once at connect time to avoid repeated roundtrips.
struct CachedAtoms {
    net_active_window: Atom,
    net_wm_state: Atom,
    net_wm_state_fullscreen: Atom,
    net_workarea: Atom,
}

impl CachedAtoms {
    fn new(conn: &RustConnection) -> Result<Self, WinsysError> {
        Ok(Self {
            net_active_window: intern(conn, b"_NET_ACTIVE_WINDOW")?,
            net_wm_state: intern(conn, b"_NET_WM_STATE")?,
            net_wm_state_fullscreen: intern(conn, b"_NET_WM_STATE_FULLSCREEN")?,
            net_workarea: intern(conn, b"_NET_WORKAREA")?,
        })
    }
}

fn intern(conn: &RustConnection, name: &[u8]) -> Result<Atom, WinsysError> {
    Ok(conn.intern_atom(false, name)?.reply()?.atom)
}

pub struct X11WindowSystem {
    conn: RustConnection,
    root: Window,
    black_pixel: u32,
    atoms: CachedAtoms,
    host_surface: Cell<Option<Window>>,
    topology_dirty: Cell<bool>,
}

impl X11WindowSystem {
    /// Connects to the display server and subscribes to topology changes.
    ///
    /// # Errors
    /// [`WinsysError`] if no display is reachable.
    pub fn connect() -> Result<Self, WinsysError> {
        let (conn, screen_num) = x11rb::connect(None)?;
        let screen = &conn.setup().roots[screen_num];
        let root = screen.root;
        let black_pixel = screen.black_pixel;
        let atoms = CachedAtoms::new(&conn)?;
        conn.randr_select_input(root, randr::NotifyMask::SCREEN_CHANGE)?;
        conn.flush()?;
        Ok(Self {
            conn,
            root,
            black_pixel,
            atoms,
            host_surface: Cell::new(None),
            topology_dirty: Cell::new(false),
        })
    }

    fn workarea(&self) -> Result<Option<Rect>, WinsysError> {
        let prop = self
            .conn
            .get_property(
                false,
                self.root,
                self.atoms.net_workarea,
                AtomEnum::CARDINAL,
                0,
                4,
            )?
            .reply()?;
        let values: Vec<u32> = match prop.value32() {
            Some(iter) => iter.collect(),
            None => return Ok(None),
        };
        if values.len() < 4 {
            return Ok(None);
        }
        Ok(Some(Rect::new(
            i32::try_from(values[0]).unwrap_or(0),
            i32::try_from(values[1]).unwrap_or(0),
            values[2],
            values[3],
        )))
    }

    fn create_surface(&self, rect: Rect, stacking: Stacking) -> Result<Window, WinsysError> {
        let wid = self.conn.generate_id()?;
        self.conn.create_window(
            COPY_DEPTH_FROM_PARENT,
            wid,
            self.root,
            i16::try_from(rect.x).unwrap_or(0),
            i16::try_from(rect.y).unwrap_or(0),
            u16::try_from(rect.width).unwrap_or(u16::MAX),
            u16::try_from(rect.height).unwrap_or(u16::MAX),
            0,
            WindowClass::INPUT_OUTPUT,
            0,
            &CreateWindowAux::new()
                .override_redirect(1)
                .background_pixel(self.black_pixel)
                .event_mask(EventMask::EXPOSURE),
        )?;
        self.conn.map_window(wid)?;
        let stack = match stacking {
            Stacking::Bottom => StackMode::BELOW,
            Stacking::TopMost => StackMode::ABOVE,
        };
        self.conn
            .configure_window(wid, &ConfigureWindowAux::new().stack_mode(stack))?;
        self.conn.flush()?;
        Ok(wid)
    }
}

/// X11 reports a vanished window as a request error; for this daemon the
/// only meaning of that is a dead player.
fn bad_window(err: x11rb::errors::ReplyError) -> WinsysError {
    match err {
        x11rb::errors::ReplyError::X11Error(_) => WinsysError::BadWindow,
        other => WinsysError::Reply(other),
    }
}

impl WindowSystem for X11WindowSystem {
    fn monitors(&self) -> Result<Vec<DisplayMonitor>, WinsysError> {
        let reply = self.conn.randr_get_monitors(self.root, true)?.reply()?;
        let workarea = self.workarea()?;
        let mut monitors = Vec::with_capacity(reply.monitors.len());
        for (index, info) in reply.monitors.iter().enumerate() {
            let name = self.conn.get_atom_name(info.name)?.reply()?.name;
            let bounds = Rect::new(
                i32::from(info.x),
                i32::from(info.y),
                u32::from(info.width),
                u32::from(info.height),
            );
            let working_area = workarea
                .and_then(|wa| wa.intersect(&bounds))
                .unwrap_or(bounds);
            monitors.push(DisplayMonitor {
                device_id: String::from_utf8_lossy(&name).into_owned(),
                index,
                bounds,
                working_area,
                is_primary: info.primary,
            });
        }
        Ok(monitors)
    }

    fn topology_changed(&self) -> Result<bool, WinsysError> {
        while let Some(event) = self.conn.poll_for_event()? {
            if matches!(
                event,
                Event::RandrScreenChangeNotify(_) | Event::RandrNotify(_)
            ) {
                self.topology_dirty.set(true);
            }
        }
        Ok(self.topology_dirty.replace(false))
    }

    fn desktop_surface(&self) -> Result<WindowHandle, WinsysError> {
        if let Some(existing) = self.host_surface.get() {
            return Ok(existing);
        }
        let geometry = self.conn.get_geometry(self.root)?.reply()?;
        let wid = self.create_surface(
            Rect::new(
                0,
                0,
                u32::from(geometry.width),
                u32::from(geometry.height),
            ),
            Stacking::Bottom,
        )?;
        self.host_surface.set(Some(wid));
        Ok(wid)
    }

    fn surface_origin(&self, surface: WindowHandle) -> Result<(i32, i32), WinsysError> {
        let reply = self
            .conn
            .translate_coordinates(surface, self.root, 0, 0)?
            .reply()
            .map_err(bad_window)?;
        Ok((i32::from(reply.dst_x), i32::from(reply.dst_y)))
    }

    fn adopt(
        &self,
        window: WindowHandle,
        parent: Option<WindowHandle>,
        rect: Rect,
        stacking: Stacking,
    ) -> Result<(), WinsysError> {
        let parent = parent.unwrap_or(self.root);
        self.conn
            .reparent_window(
                window,
                parent,
                i16::try_from(rect.x).unwrap_or(0),
                i16::try_from(rect.y).unwrap_or(0),
            )?
            .check()
            .map_err(bad_window)?;
        let stack = match stacking {
            Stacking::Bottom => StackMode::BELOW,
            Stacking::TopMost => StackMode::ABOVE,
        };
        // Position, size and stacking in one request so there is no
        // visible frame with stale geometry.
        self.conn
            .configure_window(
                window,
                &ConfigureWindowAux::new()
                    .x(rect.x)
                    .y(rect.y)
                    .width(rect.width)
                    .height(rect.height)
                    .stack_mode(stack),
            )?
            .check()
            .map_err(bad_window)?;
        self.conn.map_window(window)?;
        self.conn.flush()?;
        Ok(())
    }

    fn place(&self, window: WindowHandle, rect: Rect) -> Result<(), WinsysError> {
        self.conn
            .configure_window(
                window,
                &ConfigureWindowAux::new()
                    .x(rect.x)
                    .y(rect.y)
                    .width(rect.width)
                    .height(rect.height),
            )?
            .check()
            .map_err(bad_window)?;
        self.conn.flush()?;
        Ok(())
    }

    fn create_blank_surface(&self, rect: Rect) -> Result<WindowHandle, WinsysError> {
        self.create_surface(rect, Stacking::TopMost)
    }

    fn destroy_surface(&self, surface: WindowHandle) -> Result<(), WinsysError> {
        self.conn.destroy_window(surface)?;
        self.conn.flush()?;
        Ok(())
    }

    fn idle(&self) -> Result<Duration, WinsysError> {
        let reply = self.conn.screensaver_query_info(self.root)?.reply()?;
        Ok(Duration::from_millis(u64::from(reply.ms_since_user_input)))
    }

    fn pointer(&self) -> Result<(i32, i32), WinsysError> {
        let reply = self.conn.query_pointer(self.root)?.reply()?;
        Ok((i32::from(reply.root_x), i32::from(reply.root_y)))
    }

    fn fullscreen_app_active(&self) -> Result<bool, WinsysError> {
        let prop = self
            .conn
            .get_property(
                false,
                self.root,
                self.atoms.net_active_window,
                AtomEnum::WINDOW,
                0,
                1,
            )?
            .reply()?;
        let Some(active) = prop.value32().and_then(|mut v| v.next()) else {
            return Ok(false);
        };
        if active == 0 {
            return Ok(false);
        }
        let state = self
            .conn
            .get_property(
                false,
                active,
                self.atoms.net_wm_state,
                AtomEnum::ATOM,
                0,
                32,
            )?
            .reply();
        // The active window may vanish between the two queries.
        let Ok(state) = state else {
            return Ok(false);
        };
        Ok(state
            .value32()
            .is_some_and(|mut atoms| atoms.any(|a| a == self.atoms.net_wm_state_fullscreen)))
    }
}
