//! Screensaver presentation state machine.
//!
//! Exactly three phases: idle, starting, presenting. Starting exists so
//! a stop request that races the start sequence is never lost: it is
//! recorded and unwinds the presentation as soon as the start completes.
//! Desktop wallpaper is never destroyed to present the saver; windows
//! are lifted out and put back.

use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::arrangement::{ArrangementMode, Binding, MonitorGroup};
use crate::attach;
use crate::display::DisplayMonitor;
use crate::player::launch::LaunchOptions;
use crate::player::{AttachmentState, InstanceId, InstanceRole};
use crate::settings::SaverLayoutEntry;
use crate::supervisor::Supervisor;
use crate::wallpaper::{WallpaperDescriptor, WallpaperError};
use crate::winsys::{WindowHandle, WindowSystem, WinsysError};

/// Pointer jitter below this many pixels (per axis) does not end the
/// presentation.
pub const POINTER_NOISE: i32 = 5;

#[derive(Debug, Error)]
pub enum SaverError {
    #[error(transparent)]
    Winsys(#[from] WinsysError),
}

/// Where the presented content comes from.
pub enum SaverSource {
    /// Lift the live desktop instances topmost, in place.
    Mirror,
    /// Dedicated preview instances from the configured saver layout.
    Layout(Vec<Binding>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Starting,
    Presenting,
}

pub struct SaverMachine {
    phase: Phase,
    /// A stop that arrived mid-start; honored when the start completes.
    stop_deferred: bool,
    /// Pointer position captured at start; the noise threshold is
    /// measured against it.
    anchor: Option<(i32, i32)>,
    /// Pointer sample from the previous idle poll; key-press inference
    /// compares against it.
    last_sample: Option<(i32, i32)>,
    /// Desktop instances lifted out for mirroring.
    detached: Vec<InstanceId>,
    /// Dedicated preview instances, torn down on stop.
    previews: Vec<InstanceId>,
    /// Black covers over monitors with no saver content.
    blanks: Vec<WindowHandle>,
    lock_on_exit: bool,
}

impl SaverMachine {
    #[must_use]
    pub fn new(lock_on_exit: bool) -> Self {
        Self {
            phase: Phase::Idle,
            stop_deferred: false,
            anchor: None,
            last_sample: None,
            detached: Vec::new(),
            previews: Vec::new(),
            blanks: Vec::new(),
            lock_on_exit,
        }
    }

    pub fn set_lock_on_exit(&mut self, lock: bool) {
        self.lock_on_exit = lock;
    }

    #[must_use]
    pub fn is_presenting(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Whether the given instance is one of our previews.
    #[must_use]
    pub fn owns_preview(&self, id: InstanceId) -> bool {
        self.previews.contains(&id)
    }

    /// Whether idle time warrants presentation. Never true over an
    /// exclusive fullscreen application or while already presenting.
    #[must_use]
    pub fn should_trigger(
        &self,
        timeout: Option<Duration>,
        idle: Duration,
        fullscreen: bool,
    ) -> bool {
        if self.phase != Phase::Idle || fullscreen {
            return false;
        }
        timeout.is_some_and(|t| idle >= t)
    }

    /// Whether observed input should end the presentation. Keyboard
    /// input always ends it; pointer motion only beyond [`POINTER_NOISE`].
    #[must_use]
    pub fn should_stop(&self, pointer: (i32, i32), key_pressed: bool) -> bool {
        if self.phase != Phase::Presenting {
            return false;
        }
        if key_pressed {
            return true;
        }
        let Some((ax, ay)) = self.anchor else {
            return true;
        };
        (pointer.0 - ax).abs() > POINTER_NOISE || (pointer.1 - ay).abs() > POINTER_NOISE
    }

    /// Infers keyboard or button input from an idle-counter reset while
    /// the pointer sits exactly where the previous poll saw it. Pointer
    /// jitter also resets the counter, but it moves the sample, and
    /// polls are at least `interval` apart, so the next poll sees the
    /// counter past `interval` again.
    pub fn infer_key_press(
        &mut self,
        pointer: (i32, i32),
        idle: Duration,
        interval: Duration,
    ) -> bool {
        let unchanged = self.last_sample == Some(pointer);
        self.last_sample = Some(pointer);
        unchanged && idle < interval
    }

    /// Begins presentation. A second start while one is underway or
    /// showing is a no-op.
    ///
    /// # Errors
    /// [`SaverError`] when blank covers cannot be created; the machine
    /// unwinds to idle in that case.
    pub async fn start<W: WindowSystem>(
        &mut self,
        sup: &mut Supervisor,
        ws: &W,
        source: SaverSource,
        monitors: &[DisplayMonitor],
        launch_for: &dyn Fn(&Binding) -> LaunchOptions,
    ) -> Result<(), SaverError> {
        if !self.arm(ws) {
            return Ok(());
        }

        let mut covered: Vec<String> = Vec::new();
        match source {
            SaverSource::Mirror => {
                for id in sup.desktop_ids() {
                    let Some(instance) = sup.get_mut(id) else {
                        continue;
                    };
                    if instance.attach != AttachmentState::DesktopAttached {
                        continue;
                    }
                    match attach::detach_for_saver(instance, ws) {
                        Ok(()) => {
                            covered.extend(instance.binding.group.device_ids());
                            self.detached.push(id);
                        }
                        Err(err) => {
                            log::warn!("cannot lift player {id} for the saver: {err}");
                        }
                    }
                }
            }
            SaverSource::Layout(bindings) => {
                for binding in bindings {
                    let ids = binding.group.device_ids();
                    let launch = launch_for(&binding);
                    match sup.spawn_instance(binding, InstanceRole::SaverPreview, launch) {
                        Ok(id) => {
                            covered.extend(ids);
                            self.previews.push(id);
                        }
                        Err(err) => {
                            log::error!("saver preview spawn failed: {err}");
                        }
                    }
                }
            }
        }

        // Monitors with nothing to show get a black cover so no desktop
        // content leaks through the presentation.
        for monitor in monitors {
            if covered.iter().any(|id| id == &monitor.device_id) {
                continue;
            }
            match ws.create_blank_surface(monitor.bounds) {
                Ok(blank) => self.blanks.push(blank),
                Err(err) => {
                    self.unwind(sup, ws).await;
                    self.phase = Phase::Idle;
                    return Err(err.into());
                }
            }
        }

        self.complete(sup, ws).await;
        Ok(())
    }

    /// Enters the start sequence. False when one is already underway.
    fn arm<W: WindowSystem>(&mut self, ws: &W) -> bool {
        if self.phase != Phase::Idle {
            return false;
        }
        self.phase = Phase::Starting;
        self.stop_deferred = false;
        self.last_sample = None;
        self.anchor = ws.pointer().ok();
        true
    }

    /// Finishes the start sequence, honoring a stop that raced it.
    async fn complete<W: WindowSystem>(&mut self, sup: &mut Supervisor, ws: &W) {
        self.phase = Phase::Presenting;
        log::info!("screensaver presenting");
        if self.stop_deferred {
            self.stop(sup, ws).await;
        }
    }

    /// Attaches a desktop instance that completed its handshake while a
    /// presentation is underway. The window goes straight topmost so its
    /// monitor shows wallpaper instead of live desktop content, and it
    /// is restored to the desktop when the presentation ends.
    ///
    /// # Errors
    /// [`attach::AttachError`]; `InstanceDead` means supervisor cleanup.
    pub fn adopt_respawned<W: WindowSystem>(
        &mut self,
        sup: &mut Supervisor,
        ws: &W,
        id: InstanceId,
    ) -> Result<(), attach::AttachError> {
        let Some(instance) = sup.get_mut(id) else {
            return Ok(());
        };
        attach::attach_saver_preview(instance, ws)?;
        self.detached.push(id);
        Ok(())
    }

    /// Drops a dead instance from the presentation bookkeeping.
    pub fn forget(&mut self, id: InstanceId) {
        self.detached.retain(|d| *d != id);
        self.previews.retain(|p| *p != id);
    }

    /// Ends presentation and restores the desktop. Returns whether the
    /// session should be locked. During start the request is deferred,
    /// never dropped.
    pub async fn stop<W: WindowSystem>(&mut self, sup: &mut Supervisor, ws: &W) -> bool {
        match self.phase {
            Phase::Idle => return false,
            Phase::Starting => {
                self.stop_deferred = true;
                return false;
            }
            Phase::Presenting => {}
        }
        self.unwind(sup, ws).await;
        self.phase = Phase::Idle;
        self.stop_deferred = false;
        self.anchor = None;
        self.last_sample = None;
        log::info!("screensaver stopped");
        self.lock_on_exit
    }

    async fn unwind<W: WindowSystem>(&mut self, sup: &mut Supervisor, ws: &W) {
        for blank in self.blanks.drain(..) {
            if let Err(err) = ws.destroy_surface(blank) {
                log::warn!("cannot destroy saver cover: {err}");
            }
        }
        for id in self.previews.drain(..) {
            sup.teardown(id).await;
        }
        for id in self.detached.drain(..) {
            if let Some(instance) = sup.get_mut(id)
                && let Err(err) = attach::attach_desktop(instance, ws)
            {
                log::warn!("cannot restore player {id} to the desktop: {err}");
            }
        }
    }
}

/// Expands the persisted saver layout into bindings for the current
/// monitors. The loader indirection keeps manifest I/O out of callers
/// that do not want it.
pub fn resolve_layout(
    entries: &[SaverLayoutEntry],
    monitors: &[DisplayMonitor],
    load: &dyn Fn(&Path) -> Result<WallpaperDescriptor, WallpaperError>,
) -> Vec<Binding> {
    let mut bindings = Vec::new();
    for entry in entries {
        let descriptor = match load(&entry.wallpaper) {
            Ok(descriptor) => descriptor,
            Err(err) => {
                log::warn!(
                    "saver layout entry {} is unusable: {err}",
                    entry.wallpaper.display()
                );
                continue;
            }
        };
        match entry.mode {
            ArrangementMode::Per => {
                let Some(monitor) = monitors.iter().find(|m| {
                    entry.device_id.as_deref() == Some(m.device_id.as_str())
                }) else {
                    continue;
                };
                bindings.push(Binding {
                    group: MonitorGroup::Single(monitor.clone()),
                    descriptor,
                });
            }
            ArrangementMode::Span => {
                if monitors.is_empty() {
                    continue;
                }
                bindings.push(Binding {
                    group: MonitorGroup::Union(monitors.to_vec()),
                    descriptor,
                });
            }
            ArrangementMode::Duplicate => {
                for monitor in monitors {
                    bindings.push(Binding {
                        group: MonitorGroup::Single(monitor.clone()),
                        descriptor: descriptor.clone(),
                    });
                }
            }
        }
    }
    bindings
}
