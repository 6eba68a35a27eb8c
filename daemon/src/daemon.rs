//! `frescod` entry.
//!
//! Owns the main loop: control socket connections, player events and a
//! periodic tick race against each other; whichever wakes first is
//! handled and the loop goes around. Unless `--standby` is passed, the
//! persisted arrangement is restored on startup.

use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use smol::Timer;
use smol::channel::Receiver;
use smol::io::{AsyncReadExt, AsyncWriteExt};
use smol::net::unix::UnixStream;
use std::env;
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::arrangement::{ArrangementMode, ArrangementState, Binding};
use crate::attach;
use crate::display::DisplayMonitor;
use crate::events::{DaemonEvent, EventLog};
use crate::player::channel::{PlayerEvent, PlayerEventKind};
use crate::player::launch::{FeatureToggles, LaunchOptions};
use crate::player::protocol::{HostMessage, PlayerMessage};
use crate::player::{AttachmentState, InstanceId};
use crate::properties::{PropertyStore, copy_key};
use crate::screensaver::{self, SaverMachine, SaverSource};
use crate::settings::Settings;
use crate::socket::{DaemonCmd, Socket, SocketError};
use crate::supervisor::{HandshakeOutcome, Supervisor};
use crate::wallpaper::WallpaperDescriptor;
use crate::winsys::WindowSystem;

pub static CFG: LazyLock<Config> = LazyLock::new(parse);
pub static CACHE_PATH: LazyLock<PathBuf> = LazyLock::new(sys_cache_dir);

/// Main loop heartbeat; handshake deadlines, topology polls and saver
/// idle checks ride on it.
const TICK: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(
    version,
    about = "A daemon that supervises live wallpaper players per monitor"
)]
struct Cli {
    #[arg(
        short = 'b',
        long = "binary",
        value_name = "PATH",
        help = "Path to the wallpaper player binary."
    )]
    binary: Option<PathBuf>,

    #[arg(
        short = 's',
        long = "settings",
        value_name = "FILE",
        help = "Path to the settings file."
    )]
    settings: Option<PathBuf>,

    #[arg(
        long = "debug-port",
        value_name = "PORT",
        help = "Remote debugging port passed to web wallpapers."
    )]
    debug_port: Option<u16>,

    #[arg(long = "standby", help = "Do not restore wallpapers on startup.")]
    standby: bool,

    #[arg(short = 'v', long = "verbose", help = "Verbose player logging.")]
    verbose: bool,
}

pub struct Config {
    pub binary: PathBuf,
    pub settings: Option<PathBuf>,
    pub debug_port: Option<u16>,
    pub standby: bool,
    pub verbose: bool,
}

fn parse() -> Config {
    let parsed = Cli::parse();
    Config {
        binary: parsed
            .binary
            .unwrap_or_else(|| PathBuf::from("fresco-player")),
        settings: parsed.settings,
        debug_port: parsed.debug_port,
        standby: parsed.standby,
        verbose: parsed.verbose,
    }
}

fn sys_cache_dir() -> PathBuf {
    // Player instances keep their caches and property copies here
    if let Ok(mut value) = env::var("XDG_CACHE_HOME") {
        value.push_str("/frescod");
        return PathBuf::from(value);
    }
    if let Ok(mut value) = env::var("HOME") {
        value.push_str("/.cache/frescod");
        return PathBuf::from(value);
    }
    // This is not persistent anyhow
    PathBuf::from("/tmp/frescod")
}

fn sys_config_dir() -> Option<PathBuf> {
    let default;
    if let Ok(value) = env::var("XDG_CONFIG_HOME") {
        default = PathBuf::from(value + "/frescod");
    } else if let Ok(value) = env::var("HOME") {
        default = PathBuf::from(value + "/.config/frescod");
    } else {
        return None;
    }
    Some(default)
}

fn settings_path() -> PathBuf {
    CFG.settings.clone().unwrap_or_else(|| {
        sys_config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("settings.json")
    })
}

fn socket_path() -> PathBuf {
    let dir = env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(dir).join("frescod.sock")
}

fn setup_logger() -> Result<(), fern::InitError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {}] {}",
                chrono::Local::now().format("%H:%M:%S"),
                record.level(),
                message
            ));
        })
        .chain(std::io::stdout())
        .apply()?;
    Ok(())
}

enum Wake {
    Control(Option<UnixStream>),
    Player(PlayerEvent),
    Tick,
}

pub struct Daemon<W: WindowSystem> {
    ws: W,
    socket: Socket,
    supervisor: Supervisor,
    rx: Receiver<PlayerEvent>,
    arrangement: ArrangementState,
    properties: PropertyStore,
    saver: SaverMachine,
    settings: Settings,
    settings_path: PathBuf,
    monitors: Vec<DisplayMonitor>,
    events: EventLog,
    volume: u8,
    saver_timeout: Option<Duration>,
    terminate: Arc<AtomicBool>,
    quitting: bool,
}

/// The real start.
///
/// # Errors
/// Fatal errors that will cause the program to exit will be returned
/// here.
pub async fn start<W: WindowSystem>(ws: W) -> Result<(), Box<dyn Error>> {
    if !CACHE_PATH.is_dir() {
        std::fs::create_dir_all(CACHE_PATH.as_path()).inspect_err(|err| {
            eprintln!("failed to create cache directory: {err}");
        })?;
    }
    setup_logger()?;

    let terminate = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGTERM, Arc::clone(&terminate))?;
    signal_hook::flag::register(SIGINT, Arc::clone(&terminate))?;

    let socket = Socket::new(&socket_path())
        .inspect_err(|err| eprintln!("failed to create unix socket: {err}"))?;

    let settings_path = settings_path();
    let settings = Settings::load(&settings_path).unwrap_or_else(|err| {
        log::error!("settings unusable, starting from defaults: {err}");
        Settings::default()
    });

    let (tx, rx) = smol::channel::unbounded();
    let monitors = ws.monitors()?;
    let mut daemon = Daemon {
        ws,
        socket,
        supervisor: Supervisor::new(tx),
        rx,
        arrangement: ArrangementState::new(settings.mode),
        properties: PropertyStore::new(CACHE_PATH.clone()),
        saver: SaverMachine::new(settings.saver.lock_on_exit),
        volume: settings.volume,
        saver_timeout: settings.saver_timeout(),
        settings,
        settings_path,
        monitors,
        events: EventLog::default(),
        terminate,
        quitting: false,
    };

    daemon.restore().await;
    daemon.run().await;
    daemon.supervisor.shutdown().await;
    Ok(())
}

impl<W: WindowSystem> Daemon<W> {
    /// Rebuilds the persisted arrangement. Each broken assignment is
    /// reported and skipped; the rest come up normally.
    async fn restore(&mut self) {
        if CFG.standby {
            log::info!("standby: not restoring wallpapers");
            return;
        }
        let assignments: Vec<(String, PathBuf)> = self
            .settings
            .assignments
            .iter()
            .map(|(id, path)| (id.clone(), path.clone()))
            .collect();
        for (device_id, root) in assignments {
            match WallpaperDescriptor::load(&root) {
                Ok(descriptor) => self.arrangement.assign(&device_id, descriptor),
                Err(err) => {
                    self.events.push(DaemonEvent::WallpaperError {
                        monitor: device_id,
                        reason: err.to_string(),
                    });
                }
            }
        }
        self.reconcile_now().await;
    }

    async fn run(&mut self) {
        while !self.quitting {
            let wake = {
                let control = async { Wake::Control(self.socket.accept().await) };
                let player = async {
                    match self.rx.recv().await {
                        Ok(event) => Wake::Player(event),
                        Err(_) => Wake::Tick,
                    }
                };
                let tick = async {
                    Timer::after(TICK).await;
                    Wake::Tick
                };
                smol::future::race(smol::future::race(control, player), tick).await
            };
            match wake {
                Wake::Control(Some(conn)) => self.handle_connection(conn).await,
                Wake::Control(None) => {}
                Wake::Player(event) => self.handle_player_event(event).await,
                Wake::Tick => self.tick().await,
            }
            if self.terminate.load(Ordering::Relaxed) {
                log::info!("termination signal received");
                self.quitting = true;
            }
        }
    }

    async fn handle_connection(&mut self, mut conn: UnixStream) {
        let mut content = String::new();
        if conn.read_to_string(&mut content).await.is_err() {
            return;
        }
        let reply = match crate::socket::parse(&content) {
            Ok(cmd) => self.exec(cmd).await,
            Err(err) => format!("error: {err}"),
        };
        let _ = conn.write_all(reply.as_bytes()).await;
        let _ = conn.flush().await;
    }

    async fn exec(&mut self, cmd: DaemonCmd) -> String {
        match cmd {
            DaemonCmd::Status => self.report(),
            DaemonCmd::Mode(mode) => {
                self.arrangement.set_mode(mode, &self.monitors);
                self.settings.mode = mode;
                self.persist();
                self.reconcile_now().await;
                format!("mode {mode}")
            }
            DaemonCmd::Load { monitor, path } => {
                if !self.monitors.iter().any(|m| m.device_id == monitor) {
                    return format!("error: no such monitor {monitor}");
                }
                match WallpaperDescriptor::load(&path) {
                    Ok(descriptor) => {
                        self.arrangement.assign(&monitor, descriptor);
                        self.settings.assignments.insert(monitor.clone(), path);
                        self.persist();
                        self.reconcile_now().await;
                        format!("loaded on {monitor}")
                    }
                    Err(err) => {
                        self.events.push(DaemonEvent::WallpaperError {
                            monitor,
                            reason: err.to_string(),
                        });
                        format!("error: {err}")
                    }
                }
            }
            DaemonCmd::Unload { monitor } => {
                self.arrangement.unassign(&monitor);
                self.settings.assignments.remove(&monitor);
                self.persist();
                self.reconcile_now().await;
                format!("unloaded {monitor}")
            }
            DaemonCmd::Pause { monitor } => {
                for id in self.targets(monitor.as_deref()) {
                    self.supervisor.suspend(id).await;
                }
                "paused".to_string()
            }
            DaemonCmd::Resume { monitor } => {
                for id in self.targets(monitor.as_deref()) {
                    self.supervisor.resume(id).await;
                }
                "resumed".to_string()
            }
            DaemonCmd::Volume(volume) => {
                self.volume = volume;
                self.settings.volume = volume;
                self.persist();
                let ids = self.supervisor.desktop_ids();
                let results = self
                    .supervisor
                    .broadcast(&ids, &HostMessage::SetVolume { volume })
                    .await;
                let failed = results.iter().filter(|(_, ok)| !ok).count();
                if failed > 0 {
                    format!("volume {volume} ({failed} players unreachable)")
                } else {
                    format!("volume {volume}")
                }
            }
            DaemonCmd::Screenshot { monitor, path } => {
                let Some(id) = self.supervisor.find_by_monitor(&monitor) else {
                    return format!("error: no wallpaper on {monitor}");
                };
                let format = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("png")
                    .to_string();
                let msg = HostMessage::CaptureScreenshot {
                    format,
                    path: path.display().to_string(),
                };
                if self.supervisor.send(id, &msg).await {
                    "screenshot requested".to_string()
                } else {
                    format!("error: {}", SocketError::InternalError)
                }
            }
            DaemonCmd::Property {
                monitor,
                name,
                value,
            } => self.edit_property(&monitor, &name, &value).await,
            DaemonCmd::Defaults { monitor } => self.restore_properties(&monitor).await,
            DaemonCmd::SaverStart => {
                self.present_saver().await;
                "saver started".to_string()
            }
            DaemonCmd::SaverStop => {
                self.end_saver().await;
                "saver stopped".to_string()
            }
            DaemonCmd::SaverTimeout(timeout) => {
                self.saver_timeout = Some(timeout);
                self.settings.saver.timeout = Some(format!("{}s", timeout.as_secs()));
                self.persist();
                format!("saver timeout {}s", timeout.as_secs())
            }
            DaemonCmd::Quit => {
                self.quitting = true;
                "bye".to_string()
            }
        }
    }

    async fn edit_property(&mut self, monitor: &str, name: &str, value: &str) -> String {
        let Some(id) = self.supervisor.find_by_monitor(monitor) else {
            return format!("error: no wallpaper on {monitor}");
        };
        let Some(instance) = self.supervisor.get(id) else {
            return format!("error: no wallpaper on {monitor}");
        };
        let Some(canonical) = instance.binding.descriptor.schema_path.clone() else {
            return "error: wallpaper has no properties".to_string();
        };
        let key = copy_key(self.arrangement.mode(), monitor);
        if let Err(err) = self.properties.customize(&key, &canonical) {
            return format!("error: {err}");
        }
        let value: serde_json::Value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        match self.properties.apply_edit(&key, name, value) {
            Ok(Some(msg)) => {
                let targets = property_targets(self.arrangement.mode(), &self.supervisor, id);
                let results = self.supervisor.broadcast(&targets, &msg).await;
                if results.iter().any(|(_, delivered)| *delivered) {
                    self.events.push(DaemonEvent::WallpaperUpdated {
                        monitor: monitor.to_string(),
                    });
                    format!("property {name} set")
                } else {
                    format!("error: {}", SocketError::InternalError)
                }
            }
            Ok(None) => format!("property {name} unchanged"),
            Err(err) => format!("error: {err}"),
        }
    }

    async fn restore_properties(&mut self, monitor: &str) -> String {
        let Some(id) = self.supervisor.find_by_monitor(monitor) else {
            return format!("error: no wallpaper on {monitor}");
        };
        let Some(instance) = self.supervisor.get(id) else {
            return format!("error: no wallpaper on {monitor}");
        };
        let Some(canonical) = instance.binding.descriptor.schema_path.clone() else {
            return "error: wallpaper has no properties".to_string();
        };
        let key = copy_key(self.arrangement.mode(), monitor);
        match self.properties.restore_defaults(&key, &canonical) {
            Ok(msg) => {
                let targets = property_targets(self.arrangement.mode(), &self.supervisor, id);
                let _ = self.supervisor.broadcast(&targets, &msg).await;
                self.events.push(DaemonEvent::WallpaperUpdated {
                    monitor: monitor.to_string(),
                });
                "defaults restored".to_string()
            }
            Err(err) => format!("error: {err}"),
        }
    }

    fn targets(&self, monitor: Option<&str>) -> Vec<InstanceId> {
        match monitor {
            Some(device_id) => self
                .supervisor
                .find_by_monitor(device_id)
                .into_iter()
                .collect(),
            None => self.supervisor.desktop_ids(),
        }
    }

    async fn handle_player_event(&mut self, event: PlayerEvent) {
        match event.kind {
            PlayerEventKind::Message(PlayerMessage::WindowHandle { id: window }) => {
                self.handle_handshake(event.id, window).await;
            }
            PlayerEventKind::Message(PlayerMessage::WallpaperLoaded { success }) => {
                let monitor = self
                    .supervisor
                    .get(event.id)
                    .map(|i| i.binding.group.device_ids().join("+"))
                    .unwrap_or_default();
                if success {
                    self.supervisor.mark_loaded(event.id).await;
                    self.events.push(DaemonEvent::WallpaperChanged { monitor });
                } else {
                    self.events.push(DaemonEvent::WallpaperError {
                        monitor,
                        reason: "player reported load failure".to_string(),
                    });
                }
            }
            PlayerEventKind::Message(PlayerMessage::Console { category, message }) => {
                log::debug!("player {} [{category}] {message}", event.id);
            }
            PlayerEventKind::Message(PlayerMessage::ScreenshotResult {
                file_name,
                success,
            }) => {
                let monitor = self
                    .supervisor
                    .get(event.id)
                    .map(|i| i.binding.group.device_ids().join("+"))
                    .unwrap_or_default();
                if success {
                    log::info!("screenshot written to {file_name}");
                    self.events.push(DaemonEvent::WallpaperUpdated { monitor });
                } else {
                    self.events.push(DaemonEvent::WallpaperError {
                        monitor,
                        reason: "screenshot failed".to_string(),
                    });
                }
            }
            PlayerEventKind::Message(PlayerMessage::Unknown) => {}
            PlayerEventKind::Closed => self.handle_player_exit(event.id).await,
        }
    }

    async fn handle_handshake(&mut self, id: InstanceId, window: u32) {
        if !self.supervisor.record_window(id, window) {
            return;
        }
        let ws = &self.ws;
        let result = if self.saver.owns_preview(id) {
            match self.supervisor.get_mut(id) {
                Some(instance) => attach::attach_saver_preview(instance, ws),
                None => return,
            }
        } else if self.saver.is_presenting() {
            // A respawn during presentation must not uncover its
            // monitor: the window goes straight topmost and is restored
            // to the desktop when the presentation ends.
            self.saver.adopt_respawned(&mut self.supervisor, ws, id)
        } else {
            match self.supervisor.get_mut(id) {
                Some(instance) => attach::attach_desktop(instance, ws),
                None => return,
            }
        };
        match result {
            Ok(()) => {}
            Err(attach::AttachError::InstanceDead) => {
                let monitor = self
                    .supervisor
                    .get(id)
                    .map(|i| i.binding.group.device_ids().join("+"))
                    .unwrap_or_default();
                self.supervisor.teardown(id).await;
                self.events.push(DaemonEvent::WallpaperError {
                    monitor,
                    reason: "window vanished before attach".to_string(),
                });
            }
            Err(err) => {
                log::error!("cannot attach player {id}: {err}");
            }
        }
    }

    /// A closed stream for a live instance means the player died. One
    /// automatic respawn per binding; a second crash is surfaced and the
    /// binding left unfulfilled.
    async fn handle_player_exit(&mut self, id: InstanceId) {
        let Some(instance) = self.supervisor.get(id) else {
            // Torn down by us; the closure is expected.
            return;
        };
        let monitor = instance.binding.group.device_ids().join("+");
        if self.saver.owns_preview(id) || instance.crash_restarted {
            self.saver.forget(id);
            self.supervisor.teardown(id).await;
            self.events.push(DaemonEvent::WallpaperError {
                monitor,
                reason: "player crashed".to_string(),
            });
            return;
        }
        log::warn!("player {id} ({monitor}) exited unexpectedly, respawning");
        self.saver.forget(id);
        match self.supervisor.restart(id).await {
            Ok(new_id) => {
                if let Some(new_instance) = self.supervisor.get_mut(new_id) {
                    new_instance.crash_restarted = true;
                }
            }
            Err(err) => {
                self.events.push(DaemonEvent::WallpaperError {
                    monitor,
                    reason: err.to_string(),
                });
            }
        }
    }

    async fn tick(&mut self) {
        match self.ws.topology_changed() {
            Ok(true) => self.refresh_topology().await,
            Ok(false) => {}
            Err(err) => log::error!("display connection: {err}"),
        }

        for outcome in self.supervisor.check_handshakes() {
            match outcome {
                HandshakeOutcome::Retried { .. } => {}
                HandshakeOutcome::Failed { monitor } => {
                    self.events.push(DaemonEvent::WallpaperError {
                        monitor,
                        reason: "player never completed its handshake".to_string(),
                    });
                }
            }
        }

        self.poll_saver().await;
    }

    async fn refresh_topology(&mut self) {
        let monitors = match self.ws.monitors() {
            Ok(monitors) => monitors,
            Err(err) => {
                log::error!("cannot enumerate monitors: {err}");
                return;
            }
        };
        log::info!("monitor topology changed ({} monitors)", monitors.len());
        self.monitors = monitors;
        self.arrangement.topology_changed(&self.monitors);
        self.reconcile_now().await;
    }

    async fn poll_saver(&mut self) {
        let (Ok(idle), Ok(pointer), Ok(fullscreen)) = (
            self.ws.idle(),
            self.ws.pointer(),
            self.ws.fullscreen_app_active(),
        ) else {
            return;
        };
        if self.saver.is_presenting() {
            // Keyboard input resets the idle counter while the pointer
            // holds perfectly still; sub-threshold jitter moves the
            // sampled position and is not mistaken for a key press.
            let key_pressed = self.saver.infer_key_press(pointer, idle, TICK);
            if self.saver.should_stop(pointer, key_pressed) {
                self.end_saver().await;
            }
        } else if self
            .saver
            .should_trigger(self.saver_timeout, idle, fullscreen)
        {
            self.present_saver().await;
        }
    }

    async fn present_saver(&mut self) {
        let source = if self.settings.saver.mirror {
            SaverSource::Mirror
        } else {
            SaverSource::Layout(screensaver::resolve_layout(
                &self.settings.saver.layout,
                &self.monitors,
                &WallpaperDescriptor::load,
            ))
        };
        let volume = self.volume;
        let result = self
            .saver
            .start(
                &mut self.supervisor,
                &self.ws,
                source,
                &self.monitors,
                &|_| LaunchOptions {
                    binary: CFG.binary.clone(),
                    volume,
                    toggles: default_toggles(),
                    debug_port: CFG.debug_port,
                    cache_dir: CACHE_PATH.clone(),
                    property_copy: None,
                },
            )
            .await;
        if let Err(err) = result {
            log::error!("cannot present screensaver: {err}");
        }
    }

    async fn end_saver(&mut self) {
        let lock = self.saver.stop(&mut self.supervisor, &self.ws).await;
        if lock {
            log::info!("locking session");
            let _ = smol::process::Command::new("loginctl")
                .arg("lock-session")
                .spawn();
        }
    }

    async fn reconcile_now(&mut self) {
        let desired = self.arrangement.resolve(&self.monitors);
        let mode = self.arrangement.mode();
        let volume = self.volume;
        let props = &self.properties;
        let launch = move |binding: &Binding| -> LaunchOptions {
            let device = binding
                .group
                .device_ids()
                .into_iter()
                .next()
                .unwrap_or_default();
            let copy = props.copy_path(&copy_key(mode, &device));
            LaunchOptions {
                binary: CFG.binary.clone(),
                volume,
                toggles: default_toggles(),
                debug_port: CFG.debug_port,
                cache_dir: CACHE_PATH.clone(),
                property_copy: copy.is_file().then_some(copy),
            }
        };
        let failures = self.supervisor.reconcile(&desired, &launch).await;
        for (monitor, err) in failures {
            self.events.push(DaemonEvent::WallpaperError {
                monitor,
                reason: err.to_string(),
            });
        }

        // Adopted span instances and surviving bindings get their
        // geometry reapplied; a no-op placement is harmless.
        let attached: Vec<InstanceId> = self
            .supervisor
            .iter()
            .filter(|i| i.attach == AttachmentState::DesktopAttached)
            .map(|i| i.id)
            .collect();
        for id in attached {
            let ws = &self.ws;
            let dead = match self.supervisor.get(id) {
                Some(instance) => match attach::update_geometry(instance, ws) {
                    Ok(()) => None,
                    Err(attach::AttachError::InstanceDead) => {
                        Some(instance.binding.group.device_ids().join("+"))
                    }
                    Err(err) => {
                        log::warn!("cannot replace player {id}: {err}");
                        None
                    }
                },
                None => None,
            };
            if let Some(monitor) = dead {
                self.supervisor.teardown(id).await;
                self.events.push(DaemonEvent::WallpaperError {
                    monitor,
                    reason: "window vanished".to_string(),
                });
            }
        }
    }

    fn persist(&mut self) {
        if let Err(err) = self.settings.save(&self.settings_path) {
            log::error!("cannot persist settings: {err}");
        }
    }

    fn report(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("mode: {}\n", self.arrangement.mode()));
        out.push_str(&format!("volume: {}\n", self.volume));
        out.push_str(&format!(
            "saver: {}\n",
            if self.saver.is_presenting() {
                "presenting"
            } else {
                "idle"
            }
        ));
        out.push_str("monitors:\n");
        for monitor in &self.monitors {
            out.push_str(&format!(
                "  {} {}x{}+{}+{}{}\n",
                monitor.device_id,
                monitor.bounds.width,
                monitor.bounds.height,
                monitor.bounds.x,
                monitor.bounds.y,
                if monitor.is_primary { " primary" } else { "" }
            ));
        }
        out.push_str("wallpapers:\n");
        for instance in self.supervisor.iter() {
            out.push_str(&format!(
                "  {} {} {}{}{}\n",
                instance.binding.group.device_ids().join("+"),
                instance.binding.descriptor.root.display(),
                if instance.loaded { "loaded" } else { "starting" },
                if instance.is_paused { " paused" } else { "" },
                match instance.attach {
                    AttachmentState::DesktopAttached => " attached",
                    AttachmentState::ScreensaverDetached => " saver",
                    AttachmentState::Unattached | AttachmentState::Destroyed => "",
                }
            ));
        }
        let events = self.events.report();
        if !events.is_empty() {
            out.push_str("events:\n");
            out.push_str(&events);
        }
        out
    }
}

/// Instances that must observe a property change. Shared-copy modes
/// keep every duplicate on the same schema copy, so the edit fans out
/// to all of them.
fn property_targets(
    mode: ArrangementMode,
    sup: &Supervisor,
    id: InstanceId,
) -> Vec<InstanceId> {
    match mode {
        ArrangementMode::Per => vec![id],
        ArrangementMode::Span | ArrangementMode::Duplicate => sup.desktop_ids(),
    }
}

fn default_toggles() -> FeatureToggles {
    FeatureToggles {
        pause_events: true,
        verbose_log: CFG.verbose,
        ..FeatureToggles::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrangement::MonitorGroup;
    use crate::display::{Rect, test_monitor};
    use crate::player::InstanceRole;
    use crate::wallpaper::WallpaperKind;

    fn cat_launch() -> LaunchOptions {
        LaunchOptions {
            binary: PathBuf::from("/bin/cat"),
            volume: 50,
            toggles: FeatureToggles::default(),
            debug_port: None,
            cache_dir: std::env::temp_dir(),
            property_copy: None,
        }
    }

    fn single_binding(device: &str) -> Binding {
        Binding {
            group: MonitorGroup::Single(test_monitor(
                device,
                0,
                Rect::new(0, 0, 1920, 1080),
                true,
            )),
            descriptor: WallpaperDescriptor {
                root: PathBuf::from("/w/x"),
                kind: WallpaperKind::Video,
                entry: PathBuf::from("/w/x/scene.mp4"),
                schema_path: None,
                extra_args: Vec::new(),
            },
        }
    }

    #[test]
    fn shared_copy_edits_fan_out_to_every_duplicate() {
        smol::block_on(async {
            let (tx, rx) = smol::channel::unbounded();
            std::mem::forget(rx);
            let mut sup = Supervisor::with_timeouts(
                tx,
                Duration::from_secs(5),
                Duration::from_millis(50),
            );
            let a = sup
                .spawn_instance(single_binding("DP-1"), InstanceRole::Desktop, cat_launch())
                .unwrap();
            let b = sup
                .spawn_instance(single_binding("HDMI-1"), InstanceRole::Desktop, cat_launch())
                .unwrap();

            assert_eq!(property_targets(ArrangementMode::Per, &sup, a), vec![a]);
            assert_eq!(
                property_targets(ArrangementMode::Duplicate, &sup, a),
                vec![a, b]
            );
            assert_eq!(
                property_targets(ArrangementMode::Span, &sup, b),
                vec![a, b]
            );
            sup.shutdown().await;
        });
    }

    // Due to [`env::set_var()`] not being thread-safe, just chain them so
    // the variables are not messed around.
    #[test]
    fn getting_locations() {
        unsafe {
            env::set_var("XDG_CONFIG_HOME", ".");
            assert_eq!(sys_config_dir().unwrap(), PathBuf::from("./frescod"));
            env::remove_var("XDG_CONFIG_HOME");
            env::set_var("HOME", ".");
            assert_eq!(sys_config_dir().unwrap(), PathBuf::from("./.config/frescod"));
            env::remove_var("HOME");
            assert!(sys_config_dir().is_none());

            env::set_var("XDG_CACHE_HOME", "/some_cachey_place");
            assert_eq!(sys_cache_dir(), PathBuf::from("/some_cachey_place/frescod"));
            env::remove_var("XDG_CACHE_HOME");
            env::set_var("HOME", "/somewhere");
            assert_eq!(sys_cache_dir(), PathBuf::from("/somewhere/.cache/frescod"));
            env::remove_var("HOME");
            assert_eq!(sys_cache_dir(), PathBuf::from("/tmp/frescod"));
        }
    }
}
