//! Owns the lifecycle of every player subprocess.
//!
//! `reconcile` diffs the desired binding set against the live instances:
//! missing bindings are spawned into a pending-handshake state, unwanted
//! instances get a graceful `close` and a hard-kill timer. No operation
//! here ever waits on a single player's I/O beyond a bounded timeout; a
//! hung player is terminated, not awaited.

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use smol::Timer;
use smol::channel::Sender;
use smol::process::Child;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::arrangement::{Binding, MonitorGroup};
use crate::player::channel::{self, ChannelWriter, PlayerEvent};
use crate::player::launch::{self, LaunchOptions};
use crate::player::protocol::HostMessage;
use crate::player::{AttachmentState, InstanceId, InstanceRole, PlayerInstance};
use crate::winsys::WindowHandle;

/// A player that has not reported its window by then is treated as
/// crashed.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
/// How long a closing player may linger before SIGTERM, then SIGKILL.
pub const CLOSE_GRACE: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("cannot spawn player: {0}")]
    CannotSpawn(std::io::Error),
    #[error("player pipes were not available")]
    NoPipes,
    #[error("player never completed its handshake")]
    HandshakeTimeout,
}

/// Result of one pending-handshake sweep.
#[derive(Debug, PartialEq)]
pub enum HandshakeOutcome {
    /// First miss: the instance was killed and respawned once.
    Retried { monitor: String },
    /// Second miss: the binding is surfaced as failed and left unbound.
    Failed { monitor: String },
}

pub struct Supervisor {
    instances: HashMap<InstanceId, PlayerInstance>,
    next_id: InstanceId,
    events: Sender<PlayerEvent>,
    handshake_timeout: Duration,
    close_grace: Duration,
}

impl Supervisor {
    #[must_use]
    pub fn new(events: Sender<PlayerEvent>) -> Self {
        Self::with_timeouts(events, HANDSHAKE_TIMEOUT, CLOSE_GRACE)
    }

    #[must_use]
    pub fn with_timeouts(
        events: Sender<PlayerEvent>,
        handshake_timeout: Duration,
        close_grace: Duration,
    ) -> Self {
        Self {
            instances: HashMap::new(),
            next_id: 1,
            events,
            handshake_timeout,
            close_grace,
        }
    }

    #[must_use]
    pub fn get(&self, id: InstanceId) -> Option<&PlayerInstance> {
        self.instances.get(&id)
    }

    #[must_use]
    pub fn get_mut(&mut self, id: InstanceId) -> Option<&mut PlayerInstance> {
        self.instances.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlayerInstance> {
        self.instances.values()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Ids of all live desktop instances (not saver previews).
    #[must_use]
    pub fn desktop_ids(&self) -> Vec<InstanceId> {
        let mut ids: Vec<InstanceId> = self
            .instances
            .values()
            .filter(|i| i.role == InstanceRole::Desktop)
            .map(|i| i.id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// The desktop instance covering the given monitor, if any.
    #[must_use]
    pub fn find_by_monitor(&self, device_id: &str) -> Option<InstanceId> {
        self.instances
            .values()
            .find(|i| {
                i.role == InstanceRole::Desktop
                    && i.binding.group.device_ids().iter().any(|d| d == device_id)
            })
            .map(|i| i.id)
    }

    /// Spawns one player for a binding and registers it pending handshake.
    ///
    /// # Errors
    /// [`SpawnError`] when the executable cannot start; the binding is
    /// left unfulfilled and siblings are unaffected.
    pub fn spawn_instance(
        &mut self,
        binding: Binding,
        role: InstanceRole,
        launch: LaunchOptions,
    ) -> Result<InstanceId, SpawnError> {
        let mut cmd = launch::get_cmd(&binding.descriptor, binding.group.bounds(), &launch);
        let mut child = cmd.spawn().map_err(SpawnError::CannotSpawn)?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            return Err(SpawnError::NoPipes);
        };

        let id = self.next_id;
        self.next_id += 1;
        let pid = child.id();
        smol::spawn(channel::read_loop(id, stdout, self.events.clone())).detach();

        log::info!(
            "spawned player {id} (pid {pid}) for {}",
            binding.group.device_ids().join("+")
        );
        self.instances.insert(
            id,
            PlayerInstance {
                id,
                binding,
                role,
                launch,
                child: Some(child),
                pid,
                writer: Some(ChannelWriter::new(stdin)),
                window: None,
                attach: AttachmentState::Unattached,
                loaded: false,
                is_paused: false,
                property_copy: None,
                handshake_deadline: Instant::now() + self.handshake_timeout,
                handshake_retried: false,
                crash_restarted: false,
            },
        );
        Ok(id)
    }

    /// Diffs desired bindings against live desktop instances.
    ///
    /// Unmatched instances are torn down; unrealized bindings are
    /// spawned. A span instance whose union rectangle changed but whose
    /// content did not is adopted and resized in place rather than
    /// respawned. Returns the bindings that failed to spawn.
    pub async fn reconcile(
        &mut self,
        desired: &[Binding],
        launch_for: &dyn Fn(&Binding) -> LaunchOptions,
    ) -> Vec<(String, SpawnError)> {
        let mut wanted: HashMap<String, &Binding> =
            desired.iter().map(|b| (b.key(), b)).collect();

        // Adopt resizable span instances before diffing them away.
        let mut adopted = Vec::new();
        for instance in self.instances.values_mut() {
            if instance.role != InstanceRole::Desktop {
                continue;
            }
            if wanted.contains_key(&instance.binding.key()) {
                continue;
            }
            if let MonitorGroup::Union(_) = instance.binding.group {
                if let Some((key, binding)) = wanted
                    .iter()
                    .find(|(_, b)| {
                        matches!(b.group, MonitorGroup::Union(_))
                            && b.descriptor == instance.binding.descriptor
                    })
                    .map(|(k, b)| (k.clone(), (*b).clone()))
                {
                    log::info!("resizing span player {} in place", instance.id);
                    instance.binding = binding;
                    adopted.push(instance.id);
                    wanted.remove(&key);
                }
            }
        }

        let stale: Vec<InstanceId> = self
            .instances
            .values()
            .filter(|i| {
                i.role == InstanceRole::Desktop && !wanted.contains_key(&i.binding.key())
            })
            .map(|i| i.id)
            .collect();
        for id in stale {
            self.teardown(id).await;
        }

        let live_keys: Vec<String> = self
            .instances
            .values()
            .filter(|i| i.role == InstanceRole::Desktop)
            .map(|i| i.binding.key())
            .collect();
        let mut failures = Vec::new();
        for (key, binding) in wanted {
            if live_keys.contains(&key) {
                continue;
            }
            let launch = launch_for(binding);
            if let Err(err) = self.spawn_instance(binding.clone(), InstanceRole::Desktop, launch) {
                log::error!("binding {key} failed: {err}");
                failures.push((binding.group.device_ids().join("+"), err));
            }
        }
        failures
    }

    /// Gracefully closes one instance, arming a hard-kill timer in
    /// parallel; never waits for the player to comply.
    pub async fn teardown(&mut self, id: InstanceId) {
        let Some(mut instance) = self.instances.remove(&id) else {
            return;
        };
        instance.attach = AttachmentState::Destroyed;
        if let Some(writer) = instance.writer.as_mut() {
            // Advisory; the kill timer below does not depend on it.
            let _ = writer.send(&HostMessage::Close).await;
        }
        if let Some(child) = instance.child.take() {
            let grace = self.close_grace;
            smol::spawn(wait_then_kill(child, instance.pid, grace)).detach();
        }
        log::info!("player {id} torn down");
    }

    /// Terminates and respawns with identical parameters. Used for
    /// reload requests and recoverable crashes.
    ///
    /// # Errors
    /// [`SpawnError`] if the respawn fails.
    pub async fn restart(&mut self, id: InstanceId) -> Result<InstanceId, SpawnError> {
        let Some(instance) = self.instances.get(&id) else {
            return Err(SpawnError::HandshakeTimeout);
        };
        let binding = instance.binding.clone();
        let role = instance.role;
        let launch = instance.launch.clone();
        let was_restarted = instance.crash_restarted;
        self.teardown(id).await;
        let new_id = self.spawn_instance(binding, role, launch)?;
        if let Some(new_instance) = self.instances.get_mut(&new_id) {
            new_instance.crash_restarted = was_restarted;
        }
        Ok(new_id)
    }

    /// Sweeps instances whose handshake deadline passed: first miss is
    /// retried exactly once, the second is surfaced as a failure.
    pub fn check_handshakes(&mut self) -> Vec<HandshakeOutcome> {
        let now = Instant::now();
        let expired: Vec<InstanceId> = self
            .instances
            .values()
            .filter(|i| i.pending() && i.handshake_deadline <= now)
            .map(|i| i.id)
            .collect();

        let mut outcomes = Vec::new();
        for id in expired {
            let Some(mut instance) = self.instances.remove(&id) else {
                continue;
            };
            let monitor = instance.binding.group.device_ids().join("+");
            // It never spoke to us; no point in a graceful close.
            if let Some(mut child) = instance.child.take() {
                let _ = child.kill();
            }
            if instance.handshake_retried {
                log::error!("player {id} ({monitor}) missed its handshake twice");
                outcomes.push(HandshakeOutcome::Failed { monitor });
            } else {
                log::warn!("player {id} ({monitor}) missed its handshake, retrying");
                match self.spawn_instance(
                    instance.binding.clone(),
                    instance.role,
                    instance.launch.clone(),
                ) {
                    Ok(new_id) => {
                        if let Some(new_instance) = self.instances.get_mut(&new_id) {
                            new_instance.handshake_retried = true;
                        }
                        outcomes.push(HandshakeOutcome::Retried { monitor });
                    }
                    Err(err) => {
                        log::error!("retry spawn failed: {err}");
                        outcomes.push(HandshakeOutcome::Failed { monitor });
                    }
                }
            }
        }
        outcomes
    }

    /// Records the handshake window id.
    ///
    /// Enforces that no two live instances ever hold the same native
    /// window; a duplicate report is ignored as a player bug.
    pub fn record_window(&mut self, id: InstanceId, window: WindowHandle) -> bool {
        if self
            .instances
            .values()
            .any(|i| i.id != id && i.window == Some(window))
        {
            log::warn!("player {id} reported window {window:#x} already owned elsewhere");
            return false;
        }
        if let Some(instance) = self.instances.get_mut(&id) {
            instance.window = Some(window);
            true
        } else {
            false
        }
    }

    /// Marks the player paused. Sent immediately only after load;
    /// otherwise recorded and replayed by `mark_loaded`.
    pub async fn suspend(&mut self, id: InstanceId) {
        if let Some(instance) = self.instances.get_mut(&id) {
            instance.is_paused = true;
            if instance.loaded
                && let Some(writer) = instance.writer.as_mut()
            {
                let _ = writer.send(&HostMessage::Suspend).await;
            }
        }
    }

    pub async fn resume(&mut self, id: InstanceId) {
        if let Some(instance) = self.instances.get_mut(&id) {
            instance.is_paused = false;
            if instance.loaded
                && let Some(writer) = instance.writer.as_mut()
            {
                let _ = writer.send(&HostMessage::Resume).await;
            }
        }
    }

    /// Handles `wallpaper-loaded`, replaying a pending suspend.
    pub async fn mark_loaded(&mut self, id: InstanceId) {
        if let Some(instance) = self.instances.get_mut(&id) {
            instance.loaded = true;
            if instance.is_paused
                && let Some(writer) = instance.writer.as_mut()
            {
                let _ = writer.send(&HostMessage::Suspend).await;
            }
        }
    }

    /// Sends one message to one instance.
    pub async fn send(&mut self, id: InstanceId, msg: &HostMessage) -> bool {
        if let Some(instance) = self.instances.get_mut(&id)
            && let Some(writer) = instance.writer.as_mut()
        {
            return writer.send(msg).await.is_ok();
        }
        false
    }

    /// Independent best-effort sends; one dead target never stops the
    /// rest. Returns the per-target outcomes.
    pub async fn broadcast(
        &mut self,
        ids: &[InstanceId],
        msg: &HostMessage,
    ) -> Vec<(InstanceId, bool)> {
        let mut results = Vec::with_capacity(ids.len());
        for &id in ids {
            results.push((id, self.send(id, msg).await));
        }
        results
    }

    /// Closes every instance. Bounded: close line, grace, SIGTERM,
    /// grace, SIGKILL. Runs the kills in parallel and waits for them so
    /// no player outlives the daemon.
    pub async fn shutdown(&mut self) {
        let ids: Vec<InstanceId> = self.instances.keys().copied().collect();
        let mut tasks = Vec::new();
        for id in ids {
            let Some(mut instance) = self.instances.remove(&id) else {
                continue;
            };
            if let Some(writer) = instance.writer.as_mut() {
                let _ = writer.send(&HostMessage::Close).await;
            }
            if let Some(child) = instance.child.take() {
                tasks.push(smol::spawn(wait_then_kill(
                    child,
                    instance.pid,
                    self.close_grace,
                )));
            }
        }
        for task in tasks {
            task.await;
        }
        log::info!("all players closed");
    }
}

/// Waits for a closing player, escalating SIGTERM then SIGKILL. The
/// `close` command is advisory; this path never depends on it.
async fn wait_then_kill(mut child: Child, pid: u32, grace: Duration) {
    let exited = smol::future::race(
        async {
            let _ = child.status().await;
            true
        },
        async {
            Timer::after(grace).await;
            false
        },
    )
    .await;
    if exited {
        return;
    }
    if let Ok(raw) = i32::try_from(pid) {
        let _ = kill(Pid::from_raw(raw), Signal::SIGTERM);
    }
    let exited = smol::future::race(
        async {
            let _ = child.status().await;
            true
        },
        async {
            Timer::after(grace).await;
            false
        },
    )
    .await;
    if !exited {
        log::warn!("player pid {pid} ignored SIGTERM, killing");
        let _ = child.kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrangement::{ArrangementMode, ArrangementState};
    use crate::display::{Rect, test_monitor};
    use crate::player::launch::FeatureToggles;
    use crate::wallpaper::{WallpaperDescriptor, WallpaperKind};
    use std::path::PathBuf;

    fn descriptor(root: &str) -> WallpaperDescriptor {
        WallpaperDescriptor {
            root: PathBuf::from(root),
            kind: WallpaperKind::Video,
            entry: PathBuf::from(root),
            schema_path: None,
            extra_args: Vec::new(),
        }
    }

    fn launch(binary: &str) -> LaunchOptions {
        LaunchOptions {
            binary: PathBuf::from(binary),
            volume: 50,
            toggles: FeatureToggles::default(),
            debug_port: None,
            cache_dir: std::env::temp_dir(),
            property_copy: None,
        }
    }

    fn binding(device: &str, root: &str) -> Binding {
        Binding {
            group: MonitorGroup::Single(test_monitor(
                device,
                0,
                Rect::new(0, 0, 1920, 1080),
                true,
            )),
            descriptor: descriptor(root),
        }
    }

    /// `cat` consumes stdin and echoes nothing we care about; it is a
    /// well-behaved fake player that stays alive until closed.
    const QUIET_PLAYER: &str = "/bin/cat";
    /// Exits immediately, so it can never complete a handshake.
    const CRASHING_PLAYER: &str = "/bin/true";

    #[test]
    fn monitor_removal_terminates_only_that_instance() {
        smol::block_on(async {
            let (tx, _rx) = smol::channel::unbounded();
            let mut sup = Supervisor::with_timeouts(
                tx,
                Duration::from_secs(5),
                Duration::from_millis(100),
            );
            let desired = vec![binding("DP-1", "/w/x"), binding("HDMI-1", "/w/y")];
            let failures = sup.reconcile(&desired, &|_| launch(QUIET_PLAYER)).await;
            assert!(failures.is_empty());
            assert_eq!(sup.desktop_ids().len(), 2);
            let kept = sup.find_by_monitor("DP-1").unwrap();

            // HDMI-1 disappears.
            let desired = vec![binding("DP-1", "/w/x")];
            sup.reconcile(&desired, &|_| launch(QUIET_PLAYER)).await;
            assert_eq!(sup.desktop_ids(), vec![kept]);

            sup.shutdown().await;
        });
    }

    #[test]
    fn reconcile_is_stable_when_nothing_changed() {
        smol::block_on(async {
            let (tx, _rx) = smol::channel::unbounded();
            let mut sup = Supervisor::with_timeouts(
                tx,
                Duration::from_secs(5),
                Duration::from_millis(100),
            );
            let desired = vec![binding("DP-1", "/w/x")];
            sup.reconcile(&desired, &|_| launch(QUIET_PLAYER)).await;
            let before = sup.desktop_ids();
            sup.reconcile(&desired, &|_| launch(QUIET_PLAYER)).await;
            assert_eq!(sup.desktop_ids(), before);
            sup.shutdown().await;
        });
    }

    #[test]
    fn spawn_failure_is_isolated_to_its_binding() {
        smol::block_on(async {
            let (tx, _rx) = smol::channel::unbounded();
            let mut sup = Supervisor::with_timeouts(
                tx,
                Duration::from_secs(5),
                Duration::from_millis(100),
            );
            let desired = vec![binding("DP-1", "/w/x"), binding("HDMI-1", "/w/y")];
            let failures = sup
                .reconcile(&desired, &|b| {
                    if b.group.device_ids() == vec!["HDMI-1"] {
                        launch("/nonexistent/player-binary")
                    } else {
                        launch(QUIET_PLAYER)
                    }
                })
                .await;
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].0, "HDMI-1");
            assert_eq!(sup.desktop_ids().len(), 1);
            sup.shutdown().await;
        });
    }

    #[test]
    fn missed_handshake_is_retried_exactly_once() {
        smol::block_on(async {
            let (tx, _rx) = smol::channel::unbounded();
            let mut sup = Supervisor::with_timeouts(
                tx,
                Duration::from_millis(30),
                Duration::from_millis(50),
            );
            sup.spawn_instance(
                binding("DP-1", "/w/x"),
                InstanceRole::Desktop,
                launch(CRASHING_PLAYER),
            )
            .unwrap();

            Timer::after(Duration::from_millis(60)).await;
            let outcomes = sup.check_handshakes();
            assert_eq!(
                outcomes,
                vec![HandshakeOutcome::Retried {
                    monitor: "DP-1".to_string()
                }]
            );

            Timer::after(Duration::from_millis(60)).await;
            let outcomes = sup.check_handshakes();
            assert_eq!(
                outcomes,
                vec![HandshakeOutcome::Failed {
                    monitor: "DP-1".to_string()
                }]
            );
            assert!(sup.is_empty());
        });
    }

    #[test]
    fn duplicate_window_handles_are_rejected() {
        smol::block_on(async {
            let (tx, _rx) = smol::channel::unbounded();
            let mut sup = Supervisor::with_timeouts(
                tx,
                Duration::from_secs(5),
                Duration::from_millis(100),
            );
            let a = sup
                .spawn_instance(
                    binding("DP-1", "/w/x"),
                    InstanceRole::Desktop,
                    launch(QUIET_PLAYER),
                )
                .unwrap();
            let b = sup
                .spawn_instance(
                    binding("HDMI-1", "/w/y"),
                    InstanceRole::Desktop,
                    launch(QUIET_PLAYER),
                )
                .unwrap();
            assert!(sup.record_window(a, 0xAB));
            assert!(!sup.record_window(b, 0xAB));
            assert_eq!(sup.get(b).unwrap().window, None);
            sup.shutdown().await;
        });
    }

    #[test]
    fn span_resize_adopts_instead_of_respawning() {
        smol::block_on(async {
            let (tx, _rx) = smol::channel::unbounded();
            let mut sup = Supervisor::with_timeouts(
                tx,
                Duration::from_secs(5),
                Duration::from_millis(100),
            );
            let one = vec![test_monitor("DP-1", 0, Rect::new(0, 0, 1920, 1080), true)];
            let two = vec![
                test_monitor("DP-1", 0, Rect::new(0, 0, 1920, 1080), true),
                test_monitor("HDMI-1", 1, Rect::new(1920, 0, 1280, 1024), false),
            ];
            let mut arrangement = ArrangementState::new(ArrangementMode::Span);
            arrangement.assign("DP-1", descriptor("/w/x"));

            sup.reconcile(&arrangement.resolve(&one), &|_| launch(QUIET_PLAYER))
                .await;
            let before = sup.desktop_ids();

            let desired = arrangement.resolve(&two);
            sup.reconcile(&desired, &|_| launch(QUIET_PLAYER)).await;
            assert_eq!(sup.desktop_ids(), before);
            let instance = sup.get(before[0]).unwrap();
            assert_eq!(instance.binding.group.bounds(), Rect::new(0, 0, 3200, 1080));
            sup.shutdown().await;
        });
    }

    #[test]
    fn suspend_before_load_is_deferred() {
        smol::block_on(async {
            let (tx, _rx) = smol::channel::unbounded();
            let mut sup = Supervisor::with_timeouts(
                tx,
                Duration::from_secs(5),
                Duration::from_millis(100),
            );
            let id = sup
                .spawn_instance(
                    binding("DP-1", "/w/x"),
                    InstanceRole::Desktop,
                    launch(QUIET_PLAYER),
                )
                .unwrap();
            sup.suspend(id).await;
            let instance = sup.get(id).unwrap();
            assert!(instance.is_paused);
            assert!(!instance.loaded);

            // Load replays the pending suspend (observable via the flag
            // still being set once loaded).
            sup.mark_loaded(id).await;
            assert!(sup.get(id).unwrap().loaded);
            assert!(sup.get(id).unwrap().is_paused);
            sup.shutdown().await;
        });
    }
}
