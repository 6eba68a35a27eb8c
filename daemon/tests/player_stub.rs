//! End-to-end supervision of a real subprocess standing in for a
//! wallpaper player.
//!
//! The stub is a shell script speaking the stdio protocol: it reports a
//! window handle and a successful load, then echoes stdin like a
//! well-behaved player that stays alive until terminated.

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::Duration;

use smol::Timer;

use frescod::arrangement::{Binding, MonitorGroup};
use frescod::display::{DisplayMonitor, Rect};
use frescod::player::InstanceRole;
use frescod::player::channel::{PlayerEvent, PlayerEventKind};
use frescod::player::launch::{FeatureToggles, LaunchOptions};
use frescod::player::protocol::PlayerMessage;
use frescod::supervisor::Supervisor;
use frescod::wallpaper::{WallpaperDescriptor, WallpaperKind};

fn setup_logging() {
    let _ = env_logger::builder()
        .is_test(true)
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}

fn stub_player(dir: &std::path::Path, body: &str) -> PathBuf {
    let path = dir.join("player.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn binding() -> Binding {
    Binding {
        group: MonitorGroup::Single(DisplayMonitor {
            device_id: "DP-1".to_string(),
            index: 0,
            bounds: Rect::new(0, 0, 1920, 1080),
            working_area: Rect::new(0, 0, 1920, 1080),
            is_primary: true,
        }),
        descriptor: WallpaperDescriptor {
            root: PathBuf::from("/w/aurora"),
            kind: WallpaperKind::Video,
            entry: PathBuf::from("/w/aurora/scene.mp4"),
            schema_path: None,
            extra_args: Vec::new(),
        },
    }
}

fn launch(binary: PathBuf, cache: PathBuf) -> LaunchOptions {
    LaunchOptions {
        binary,
        volume: 50,
        toggles: FeatureToggles::default(),
        debug_port: None,
        cache_dir: cache,
        property_copy: None,
    }
}

async fn next_event(rx: &smol::channel::Receiver<PlayerEvent>) -> Option<PlayerEvent> {
    smol::future::race(
        async { rx.recv().await.ok() },
        async {
            Timer::after(Duration::from_secs(5)).await;
            None
        },
    )
    .await
}

#[test]
fn handshake_and_load_flow() {
    setup_logging();
    let dir = std::env::temp_dir().join(format!("fresco-stub-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let script = stub_player(
        &dir,
        "printf '{\"type\":\"window-handle\",\"id\":77}\\n'\n\
         printf '{\"type\":\"wallpaper-loaded\",\"success\":true}\\n'\n\
         exec cat",
    );

    smol::block_on(async {
        let (tx, rx) = smol::channel::unbounded();
        let mut sup = Supervisor::with_timeouts(
            tx,
            Duration::from_secs(5),
            Duration::from_millis(100),
        );
        let id = sup
            .spawn_instance(
                binding(),
                InstanceRole::Desktop,
                launch(script, dir.clone()),
            )
            .unwrap();

        let event = next_event(&rx).await.expect("handshake event");
        assert_eq!(event.id, id);
        assert_eq!(
            event.kind,
            PlayerEventKind::Message(PlayerMessage::WindowHandle { id: 77 })
        );
        assert!(sup.record_window(id, 77));

        let event = next_event(&rx).await.expect("load event");
        assert_eq!(
            event.kind,
            PlayerEventKind::Message(PlayerMessage::WallpaperLoaded { success: true })
        );
        sup.mark_loaded(id).await;
        assert!(sup.get(id).unwrap().loaded);

        sup.shutdown().await;
        // The stub ignores `close`; the SIGTERM escalation ends it and
        // the reader observes the closure.
        let event = next_event(&rx).await.expect("closed event");
        assert_eq!(event.kind, PlayerEventKind::Closed);
    });

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn crashing_player_reports_closure_without_handshake() {
    setup_logging();
    let dir = std::env::temp_dir().join(format!("fresco-stub-crash-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let script = stub_player(&dir, "exit 3");

    smol::block_on(async {
        let (tx, rx) = smol::channel::unbounded();
        let mut sup = Supervisor::with_timeouts(
            tx,
            Duration::from_secs(5),
            Duration::from_millis(100),
        );
        let id = sup
            .spawn_instance(
                binding(),
                InstanceRole::Desktop,
                launch(script, dir.clone()),
            )
            .unwrap();

        let event = next_event(&rx).await.expect("closed event");
        assert_eq!(event.id, id);
        assert_eq!(event.kind, PlayerEventKind::Closed);
        // Bookkeeping still shows the pending instance; the daemon's
        // exit handling decides whether to respawn.
        assert!(sup.get(id).unwrap().pending());
        sup.shutdown().await;
    });

    let _ = std::fs::remove_dir_all(&dir);
}
