//! Camera Lifecycle CLI
//!
//! Headless stand-in for a camera preview window: runs the lifecycle
//! manager, consumes the latest frame at display pace and logs what a
//! preview pane would show.

#[cfg(all(target_os = "linux", feature = "hotplug"))]
use camera_lifecycle::hotplug::{HotplugFilter, NetlinkHotplugSource};
use camera_lifecycle::{
    capture::{CaptureConfig, FileConfig, FrameTransform, Mirror, ToRgba, TransformSink},
    CameraManager, CaptureDevice, Frame, FrameMailbox, MailboxEvent, ManagerError,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Runs the camera lifecycle manager with a headless preview.
#[derive(Debug, Parser)]
#[command(name = "camera-lifecycle", version, about)]
struct Args {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Maximum preview frame rate (overrides the config file).
    #[arg(long)]
    max_fps: Option<f64>,

    /// Camera device index (overrides the config file).
    #[arg(long)]
    device: Option<u32>,

    /// Do not listen for hot-plug events.
    #[arg(long)]
    no_hotplug: bool,

    /// Start with the camera switch off.
    #[arg(long)]
    start_disabled: bool,

    /// Flip the camera switch every N seconds.
    #[arg(long, value_name = "SECS")]
    toggle_every: Option<u64>,

    /// Exit after N seconds instead of waiting for Ctrl-C.
    #[arg(long, value_name = "SECS")]
    duration: Option<u64>,

    /// List cameras and exit.
    #[cfg(feature = "camera")]
    #[arg(long)]
    list_devices: bool,
}

/// Display-side conversion applied before frames reach the preview.
struct Preview {
    mirror: bool,
}

impl FrameTransform for Preview {
    fn apply(&self, frame: Frame) -> Frame {
        let frame = if self.mirror { Mirror.apply(frame) } else { frame };
        ToRgba.apply(frame)
    }
}

fn preview_description(enabled: bool, available: bool) -> &'static str {
    if !enabled {
        "Camera Disabled!"
    } else if !available {
        "Camera not available!"
    } else {
        ""
    }
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!("Camera Lifecycle v{}", camera_lifecycle::VERSION);

    #[cfg(feature = "camera")]
    if args.list_devices {
        match camera_lifecycle::capture::NokhwaDevice::list_devices() {
            Ok(devices) => devices.iter().for_each(|d| println!("{}", d)),
            Err(e) => {
                eprintln!("Failed to list cameras: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let mut config = match &args.config {
        Some(path) => match FileConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load config: {}", e);
                std::process::exit(1);
            }
        },
        None => FileConfig::default(),
    };
    apply_overrides(&mut config, &args);
    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    #[cfg(feature = "camera")]
    let device = camera_lifecycle::capture::NokhwaDevice::new(config.camera.device_index);
    #[cfg(not(feature = "camera"))]
    let device = {
        info!("Built without the `camera` feature, using mock camera input");
        camera_lifecycle::MockCamera::new().read_delay(Duration::from_millis(33))
    };

    if let Err(e) = run(device, &config, &args) {
        eprintln!("Camera manager failed: {}", e);
        std::process::exit(1);
    }
}

fn apply_overrides(config: &mut FileConfig, args: &Args) {
    if let Some(fps) = args.max_fps {
        config.camera.max_frame_rate = fps;
    }
    if let Some(device) = args.device {
        config.camera.device_index = device;
    }
    if args.no_hotplug {
        config.hotplug.enabled = false;
    }
    if args.start_disabled {
        config.camera.start_enabled = false;
    }
}

fn run<D: CaptureDevice>(device: D, config: &FileConfig, args: &Args) -> Result<(), ManagerError> {
    let running = Arc::new(AtomicBool::new(true));
    let running_for_handler = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || running_for_handler.store(false, Ordering::SeqCst)) {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }

    let CaptureConfig {
        max_frame_rate,
        start_enabled,
        mirror,
        ..
    } = config.camera;

    let mailbox = FrameMailbox::new();
    let sink = TransformSink::new(Preview { mirror }, mailbox.clone());
    let manager = Arc::new(CameraManager::new(device, max_frame_rate, sink)?);

    manager.set_status_sink(|available: bool| {
        info!(available, "Camera device status changed");
    });

    attach_hotplug(&manager, config);

    #[cfg(feature = "metrics")]
    let metrics = start_metrics(config.metrics.port);

    manager.set_enabled(start_enabled);
    info!(
        "Preview: {:?}",
        preview_description(manager.is_enabled(), manager.is_available())
    );

    let started = Instant::now();
    let mut last_toggle = Instant::now();
    let mut last_report = Instant::now();
    let mut shown = 0u64;
    let mut last_frame: Option<(u32, u32)> = None;

    while running.load(Ordering::SeqCst) {
        if let Some(limit) = args.duration {
            if started.elapsed() >= Duration::from_secs(limit) {
                break;
            }
        }

        if let Some(every) = args.toggle_every {
            if last_toggle.elapsed() >= Duration::from_secs(every) {
                last_toggle = Instant::now();
                let enable = !manager.is_enabled();
                manager.set_enabled(enable);
                info!(
                    "Camera switch {} | Preview: {:?}",
                    if enable { "ON" } else { "OFF" },
                    preview_description(enable, manager.is_available())
                );
            }
        }

        match mailbox.wait(Duration::from_millis(250)) {
            MailboxEvent::Frame(frame) => {
                if !manager.is_enabled() {
                    warn!("Frame received from camera, but camera is disabled!");
                    continue;
                }
                shown += 1;
                last_frame = Some((frame.width(), frame.height()));
            }
            MailboxEvent::Cleared => {
                last_frame = None;
                info!(
                    "Preview cleared: {:?}",
                    preview_description(manager.is_enabled(), manager.is_available())
                );
            }
            MailboxEvent::Timeout => {}
        }

        if last_report.elapsed() >= Duration::from_secs(5) {
            last_report = Instant::now();
            let stats = manager.stats();
            info!(
                state = %manager.state(),
                shown,
                frame = ?last_frame,
                accepted = stats.frames_accepted,
                dropped = stats.frames_dropped,
                "Preview status"
            );
            #[cfg(feature = "metrics")]
            if let Some(state) = &metrics {
                state
                    .blocking_write()
                    .update(&stats, manager.state(), manager.last_exit());
            }
        }
    }

    manager.stop();
    let stats = manager.stats();
    info!(
        sessions = stats.sessions_started,
        frames_read = stats.frames_read,
        frames_accepted = stats.frames_accepted,
        frames_shown = shown,
        "Closed!"
    );
    Ok(())
}

fn attach_hotplug<D: CaptureDevice>(manager: &CameraManager<D>, config: &FileConfig) {
    if !config.hotplug.enabled {
        info!("Hot-plug monitoring disabled");
        return;
    }

    #[cfg(all(target_os = "linux", feature = "hotplug"))]
    {
        let filter = HotplugFilter::new(config.hotplug.subsystem.clone());
        let attached = NetlinkHotplugSource::open()
            .map_err(ManagerError::from)
            .and_then(|source| manager.watch_hotplug(source, filter));
        if let Err(e) = attached {
            warn!("Hot-plug monitoring unavailable: {}", e);
        }
    }

    #[cfg(not(all(target_os = "linux", feature = "hotplug")))]
    {
        let _ = manager;
        info!(
            subsystem = %config.hotplug.subsystem,
            "Built without hot-plug support; camera starts only from the switch"
        );
    }
}

#[cfg(feature = "metrics")]
fn start_metrics(
    port: u16,
) -> Option<Arc<tokio::sync::RwLock<camera_lifecycle::metrics::MetricsState>>> {
    use camera_lifecycle::metrics::{MetricsRegistry, MetricsServer, MetricsServerConfig};

    if port == 0 {
        return None;
    }
    let registry = match MetricsRegistry::new() {
        Ok(registry) => registry,
        Err(e) => {
            warn!("Metrics disabled: {}", e);
            return None;
        }
    };
    let server = MetricsServer::new(MetricsServerConfig::with_port(port), registry);
    let state = server.state();

    let spawned = std::thread::Builder::new()
        .name("metrics-server".into())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(e) => {
                    warn!("Failed to start metrics runtime: {}", e);
                    return;
                }
            };
            if let Err(e) = runtime.block_on(server.run()) {
                warn!("Metrics server stopped: {}", e);
            }
        });
    if let Err(e) = spawned {
        warn!("Failed to spawn metrics thread: {}", e);
        return None;
    }
    Some(state)
}
