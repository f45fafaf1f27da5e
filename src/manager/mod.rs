//! Camera lifecycle manager.
//!
//! The manager owns the decision of when a capture session exists. Three
//! independent inputs drive it:
//!
//! - the enable switch ([`CameraManager::set_enabled`]),
//! - device arrivals from a hot-plug source,
//! - read failures inside the capture loop.
//!
//! Enable and hot-plug both funnel into [`CameraManager::try_start`],
//! which holds the session-slot mutex across opening the device and
//! spawning the capture thread, so at most one session ever exists.
//!
//! ```text
//!  set_enabled(true) ──┐
//!                      ├──▶ try_start ──▶ session thread ──▶ FrameSink
//!  hot-plug "bind" ────┘        │              │
//!                               │              └─(exit)──▶ StatusSink(false)
//!                               └─(open ok)──────────────▶ StatusSink(true)
//! ```

mod session;
mod state;
mod stats;

pub use state::{ManagerState, SessionExit, StartOutcome, StartTrigger};
pub use stats::StatsSnapshot;

use self::session::SessionStart;
use self::state::StopRequest;
use self::stats::CaptureStats;
use crate::capture::{min_frame_interval, CameraError, CaptureDevice, ConfigError};
use crate::hotplug::{HotplugBridge, HotplugError, HotplugFilter, HotplugSource};
use crate::sink::{FrameSink, StatusSink};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Upper bound on how long [`CameraManager::stop`] waits for the capture
/// thread. A device stuck in a read is left to finish on its own.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// How often a start waiting on a slow `open` checks for shutdown.
const OPEN_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Errors returned by manager operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("hot-plug source already attached")]
    HotplugAlreadyWatched,
    #[error(transparent)]
    Hotplug(#[from] HotplugError),
    #[error("camera manager has been stopped")]
    ShutDown,
}

/// Bookkeeping for the live session, owned by the slot.
struct SessionControl {
    id: u64,
    stop: Arc<AtomicU8>,
    done: Receiver<()>,
    thread: JoinHandle<()>,
}

struct SessionSlot {
    state: ManagerState,
    session: Option<SessionControl>,
    next_id: u64,
    last_exit: Option<SessionExit>,
}

/// State shared between the manager, its capture thread and the
/// hot-plug listener.
pub(crate) struct Shared<D: CaptureDevice> {
    device: D,
    device_name: String,
    max_frame_rate: f64,
    min_frame_interval: Duration,
    enabled: AtomicBool,
    shutting_down: AtomicBool,
    available: AtomicBool,
    slot: Mutex<SessionSlot>,
    /// Held while availability is published so that one session's
    /// `false` always precedes the next session's `true`.
    status_gate: Mutex<()>,
    frame_sink: Box<dyn FrameSink>,
    status_sink: RwLock<Option<Arc<dyn StatusSink>>>,
    stats: CaptureStats,
}

impl<D: CaptureDevice> Shared<D> {
    fn lock_slot(&self) -> MutexGuard<'_, SessionSlot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_gate(&self) -> MutexGuard<'_, ()> {
        self.status_gate.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Notifies the status sink if availability actually changed.
    /// Callers hold the status gate.
    fn publish(&self, available: bool) {
        if self.available.swap(available, Ordering::AcqRel) == available {
            return;
        }
        info!(available, "Camera availability changed");

        let sink = self
            .status_sink
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        if let Some(sink) = sink {
            if catch_unwind(AssertUnwindSafe(|| sink.on_availability_changed(available))).is_err() {
                error!(available, "Status sink panicked");
            }
        }
    }

    fn clear_frames(&self) {
        if catch_unwind(AssertUnwindSafe(|| self.frame_sink.clear())).is_err() {
            error!("Frame sink panicked while clearing");
        }
    }

    /// Single entry point for creating a session.
    fn try_start(self: &Arc<Self>, trigger: StartTrigger) -> StartOutcome {
        if self.is_shutting_down() {
            return StartOutcome::ShutDown;
        }
        if !self.is_enabled() {
            debug!(trigger = ?trigger, "Camera disabled, not starting capture");
            return StartOutcome::Disabled;
        }

        let mut slot = self.lock_slot();
        if self.is_shutting_down() {
            return StartOutcome::ShutDown;
        }
        if slot.session.is_some() {
            debug!(trigger = ?trigger, state = %slot.state, "Already capturing");
            return StartOutcome::AlreadyRunning;
        }

        info!(trigger = ?trigger, device = %self.device_name, "Try to start capture");
        let id = slot.next_id;
        slot.next_id += 1;
        slot.state = ManagerState::Starting;

        let stop = Arc::new(AtomicU8::new(StopRequest::None as u8));
        let (opened_tx, opened_rx) = mpsc::sync_channel(1);
        let (done_tx, done_rx) = mpsc::channel();
        let start = SessionStart {
            id,
            stop: Arc::clone(&stop),
            opened: opened_tx,
            done: done_tx,
        };

        let shared = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("camera-capture-{}", id))
            .spawn(move || session::run(shared, start));
        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                slot.state = ManagerState::Idle;
                CaptureStats::bump(&self.stats.open_failures);
                error!(error = %e, "Failed to spawn capture thread");
                return StartOutcome::OpenFailed(CameraError::OpenFailed(format!(
                    "failed to spawn capture thread: {}",
                    e
                )));
            }
        };

        let opened = loop {
            match opened_rx.recv_timeout(OPEN_POLL_INTERVAL) {
                Ok(result) => break result,
                Err(RecvTimeoutError::Disconnected) => {
                    break Err(CameraError::OpenFailed(
                        "capture thread exited while opening the device".into(),
                    ))
                }
                Err(RecvTimeoutError::Timeout) if self.is_shutting_down() => {
                    // The session thread sees the dropped receiver (or the
                    // stop request) and releases whatever it opened.
                    stop.store(StopRequest::Shutdown as u8, Ordering::Release);
                    drop(opened_rx);
                    slot.state = ManagerState::Idle;
                    warn!(session = id, "Shutdown while the camera was opening; abandoning session");
                    return StartOutcome::ShutDown;
                }
                Err(RecvTimeoutError::Timeout) => {}
            }
        };

        match opened {
            Ok(()) => {
                slot.session = Some(SessionControl {
                    id,
                    stop,
                    done: done_rx,
                    thread,
                });
                CaptureStats::bump(&self.stats.sessions_started);
                info!(session = id, "Capture session started");
                StartOutcome::Started
            }
            Err(e) => {
                slot.state = ManagerState::Idle;
                drop(slot);
                let _ = thread.join();
                CaptureStats::bump(&self.stats.open_failures);
                info!(error = %e, "Camera device not available");
                StartOutcome::OpenFailed(e)
            }
        }
    }

    /// Asks the live session, if any, to end because of a disable.
    fn request_disable(&self) {
        let mut slot = self.lock_slot();
        let Some(id) = slot.session.as_ref().map(|session| {
            let _ = session.stop.compare_exchange(
                StopRequest::None as u8,
                StopRequest::Disable as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            session.id
        }) else {
            return;
        };
        if matches!(slot.state, ManagerState::Starting | ManagerState::Capturing) {
            slot.state = ManagerState::Stopping;
            info!(session = id, "Stopping capture");
        }
    }

    /// Waits up to `timeout` for a detached session to finish.
    fn await_exit(&self, control: SessionControl, timeout: Duration) {
        if control.thread.thread().id() == thread::current().id() {
            // Called from a sink on the capture thread itself.
            return;
        }
        match control.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = control.thread.join();
                debug!(session = control.id, "Capture thread joined");
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    session = control.id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Capture thread did not stop in time; it will release the camera when its read returns"
                );
            }
        }
    }
}

/// Owns the camera and the lifecycle of capture sessions.
///
/// Construct it once, hand it by reference to the presentation layer, and
/// call [`CameraManager::stop`] (or drop it) on shutdown. A stopped
/// manager never opens the device again.
pub struct CameraManager<D: CaptureDevice> {
    shared: Arc<Shared<D>>,
    hotplug: Mutex<Option<HotplugBridge>>,
}

impl<D: CaptureDevice> CameraManager<D> {
    /// Creates an idle manager. The enable switch starts on, but nothing
    /// is opened until [`set_enabled`](Self::set_enabled) or a hot-plug
    /// arrival asks for it.
    pub fn new<S>(device: D, max_frame_rate: f64, frame_sink: S) -> Result<Self, ManagerError>
    where
        S: FrameSink + 'static,
    {
        let min_frame_interval = min_frame_interval(max_frame_rate)?;
        let device_name = device.describe();
        info!(
            device = %device_name,
            max_frame_rate,
            interval_ns = min_frame_interval.as_nanos() as u64,
            "Camera manager created"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                device,
                device_name,
                max_frame_rate,
                min_frame_interval,
                enabled: AtomicBool::new(true),
                shutting_down: AtomicBool::new(false),
                available: AtomicBool::new(false),
                slot: Mutex::new(SessionSlot {
                    state: ManagerState::Idle,
                    session: None,
                    next_id: 1,
                    last_exit: None,
                }),
                status_gate: Mutex::new(()),
                frame_sink: Box::new(frame_sink),
                status_sink: RwLock::new(None),
                stats: CaptureStats::default(),
            }),
            hotplug: Mutex::new(None),
        })
    }

    /// Installs the availability callback, replacing any previous one.
    pub fn set_status_sink<S>(&self, sink: S)
    where
        S: StatusSink + 'static,
    {
        let sink: Arc<dyn StatusSink> = Arc::new(sink);
        *self
            .shared
            .status_sink
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(sink);
    }

    /// Flips the enable switch.
    ///
    /// Turning it on starts capture if no session exists. Turning it off
    /// asks the running session to end at its next loop iteration.
    pub fn set_enabled(&self, enabled: bool) {
        let previous = self.shared.enabled.swap(enabled, Ordering::AcqRel);
        if previous != enabled {
            info!(enabled, "Camera enable switch changed");
        }

        if enabled {
            match self.shared.try_start(StartTrigger::Enable) {
                StartOutcome::ShutDown => warn!("Enable ignored: camera manager stopped"),
                outcome => debug!(outcome = ?outcome, "Enable handled"),
            }
        } else {
            self.shared.request_disable();
        }
    }

    /// Starts a capture session unless one exists.
    ///
    /// Safe to call redundantly from any thread.
    pub fn try_start(&self) -> StartOutcome {
        self.shared.try_start(StartTrigger::Enable)
    }

    /// Subscribes to device arrivals for the rest of the manager's life.
    pub fn watch_hotplug<S>(&self, source: S, filter: HotplugFilter) -> Result<(), ManagerError>
    where
        S: HotplugSource,
    {
        if self.shared.is_shutting_down() {
            return Err(ManagerError::ShutDown);
        }
        let mut hotplug = self.hotplug.lock().unwrap_or_else(|e| e.into_inner());
        if hotplug.is_some() {
            return Err(ManagerError::HotplugAlreadyWatched);
        }

        let shared = Arc::clone(&self.shared);
        let bridge = HotplugBridge::spawn(source, filter, move |event| {
            let outcome = shared.try_start(StartTrigger::Hotplug);
            debug!(
                device_number = event.device_number,
                outcome = ?outcome,
                "Hot-plug arrival handled"
            );
        })?;
        *hotplug = Some(bridge);
        Ok(())
    }

    /// Shuts the manager down.
    ///
    /// Stops the hot-plug listener, ends the running session and waits up
    /// to [`SHUTDOWN_TIMEOUT`] for it to release the camera. Idempotent.
    pub fn stop(&self) {
        if !self.shared.shutting_down.swap(true, Ordering::AcqRel) {
            info!("Stopping camera manager");
        }

        let bridge = self
            .hotplug
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(mut bridge) = bridge {
            bridge.stop();
        }

        let control = {
            let mut slot = self.shared.lock_slot();
            let control = slot.session.take();
            if let Some(control) = &control {
                control
                    .stop
                    .store(StopRequest::Shutdown as u8, Ordering::Release);
                slot.state = ManagerState::Stopping;
            }
            control
        };

        if let Some(control) = control {
            self.shared.await_exit(control, SHUTDOWN_TIMEOUT);
        }

        self.shared.lock_slot().state = ManagerState::Idle;
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ManagerState {
        self.shared.lock_slot().state
    }

    /// Whether a camera is open and producing frames.
    pub fn is_available(&self) -> bool {
        self.shared.available.load(Ordering::Acquire)
    }

    /// Position of the enable switch.
    pub fn is_enabled(&self) -> bool {
        self.shared.is_enabled()
    }

    /// True once [`stop`](Self::stop) has been called.
    pub fn is_stopped(&self) -> bool {
        self.shared.is_shutting_down()
    }

    /// Why the most recent session ended.
    pub fn last_exit(&self) -> Option<SessionExit> {
        self.shared.lock_slot().last_exit.clone()
    }

    /// Configured frame rate ceiling.
    pub fn max_frame_rate(&self) -> f64 {
        self.shared.max_frame_rate
    }

    /// Minimum spacing between delivered frames.
    pub fn min_frame_interval(&self) -> Duration {
        self.shared.min_frame_interval
    }

    /// Capture counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot(self.is_available())
    }
}

impl<D: CaptureDevice> Drop for CameraManager<D> {
    fn drop(&mut self) {
        self.stop();
    }
}
