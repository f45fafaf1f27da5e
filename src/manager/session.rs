//! Capture session thread.
//!
//! One thread per session. The thread opens the device, reports the open
//! result back to the starter, runs the capture loop, and on every exit
//! path releases the handle before the session slot is cleared. Releasing
//! first keeps at most one handle open across back-to-back sessions.

use super::state::{SessionExit, StartTrigger, StopRequest};
use super::stats::CaptureStats;
use super::Shared;
use crate::capture::{CameraError, CaptureDevice, HandleGuard};
use crate::limiter::RateLimiter;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{Sender, SyncSender};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// Everything the session thread needs besides the shared manager state.
pub(super) struct SessionStart {
    pub id: u64,
    pub stop: Arc<AtomicU8>,
    pub opened: SyncSender<Result<(), CameraError>>,
    /// Dropped when the thread finishes; the receiver sees a disconnect.
    pub done: Sender<()>,
}

pub(super) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Body of the session thread.
pub(super) fn run<D: CaptureDevice>(shared: Arc<Shared<D>>, start: SessionStart) {
    let SessionStart {
        id,
        stop,
        opened,
        done: _done,
    } = start;

    let handle = match catch_unwind(AssertUnwindSafe(|| shared.device.open())) {
        Ok(Ok(handle)) => handle,
        Ok(Err(e)) => {
            let _ = opened.send(Err(e));
            return;
        }
        Err(payload) => {
            let message = panic_message(&*payload);
            error!(session = id, panic = %message, "Camera open panicked");
            let _ = opened.send(Err(CameraError::OpenFailed(message)));
            return;
        }
    };
    let mut guard = HandleGuard::new(handle);

    if opened.send(Ok(())).is_err() {
        // Starter vanished; the guard releases the handle on drop.
        return;
    }
    drop(opened);

    let announced = announce(&shared, id, &stop);

    let exit = match catch_unwind(AssertUnwindSafe(|| capture_loop(&shared, &stop, &mut guard))) {
        Ok(exit) => exit,
        Err(payload) => {
            let message = panic_message(&*payload);
            CaptureStats::bump(&shared.stats.loop_panics);
            error!(session = id, panic = %message, "Capture loop panicked");
            SessionExit::Panicked(message)
        }
    };

    info!(session = id, "Releasing camera");
    if catch_unwind(AssertUnwindSafe(|| guard.release())).is_err() {
        error!(session = id, "Camera release panicked");
    }
    drop(guard);

    finish(&shared, id, announced, exit);
}

/// Moves the manager to `Capturing` and publishes availability, unless
/// the session was cancelled before it got going.
fn announce<D: CaptureDevice>(shared: &Shared<D>, id: u64, stop: &AtomicU8) -> bool {
    let _gate = shared.lock_gate();
    let proceed = {
        let mut slot = shared.lock_slot();
        let current = slot.session.as_ref().is_some_and(|s| s.id == id);
        let proceed = current
            && StopRequest::from_u8(stop.load(Ordering::Acquire)) == StopRequest::None
            && shared.is_enabled();
        if proceed {
            slot.state = super::ManagerState::Capturing;
        }
        proceed
    };

    if proceed {
        info!(session = id, device = %shared.device_name, "Camera device available");
        shared.publish(true);
    } else {
        debug!(session = id, "Session cancelled before capture started");
    }
    proceed
}

fn capture_loop<D: CaptureDevice>(
    shared: &Shared<D>,
    stop: &AtomicU8,
    guard: &mut HandleGuard<D::Handle>,
) -> SessionExit {
    let mut limiter = RateLimiter::with_interval(shared.min_frame_interval, Instant::now());
    info!("Start capturing from camera");

    loop {
        match StopRequest::from_u8(stop.load(Ordering::Acquire)) {
            StopRequest::None => {}
            StopRequest::Disable => {
                info!("Camera disabled");
                return SessionExit::Disabled;
            }
            StopRequest::Shutdown => {
                info!("Capture stop requested");
                return SessionExit::Stopped;
            }
        }
        if !shared.is_enabled() {
            info!("Camera disabled");
            return SessionExit::Disabled;
        }

        trace!("Reading frame from camera");
        let frame = match guard.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("Camera stream ended");
                return SessionExit::EndOfStream;
            }
            Err(e) => {
                CaptureStats::bump(&shared.stats.read_failures);
                warn!(error = %e, "Camera stream not available");
                return SessionExit::ReadFailed(e.to_string());
            }
        };
        CaptureStats::bump(&shared.stats.frames_read);

        if !limiter.accept(Instant::now()) {
            CaptureStats::bump(&shared.stats.frames_dropped);
            continue;
        }
        // A frame read across a stop request is stale by definition.
        if stop.load(Ordering::Acquire) != StopRequest::None as u8 {
            CaptureStats::bump(&shared.stats.frames_dropped);
            continue;
        }

        trace!(sequence = frame.sequence(), "Delivering frame");
        CaptureStats::bump(&shared.stats.frames_accepted);
        shared.frame_sink.accept(frame);
    }
}

/// Clears the session slot, signals unavailability and, if the session
/// was ended by a disable that has since been undone, starts a new one.
fn finish<D: CaptureDevice>(shared: &Arc<Shared<D>>, id: u64, announced: bool, exit: SessionExit) {
    {
        let _gate = shared.lock_gate();
        {
            let mut slot = shared.lock_slot();
            if slot.session.as_ref().is_some_and(|s| s.id == id) {
                slot.session = None;
            }
            if slot.session.is_none() {
                slot.state = super::ManagerState::Idle;
            }
            slot.last_exit = Some(exit.clone());
        }

        if announced {
            shared.publish(false);
        }
        if !shared.is_shutting_down() {
            shared.clear_frames();
        }
    }

    if exit.is_abnormal() {
        warn!(session = id, exit = ?exit, "Capture session ended");
    } else {
        info!(session = id, exit = ?exit, "Capture session ended");
    }

    if exit == SessionExit::Disabled && shared.is_enabled() && !shared.is_shutting_down() {
        debug!(session = id, "Enable switch turned back on while stopping");
        let outcome = shared.try_start(StartTrigger::Restart);
        debug!(outcome = ?outcome, "Restart attempt");
    }
}
