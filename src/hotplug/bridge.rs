//! Listener thread connecting a hot-plug source to the manager.

use super::{HotplugAction, HotplugError, HotplugEvent, HotplugSource};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long one `next_event` call may block before the stop flag is rechecked.
const POLL_INTERVAL: Duration = Duration::from_millis(200);
/// Pause after a source error so a persistently failing source does not spin.
const ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Decides which events count as a camera arrival.
#[derive(Debug, Clone)]
pub struct HotplugFilter {
    subsystem: String,
}

impl HotplugFilter {
    /// Accepts `bind` events of real devices in `subsystem`.
    pub fn new(subsystem: impl Into<String>) -> Self {
        Self {
            subsystem: subsystem.into(),
        }
    }

    /// Subsystem whose `bind` events count as arrivals.
    pub fn subsystem(&self) -> &str {
        &self.subsystem
    }

    /// Returns true if the event announces a newly usable device.
    ///
    /// Device number 0 belongs to bus-level pseudo devices and interfaces,
    /// which never carry a camera of their own.
    pub fn is_arrival(&self, event: &HotplugEvent) -> bool {
        event.action == HotplugAction::Bound
            && event.device_number != 0
            && event.subsystem == self.subsystem
    }
}

impl Default for HotplugFilter {
    fn default() -> Self {
        Self::new("usb")
    }
}

/// Handle to the running listener thread.
pub struct HotplugBridge {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl HotplugBridge {
    /// Starts listening on `source`, calling `on_arrival` for each arrival.
    ///
    /// Source errors are logged and the listener keeps going; only
    /// [`HotplugError::Closed`] ends it.
    pub fn spawn<S, F>(mut source: S, filter: HotplugFilter, on_arrival: F) -> Result<Self, HotplugError>
    where
        S: HotplugSource,
        F: Fn(&HotplugEvent) + Send + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let running_for_thread = Arc::clone(&running);

        let thread = thread::Builder::new()
            .name("camera-hotplug".into())
            .spawn(move || {
                info!(subsystem = filter.subsystem(), "Hot-plug listener started");
                while running_for_thread.load(Ordering::Acquire) {
                    let event = match source.next_event(POLL_INTERVAL) {
                        Ok(Some(event)) => event,
                        Ok(None) => continue,
                        Err(HotplugError::Closed) => {
                            info!("Hot-plug event stream closed");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "Hot-plug source error, listening on");
                            thread::sleep(ERROR_BACKOFF);
                            continue;
                        }
                    };

                    debug!(
                        action = ?event.action,
                        subsystem = %event.subsystem,
                        device_number = event.device_number,
                        "Hot-plug event"
                    );

                    if !running_for_thread.load(Ordering::Acquire) {
                        break;
                    }
                    if filter.is_arrival(&event) {
                        info!(device_number = event.device_number, "Device bound");
                        on_arrival(&event);
                    } else if matches!(event.action, HotplugAction::Unbound | HotplugAction::Removed)
                        && event.subsystem == filter.subsystem()
                    {
                        debug!(
                            device_number = event.device_number,
                            "Device left; capture loop will notice on its next read"
                        );
                    }
                }
                info!("Hot-plug listener stopped");
            })
            .map_err(HotplugError::Spawn)?;

        Ok(Self {
            running,
            thread: Some(thread),
        })
    }

    /// Returns true while the listener thread is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
            && self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stops the listener and waits for its thread.
    ///
    /// Safe to call from inside the arrival callback; the thread is then
    /// left to finish on its own.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            debug!("Waiting for hot-plug listener to stop...");
            let _ = handle.join();
        }
    }
}

impl Drop for HotplugBridge {
    fn drop(&mut self) {
        self.stop();
    }
}
