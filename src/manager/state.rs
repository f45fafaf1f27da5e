//! Manager states and transition outcomes.

use crate::capture::CameraError;
use serde::Serialize;
use std::fmt;

/// Lifecycle state of the camera manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ManagerState {
    /// No device open, not capturing.
    Idle,
    /// Device opened, capture thread not yet confirmed running.
    Starting,
    /// Capture thread is producing frames.
    Capturing,
    /// Termination requested, capture thread unwinding.
    Stopping,
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ManagerState::Idle => "idle",
            ManagerState::Starting => "starting",
            ManagerState::Capturing => "capturing",
            ManagerState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// What caused a start attempt. Only used for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartTrigger {
    /// The enable switch was turned on.
    Enable,
    /// A device arrival was reported.
    Hotplug,
    /// A session ended by a disable found the switch back on.
    Restart,
}

/// Result of [`CameraManager::try_start`](super::CameraManager::try_start).
#[derive(Debug)]
pub enum StartOutcome {
    /// A new capture session owns the device.
    Started,
    /// A session already exists; nothing was opened.
    AlreadyRunning,
    /// The enable switch is off.
    Disabled,
    /// The manager has been stopped for good.
    ShutDown,
    /// The device could not be opened. The manager stays idle.
    OpenFailed(CameraError),
}

impl StartOutcome {
    /// True if this call created the session.
    pub fn is_started(&self) -> bool {
        matches!(self, StartOutcome::Started)
    }
}

/// Pending termination request for a session, stored in an `AtomicU8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum StopRequest {
    None = 0,
    Disable = 1,
    Shutdown = 2,
}

impl StopRequest {
    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => StopRequest::None,
            1 => StopRequest::Disable,
            _ => StopRequest::Shutdown,
        }
    }
}

/// Why a capture session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SessionExit {
    /// `stop()` was called.
    Stopped,
    /// The enable switch was turned off.
    Disabled,
    /// The device reported end of stream.
    EndOfStream,
    /// Reading a frame failed, usually because the device was removed.
    ReadFailed(String),
    /// Device or sink code panicked inside the loop.
    Panicked(String),
}

impl SessionExit {
    /// True for exits the manager did not ask for.
    pub fn is_abnormal(&self) -> bool {
        !matches!(self, SessionExit::Stopped | SessionExit::Disabled)
    }
}
