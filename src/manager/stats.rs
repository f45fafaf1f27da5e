//! Capture counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the manager and its capture threads.
#[derive(Debug, Default)]
pub(crate) struct CaptureStats {
    pub sessions_started: AtomicU64,
    pub open_failures: AtomicU64,
    pub frames_read: AtomicU64,
    pub frames_accepted: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub read_failures: AtomicU64,
    pub loop_panics: AtomicU64,
}

impl CaptureStats {
    #[inline]
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, available: bool) -> StatsSnapshot {
        StatsSnapshot {
            available,
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            open_failures: self.open_failures.load(Ordering::Relaxed),
            frames_read: self.frames_read.load(Ordering::Relaxed),
            frames_accepted: self.frames_accepted.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            loop_panics: self.loop_panics.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the manager's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Whether a camera is currently available.
    pub available: bool,
    /// Capture sessions started.
    pub sessions_started: u64,
    /// Failed attempts to open the device.
    pub open_failures: u64,
    /// Frames read from the device.
    pub frames_read: u64,
    /// Frames handed to the frame sink.
    pub frames_accepted: u64,
    /// Frames discarded by the rate limiter or read across a stop.
    pub frames_dropped: u64,
    /// Sessions ended by a failed read.
    pub read_failures: u64,
    /// Sessions ended by a panic inside the loop.
    pub loop_panics: u64,
}
