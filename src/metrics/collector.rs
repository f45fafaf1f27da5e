//! Metrics collection and registry.

use crate::manager::StatsSnapshot;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Prometheus metrics registry for camera monitoring.
pub struct MetricsRegistry {
    registry: Registry,

    available: IntGauge,
    sessions_started: IntCounter,
    open_failures: IntCounter,
    frames_read: IntCounter,
    frames_accepted: IntCounter,
    frames_dropped: IntCounter,
    read_failures: IntCounter,
    loop_panics: IntCounter,
}

/// Advances a counter to `target`; counters never move backwards.
fn advance(counter: &IntCounter, target: u64) {
    let current = counter.get();
    if target > current {
        counter.inc_by(target - current);
    }
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all camera metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let available = IntGauge::new(
            "camera_lifecycle_available",
            "Camera availability (1=available, 0=not available)",
        )?;
        let sessions_started = IntCounter::new(
            "camera_lifecycle_sessions_started_total",
            "Total capture sessions started",
        )?;
        let open_failures = IntCounter::new(
            "camera_lifecycle_open_failures_total",
            "Total failed attempts to open the camera",
        )?;
        let frames_read = IntCounter::new(
            "camera_lifecycle_frames_read_total",
            "Total frames read from the camera",
        )?;
        let frames_accepted = IntCounter::new(
            "camera_lifecycle_frames_accepted_total",
            "Total frames delivered to the frame sink",
        )?;
        let frames_dropped = IntCounter::new(
            "camera_lifecycle_frames_dropped_total",
            "Total frames dropped by the rate limiter",
        )?;
        let read_failures = IntCounter::new(
            "camera_lifecycle_read_failures_total",
            "Total capture sessions ended by a failed read",
        )?;
        let loop_panics = IntCounter::new(
            "camera_lifecycle_loop_panics_total",
            "Total capture sessions ended by a panic",
        )?;

        registry.register(Box::new(available.clone()))?;
        registry.register(Box::new(sessions_started.clone()))?;
        registry.register(Box::new(open_failures.clone()))?;
        registry.register(Box::new(frames_read.clone()))?;
        registry.register(Box::new(frames_accepted.clone()))?;
        registry.register(Box::new(frames_dropped.clone()))?;
        registry.register(Box::new(read_failures.clone()))?;
        registry.register(Box::new(loop_panics.clone()))?;

        Ok(Self {
            registry,
            available,
            sessions_started,
            open_failures,
            frames_read,
            frames_accepted,
            frames_dropped,
            read_failures,
            loop_panics,
        })
    }

    /// Updates all metrics from a snapshot of manager state.
    pub fn update(&self, snapshot: &StatsSnapshot) {
        self.available.set(i64::from(snapshot.available));
        advance(&self.sessions_started, snapshot.sessions_started);
        advance(&self.open_failures, snapshot.open_failures);
        advance(&self.frames_read, snapshot.frames_read);
        advance(&self.frames_accepted, snapshot.frames_accepted);
        advance(&self.frames_dropped, snapshot.frames_dropped);
        advance(&self.read_failures, snapshot.read_failures);
        advance(&self.loop_panics, snapshot.loop_panics);
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
