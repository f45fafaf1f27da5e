//! Prometheus metrics exporter for camera monitoring.
//!
//! # Metrics Exposed
//!
//! - `camera_lifecycle_available` - Camera availability (1=available, 0=not)
//! - `camera_lifecycle_sessions_started_total` - Capture sessions started
//! - `camera_lifecycle_open_failures_total` - Failed device open attempts
//! - `camera_lifecycle_frames_read_total` - Frames read from the device
//! - `camera_lifecycle_frames_accepted_total` - Frames delivered to the sink
//! - `camera_lifecycle_frames_dropped_total` - Frames dropped by the rate limiter
//! - `camera_lifecycle_read_failures_total` - Sessions ended by a failed read
//! - `camera_lifecycle_loop_panics_total` - Sessions ended by a panic
//!
//! # Example
//!
//! ```no_run
//! use camera_lifecycle::metrics::MetricsRegistry;
//! use camera_lifecycle::StatsSnapshot;
//!
//! let registry = MetricsRegistry::new().expect("Failed to create registry");
//! registry.update(&StatsSnapshot {
//!     available: true,
//!     sessions_started: 1,
//!     frames_read: 600,
//!     frames_accepted: 20,
//!     frames_dropped: 580,
//!     ..Default::default()
//! });
//! ```

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry};
#[cfg(feature = "metrics")]
pub use server::{CameraHealth, MetricsServer, MetricsServerConfig, MetricsState, ServerError};
