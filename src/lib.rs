//! Camera Lifecycle Library
//!
//! Owns a single camera, runs a rate-limited capture loop on a background
//! thread, reacts to hot-plug arrivals and exposes an enable switch plus an
//! availability callback to a presentation layer.
//!
//! # Architecture
//!
//! ```text
//!   enable switch ─┐
//!                  ├─▶ manager ──▶ capture session ──▶ rate limiter ──▶ frame sink
//!   hot-plug ──────┘       │              │
//!                          └──────────────┴──▶ status sink (availability)
//! ```
//!
//! # Guarantees
//!
//! - **One session**: enable and hot-plug share one guarded start path,
//!   so the device is never opened twice
//! - **No leaked handles**: every successful open is released exactly once,
//!   including on read failure and panics
//! - **Latest frame only**: early frames are dropped, never queued
//! - **Nothing fatal**: every failure degrades to "camera unavailable"
//!
//! # Example
//!
//! ```no_run
//! use camera_lifecycle::{CameraManager, FrameMailbox, MockCamera};
//! use std::time::Duration;
//!
//! let mailbox = FrameMailbox::new();
//! let manager = CameraManager::new(MockCamera::new(), 20.0, mailbox.clone()).unwrap();
//! manager.set_status_sink(|available: bool| println!("camera available: {available}"));
//!
//! manager.set_enabled(true);
//! if let camera_lifecycle::MailboxEvent::Frame(frame) = mailbox.wait(Duration::from_secs(1)) {
//!     println!("got frame {}", frame.sequence());
//! }
//! manager.stop();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod hotplug;
pub mod limiter;
pub mod manager;
pub mod metrics;
pub mod sink;

// Re-export commonly used types at crate root
pub use capture::{
    CameraError, CaptureConfig, CaptureDevice, CaptureHandle, FileConfig, Frame, MockCamera,
    PixelFormat,
};
pub use hotplug::{HotplugEvent, HotplugFilter, HotplugSource};
pub use limiter::RateLimiter;
pub use manager::{
    CameraManager, ManagerError, ManagerState, SessionExit, StartOutcome, StatsSnapshot,
};
pub use sink::{FrameMailbox, FrameSink, MailboxEvent, StatusSink};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
