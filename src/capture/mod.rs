//! Camera input and frame handling.
//!
//! This module provides the narrow interfaces the lifecycle manager uses
//! to reach camera hardware, a mock implementation for tests, and the
//! display-side frame transforms.

mod camera;
mod config;
mod frame;
mod mock;
#[cfg(feature = "camera")]
mod webcam;
mod transform;

pub use camera::{CameraError, CaptureDevice, CaptureHandle, HandleGuard};
pub use config::{
    min_frame_interval, CaptureConfig, ConfigError, FileConfig, HotplugConfig, MetricsConfig,
};
pub use frame::{Frame, PixelFormat};
pub use mock::{MockCamera, MockHandle};
#[cfg(feature = "camera")]
pub use webcam::{NokhwaDevice, NokhwaHandle};
pub use transform::{Chain, FrameTransform, Mirror, ToRgba, TransformSink};
