//! Camera abstraction for frame capture.
//!
//! A [`CaptureDevice`] is the factory side of a camera: it knows how to
//! open the hardware. Opening yields a [`CaptureHandle`], the exclusive
//! owner of the open device for the lifetime of one capture session.
//! Handles are opened, read and released on the session thread, so they
//! are not required to be `Send`.

use super::Frame;
use thiserror::Error;

/// Errors that can occur during camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera device not found: {0}")]
    DeviceNotFound(String),
    #[error("failed to open camera: {0}")]
    OpenFailed(String),
    #[error("failed to capture frame: {0}")]
    CaptureFailed(String),
    #[error("camera handle already released")]
    Released,
}

/// Opens the physical camera.
pub trait CaptureDevice: Send + Sync + 'static {
    /// The open-device type produced by [`CaptureDevice::open`].
    type Handle: CaptureHandle;

    /// Opens the camera.
    ///
    /// Fails when no device is present or it is busy. Callers treat the
    /// failure as "not available right now" and retry only on the next
    /// external trigger.
    fn open(&self) -> Result<Self::Handle, CameraError>;

    /// Human readable device description, used in log output.
    fn describe(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// An open camera.
pub trait CaptureHandle {
    /// Blocks until the next frame is available.
    ///
    /// Returns `Ok(None)` when the stream has ended.
    fn read_frame(&mut self) -> Result<Option<Frame>, CameraError>;

    /// Releases the underlying device. Must be idempotent.
    fn release(&mut self);
}

/// Owns a handle and releases it exactly once.
///
/// Release happens either explicitly through [`HandleGuard::release`] or
/// when the guard is dropped, which also covers unwinding.
pub struct HandleGuard<H: CaptureHandle> {
    handle: H,
    released: bool,
}

impl<H: CaptureHandle> HandleGuard<H> {
    /// Takes ownership of a freshly opened handle.
    pub fn new(handle: H) -> Self {
        Self {
            handle,
            released: false,
        }
    }

    /// Reads a frame from the guarded handle.
    pub fn read_frame(&mut self) -> Result<Option<Frame>, CameraError> {
        if self.released {
            return Err(CameraError::Released);
        }
        self.handle.read_frame()
    }

    /// Releases the handle. Later calls do nothing.
    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.handle.release();
            tracing::debug!("Camera handle released");
        }
    }

    /// Returns true once the handle has been released.
    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl<H: CaptureHandle> Drop for HandleGuard<H> {
    fn drop(&mut self) {
        self.release();
    }
}
