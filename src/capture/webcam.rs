//! Webcam capture using nokhwa.

use super::{CameraError, CaptureDevice, CaptureHandle, Frame, PixelFormat};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use tracing::{debug, info, warn};

/// Native webcam reachable through nokhwa's platform backend.
#[derive(Debug, Clone)]
pub struct NokhwaDevice {
    index: u32,
}

impl NokhwaDevice {
    /// Creates a device for the webcam at `index` (0 is the system default).
    pub fn new(index: u32) -> Self {
        Self { index }
    }

    /// List available webcam devices.
    pub fn list_devices() -> Result<Vec<String>, CameraError> {
        let devices = nokhwa::query(nokhwa::utils::ApiBackend::Auto)
            .map_err(|e| CameraError::DeviceNotFound(e.to_string()))?;

        Ok(devices
            .into_iter()
            .map(|info| format!("{}: {}", info.index(), info.human_name()))
            .collect())
    }
}

impl CaptureDevice for NokhwaDevice {
    type Handle = NokhwaHandle;

    fn open(&self) -> Result<NokhwaHandle, CameraError> {
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let mut camera = Camera::new(CameraIndex::Index(self.index), requested)
            .map_err(|e| CameraError::DeviceNotFound(e.to_string()))?;
        camera
            .open_stream()
            .map_err(|e| CameraError::OpenFailed(e.to_string()))?;

        let resolution = camera.resolution();
        info!(
            index = self.index,
            width = resolution.width(),
            height = resolution.height(),
            fps = camera.frame_rate(),
            "Webcam opened"
        );

        Ok(NokhwaHandle {
            camera,
            sequence: 0,
            released: false,
        })
    }

    fn describe(&self) -> String {
        format!("webcam {}", self.index)
    }
}

/// Open nokhwa stream.
pub struct NokhwaHandle {
    camera: Camera,
    sequence: u64,
    released: bool,
}

impl CaptureHandle for NokhwaHandle {
    fn read_frame(&mut self) -> Result<Option<Frame>, CameraError> {
        if self.released {
            return Err(CameraError::Released);
        }

        let buffer = self
            .camera
            .frame()
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;

        self.sequence += 1;
        let (width, height) = (decoded.width(), decoded.height());
        debug!(sequence = self.sequence, width, height, "Captured frame");

        Ok(Some(Frame::new(
            decoded.into_raw(),
            width,
            height,
            PixelFormat::Rgb8,
            self.sequence,
        )))
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if let Err(e) = self.camera.stop_stream() {
            warn!(error = %e, "Failed to stop webcam stream");
        }
        info!(frames = self.sequence, "Webcam released");
    }
}

impl Drop for NokhwaHandle {
    fn drop(&mut self) {
        self.release();
    }
}
