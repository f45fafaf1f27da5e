//! Scriptable in-process camera.
//!
//! Used by the test suite and by the CLI when no hardware backend is
//! compiled in. Clones share state, so a test can keep one clone for
//! inspection and fault injection while the manager owns another.

use super::{CameraError, CaptureDevice, CaptureHandle, Frame, PixelFormat};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const NEVER: u64 = u64::MAX;

#[derive(Debug)]
struct MockState {
    present: AtomicBool,
    fail_after: AtomicU64,
    end_after: AtomicU64,
    panic_after: AtomicU64,
    read_delay_us: AtomicU64,
    fail_next_read: AtomicBool,
    width: u32,
    height: u32,

    open_calls: AtomicUsize,
    successful_opens: AtomicUsize,
    release_calls: AtomicUsize,
    open_handles: AtomicUsize,
    max_concurrent_handles: AtomicUsize,
    frames_produced: AtomicU64,
}

/// Mock camera that generates synthetic grayscale frames.
#[derive(Debug, Clone)]
pub struct MockCamera {
    state: Arc<MockState>,
}

impl MockCamera {
    /// Creates a present camera producing 8x6 frames with no delay.
    pub fn new() -> Self {
        Self::with_dimensions(8, 6)
    }

    /// Creates a present camera producing frames of the given size.
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            state: Arc::new(MockState {
                present: AtomicBool::new(true),
                fail_after: AtomicU64::new(NEVER),
                end_after: AtomicU64::new(NEVER),
                panic_after: AtomicU64::new(NEVER),
                read_delay_us: AtomicU64::new(0),
                fail_next_read: AtomicBool::new(false),
                width,
                height,
                open_calls: AtomicUsize::new(0),
                successful_opens: AtomicUsize::new(0),
                release_calls: AtomicUsize::new(0),
                open_handles: AtomicUsize::new(0),
                max_concurrent_handles: AtomicUsize::new(0),
                frames_produced: AtomicU64::new(0),
            }),
        }
    }

    /// Starts with no device attached.
    pub fn absent(self) -> Self {
        self.set_present(false);
        self
    }

    /// Every read after the first `reads` reads of a handle fails.
    pub fn fail_after(self, reads: u64) -> Self {
        self.state.fail_after.store(reads, Ordering::SeqCst);
        self
    }

    /// Every read after the first `reads` reads of a handle reports end of stream.
    pub fn end_after(self, reads: u64) -> Self {
        self.state.end_after.store(reads, Ordering::SeqCst);
        self
    }

    /// The read after the first `reads` reads of a handle panics.
    pub fn panic_after(self, reads: u64) -> Self {
        self.state.panic_after.store(reads, Ordering::SeqCst);
        self
    }

    /// Each read blocks for `delay` before producing a frame.
    pub fn read_delay(self, delay: Duration) -> Self {
        self.state
            .read_delay_us
            .store(delay.as_micros() as u64, Ordering::SeqCst);
        self
    }

    /// Plugs or unplugs the simulated device.
    ///
    /// Unplugging makes reads on open handles fail, like a real removal.
    pub fn set_present(&self, present: bool) {
        self.state.present.store(present, Ordering::SeqCst);
    }

    /// Makes the next read on any open handle fail once.
    pub fn fail_next_read(&self) {
        self.state.fail_next_read.store(true, Ordering::SeqCst);
    }

    /// Number of `open` calls, successful or not.
    pub fn open_calls(&self) -> usize {
        self.state.open_calls.load(Ordering::SeqCst)
    }

    /// Number of `open` calls that produced a handle.
    pub fn successful_opens(&self) -> usize {
        self.state.successful_opens.load(Ordering::SeqCst)
    }

    /// Number of handles released.
    pub fn release_calls(&self) -> usize {
        self.state.release_calls.load(Ordering::SeqCst)
    }

    /// Number of handles currently open.
    pub fn open_handles(&self) -> usize {
        self.state.open_handles.load(Ordering::SeqCst)
    }

    /// Highest number of handles that were ever open at the same time.
    pub fn max_concurrent_handles(&self) -> usize {
        self.state.max_concurrent_handles.load(Ordering::SeqCst)
    }

    /// Sequence number of the most recently produced frame.
    pub fn frames_produced(&self) -> u64 {
        self.state.frames_produced.load(Ordering::SeqCst)
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureDevice for MockCamera {
    type Handle = MockHandle;

    fn open(&self) -> Result<MockHandle, CameraError> {
        self.state.open_calls.fetch_add(1, Ordering::SeqCst);
        if !self.state.present.load(Ordering::SeqCst) {
            return Err(CameraError::DeviceNotFound("mock camera unplugged".into()));
        }

        self.state.successful_opens.fetch_add(1, Ordering::SeqCst);
        let open = self.state.open_handles.fetch_add(1, Ordering::SeqCst) + 1;
        self.state
            .max_concurrent_handles
            .fetch_max(open, Ordering::SeqCst);

        tracing::info!(open_handles = open, "MockCamera opened");
        Ok(MockHandle {
            state: Arc::clone(&self.state),
            reads: 0,
            released: false,
        })
    }

    fn describe(&self) -> String {
        format!("mock camera {}x{}", self.state.width, self.state.height)
    }
}

/// Open handle on a [`MockCamera`].
#[derive(Debug)]
pub struct MockHandle {
    state: Arc<MockState>,
    reads: u64,
    released: bool,
}

impl CaptureHandle for MockHandle {
    fn read_frame(&mut self) -> Result<Option<Frame>, CameraError> {
        let delay = self.state.read_delay_us.load(Ordering::SeqCst);
        if delay > 0 {
            std::thread::sleep(Duration::from_micros(delay));
        }

        if self.state.fail_next_read.swap(false, Ordering::SeqCst) {
            return Err(CameraError::CaptureFailed("injected read failure".into()));
        }
        if !self.state.present.load(Ordering::SeqCst) {
            return Err(CameraError::CaptureFailed("device removed".into()));
        }

        let done = self.reads;
        if done >= self.state.panic_after.load(Ordering::SeqCst) {
            panic!("mock camera panicked after {} reads", done);
        }
        if done >= self.state.fail_after.load(Ordering::SeqCst) {
            return Err(CameraError::CaptureFailed(format!(
                "read failed after {} frames",
                done
            )));
        }
        if done >= self.state.end_after.load(Ordering::SeqCst) {
            return Ok(None);
        }
        self.reads += 1;

        let sequence = self.state.frames_produced.fetch_add(1, Ordering::SeqCst) + 1;
        let pixel_count = (self.state.width * self.state.height) as usize;
        // Deterministic pattern, shifted by sequence so frames differ.
        let pixels: Vec<u8> = (0..pixel_count)
            .map(|i| ((i as u64 ^ sequence) % 256) as u8)
            .collect();

        Ok(Some(Frame::new(
            pixels,
            self.state.width,
            self.state.height,
            PixelFormat::Gray8,
            sequence,
        )))
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.state.release_calls.fetch_add(1, Ordering::SeqCst);
        self.state.open_handles.fetch_sub(1, Ordering::SeqCst);
        tracing::info!("MockCamera closed");
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        // Handles dropped without release would leak the device.
        if !self.released {
            tracing::warn!("MockHandle dropped without release");
            self.release();
        }
    }
}
