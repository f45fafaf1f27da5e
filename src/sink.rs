//! Outputs of the lifecycle manager.
//!
//! Frames flow to a [`FrameSink`], availability transitions to a
//! [`StatusSink`]. Both are called from the capture thread and must
//! return quickly; [`FrameMailbox`] is the ready-made sink that decouples
//! a slow consumer by keeping only the latest frame.

use crate::capture::Frame;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Receives accepted frames.
pub trait FrameSink: Send + Sync {
    /// Takes ownership of a freshly accepted frame. Must not block.
    fn accept(&self, frame: Frame);

    /// Signals that no frame is available any more.
    fn clear(&self) {}
}

impl<F> FrameSink for F
where
    F: Fn(Frame) + Send + Sync,
{
    fn accept(&self, frame: Frame) {
        self(frame)
    }
}

/// Receives availability transitions.
pub trait StatusSink: Send + Sync {
    /// Called with `true` when capture starts and `false` when it ends.
    fn on_availability_changed(&self, available: bool);
}

impl<F> StatusSink for F
where
    F: Fn(bool) + Send + Sync,
{
    fn on_availability_changed(&self, available: bool) {
        self(available)
    }
}

/// What a consumer observed when waiting on a [`FrameMailbox`].
#[derive(Debug)]
pub enum MailboxEvent {
    /// The latest frame.
    Frame(Frame),
    /// The producer signalled that there is no frame.
    Cleared,
    /// Nothing happened before the timeout.
    Timeout,
}

#[derive(Default)]
struct Slot {
    frame: Option<Frame>,
    cleared: bool,
    accepted: u64,
    overwritten: u64,
}

/// Capacity-one, overwrite-on-write frame slot.
///
/// Writers never block on readers: a frame that has not been taken when
/// the next one arrives is discarded. Clones share the same slot.
#[derive(Clone, Default)]
pub struct FrameMailbox {
    inner: Arc<(Mutex<Slot>, Condvar)>,
}

impl FrameMailbox {
    /// Creates an empty mailbox.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        // A panicking consumer must not take the producer down with it.
        self.inner.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Takes the pending frame, if any.
    pub fn take(&self) -> Option<Frame> {
        let mut slot = self.slot();
        slot.cleared = false;
        slot.frame.take()
    }

    /// Returns true if a frame is waiting.
    pub fn has_frame(&self) -> bool {
        self.slot().frame.is_some()
    }

    /// Waits up to `timeout` for a frame or a clear signal.
    pub fn wait(&self, timeout: Duration) -> MailboxEvent {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot();
        loop {
            if let Some(frame) = slot.frame.take() {
                slot.cleared = false;
                return MailboxEvent::Frame(frame);
            }
            if slot.cleared {
                slot.cleared = false;
                return MailboxEvent::Cleared;
            }

            let now = Instant::now();
            if now >= deadline {
                return MailboxEvent::Timeout;
            }
            slot = match self.inner.1.wait_timeout(slot, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Total frames written into the mailbox.
    pub fn accepted(&self) -> u64 {
        self.slot().accepted
    }

    /// Frames replaced before anyone took them.
    pub fn overwritten(&self) -> u64 {
        self.slot().overwritten
    }
}

impl FrameSink for FrameMailbox {
    fn accept(&self, frame: Frame) {
        let mut slot = self.slot();
        if slot.frame.replace(frame).is_some() {
            slot.overwritten += 1;
        }
        slot.accepted += 1;
        slot.cleared = false;
        drop(slot);
        self.inner.1.notify_all();
    }

    fn clear(&self) {
        let mut slot = self.slot();
        slot.frame = None;
        slot.cleared = true;
        drop(slot);
        self.inner.1.notify_all();
    }
}

impl std::fmt::Debug for FrameMailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.slot();
        f.debug_struct("FrameMailbox")
            .field("pending", &slot.frame.is_some())
            .field("accepted", &slot.accepted)
            .field("overwritten", &slot.overwritten)
            .finish()
    }
}
