//! Frame rate limiting.
//!
//! The limiter drops frames that arrive sooner than the minimum interval
//! after the last accepted one. Nothing is queued, so the frame that gets
//! through is always the one that was just read.

use crate::capture::{min_frame_interval, ConfigError};
use std::time::{Duration, Instant};

/// Time-based admission check for captured frames.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    last_accepted: Instant,
}

impl RateLimiter {
    /// Creates a limiter for `max_frame_rate` frames per second.
    ///
    /// The interval is measured from `start`, so the first frame is
    /// accepted one interval after the session begins.
    pub fn new(max_frame_rate: f64, start: Instant) -> Result<Self, ConfigError> {
        Ok(Self::with_interval(min_frame_interval(max_frame_rate)?, start))
    }

    /// Creates a limiter from a precomputed minimum interval.
    pub fn with_interval(min_interval: Duration, start: Instant) -> Self {
        Self {
            min_interval,
            last_accepted: start,
        }
    }

    /// Returns true if a frame read at `now` should be delivered.
    pub fn accept(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_accepted) < self.min_interval {
            return false;
        }
        self.last_accepted = now;
        true
    }

    /// Minimum spacing between accepted frames.
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Instant of the last accepted frame (or the start instant).
    pub fn last_accepted(&self) -> Instant {
        self.last_accepted
    }
}
