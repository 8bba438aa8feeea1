//! Sliding-window request counter

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Timestamps of admitted requests inside a trailing window.
///
/// Entries older than the window are evicted lazily on every check.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    window: Duration,
    timestamps: VecDeque<Instant>,
}

impl SlidingWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            timestamps: VecDeque::new(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn evict(&mut self, now: Instant) {
        while let Some(oldest) = self.timestamps.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Admits a request at `now` if fewer than `limit` requests fall inside
    /// the window, recording its timestamp.
    ///
    /// On rejection returns how long until the oldest entry leaves the window.
    pub fn try_admit(&mut self, now: Instant, limit: usize) -> Result<usize, Duration> {
        self.evict(now);

        if self.timestamps.len() < limit {
            self.timestamps.push_back(now);
            return Ok(limit - self.timestamps.len());
        }

        let retry_after = self
            .timestamps
            .front()
            .map(|oldest| self.window.saturating_sub(now.saturating_duration_since(*oldest)))
            .unwrap_or(self.window);
        Err(retry_after)
    }

    /// Requests counted inside the window ending at `now`
    pub fn count(&mut self, now: Instant) -> usize {
        self.evict(now);
        self.timestamps.len()
    }
}
