//! Sliding-window rate limiter for job-initiating requests
//!
//! One process-wide window: a request is admitted when fewer than
//! `max_requests` admissions happened within the trailing `window`.
//! Uses `tokio::time::Instant` so tests can drive it with a paused clock.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::RateLimitConfig;
use crate::types::RateLimitStats;

/// Result of an admission check
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Request recorded and allowed
    Allowed,
    /// Window full; the oldest request leaves after `retry_after`
    Denied {
        /// Time until a slot frees up
        retry_after: Duration,
    },
}

/// Sliding-window limiter over admission timestamps
pub struct SlidingWindowLimiter {
    timestamps: Mutex<VecDeque<Instant>>,
    max_requests: u32,
    window: Duration,
}

impl SlidingWindowLimiter {
    /// Create a limiter admitting `max_requests` per `window`
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            timestamps: Mutex::new(VecDeque::with_capacity(max_requests as usize)),
            max_requests,
            window,
        }
    }

    /// Create a limiter from API configuration
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, config.window)
    }

    fn prune(&self, timestamps: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&oldest) = timestamps.front() {
            if now.duration_since(oldest) >= self.window {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn time_until_reset(&self, timestamps: &VecDeque<Instant>, now: Instant) -> Duration {
        timestamps
            .front()
            .map(|&oldest| self.window.saturating_sub(now.duration_since(oldest)))
            .unwrap_or(Duration::ZERO)
    }

    /// Check the window and record the request if admitted
    ///
    /// Check and record happen under one lock, so concurrent callers can
    /// never push the count past `max_requests`.
    pub async fn try_admit(&self) -> Admission {
        let now = Instant::now();
        let mut timestamps = self.timestamps.lock().await;
        self.prune(&mut timestamps, now);

        if (timestamps.len() as u32) < self.max_requests {
            timestamps.push_back(now);
            Admission::Allowed
        } else {
            let retry_after = self.time_until_reset(&timestamps, now);
            tracing::debug!(
                retry_after_ms = retry_after.as_millis() as u64,
                current = timestamps.len(),
                "rate limit window full"
            );
            Admission::Denied { retry_after }
        }
    }

    /// Current counters, after pruning expired entries
    pub async fn stats(&self) -> RateLimitStats {
        let now = Instant::now();
        let mut timestamps = self.timestamps.lock().await;
        self.prune(&mut timestamps, now);
        RateLimitStats {
            current_requests: timestamps.len() as u32,
            max_requests: self.max_requests,
            time_until_reset_ms: self.time_until_reset(&timestamps, now).as_millis() as u64,
        }
    }
}
