//! Fixed-window rate limiter.
//!
//! Admits at most `max_requests` calls per window. The window restarts on the
//! first call made after more than `period` has elapsed since it began, so a
//! burst straddling a boundary can admit up to twice the limit.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum admissions per window
    pub max_requests: u32,
    /// Window length
    pub period: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: 10,
            period: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct WindowState {
    window_start: Instant,
    count: u32,
}

/// Process-wide fixed-window admission counter
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    state: Mutex<WindowState>,
}

impl RateLimiter {
    /// Create a new rate limiter; the first window starts now
    #[must_use]
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            state: Mutex::new(WindowState {
                window_start: Instant::now(),
                count: 0,
            }),
        }
    }

    /// Create a limiter admitting `max_requests` per `period`
    #[must_use]
    pub fn with_limits(max_requests: u32, period: Duration) -> Self {
        Self::new(RateLimiterConfig {
            max_requests,
            period,
        })
    }

    /// Try to admit one request. Returns `false` when the window is full.
    pub fn allow(&self) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock();

        if now.duration_since(state.window_start) > self.config.period {
            debug!(
                previous_count = state.count,
                "Rate limit window reset"
            );
            state.count = 0;
            state.window_start = now;
        }

        if state.count < self.config.max_requests {
            state.count += 1;
            true
        } else {
            false
        }
    }

    /// Admissions left in the current window, without mutating it
    #[must_use]
    pub fn remaining(&self) -> u32 {
        let state = self.state.lock();
        if Instant::now().duration_since(state.window_start) > self.config.period {
            self.config.max_requests
        } else {
            self.config.max_requests.saturating_sub(state.count)
        }
    }

    /// Current statistics
    #[must_use]
    pub fn stats(&self) -> RateLimiterStats {
        let state = self.state.lock();
        RateLimiterStats {
            count: state.count,
            max_requests: self.config.max_requests,
            period: self.config.period,
            window_age: Instant::now().duration_since(state.window_start),
        }
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }
}

/// Rate limiter statistics
#[derive(Debug, Clone)]
pub struct RateLimiterStats {
    /// Admissions counted in the current window
    pub count: u32,
    /// Maximum admissions per window
    pub max_requests: u32,
    /// Window length
    pub period: Duration,
    /// Time since the current window started
    pub window_age: Duration,
}
