//! Non-blocking token-bucket rate limiter.
//!
//! One token refills every `every`; the bucket holds at most `burst`.
//! `allow` consumes a token or refuses without blocking, so a refused
//! chunk load is simply retried on a later subtick.

use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct RateLimiter {
    every: Duration,
    burst: f64,
    tokens: f64,
    refreshed: Instant,
}

impl RateLimiter {
    pub fn new(every: Duration, burst: u32) -> Self {
        Self {
            every,
            burst: f64::from(burst),
            tokens: f64::from(burst),
            refreshed: Instant::now(),
        }
    }

    /// A limiter that never refuses. Used where a configuration leaves a
    /// limit out.
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO, 0)
    }

    pub fn allow(&mut self) -> bool {
        if self.every.is_zero() {
            return true;
        }
        let now = Instant::now();
        let refill = now.duration_since(self.refreshed).as_secs_f64() / self.every.as_secs_f64();
        self.tokens = (self.tokens + refill).min(self.burst);
        self.refreshed = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}
