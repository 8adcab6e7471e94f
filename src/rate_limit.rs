//! Per-caller fixed-window request limiting.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::RagError;

/// Default request budget per window.
pub const DEFAULT_MAX_REQUESTS_PER_MINUTE: u32 = 10;

/// Fixed-window request counter keyed by caller identifier.
///
/// Each identifier gets a window created lazily on its first request and
/// reset once the window duration has fully elapsed. A caller right at a
/// window boundary can burst up to twice the limit across the two windows;
/// that is the documented cost of the fixed-window simplification over a
/// sliding window or token bucket.
///
/// Windows are never evicted, so memory grows with the number of distinct
/// identifiers seen over the process lifetime. Acceptable behind keyed
/// auth; front the limiter with an identifier allowlist if caller
/// cardinality is unbounded.
#[derive(Debug)]
pub struct RateLimiter {
    windows: Mutex<HashMap<String, RateWindow>>,
    max_requests: u32,
    window: Duration,
}

#[derive(Debug)]
struct RateWindow {
    window_start: Instant,
    count: u32,
}

impl RateLimiter {
    /// Builds a limiter allowing `max_requests` per minute per identifier.
    pub fn new(max_requests: u32) -> Self {
        Self::with_window(max_requests, Duration::from_secs(60))
    }

    /// Builds a limiter with an explicit window duration.
    pub fn with_window(max_requests: u32, window: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            max_requests,
            window,
        }
    }

    /// Configured per-window request budget.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Charges one request to `identifier`, failing once the window budget
    /// is exhausted.
    ///
    /// The charge is applied before the limit check and is not rolled back
    /// on rejection, so hammering a tripped limiter never resets it. The
    /// whole read-increment-compare runs under one lock; two concurrent
    /// requests from the same identifier cannot both observe the
    /// pre-increment count.
    pub fn check_and_consume(&self, identifier: &str) -> Result<(), RagError> {
        self.check_at(identifier, Instant::now())
    }

    fn check_at(&self, identifier: &str, now: Instant) -> Result<(), RagError> {
        let mut windows = self.windows.lock().expect("rate limit lock poisoned");
        let entry = windows
            .entry(identifier.to_string())
            .or_insert_with(|| RateWindow {
                window_start: now,
                count: 0,
            });

        if now.saturating_duration_since(entry.window_start) > self.window {
            entry.count = 0;
            entry.window_start = now;
        }

        entry.count += 1;
        if entry.count > self.max_requests {
            warn!(%identifier, count = entry.count, "rate limit exceeded");
            return Err(RagError::RateLimitExceeded {
                limit: self.max_requests,
            });
        }

        debug!(%identifier, count = entry.count, "rate limit check passed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit_then_rejects() {
        let limiter = RateLimiter::new(10);
        let now = Instant::now();
        for _ in 0..10 {
            limiter.check_at("caller-x", now).unwrap();
        }
        match limiter.check_at("caller-x", now) {
            Err(RagError::RateLimitExceeded { limit }) => assert_eq!(limit, 10),
            other => panic!("expected rate limit error, got {other:?}"),
        }
    }

    #[test]
    fn window_elapse_resets_the_count() {
        let limiter = RateLimiter::new(10);
        let start = Instant::now();
        for _ in 0..11 {
            let _ = limiter.check_at("caller-x", start);
        }
        // Just past the window boundary: request 12 succeeds again.
        let later = start + Duration::from_secs(61);
        limiter.check_at("caller-x", later).unwrap();
    }

    #[test]
    fn rejected_attempts_are_still_charged() {
        let limiter = RateLimiter::with_window(2, Duration::from_secs(60));
        let now = Instant::now();
        limiter.check_at("caller-x", now).unwrap();
        limiter.check_at("caller-x", now).unwrap();
        for _ in 0..5 {
            assert!(limiter.check_at("caller-x", now).is_err());
        }
        // Still inside the window: the retries above must not have freed
        // budget.
        assert!(limiter.check_at("caller-x", now + Duration::from_secs(30)).is_err());
    }

    #[test]
    fn identifiers_are_independent() {
        let limiter = RateLimiter::with_window(1, Duration::from_secs(60));
        let now = Instant::now();
        limiter.check_at("a", now).unwrap();
        assert!(limiter.check_at("a", now).is_err());
        limiter.check_at("b", now).unwrap();
    }

    #[test]
    fn boundary_is_strictly_after_window_end() {
        let limiter = RateLimiter::with_window(1, Duration::from_secs(60));
        let start = Instant::now();
        limiter.check_at("a", start).unwrap();
        // Exactly at the boundary the window has not elapsed yet.
        assert!(limiter
            .check_at("a", start + Duration::from_secs(60))
            .is_err());
        limiter
            .check_at("a", start + Duration::from_secs(60) + Duration::from_millis(1))
            .unwrap();
    }
}
