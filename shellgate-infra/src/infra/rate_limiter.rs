use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("Rate limit exceeded, retry in {retry_after_secs}s")]
    Exceeded { retry_after_secs: u64 },
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: usize,
    pub window: Duration,
}

impl RateLimitConfig {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self { max_requests, window }
    }

    /// `max_requests` per rolling minute.
    pub fn per_minute(max_requests: usize) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::per_minute(30)
    }
}

/// Request timestamps of one identity, oldest first.
#[derive(Default)]
struct Window {
    hits: VecDeque<DateTime<Utc>>,
}

impl Window {
    fn prune(&mut self, now: DateTime<Utc>, window: TimeDelta) {
        let cutoff = now - window;
        while self.hits.front().is_some_and(|t| *t <= cutoff) {
            self.hits.pop_front();
        }
    }
}

/// Per-identity sliding-window limiter.
///
/// Windows are created on first use and never collected; memory grows with
/// the number of distinct identities seen.
pub struct RateLimiter {
    windows: Mutex<HashMap<String, Window>>,
    config: RateLimitConfig,
    window: TimeDelta,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let window = TimeDelta::from_std(config.window).unwrap_or_else(|_| TimeDelta::weeks(5200));
        Self {
            windows: Mutex::new(HashMap::new()),
            config,
            window,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn is_allowed(&self, identity: &str) -> bool {
        self.is_allowed_at(identity, Utc::now())
    }

    /// Records the request and returns true, or returns false without
    /// recording when the window is full.
    pub fn is_allowed_at(&self, identity: &str, now: DateTime<Utc>) -> bool {
        let mut windows = self.windows.lock();
        let window = windows.entry(identity.to_string()).or_default();
        window.prune(now, self.window);

        if window.hits.len() >= self.config.max_requests {
            return false;
        }
        window.hits.push_back(now);
        true
    }

    pub fn time_until_allowed(&self, identity: &str) -> u64 {
        self.time_until_allowed_at(identity, Utc::now())
    }

    /// Whole seconds until the oldest retained request leaves the window,
    /// rounded up; 0 when the window is empty.
    pub fn time_until_allowed_at(&self, identity: &str, now: DateTime<Utc>) -> u64 {
        let mut windows = self.windows.lock();
        let Some(window) = windows.get_mut(identity) else {
            return 0;
        };
        window.prune(now, self.window);

        let Some(oldest) = window.hits.front() else {
            return 0;
        };
        let remaining = (*oldest + self.window - now).num_milliseconds().max(0) as u64;
        remaining.div_ceil(1000)
    }

    /// `is_allowed` folded into a `Result` carrying the retry hint.
    pub fn check(&self, identity: &str) -> Result<(), RateLimitError> {
        self.check_at(identity, Utc::now())
    }

    pub fn check_at(&self, identity: &str, now: DateTime<Utc>) -> Result<(), RateLimitError> {
        if self.is_allowed_at(identity, now) {
            Ok(())
        } else {
            Err(RateLimitError::Exceeded {
                retry_after_secs: self.time_until_allowed_at(identity, now),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn limiter(max: usize, secs: u64) -> RateLimiter {
        RateLimiter::new(RateLimitConfig::new(max, Duration::from_secs(secs)))
    }

    #[test]
    fn test_two_per_minute_scenario() {
        let limiter = limiter(2, 60);
        let t0 = Utc::now();

        assert!(limiter.is_allowed_at("alice", t0));
        assert!(limiter.is_allowed_at("alice", t0 + TimeDelta::seconds(10)));
        assert!(!limiter.is_allowed_at("alice", t0 + TimeDelta::seconds(20)));
        assert!(limiter.is_allowed_at("alice", t0 + TimeDelta::seconds(61)));
    }

    #[test]
    fn test_denied_calls_are_not_recorded() {
        let limiter = limiter(1, 60);
        let t0 = Utc::now();

        assert!(limiter.is_allowed_at("bob", t0));
        for i in 1..10 {
            assert!(!limiter.is_allowed_at("bob", t0 + TimeDelta::seconds(i)));
        }
        // Only the first call occupies the window.
        assert!(limiter.is_allowed_at("bob", t0 + TimeDelta::seconds(60)));
    }

    #[test]
    fn test_timestamp_exactly_at_cutoff_is_pruned() {
        let limiter = limiter(1, 60);
        let t0 = Utc::now();
        assert!(limiter.is_allowed_at("carol", t0));
        assert!(limiter.is_allowed_at("carol", t0 + TimeDelta::seconds(60)));
    }

    #[test]
    fn test_time_until_allowed() {
        let limiter = limiter(2, 60);
        let t0 = Utc::now();
        assert_eq!(limiter.time_until_allowed_at("dave", t0), 0);

        limiter.is_allowed_at("dave", t0);
        limiter.is_allowed_at("dave", t0 + TimeDelta::seconds(5));
        assert_eq!(limiter.time_until_allowed_at("dave", t0 + TimeDelta::seconds(20)), 40);
        assert_eq!(limiter.time_until_allowed_at("dave", t0 + TimeDelta::seconds(120)), 0);
    }

    #[test]
    fn test_check_reports_retry_hint() {
        let limiter = limiter(1, 60);
        let t0 = Utc::now();
        assert!(limiter.check_at("erin", t0).is_ok());
        assert_eq!(
            limiter.check_at("erin", t0 + TimeDelta::seconds(15)),
            Err(RateLimitError::Exceeded { retry_after_secs: 45 })
        );
    }

    #[test]
    fn test_per_identity_isolation() {
        let limiter = limiter(2, 60);
        let t0 = Utc::now();

        assert!(limiter.is_allowed_at("a", t0));
        assert!(limiter.is_allowed_at("a", t0));
        assert!(!limiter.is_allowed_at("a", t0));

        assert!(limiter.is_allowed_at("b", t0));
        assert!(limiter.is_allowed_at("b", t0));
        assert!(!limiter.is_allowed_at("b", t0));
    }

    #[test]
    fn test_concurrent_access() {
        let limiter = Arc::new(limiter(10, 60));

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                thread::spawn(move || limiter.is_allowed("shared"))
            })
            .collect();

        let allowed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(allowed, 10);
    }
}
