//! Sliding-window rate limiting for submitted messages

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

pub const DEFAULT_LIMIT_PER_MINUTE: u32 = 60;

/// Shown instead of starting a turn when the limit is hit
pub const WAITING_ROOM_NOTICE: &str =
    "You're sending messages faster than we can answer. Take a breath and try again in a minute.";

/// Allows at most `limit` hits per key within any `window`
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    pub fn per_minute(limit: u32) -> Self {
        Self::new(limit, Duration::from_secs(60))
    }

    /// Record a hit for `key`; `false` if it is over the limit
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut hits = self.hits.lock();
        // Forget keys whose most recent hit has left the window
        hits.retain(|_, window| {
            window
                .back()
                .is_some_and(|last| now.duration_since(*last) < self.window)
        });
        let window = hits.entry(key.to_string()).or_default();
        while let Some(oldest) = window.front() {
            if now.duration_since(*oldest) >= self.window {
                window.pop_front();
            } else {
                break;
            }
        }
        if window.len() >= self.limit as usize {
            tracing::warn!(key, limit = self.limit, "Rate limit exceeded");
            return false;
        }
        window.push_back(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_within_window() {
        let limiter = RateLimiter::per_minute(2);
        let start = Instant::now();
        assert!(limiter.check_at("local", start));
        assert!(limiter.check_at("local", start + Duration::from_secs(1)));
        assert!(!limiter.check_at("local", start + Duration::from_secs(2)));
        assert!(limiter.check_at("other", start + Duration::from_secs(2)));
    }

    #[test]
    fn test_window_slides() {
        let limiter = RateLimiter::per_minute(1);
        let start = Instant::now();
        assert!(limiter.check_at("local", start));
        assert!(!limiter.check_at("local", start + Duration::from_secs(59)));
        assert!(limiter.check_at("local", start + Duration::from_secs(60)));
    }

    #[test]
    fn test_idle_keys_are_forgotten() {
        let limiter = RateLimiter::per_minute(5);
        let start = Instant::now();
        assert!(limiter.check_at("alice", start));
        assert!(limiter.check_at("bob", start + Duration::from_secs(30)));
        assert_eq!(limiter.hits.lock().len(), 2);

        assert!(limiter.check_at("carol", start + Duration::from_secs(61)));
        let hits = limiter.hits.lock();
        assert!(!hits.contains_key("alice"));
        assert!(hits.contains_key("bob"));
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_rejected_hits_do_not_count() {
        let limiter = RateLimiter::per_minute(1);
        let start = Instant::now();
        assert!(limiter.check_at("local", start));
        assert!(!limiter.check_at("local", start + Duration::from_secs(30)));
        assert!(limiter.check_at("local", start + Duration::from_secs(61)));
    }
}
