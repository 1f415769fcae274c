//! Fixed-window rate limiting keyed by caller identity.
//!
//! The limiter counts requests in non-overlapping time buckets of fixed
//! duration. It is process-local and advisory: state is lost on restart,
//! which is acceptable because the limiter is an abuse-dampening heuristic,
//! not a security boundary.
//!
//! Separate named instances guard record creation and tracking with
//! independent `(window, max)` tuning.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Outcome of a limiter check.
///
/// `reset_at` is surfaced even when the request is allowed so callers can
/// expose remaining-budget information.
#[derive(Debug, Clone, Copy)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    reset_at: DateTime<Utc>,
}

/// Fixed-window counter keyed by identity.
///
/// The first call in a window creates a counter with
/// `reset_at = now + window`; calls within the window increment it; once
/// `now > reset_at` the counter resets transparently on the next call.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    name: &'static str,
    window: Duration,
    max_requests: u32,
    entries: Mutex<HashMap<String, Window>>,
}

impl FixedWindowLimiter {
    /// Create a limiter allowing `max_requests` per `window` per identity.
    pub fn new(name: &'static str, window: std::time::Duration, max_requests: u32) -> Self {
        Self {
            name,
            window: Duration::from_std(window).unwrap_or_else(|_| Duration::seconds(60)),
            max_requests,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Check whether `identity` may proceed, charging one request if so.
    pub fn check(&self, identity: &str) -> RateDecision {
        self.check_at(identity, Utc::now())
    }

    /// Window arithmetic with an explicit clock, exercised directly by the
    /// unit tests.
    fn check_at(&self, identity: &str, now: DateTime<Utc>) -> RateDecision {
        let mut entries = self.entries.lock().expect("limiter lock poisoned");

        let window = entries.entry(identity.to_string()).or_insert(Window {
            count: 0,
            reset_at: now + self.window,
        });

        // Expired window: reset transparently before counting this call.
        if now > window.reset_at {
            window.count = 0;
            window.reset_at = now + self.window;
        }

        if window.count >= self.max_requests {
            tracing::debug!(limiter = self.name, identity, "rate limit exceeded");
            return RateDecision {
                allowed: false,
                remaining: 0,
                reset_at: window.reset_at,
            };
        }

        window.count += 1;
        RateDecision {
            allowed: true,
            remaining: self.max_requests - window.count,
            reset_at: window.reset_at,
        }
    }

    /// Clear one identity's counter.
    ///
    /// Used to refund a charge when the guarded operation fails and failed
    /// attempts are configured not to count.
    pub fn reset(&self, identity: &str) {
        self.entries
            .lock()
            .expect("limiter lock poisoned")
            .remove(identity);
    }

    /// Drop expired windows so memory is bounded by active identities.
    pub fn reap(&self) -> usize {
        self.reap_at(Utc::now())
    }

    fn reap_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock().expect("limiter lock poisoned");
        let before = entries.len();
        entries.retain(|_, window| now <= window.reset_at);
        before - entries.len()
    }

    /// Spawn a background task reaping expired windows on `every`.
    pub fn spawn_reaper(self: Arc<Self>, every: std::time::Duration) -> tokio::task::JoinHandle<()> {
        let limiter = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let reaped = limiter.reap();
                if reaped > 0 {
                    tracing::debug!(limiter = limiter.name, reaped, "reaped expired windows");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    fn limiter(window_secs: u64, max: u32) -> FixedWindowLimiter {
        FixedWindowLimiter::new("test", StdDuration::from_secs(window_secs), max)
    }

    #[test]
    fn allows_up_to_max_then_blocks() {
        let limiter = limiter(60, 3);
        let now = Utc::now();

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.check_at("alice", now);
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let fourth = limiter.check_at("alice", now + Duration::seconds(30));
        assert!(!fourth.allowed);
        assert_eq!(fourth.remaining, 0);
        assert_eq!(fourth.reset_at, now + Duration::seconds(60));
    }

    #[test]
    fn window_expiry_resets_transparently() {
        let limiter = limiter(60, 3);
        let now = Utc::now();

        for _ in 0..3 {
            assert!(limiter.check_at("alice", now).allowed);
        }
        assert!(!limiter.check_at("alice", now).allowed);

        // Past reset_at the next call starts a fresh window.
        let later = now + Duration::seconds(61);
        let decision = limiter.check_at("alice", later);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
        assert_eq!(decision.reset_at, later + Duration::seconds(60));
    }

    #[test]
    fn identities_are_independent() {
        let limiter = limiter(60, 1);
        let now = Utc::now();

        assert!(limiter.check_at("alice", now).allowed);
        assert!(!limiter.check_at("alice", now).allowed);
        assert!(limiter.check_at("bob", now).allowed);
    }

    #[test]
    fn reset_refunds_a_single_identity() {
        let limiter = limiter(60, 1);
        let now = Utc::now();

        assert!(limiter.check_at("alice", now).allowed);
        assert!(limiter.check_at("bob", now).allowed);
        limiter.reset("alice");

        assert!(limiter.check_at("alice", now).allowed);
        assert!(!limiter.check_at("bob", now).allowed);
    }

    #[test]
    fn reap_drops_only_expired_windows() {
        let limiter = limiter(60, 3);
        let now = Utc::now();

        limiter.check_at("old", now);
        limiter.check_at("fresh", now + Duration::seconds(50));

        let reaped = limiter.reap_at(now + Duration::seconds(70));
        assert_eq!(reaped, 1);

        // The fresh window still carries its count.
        limiter.check_at("fresh", now + Duration::seconds(55));
        let decision = limiter.check_at("fresh", now + Duration::seconds(56));
        assert_eq!(decision.remaining, 0);
    }
}
