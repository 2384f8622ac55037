//! Per-IP sliding-window click limit.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

/// Counts accepted clicks per IP over a trailing window.
pub struct ClickRateLimiter {
    limit: usize,
    window: Duration,
    hits: Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>,
}

impl ClickRateLimiter {
    /// Creates a limiter with a one-hour window.
    pub fn new(limit_per_hour: u32) -> Self {
        Self::with_window(limit_per_hour, Duration::hours(1))
    }

    pub fn with_window(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit as usize,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Records a click from `ip` if it is under the limit.
    ///
    /// Returns `false` without recording anything when the limit is reached.
    pub fn check_and_record(&self, ip: &str) -> bool {
        self.check_and_record_at(ip, Utc::now())
    }

    pub(crate) fn check_and_record_at(&self, ip: &str, now: DateTime<Utc>) -> bool {
        let cutoff = now - self.window;
        let mut hits = self.hits.lock();
        let window = hits.entry(ip.to_string()).or_default();

        while window.front().is_some_and(|at| *at <= cutoff) {
            window.pop_front();
        }

        if window.len() >= self.limit {
            return false;
        }

        window.push_back(now);
        true
    }

    /// Gives back a slot taken by [`check_and_record_at`](Self::check_and_record_at)
    /// for a click that was not recorded after all.
    pub fn release(&self, ip: &str, at: DateTime<Utc>) {
        let mut hits = self.hits.lock();
        if let Some(window) = hits.get_mut(ip) {
            if let Some(pos) = window.iter().rposition(|hit| *hit == at) {
                window.remove(pos);
            }
            if window.is_empty() {
                hits.remove(ip);
            }
        }
    }

    /// Clicks from `ip` still inside the window.
    pub fn recent(&self, ip: &str) -> usize {
        let cutoff = Utc::now() - self.window;
        self.hits
            .lock()
            .get(ip)
            .map_or(0, |window| window.iter().filter(|at| **at > cutoff).count())
    }

    /// Drops IPs with no clicks inside the window. Returns how many were removed.
    pub fn prune(&self) -> usize {
        self.prune_at(Utc::now())
    }

    pub(crate) fn prune_at(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.window;
        let mut hits = self.hits.lock();
        let before = hits.len();

        hits.retain(|_, window| {
            while window.front().is_some_and(|at| *at <= cutoff) {
                window.pop_front();
            }
            !window.is_empty()
        });

        before - hits.len()
    }

    pub fn tracked_ips(&self) -> usize {
        self.hits.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thirtieth_accepted_thirty_first_rejected() {
        let limiter = ClickRateLimiter::new(30);

        for i in 1..=30 {
            assert!(limiter.check_and_record("10.0.0.1"), "click {i} should pass");
        }
        assert!(!limiter.check_and_record("10.0.0.1"));
        assert_eq!(limiter.recent("10.0.0.1"), 30);
    }

    #[test]
    fn test_limits_are_per_ip() {
        let limiter = ClickRateLimiter::new(1);

        assert!(limiter.check_and_record("10.0.0.1"));
        assert!(!limiter.check_and_record("10.0.0.1"));
        assert!(limiter.check_and_record("10.0.0.2"));
    }

    #[test]
    fn test_old_clicks_leave_the_window() {
        let limiter = ClickRateLimiter::new(2);
        let start = Utc::now();

        assert!(limiter.check_and_record_at("ip", start));
        assert!(limiter.check_and_record_at("ip", start + Duration::minutes(10)));
        assert!(!limiter.check_and_record_at("ip", start + Duration::minutes(30)));

        assert!(limiter.check_and_record_at("ip", start + Duration::minutes(61)));
    }

    #[test]
    fn test_released_slot_can_be_reused() {
        let limiter = ClickRateLimiter::new(2);
        let start = Utc::now();

        assert!(limiter.check_and_record_at("ip", start));
        let second = start + Duration::seconds(1);
        assert!(limiter.check_and_record_at("ip", second));
        assert!(!limiter.check_and_record_at("ip", second));

        limiter.release("ip", second);

        assert_eq!(limiter.recent("ip"), 1);
        assert!(limiter.check_and_record_at("ip", second + Duration::seconds(1)));
    }

    #[test]
    fn test_release_of_unknown_hit_is_ignored() {
        let limiter = ClickRateLimiter::new(2);
        let start = Utc::now();
        limiter.check_and_record_at("ip", start);

        limiter.release("ip", start + Duration::seconds(5));
        limiter.release("other", start);

        assert_eq!(limiter.recent("ip"), 1);
        assert_eq!(limiter.tracked_ips(), 1);
    }

    #[test]
    fn test_prune_removes_idle_ips() {
        let limiter = ClickRateLimiter::new(5);
        let start = Utc::now();
        limiter.check_and_record_at("idle", start);
        limiter.check_and_record_at("busy", start + Duration::minutes(50));

        let removed = limiter.prune_at(start + Duration::minutes(90));

        assert_eq!(removed, 1);
        assert_eq!(limiter.tracked_ips(), 1);
    }
}
