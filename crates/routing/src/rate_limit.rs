// routing/src/rate_limit.rs

use mesh_core::fixed::mul_div_u64;
use mesh_core::{ThrottleMode, Timestamp, SCALE};
use serde::{Deserialize, Serialize};

/// Fixed-window request counter of one network.
///
/// The window restarts in full once `now >= window_start + window_duration`.
/// A breach starts a backoff during which every request is refused,
/// regardless of the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub current_count: u64,
    pub max_count: u64,
    pub window_start: Timestamp,
    pub window_duration: u64,
    pub backoff_until: Timestamp,
    pub is_throttled: bool,
}

impl RateLimit {
    pub fn new(max_count: u64, window_duration: u64, now: Timestamp) -> Self {
        Self {
            current_count: 0,
            max_count,
            window_start: now,
            window_duration,
            backoff_until: 0,
            is_throttled: false,
        }
    }

    /// Requests allowed per window under the given throttle mode
    pub fn effective_limit(&self, mode: ThrottleMode) -> u64 {
        mul_div_u64(self.max_count, mode.capacity(), SCALE)
    }

    /// Backoff still running at `now`
    pub fn in_backoff(&self, now: Timestamp) -> bool {
        self.is_throttled && now < self.backoff_until
    }

    fn roll_window(&mut self, now: Timestamp) {
        if now >= self.window_start.saturating_add(self.window_duration) {
            self.window_start = now;
            self.current_count = 0;
        }
    }

    /// Count one request. On refusal returns the time to retry after.
    pub fn try_acquire(&mut self, now: Timestamp, mode: ThrottleMode, backoff_secs: u64) -> Result<(), Timestamp> {
        if self.in_backoff(now) {
            return Err(self.backoff_until);
        }
        self.is_throttled = false;
        self.roll_window(now);

        if self.current_count >= self.effective_limit(mode) {
            self.is_throttled = true;
            self.backoff_until = now.saturating_add(backoff_secs);
            return Err(self.backoff_until);
        }

        self.current_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_resets_exactly_at_boundary() {
        let mut limit = RateLimit::new(2, 60, 1000);
        limit.try_acquire(1000, ThrottleMode::Normal, 300).unwrap();
        limit.try_acquire(1030, ThrottleMode::Normal, 300).unwrap();

        // One second before the boundary still counts against the old window
        let mut before = limit.clone();
        assert_eq!(before.try_acquire(1059, ThrottleMode::Normal, 300), Err(1359));

        limit.try_acquire(1060, ThrottleMode::Normal, 300).unwrap();
        assert_eq!(limit.window_start, 1060);
        assert_eq!(limit.current_count, 1);
    }

    #[test]
    fn test_backoff_overrides_window() {
        let mut limit = RateLimit::new(1, 60, 0);
        limit.try_acquire(0, ThrottleMode::Normal, 300).unwrap();
        assert_eq!(limit.try_acquire(1, ThrottleMode::Normal, 300), Err(301));
        assert!(limit.is_throttled);

        // A fresh window does not lift the backoff
        assert_eq!(limit.try_acquire(120, ThrottleMode::Normal, 300), Err(301));
        assert!(limit.try_acquire(301, ThrottleMode::Normal, 300).is_ok());
        assert!(!limit.is_throttled);
    }

    #[test]
    fn test_effective_limit_follows_throttle_mode() {
        let limit = RateLimit::new(100, 60, 0);
        assert_eq!(limit.effective_limit(ThrottleMode::Normal), 100);
        assert_eq!(limit.effective_limit(ThrottleMode::Congested), 70);
        assert_eq!(limit.effective_limit(ThrottleMode::Emergency), 30);
        assert_eq!(limit.effective_limit(ThrottleMode::Halt), 0);
    }
}
