use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Rolling record of receive timestamps, used to detect peers flooding us.
pub struct Throttle {
    per_sec: usize,
    per_10_sec: usize,
    timestamps: VecDeque<Instant>,
}

impl Throttle {
    pub fn new(per_sec: usize, per_10_sec: usize) -> Self {
        let capacity = per_sec.max(per_10_sec) + 1;
        Throttle { per_sec, per_10_sec, timestamps: VecDeque::with_capacity(capacity) }
    }

    /// Records a message received at `now` and reports whether either window limit is
    /// exceeded. The limit itself is allowed: `limit` messages within a window pass, the
    /// next one within the same window does not.
    pub fn record(&mut self, now: Instant) -> bool {
        self.timestamps.push_back(now);
        while self.timestamps.len() > self.per_sec.max(self.per_10_sec) + 1 {
            self.timestamps.pop_front();
        }
        self.exceeds(now, self.per_sec, Duration::from_secs(1))
            || self.exceeds(now, self.per_10_sec, Duration::from_secs(10))
    }

    fn exceeds(&self, now: Instant, limit: usize, window: Duration) -> bool {
        let len = self.timestamps.len();
        if len <= limit {
            return false;
        }
        // the oldest of the last `limit + 1` messages
        let oldest = self.timestamps[len - 1 - limit];
        now.duration_since(oldest) < window
    }

    pub fn recorded(&self) -> usize {
        self.timestamps.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_is_allowed_one_more_is_not() {
        let mut throttle = Throttle::new(5, 1000);
        let now = Instant::now();
        for _ in 0..5 {
            assert!(!throttle.record(now));
        }
        assert!(throttle.record(now));
    }

    #[test]
    fn test_window_expires() {
        let mut throttle = Throttle::new(5, 1000);
        let start = Instant::now();
        for _ in 0..5 {
            assert!(!throttle.record(start));
        }
        assert!(!throttle.record(start + Duration::from_millis(1000)));
        assert!(!throttle.record(start + Duration::from_millis(1001)));
    }

    #[test]
    fn test_ten_second_window() {
        let mut throttle = Throttle::new(200, 10);
        let start = Instant::now();
        for i in 0..10 {
            assert!(!throttle.record(start + Duration::from_millis(900 * i)));
        }
        assert!(throttle.record(start + Duration::from_millis(9000)));
    }

    #[test]
    fn test_timestamps_are_trimmed() {
        let mut throttle = Throttle::new(3, 5);
        let start = Instant::now();
        for i in 0..100 {
            throttle.record(start + Duration::from_secs(20 * i));
        }
        assert_eq!(throttle.recorded(), 6);
    }
}
