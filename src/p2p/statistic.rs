//! Traffic counters of a single connection and of the whole process.

use lazy_static::lazy_static;
use parking_lot::Mutex;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Process-wide totals, shared by every connection.
pub struct TotalStatistics {
    pub sent_bytes: AtomicU64,
    pub received_bytes: AtomicU64,
    pub sent_messages: AtomicU64,
    pub received_messages: AtomicU64,
    received_by_kind: Mutex<HashMap<String, u64>>,
}

lazy_static! {
    pub static ref TOTALS: TotalStatistics = TotalStatistics {
        sent_bytes: AtomicU64::new(0),
        received_bytes: AtomicU64::new(0),
        sent_messages: AtomicU64::new(0),
        received_messages: AtomicU64::new(0),
        received_by_kind: Mutex::new(HashMap::new()),
    };
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TotalsSnapshot {
    pub sent_bytes: u64,
    pub received_bytes: u64,
    pub sent_messages: u64,
    pub received_messages: u64,
}

impl TotalStatistics {
    pub fn snapshot(&self) -> TotalsSnapshot {
        TotalsSnapshot {
            sent_bytes: self.sent_bytes.load(Ordering::Relaxed),
            received_bytes: self.received_bytes.load(Ordering::Relaxed),
            sent_messages: self.sent_messages.load(Ordering::Relaxed),
            received_messages: self.received_messages.load(Ordering::Relaxed),
        }
    }

    pub fn received_by_kind(&self) -> HashMap<String, u64> {
        self.received_by_kind.lock().clone()
    }
}

/// Counters of one connection.
pub struct Statistic {
    creation_time: Instant,
    last_activity: Mutex<Instant>,
    sent_bytes: AtomicU64,
    received_bytes: AtomicU64,
    sent_messages: Mutex<HashMap<String, u64>>,
    received_messages: Mutex<HashMap<String, u64>>,
    // milliseconds
    round_trip_time: AtomicU64,
}

impl Statistic {
    pub fn new() -> Self {
        let now = Instant::now();
        Statistic {
            creation_time: now,
            last_activity: Mutex::new(now),
            sent_bytes: AtomicU64::new(0),
            received_bytes: AtomicU64::new(0),
            sent_messages: Mutex::new(HashMap::new()),
            received_messages: Mutex::new(HashMap::new()),
            round_trip_time: AtomicU64::new(0),
        }
    }

    pub fn add_sent_bytes(&self, bytes: usize) {
        self.sent_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        TOTALS.sent_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn add_received_bytes(&self, bytes: usize) {
        self.received_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
        TOTALS.received_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn add_sent_message(&self, kind: &str) {
        *self.sent_messages.lock().entry(kind.to_string()).or_insert(0) += 1;
        TOTALS.sent_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_received_message(&self, kind: &str) {
        *self.received_messages.lock().entry(kind.to_string()).or_insert(0) += 1;
        *TOTALS.received_by_kind.lock().entry(kind.to_string()).or_insert(0) += 1;
        TOTALS.received_messages.fetch_add(1, Ordering::Relaxed);
    }

    pub fn update_last_activity(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock()
    }

    pub fn last_activity_age(&self) -> Duration {
        self.last_activity().elapsed()
    }

    pub fn creation_time(&self) -> Instant {
        self.creation_time
    }

    pub fn set_round_trip_time(&self, round_trip_time: Duration) {
        self.round_trip_time.store(round_trip_time.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn round_trip_time(&self) -> Duration {
        Duration::from_millis(self.round_trip_time.load(Ordering::Relaxed))
    }

    pub fn sent_bytes(&self) -> u64 {
        self.sent_bytes.load(Ordering::Relaxed)
    }

    pub fn received_bytes(&self) -> u64 {
        self.received_bytes.load(Ordering::Relaxed)
    }

    pub fn sent_messages(&self) -> HashMap<String, u64> {
        self.sent_messages.lock().clone()
    }

    pub fn received_messages(&self) -> HashMap<String, u64> {
        self.received_messages.lock().clone()
    }
}

impl Default for Statistic {
    fn default() -> Self {
        Statistic::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_per_connection_and_totals() {
        let before = TOTALS.snapshot();
        let statistic = Statistic::new();
        statistic.add_sent_bytes(100);
        statistic.add_received_bytes(40);
        statistic.add_received_message("Ping");
        statistic.add_received_message("Ping");
        statistic.add_sent_message("Pong");

        assert_eq!(statistic.sent_bytes(), 100);
        assert_eq!(statistic.received_bytes(), 40);
        assert_eq!(statistic.received_messages().get("Ping"), Some(&2));
        assert_eq!(statistic.sent_messages().get("Pong"), Some(&1));

        // other tests run concurrently, so totals only grow
        let after = TOTALS.snapshot();
        assert!(after.sent_bytes >= before.sent_bytes + 100);
        assert!(after.received_messages >= before.received_messages + 2);
    }

    #[test]
    fn test_round_trip_time() {
        let statistic = Statistic::new();
        statistic.set_round_trip_time(Duration::from_millis(350));
        assert_eq!(statistic.round_trip_time(), Duration::from_millis(350));
        assert!(statistic.last_activity() >= statistic.creation_time());
    }
}
