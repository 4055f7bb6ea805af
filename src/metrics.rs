//! Running-rate metrics for bounded queues.
//!
//! Every queue keeps one [`RateCounter`] per event kind. A counter stores the
//! lifetime at its last update and the average rate up to that point, which is
//! enough to fold in a new event without keeping any history:
//!
//! `value' = (value * lived + n * 1s) / d`, `lived' = d`
//!
//! i.e. the cumulative events-per-second since the queue was created.

use crate::error::AnvilResult;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant, SystemTime};

const MIN_LIFETIME: Duration = Duration::from_micros(1);

/// Incremental time-weighted average rate.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RateCounter {
    lived: Duration,
    value: f64,
}

impl RateCounter {
    /// Fold `n` events observed at lifetime `lived` into the average and
    /// return the new rate (events per second).
    pub fn push(&mut self, n: f64, lived: Duration) -> f64 {
        let lived = lived.max(MIN_LIFETIME);
        let total = self.value * self.lived.as_secs_f64() + n;
        self.value = (total / lived.as_secs_f64()).max(0.0);
        self.lived = lived;
        self.value
    }

    /// Current rate in events per second.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Lifetime at the last update.
    pub fn lived(&self) -> Duration {
        self.lived
    }
}

/// Counters and rate estimators of one queue, updated under the queue lock.
#[derive(Debug)]
pub(crate) struct QueueMetrics {
    started: Instant,
    started_at: SystemTime,
    inserted: u64,
    acquired: u64,
    acknowledged: u64,
    dropped: u64,
    retried: u64,
    insert_rate: RateCounter,
    acquire_rate: RateCounter,
    acknowledge_rate: RateCounter,
    drop_rate: RateCounter,
}

impl QueueMetrics {
    pub(crate) fn new() -> Self {
        Self {
            started: Instant::now(),
            started_at: SystemTime::now(),
            inserted: 0,
            acquired: 0,
            acknowledged: 0,
            dropped: 0,
            retried: 0,
            insert_rate: RateCounter::default(),
            acquire_rate: RateCounter::default(),
            acknowledge_rate: RateCounter::default(),
            drop_rate: RateCounter::default(),
        }
    }

    pub(crate) fn lived(&self) -> Duration {
        self.started.elapsed()
    }

    pub(crate) fn record_insert(&mut self) {
        let lived = self.lived();
        self.inserted += 1;
        self.insert_rate.push(1.0, lived);
    }

    pub(crate) fn record_acquire(&mut self) {
        let lived = self.lived();
        self.acquired += 1;
        self.acquire_rate.push(1.0, lived);
    }

    pub(crate) fn record_acknowledge(&mut self) {
        let lived = self.lived();
        self.acknowledged += 1;
        self.acknowledge_rate.push(1.0, lived);
    }

    pub(crate) fn record_drop(&mut self) {
        let lived = self.lived();
        self.dropped += 1;
        self.drop_rate.push(1.0, lived);
    }

    pub(crate) fn record_retry(&mut self) {
        self.retried += 1;
    }

    pub(crate) fn snapshot(&self, occupancy: Occupancy) -> QueueSnapshot {
        QueueSnapshot {
            started_at: self.started_at,
            lived_secs: self.lived().as_secs_f64(),
            inserted: self.inserted,
            inserted_per_sec: self.insert_rate.value(),
            acquired: self.acquired,
            acquired_per_sec: self.acquire_rate.value(),
            acknowledged: self.acknowledged,
            acknowledged_per_sec: self.acknowledge_rate.value(),
            dropped: self.dropped,
            dropped_per_sec: self.drop_rate.value(),
            retried: self.retried,
            outstanding: occupancy.outstanding,
            pending: occupancy.pending,
            in_flight: occupancy.in_flight,
            capacity: occupancy.capacity,
        }
    }
}

/// How full a queue is at snapshot time.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Occupancy {
    pub(crate) outstanding: usize,
    pub(crate) pending: usize,
    pub(crate) in_flight: usize,
    pub(crate) capacity: usize,
}

/// Point-in-time view of a queue's metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSnapshot {
    /// When the queue was created
    pub started_at: SystemTime,
    /// Queue lifetime (in seconds)
    pub lived_secs: f64,
    /// Tasks accepted
    pub inserted: u64,
    /// Average insert rate
    pub inserted_per_sec: f64,
    /// Tasks handed to workers, retries included
    pub acquired: u64,
    /// Average acquire rate
    pub acquired_per_sec: f64,
    /// Tasks completed successfully
    pub acknowledged: u64,
    /// Average acknowledge rate
    pub acknowledged_per_sec: f64,
    /// Tasks evicted to make room
    pub dropped: u64,
    /// Average drop rate
    pub dropped_per_sec: f64,
    /// Failed attempts that were requeued
    pub retried: u64,
    /// Pending plus in-flight tasks
    pub outstanding: usize,
    /// Tasks waiting for their first attempt
    pub pending: usize,
    /// Tasks checked out or awaiting a retry
    pub in_flight: usize,
    /// Configured queue length
    pub capacity: usize,
}

impl QueueSnapshot {
    /// Serialize the snapshot as JSON.
    pub fn to_json(&self) -> AnvilResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_rate_counter_matches_total_over_time() {
        let mut counter = RateCounter::default();
        assert_close(counter.push(1.0, Duration::from_secs(1)), 1.0);
        assert_close(counter.push(1.0, Duration::from_secs(2)), 1.0);
        assert_close(counter.push(1.0, Duration::from_secs(6)), 0.5);
        assert_close(counter.push(1.0, Duration::from_secs(8)), 0.5);
        assert_eq!(counter.lived(), Duration::from_secs(8));
    }

    #[test]
    fn test_rate_counter_stays_finite_at_zero_lifetime() {
        let mut counter = RateCounter::default();
        let value = counter.push(1.0, Duration::ZERO);
        assert!(value.is_finite());
        assert!(value >= 0.0);
        assert_eq!(counter.lived(), MIN_LIFETIME);
    }

    #[test]
    fn test_queue_metrics_counts() {
        let mut metrics = QueueMetrics::new();
        metrics.record_insert();
        metrics.record_insert();
        metrics.record_acquire();
        metrics.record_retry();
        metrics.record_acquire();
        metrics.record_acknowledge();
        metrics.record_drop();

        let snapshot = metrics.snapshot(Occupancy {
            outstanding: 0,
            pending: 0,
            in_flight: 0,
            capacity: 4,
        });
        assert_eq!(snapshot.inserted, 2);
        assert_eq!(snapshot.acquired, 2);
        assert_eq!(snapshot.acknowledged, 1);
        assert_eq!(snapshot.dropped, 1);
        assert_eq!(snapshot.retried, 1);
        assert_eq!(snapshot.capacity, 4);

        for rate in [
            snapshot.inserted_per_sec,
            snapshot.acquired_per_sec,
            snapshot.acknowledged_per_sec,
            snapshot.dropped_per_sec,
        ] {
            assert!(rate.is_finite());
            assert!(rate > 0.0);
        }
    }

    #[test]
    fn test_snapshot_to_json() {
        let snapshot = QueueMetrics::new().snapshot(Occupancy::default());
        let json = snapshot.to_json().unwrap();
        assert_eq!(json["inserted"], 0);
        assert!(json.get("dropped_per_sec").is_some());
    }
}
