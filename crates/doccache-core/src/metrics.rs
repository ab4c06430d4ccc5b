//! Operation counters behind the hit and eviction rates.
//!
//! All counters are relaxed atomics.

#![allow(clippy::cast_precision_loss)] // Rates are reporting values; precision loss past 2^53 ops is fine

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome class of a single cache operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Hit,
    Miss,
    Write,
    Error,
}

/// Lifetime counters for one cache instance.
///
/// Lock-free; the facade shares it through an `Arc` so statistics reads never
/// wait on the store mutex.
#[derive(Debug)]
pub struct MetricsCollector {
    enabled: AtomicBool,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    errors: AtomicU64,
    integrity_failures: AtomicU64,
    evictions: AtomicU64,
    bytes_written: AtomicU64,
    retrieval_micros: AtomicU64,
    retrievals: AtomicU64,
    last_operation_millis: AtomicI64,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Point-in-time copy of [`MetricsCollector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Reads served from the store.
    pub hits: u64,
    /// Reads that found nothing usable.
    pub misses: u64,
    /// Values written.
    pub writes: u64,
    /// Failed operations.
    pub errors: u64,
    /// Reads dropped for integrity failures.
    pub integrity_failures: u64,
    /// Entries evicted.
    pub evictions: u64,
    /// Plaintext bytes written.
    pub bytes_written: u64,
    /// `hits / (hits + misses)`, 0.0 with no lookups.
    pub hit_rate: f64,
    /// `evictions / (writes + hits)`, 0.0 with no accesses.
    pub eviction_rate: f64,
    /// Mean read latency.
    pub average_retrieval_latency: Duration,
    /// Time of the most recent operation.
    pub last_operation_at: Option<DateTime<Utc>>,
}

impl MetricsCollector {
    /// Zeroed collector.
    #[must_use]
    pub const fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            integrity_failures: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            retrieval_micros: AtomicU64::new(0),
            retrievals: AtomicU64::new(0),
            last_operation_millis: AtomicI64::new(i64::MIN),
        }
    }

    /// Whether operations are being recorded.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Turn recording on or off.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Record one operation. `duration` feeds the retrieval latency average
    /// for hits; `bytes` is counted for writes.
    #[allow(clippy::cast_possible_truncation)] // Saturating at u64::MAX is acceptable for timing metrics
    pub fn record(&self, kind: OperationKind, duration: Duration, bytes: usize) {
        if !self.is_enabled() {
            return;
        }
        match kind {
            OperationKind::Hit => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                self.retrievals.fetch_add(1, Ordering::Relaxed);
                self.retrieval_micros.fetch_add(
                    duration.as_micros().min(u128::from(u64::MAX)) as u64,
                    Ordering::Relaxed,
                );
            },
            OperationKind::Miss => {
                self.misses.fetch_add(1, Ordering::Relaxed);
            },
            OperationKind::Write => {
                self.writes.fetch_add(1, Ordering::Relaxed);
                self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
            },
            OperationKind::Error => {
                self.errors.fetch_add(1, Ordering::Relaxed);
            },
        }
        self.last_operation_millis
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// A read that failed authentication or checksum verification. Counted as
    /// a miss as well.
    pub fn record_integrity_failure(&self, duration: Duration) {
        if !self.is_enabled() {
            return;
        }
        self.integrity_failures.fetch_add(1, Ordering::Relaxed);
        self.record(OperationKind::Miss, duration, 0);
    }

    /// Count `count` evictions.
    pub fn record_evictions(&self, count: usize) {
        if count == 0 || !self.is_enabled() {
            return;
        }
        self.evictions.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Hits over hits plus misses.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        ratio(hits, hits + misses)
    }

    /// Evictions over writes plus hits.
    pub fn eviction_rate(&self) -> f64 {
        let accesses = self.writes.load(Ordering::Relaxed) + self.hits.load(Ordering::Relaxed);
        ratio(self.evictions.load(Ordering::Relaxed), accesses)
    }

    /// Hits, misses, writes and evictions seen so far.
    pub fn observations(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
            + self.misses.load(Ordering::Relaxed)
            + self.writes.load(Ordering::Relaxed)
            + self.evictions.load(Ordering::Relaxed)
    }

    /// Mean read latency, zero before any read.
    pub fn average_retrieval_latency(&self) -> Duration {
        let count = self.retrievals.load(Ordering::Relaxed);
        if count == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.retrieval_micros.load(Ordering::Relaxed) / count)
    }

    /// Copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let millis = self.last_operation_millis.load(Ordering::Relaxed);
        MetricsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            integrity_failures: self.integrity_failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            hit_rate: self.hit_rate(),
            eviction_rate: self.eviction_rate(),
            average_retrieval_latency: self.average_retrieval_latency(),
            last_operation_at: (millis != i64::MIN)
                .then(|| DateTime::from_timestamp_millis(millis))
                .flatten(),
        }
    }

    /// Zero every counter. The enabled flag is kept.
    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.writes,
            &self.errors,
            &self.integrity_failures,
            &self.evictions,
            &self.bytes_written,
            &self.retrieval_micros,
            &self.retrievals,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.last_operation_millis.store(i64::MIN, Ordering::Relaxed);
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}
