//! Capacity limits that follow memory pressure and cache performance.
//!
//! [`SizingPolicy::limits_for`] is the pure core: pressure level plus recent
//! hit/eviction rates in, limits out. [`AdaptiveSizingEngine`] wraps it with
//! the rolling [`MetricsWindow`], the recheck interval and an adjustment
//! counter. The facade drives it from two places (a background timer and a
//! lazy check before writes) and both go through [`AdaptiveSizingEngine::recompute`].

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::pressure::MemoryPressureLevel;

/// Hit rate that must be exceeded before limits grow past base.
pub const BOOST_HIT_RATE: f64 = 0.8;
/// Eviction rate that must not be reached before limits grow past base.
pub const BOOST_EVICTION_RATE: f64 = 0.1;
/// Default number of samples kept in the window.
pub const DEFAULT_WINDOW_SIZE: usize = 100;

/// Active capacity of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveLimits {
    /// Most entries the store may hold.
    pub max_item_count: usize,
    /// Most stored payload bytes.
    pub max_total_bytes: u64,
}

impl AdaptiveLimits {
    /// Limits of `max_item_count` entries and `max_total_bytes` bytes.
    #[must_use]
    pub const fn new(max_item_count: usize, max_total_bytes: u64) -> Self {
        Self {
            max_item_count,
            max_total_bytes,
        }
    }

    /// True when either dimension is smaller than in `other`.
    #[must_use]
    pub const fn is_tighter_than(&self, other: &Self) -> bool {
        self.max_item_count < other.max_item_count || self.max_total_bytes < other.max_total_bytes
    }
}

/// Base limits plus the bounds the engine may move them within.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizingPolicy {
    /// Limits under normal pressure before any boost.
    pub base: AdaptiveLimits,
    /// Upper bound when growing under low pressure.
    pub hard_cap: AdaptiveLimits,
    /// Minimum viable size under critical pressure.
    pub floor: AdaptiveLimits,
}

impl SizingPolicy {
    /// Limits for a given pressure level and recent rates.
    ///
    /// Fractions are floored and every limit is at least one:
    ///
    /// ```rust
    /// use doccache_core::{AdaptiveLimits, MemoryPressureLevel, SizingPolicy};
    ///
    /// let policy = SizingPolicy {
    ///     base: AdaptiveLimits::new(50, 1000),
    ///     hard_cap: AdaptiveLimits::new(100, 2000),
    ///     floor: AdaptiveLimits::new(10, 100),
    /// };
    /// assert_eq!(policy.limits_for(MemoryPressureLevel::Warning, 0.0, 0.0).max_item_count, 37);
    /// assert_eq!(policy.limits_for(MemoryPressureLevel::Urgent, 0.0, 0.0).max_item_count, 25);
    /// assert_eq!(policy.limits_for(MemoryPressureLevel::Normal, 0.9, 0.0).max_item_count, 100);
    /// ```
    #[must_use]
    pub fn limits_for(
        &self,
        level: MemoryPressureLevel,
        hit_rate: f64,
        eviction_rate: f64,
    ) -> AdaptiveLimits {
        let boosted = level == MemoryPressureLevel::Normal
            && hit_rate > BOOST_HIT_RATE
            && eviction_rate < BOOST_EVICTION_RATE;

        let items = scale(
            self.base.max_item_count as u64,
            self.hard_cap.max_item_count as u64,
            self.floor.max_item_count as u64,
            level,
            boosted,
        );
        let bytes = scale(
            self.base.max_total_bytes,
            self.hard_cap.max_total_bytes,
            self.floor.max_total_bytes,
            level,
            boosted,
        );

        AdaptiveLimits {
            max_item_count: usize::try_from(items).unwrap_or(usize::MAX),
            max_total_bytes: bytes,
        }
    }
}

fn scale(base: u64, hard_cap: u64, floor: u64, level: MemoryPressureLevel, boosted: bool) -> u64 {
    let limit = match level {
        MemoryPressureLevel::Normal if boosted => base.max(base.saturating_mul(2).min(hard_cap)),
        MemoryPressureLevel::Normal => base,
        MemoryPressureLevel::Warning => base / 4 * 3 + base % 4 * 3 / 4,
        MemoryPressureLevel::Urgent => base / 2,
        MemoryPressureLevel::Critical => floor.min(base).max(base / 5),
    };
    limit.max(1)
}

/// One observation of cache performance.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateSample {
    /// Hit rate at sample time.
    pub hit_rate: f64,
    /// Eviction rate at sample time.
    pub eviction_rate: f64,
    /// Collector operation count when the sample was taken.
    pub observations: u64,
}

/// Bounded ring of the most recent [`RateSample`]s.
#[derive(Debug, Clone)]
pub struct MetricsWindow {
    samples: VecDeque<RateSample>,
    capacity: usize,
}

impl Default for MetricsWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}

impl MetricsWindow {
    /// Empty window holding at most `capacity` samples (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a sample, dropping the oldest when full. A sample taken at the
    /// same observation count as the newest one is not appended, so
    /// rechecking with unchanged counters leaves the window as it was.
    pub fn push(&mut self, sample: RateSample) -> bool {
        if self
            .samples
            .back()
            .is_some_and(|newest| newest.observations == sample.observations)
        {
            return false;
        }
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        true
    }

    /// Number of samples held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True before the first sample.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Maximum number of samples held.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Mean hit rate, 0.0 when empty.
    #[must_use]
    pub fn mean_hit_rate(&self) -> f64 {
        self.mean(|s| s.hit_rate)
    }

    /// Mean eviction rate, 0.0 when empty.
    #[must_use]
    pub fn mean_eviction_rate(&self) -> f64 {
        self.mean(|s| s.eviction_rate)
    }

    /// Drop every sample.
    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Change the capacity, dropping the oldest samples if it shrinks.
    pub fn resize(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn mean(&self, field: impl Fn(&RateSample) -> f64) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().map(field).sum::<f64>() / self.samples.len() as f64
    }
}

/// Outcome of one recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitAdjustment {
    /// Limits before the recomputation.
    pub previous: AdaptiveLimits,
    /// Limits after it.
    pub current: AdaptiveLimits,
    /// Pressure level that was sampled.
    pub level: MemoryPressureLevel,
}

impl LimitAdjustment {
    /// Whether either limit moved.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }

    /// Whether enforcement must run after this adjustment.
    #[must_use]
    pub const fn tightened(&self) -> bool {
        self.current.is_tighter_than(&self.previous)
    }
}

/// Stateful driver of [`SizingPolicy`].
#[derive(Debug, Clone)]
pub struct AdaptiveSizingEngine {
    policy: SizingPolicy,
    window: MetricsWindow,
    interval: Duration,
    current: AdaptiveLimits,
    level: MemoryPressureLevel,
    last_check: Option<Instant>,
    adjustment_count: u64,
}

impl AdaptiveSizingEngine {
    /// Engine starting at the policy's base limits.
    #[must_use]
    pub fn new(policy: SizingPolicy, window_size: usize, interval: Duration) -> Self {
        Self {
            current: policy.base,
            policy,
            window: MetricsWindow::new(window_size),
            interval,
            level: MemoryPressureLevel::Normal,
            last_check: None,
            adjustment_count: 0,
        }
    }

    /// Whether the recheck interval has elapsed. Never-checked engines are due.
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        self.last_check
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval)
    }

    /// Feed one pressure reading and one performance sample, then recompute.
    pub fn recompute(
        &mut self,
        level: MemoryPressureLevel,
        sample: RateSample,
        now: Instant,
    ) -> LimitAdjustment {
        self.window.push(sample);
        let previous = self.current;
        self.current = self.policy.limits_for(
            level,
            self.window.mean_hit_rate(),
            self.window.mean_eviction_rate(),
        );
        self.level = level;
        self.last_check = Some(now);
        self.adjustment_count += 1;
        LimitAdjustment {
            previous,
            current: self.current,
            level,
        }
    }

    /// Replace the policy and re-derive limits from the last known level and
    /// window, without taking a new sample.
    pub fn set_policy(&mut self, policy: SizingPolicy) -> LimitAdjustment {
        let previous = self.current;
        self.policy = policy;
        self.current = policy.limits_for(
            self.level,
            self.window.mean_hit_rate(),
            self.window.mean_eviction_rate(),
        );
        LimitAdjustment {
            previous,
            current: self.current,
            level: self.level,
        }
    }

    /// Change how often the background task recomputes.
    pub const fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Resize the metrics window, keeping the newest samples.
    pub fn set_window_size(&mut self, window_size: usize) {
        self.window.resize(window_size);
    }

    /// Drop history. Limits fall back to base on the next recomputation.
    pub fn reset_window(&mut self) {
        self.window.clear();
    }

    /// Limits in force.
    #[must_use]
    pub const fn current_limits(&self) -> AdaptiveLimits {
        self.current
    }

    /// Active policy.
    #[must_use]
    pub const fn policy(&self) -> &SizingPolicy {
        &self.policy
    }

    /// Pressure level of the last recomputation.
    #[must_use]
    pub const fn pressure_level(&self) -> MemoryPressureLevel {
        self.level
    }

    /// Samples the limits are derived from.
    #[must_use]
    pub const fn window(&self) -> &MetricsWindow {
        &self.window
    }

    /// Recompute interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Recomputations since construction.
    #[must_use]
    pub const fn adjustment_count(&self) -> u64 {
        self.adjustment_count
    }
}
