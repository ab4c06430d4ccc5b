//! Weighted eviction.
//!
//! Entries are ranked by
//!
//! ```text
//! 0.3 * size / max_total_bytes
//! + 0.5 * min(idle / 1h, 1)
//! + 0.2 * 1 / access_count
//! ```
//!
//! and the highest score goes first. Stale entries dominate; among equally
//! stale ones the rarely used and the large go before the rest.

#![allow(clippy::cast_precision_loss)] // Scores are heuristics; exact byte counts do not matter

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::adaptive::AdaptiveLimits;
use crate::key::CacheKey;
use crate::store::{CacheEntry, EntryStore};

/// Weight of the size term.
pub const SIZE_WEIGHT: f64 = 0.3;
/// Weight of the recency term.
pub const RECENCY_WEIGHT: f64 = 0.5;
/// Weight of the frequency term.
pub const FREQUENCY_WEIGHT: f64 = 0.2;

/// Idle time at which the recency term saturates.
pub const RECENCY_HORIZON_SECS: f64 = 3600.0;

/// Eviction priority of `entry`; higher means evict sooner.
#[must_use]
pub fn score(entry: &CacheEntry, limits: &AdaptiveLimits, now: DateTime<Utc>) -> f64 {
    let size = entry.original_size as f64 / limits.max_total_bytes.max(1) as f64;
    let idle_secs = (now - entry.last_accessed_at).num_milliseconds().max(0) as f64 / 1000.0;
    let recency = (idle_secs / RECENCY_HORIZON_SECS).min(1.0);
    let frequency = 1.0 / entry.access_count.max(1) as f64;
    SIZE_WEIGHT * size + RECENCY_WEIGHT * recency + FREQUENCY_WEIGHT * frequency
}

/// What [`enforce`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnforcementOutcome {
    /// Keys removed, in eviction order.
    pub evicted: Vec<CacheKey>,
    /// The last entry alone exceeds the byte budget and was kept.
    pub over_budget: bool,
}

/// Keys ordered from first to last eviction candidate.
///
/// Ties on score go to the older `last_accessed_at`, then to key order.
#[must_use]
pub fn candidates(store: &EntryStore, limits: &AdaptiveLimits, now: DateTime<Utc>) -> Vec<CacheKey> {
    let mut ranked: Vec<(f64, &CacheKey, &CacheEntry)> = store
        .iter()
        .map(|(key, entry)| (score(entry, limits, now), key, entry))
        .collect();
    ranked.sort_by(|a, b| {
        b.0.total_cmp(&a.0)
            .then_with(|| a.2.last_accessed_at.cmp(&b.2.last_accessed_at))
            .then_with(|| a.1.cmp(b.1))
    });
    ranked.into_iter().map(|(_, key, _)| key.clone()).collect()
}

fn over_limits(store: &EntryStore, limits: &AdaptiveLimits) -> bool {
    store.len() > limits.max_item_count || store.total_bytes() > limits.max_total_bytes
}

/// Evict until `store` fits `limits`.
///
/// A single remaining entry larger than the byte budget is kept and reported
/// through [`EnforcementOutcome::over_budget`].
pub fn enforce(
    store: &mut EntryStore,
    limits: &AdaptiveLimits,
    now: DateTime<Utc>,
) -> EnforcementOutcome {
    let mut outcome = EnforcementOutcome::default();
    if !over_limits(store, limits) {
        return outcome;
    }

    for key in candidates(store, limits, now) {
        if !over_limits(store, limits) {
            break;
        }
        if store.len() <= 1 && store.len() <= limits.max_item_count {
            outcome.over_budget = true;
            break;
        }
        store.remove(&key);
        outcome.evicted.push(key);
    }

    if !outcome.evicted.is_empty() {
        store.mark_cleanup(now);
        debug!(
            evicted = outcome.evicted.len(),
            items = store.len(),
            bytes = store.total_bytes(),
            "evicted entries to fit cache limits"
        );
    }
    if outcome.over_budget {
        warn!(
            bytes = store.total_bytes(),
            max_bytes = limits.max_total_bytes,
            "single entry exceeds cache byte budget; keeping it"
        );
    }
    outcome
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{CacheCategory, KeyNormalizer};
    use chrono::TimeDelta;
    use std::time::Duration;

    fn key(text: &str) -> CacheKey {
        KeyNormalizer::default().normalize(CacheCategory::Analysis, text)
    }

    fn entry(size: usize, idle: TimeDelta, count: u64, now: DateTime<Utc>) -> CacheEntry {
        let body = vec![b'x'; size];
        let mut entry = CacheEntry::seal(&body, None, &key("x"), now - idle).unwrap();
        entry.access_count = count;
        entry
    }

    #[test]
    fn test_score_terms() {
        let now = Utc::now();
        let limits = AdaptiveLimits::new(10, 1000);

        let fresh = entry(0, TimeDelta::zero(), 1, now);
        assert!((score(&fresh, &limits, now) - 0.2).abs() < 1e-9);

        let stale_big = entry(1000, TimeDelta::hours(5), 4, now);
        assert!((score(&stale_big, &limits, now) - (0.3 + 0.5 + 0.05)).abs() < 1e-9);

        let half_hour = entry(500, TimeDelta::minutes(30), 2, now);
        assert!((score(&half_hour, &limits, now) - (0.15 + 0.25 + 0.1)).abs() < 1e-9);
    }

    #[test]
    fn test_future_access_time_is_not_negative_recency() {
        let now = Utc::now();
        let limits = AdaptiveLimits::new(10, 1000);
        let skewed = entry(0, TimeDelta::minutes(-10), 1, now);
        assert!((score(&skewed, &limits, now) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_older_and_colder_goes_first() {
        let now = Utc::now();
        let mut store = EntryStore::new();
        store.insert(key("hot"), entry(10, TimeDelta::minutes(1), 9, now));
        store.insert(key("cold"), entry(10, TimeDelta::minutes(50), 1, now));

        let outcome = enforce(&mut store, &AdaptiveLimits::new(1, 1000), now);
        assert_eq!(outcome.evicted, vec![key("cold")]);
        assert!(store.get(&key("hot")).is_some());
    }

    #[test]
    fn test_ties_break_on_age_then_key() {
        let now = Utc::now();
        let limits = AdaptiveLimits::new(10, 1000);
        let mut store = EntryStore::new();
        // Both saturate recency, so scores tie.
        store.insert(key("a"), entry(10, TimeDelta::hours(2), 1, now));
        store.insert(key("b"), entry(10, TimeDelta::hours(3), 1, now));
        store.insert(key("c"), entry(10, TimeDelta::hours(3), 1, now));

        let order = candidates(&store, &limits, now);
        assert_eq!(order[2], key("a"));
        assert!(order[0] < order[1]);
    }

    #[test]
    fn test_enforce_converges_on_both_limits() {
        let now = Utc::now();
        let mut store = EntryStore::new();
        for i in 0..20 {
            store.insert(key(&i.to_string()), entry(100, TimeDelta::minutes(i), 1, now));
        }
        let limits = AdaptiveLimits::new(15, 1000);
        let outcome = enforce(&mut store, &limits, now);

        assert_eq!(store.len(), 10);
        assert!(store.total_bytes() <= limits.max_total_bytes);
        assert_eq!(outcome.evicted.len(), 10);
        assert!(!outcome.over_budget);
        assert_eq!(store.last_cleanup(), Some(now));
    }

    #[test]
    fn test_single_oversized_entry_is_tolerated() {
        let now = Utc::now();
        let mut store = EntryStore::new();
        store.insert(key("huge"), entry(5000, TimeDelta::zero(), 1, now));
        store.insert(key("huger"), entry(6000, TimeDelta::zero(), 1, now));

        let outcome = enforce(&mut store, &AdaptiveLimits::new(10, 1000), now);
        assert!(outcome.over_budget);
        assert_eq!(outcome.evicted, vec![key("huger")]);
        assert_eq!(store.len(), 1);
        assert!(store.get(&key("huge")).is_some());
    }

    #[test]
    fn test_within_limits_is_a_no_op() {
        let now = Utc::now();
        let mut store = EntryStore::new();
        store.insert(key("a"), entry(10, TimeDelta::zero(), 1, now));
        let outcome = enforce(&mut store, &AdaptiveLimits::new(1, 10), now);
        assert_eq!(outcome, EnforcementOutcome::default());
        assert!(store.last_cleanup().is_none());
    }

    #[test]
    fn test_access_lowers_score() {
        let now = Utc::now();
        let limits = AdaptiveLimits::new(10, 1000);
        let mut touched = entry(10, TimeDelta::minutes(20), 1, now);
        let untouched = touched.clone();
        touched.record_access(now, Duration::ZERO);
        assert!(score(&untouched, &limits, now) > score(&touched, &limits, now));
    }
}
