// Copyright 2026 alcove Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Cache statistics.
//!
//! [`CacheStats`] is an immutable snapshot; [`StatsRecorder`] is the mutable,
//! thread-safe accumulator behind it. Recorders are updated from arbitrary
//! executor threads without coordination, so implementations must be
//! atomic-add based. A snapshot is not required to be torn-read-free across
//! fields while updates are concurrently in flight.

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use serde::{Deserialize, Serialize};

use crate::{event::Event, panic};

/// An immutable snapshot of cache statistics.
///
/// Two snapshots compose with [`CacheStats::plus`] and [`CacheStats::minus`]
/// to compute deltas between observation points. Both are pure and saturate
/// instead of overflowing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups that found a live entry.
    pub hits: u64,
    /// Lookups that found no live entry.
    pub misses: u64,
    /// Load computations that produced a value.
    pub load_successes: u64,
    /// Load computations that failed or produced no value.
    pub load_failures: u64,
    /// Total nanoseconds spent in load computations.
    pub total_load_nanos: u64,
    /// Entries removed by the eviction policy (capacity or expiry).
    pub evictions: u64,
    /// Total weight of entries removed by the eviction policy.
    pub eviction_weight: u64,
}

impl CacheStats {
    /// Field-wise sum, clamping at `u64::MAX`.
    pub fn plus(&self, other: &CacheStats) -> CacheStats {
        CacheStats {
            hits: self.hits.saturating_add(other.hits),
            misses: self.misses.saturating_add(other.misses),
            load_successes: self.load_successes.saturating_add(other.load_successes),
            load_failures: self.load_failures.saturating_add(other.load_failures),
            total_load_nanos: self.total_load_nanos.saturating_add(other.total_load_nanos),
            evictions: self.evictions.saturating_add(other.evictions),
            eviction_weight: self.eviction_weight.saturating_add(other.eviction_weight),
        }
    }

    /// Field-wise difference, flooring at zero.
    pub fn minus(&self, other: &CacheStats) -> CacheStats {
        CacheStats {
            hits: self.hits.saturating_sub(other.hits),
            misses: self.misses.saturating_sub(other.misses),
            load_successes: self.load_successes.saturating_sub(other.load_successes),
            load_failures: self.load_failures.saturating_sub(other.load_failures),
            total_load_nanos: self.total_load_nanos.saturating_sub(other.total_load_nanos),
            evictions: self.evictions.saturating_sub(other.evictions),
            eviction_weight: self.eviction_weight.saturating_sub(other.eviction_weight),
        }
    }

    /// Total lookups observed.
    pub fn requests(&self) -> u64 {
        self.hits.saturating_add(self.misses)
    }

    /// Ratio of lookups that hit. `1.0` when no lookup was observed.
    pub fn hit_rate(&self) -> f64 {
        match self.requests() {
            0 => 1.0,
            requests => self.hits as f64 / requests as f64,
        }
    }

    /// Ratio of lookups that missed. `0.0` when no lookup was observed.
    pub fn miss_rate(&self) -> f64 {
        match self.requests() {
            0 => 0.0,
            requests => self.misses as f64 / requests as f64,
        }
    }

    /// Total load computations observed.
    pub fn load_count(&self) -> u64 {
        self.load_successes.saturating_add(self.load_failures)
    }

    /// Mean nanoseconds per load computation. `0.0` when no load was observed.
    pub fn average_load_nanos(&self) -> f64 {
        match self.load_count() {
            0 => 0.0,
            loads => self.total_load_nanos as f64 / loads as f64,
        }
    }

    /// Ratio of load computations that failed. `0.0` when no load was observed.
    pub fn load_failure_rate(&self) -> f64 {
        match self.load_count() {
            0 => 0.0,
            loads => self.load_failures as f64 / loads as f64,
        }
    }
}

/// The mutable, thread-safe accumulator behind [`CacheStats`].
///
/// Call discipline: a lookup records exactly one of `record_hits` /
/// `record_misses` per caller, a miss that proceeds to load records exactly
/// one of `record_load_success` / `record_load_failure` per computation (not
/// per coalesced caller), and `record_eviction` is reserved for removals
/// driven by the eviction policy, never for explicit invalidation.
pub trait StatsRecorder: Send + Sync + 'static {
    /// Record `count` lookups that hit.
    fn record_hits(&self, count: u64);

    /// Record `count` lookups that missed.
    fn record_misses(&self, count: u64);

    /// Record one load computation that produced a value, and its duration.
    fn record_load_success(&self, load_nanos: u64);

    /// Record one load computation that failed or produced no value, and its duration.
    fn record_load_failure(&self, load_nanos: u64);

    /// Record one policy-driven removal and the weight it released.
    fn record_eviction(&self, weight: usize, event: Event);

    /// Take an immutable snapshot of the counters.
    ///
    /// Repeated snapshots are independent values.
    fn snapshot(&self) -> CacheStats;
}

/// Lock-free [`StatsRecorder`] backed by atomic counters.
#[derive(Debug, Default)]
pub struct AtomicStatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
    load_successes: AtomicU64,
    load_failures: AtomicU64,
    total_load_nanos: AtomicU64,
    evictions: AtomicU64,
    eviction_weight: AtomicU64,
}

impl StatsRecorder for AtomicStatsRecorder {
    fn record_hits(&self, count: u64) {
        self.hits.fetch_add(count, Ordering::Relaxed);
    }

    fn record_misses(&self, count: u64) {
        self.misses.fetch_add(count, Ordering::Relaxed);
    }

    fn record_load_success(&self, load_nanos: u64) {
        self.load_successes.fetch_add(1, Ordering::Relaxed);
        self.total_load_nanos.fetch_add(load_nanos, Ordering::Relaxed);
    }

    fn record_load_failure(&self, load_nanos: u64) {
        self.load_failures.fetch_add(1, Ordering::Relaxed);
        self.total_load_nanos.fetch_add(load_nanos, Ordering::Relaxed);
    }

    fn record_eviction(&self, weight: usize, _: Event) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
        self.eviction_weight.fetch_add(weight as u64, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            load_successes: self.load_successes.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            total_load_nanos: self.total_load_nanos.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            eviction_weight: self.eviction_weight.load(Ordering::Relaxed),
        }
    }
}

/// [`StatsRecorder`] that records nothing and snapshots zeros.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStatsRecorder;

impl StatsRecorder for NoopStatsRecorder {
    fn record_hits(&self, _: u64) {}

    fn record_misses(&self, _: u64) {}

    fn record_load_success(&self, _: u64) {}

    fn record_load_failure(&self, _: u64) {}

    fn record_eviction(&self, _: usize, _: Event) {}

    fn snapshot(&self) -> CacheStats {
        CacheStats::default()
    }
}

/// [`StatsRecorder`] wrapper that isolates the cache from a misbehaving
/// delegate.
///
/// A panic raised by the delegate is caught and logged instead of propagating
/// into the cache operation that triggered the record. A panicking `snapshot`
/// degrades to an all-zero snapshot.
pub struct GuardedStatsRecorder {
    inner: Arc<dyn StatsRecorder>,
}

impl GuardedStatsRecorder {
    /// Wrap `inner` with the isolation boundary.
    pub fn new(inner: Arc<dyn StatsRecorder>) -> Self {
        Self { inner }
    }

    fn guard<F, R>(&self, operation: &'static str, fallback: R, f: F) -> R
    where
        F: FnOnce(&dyn StatsRecorder) -> R,
    {
        match catch_unwind(AssertUnwindSafe(|| f(self.inner.as_ref()))) {
            Ok(r) => r,
            Err(payload) => {
                tracing::warn!(
                    operation,
                    panic = panic::message(payload.as_ref()),
                    "stats recorder panicked, ignored"
                );
                fallback
            }
        }
    }
}

impl StatsRecorder for GuardedStatsRecorder {
    fn record_hits(&self, count: u64) {
        self.guard("record_hits", (), |r| r.record_hits(count));
    }

    fn record_misses(&self, count: u64) {
        self.guard("record_misses", (), |r| r.record_misses(count));
    }

    fn record_load_success(&self, load_nanos: u64) {
        self.guard("record_load_success", (), |r| r.record_load_success(load_nanos));
    }

    fn record_load_failure(&self, load_nanos: u64) {
        self.guard("record_load_failure", (), |r| r.record_load_failure(load_nanos));
    }

    fn record_eviction(&self, weight: usize, event: Event) {
        self.guard("record_eviction", (), |r| r.record_eviction(weight, event));
    }

    fn snapshot(&self) -> CacheStats {
        self.guard("snapshot", CacheStats::default(), |r| r.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(seed: u64) -> CacheStats {
        CacheStats {
            hits: seed,
            misses: seed + 1,
            load_successes: seed + 2,
            load_failures: seed + 3,
            total_load_nanos: seed + 4,
            evictions: seed + 5,
            eviction_weight: seed + 6,
        }
    }

    #[test]
    fn test_plus_minus_round_trip() {
        let a = stats(100);
        let b = stats(7);
        assert_eq!(a.plus(&b).minus(&b), a);
    }

    #[test]
    fn test_minus_floors_at_zero() {
        let small = stats(1);
        let large = stats(1000);
        assert_eq!(small.minus(&large), CacheStats::default());
    }

    #[test]
    fn test_plus_saturates() {
        let a = CacheStats {
            hits: u64::MAX - 1,
            ..Default::default()
        };
        let b = stats(10);
        assert_eq!(a.plus(&b).hits, u64::MAX);
    }

    #[test]
    fn test_rates() {
        let empty = CacheStats::default();
        assert_eq!(empty.hit_rate(), 1.0);
        assert_eq!(empty.miss_rate(), 0.0);
        assert_eq!(empty.average_load_nanos(), 0.0);

        let s = CacheStats {
            hits: 3,
            misses: 1,
            load_successes: 1,
            load_failures: 1,
            total_load_nanos: 500,
            ..Default::default()
        };
        assert_eq!(s.requests(), 4);
        assert_eq!(s.hit_rate(), 0.75);
        assert_eq!(s.miss_rate(), 0.25);
        assert_eq!(s.load_count(), 2);
        assert_eq!(s.average_load_nanos(), 250.0);
        assert_eq!(s.load_failure_rate(), 0.5);
    }

    #[test]
    fn test_atomic_recorder() {
        let recorder = AtomicStatsRecorder::default();
        recorder.record_hits(2);
        recorder.record_misses(1);
        recorder.record_load_success(100);
        recorder.record_load_failure(50);
        recorder.record_eviction(8, Event::Evict);

        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.hits, 2);
        assert_eq!(snapshot.misses, 1);
        assert_eq!(snapshot.load_successes, 1);
        assert_eq!(snapshot.load_failures, 1);
        assert_eq!(snapshot.total_load_nanos, 150);
        assert_eq!(snapshot.evictions, 1);
        assert_eq!(snapshot.eviction_weight, 8);

        // Snapshots are independent values.
        recorder.record_hits(1);
        assert_eq!(snapshot.hits, 2);
        assert_eq!(recorder.snapshot().hits, 3);
    }

    struct PanickyRecorder;

    impl StatsRecorder for PanickyRecorder {
        fn record_hits(&self, _: u64) {
            panic!("broken instrumentation");
        }

        fn record_misses(&self, _: u64) {
            panic!("broken instrumentation");
        }

        fn record_load_success(&self, _: u64) {
            panic!("broken instrumentation");
        }

        fn record_load_failure(&self, _: u64) {
            panic!("broken instrumentation");
        }

        fn record_eviction(&self, _: usize, _: Event) {
            panic!("broken instrumentation");
        }

        fn snapshot(&self) -> CacheStats {
            panic!("broken instrumentation");
        }
    }

    #[test]
    fn test_guarded_recorder_isolates_panics() {
        let guarded = GuardedStatsRecorder::new(Arc::new(PanickyRecorder));
        guarded.record_hits(1);
        guarded.record_misses(1);
        guarded.record_load_success(1);
        guarded.record_load_failure(1);
        guarded.record_eviction(1, Event::Expire);
        assert_eq!(guarded.snapshot(), CacheStats::default());
    }
}
