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

//! Monotonic time sources.
//!
//! All cache time arithmetic (expiry, load timing, refresh-ahead ages) is
//! based on a [`Ticker`] instead of the wall clock, so tests can inject a
//! deterministic source.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

/// A monotonic nanosecond time source.
pub trait Ticker: Send + Sync + 'static {
    /// Current reading in nanoseconds.
    ///
    /// Readings are only meaningful relative to each other; the zero point is
    /// implementation defined.
    fn now(&self) -> u64;
}

/// Ticker backed by [`Instant`], anchored at construction.
#[derive(Debug)]
pub struct SystemTicker {
    origin: Instant,
}

impl Default for SystemTicker {
    fn default() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Ticker for SystemTicker {
    fn now(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }
}

/// Ticker that always reads zero.
///
/// Useful for caches that opt out of time-based behavior entirely: nothing
/// ever ages and nothing ever expires.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZeroTicker;

impl Ticker for ZeroTicker {
    fn now(&self) -> u64 {
        0
    }
}

/// Ticker advanced explicitly, for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualTicker(AtomicU64);

impl ManualTicker {
    /// Advance the reading by `duration`.
    pub fn advance(&self, duration: Duration) {
        self.0.fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }
}

impl Ticker for ManualTicker {
    fn now(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_ticker_never_drifts() {
        let ticker = ZeroTicker;
        for _ in 0..1000 {
            assert_eq!(ticker.now(), 0);
        }
    }

    #[test]
    fn test_system_ticker_monotonic() {
        let ticker = SystemTicker::default();
        let mut last = ticker.now();
        for _ in 0..1000 {
            let now = ticker.now();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn test_manual_ticker_advance() {
        let ticker = ManualTicker::default();
        assert_eq!(ticker.now(), 0);
        ticker.advance(Duration::from_secs(1));
        assert_eq!(ticker.now(), Duration::from_secs(1).as_nanos() as u64);
        ticker.advance(Duration::from_nanos(42));
        assert_eq!(ticker.now(), Duration::from_secs(1).as_nanos() as u64 + 42);
    }
}
