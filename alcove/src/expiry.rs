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

//! Per-entry expiry policies.
//!
//! An [`Expiry`] is consulted on every lifecycle transition of an entry and
//! answers with the lifetime the entry has left from that moment. `now` is a
//! reading of the cache's ticker, `remaining` is what was left of the
//! previous lifetime. Policies are pure functions; the cache stores only the
//! resulting deadline.

use std::time::Duration;

/// A lifetime long enough to never expire in practice.
///
/// Internally lifetimes are clamped to `u64::MAX` nanoseconds (about 584
/// years), so any duration at or beyond that bound means "never".
pub const NEVER: Duration = Duration::from_nanos(u64::MAX);

/// Per-entry expiry policy.
pub trait Expiry<K, V>: Send + Sync + 'static {
    /// Lifetime granted when the entry is created.
    fn after_create(&self, key: &K, value: &V, now: u64) -> Duration;

    /// Lifetime granted when the value is replaced.
    ///
    /// Defaults to re-running the creation policy.
    fn after_update(&self, key: &K, value: &V, now: u64, remaining: Duration) -> Duration {
        let _ = remaining;
        self.after_create(key, value, now)
    }

    /// Lifetime granted when the entry is read.
    ///
    /// Defaults to keeping the remaining lifetime untouched.
    fn after_read(&self, key: &K, value: &V, now: u64, remaining: Duration) -> Duration {
        let _ = (key, value, now);
        remaining
    }
}

/// Entries never expire.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverExpiry;

impl<K, V> Expiry<K, V> for NeverExpiry
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn after_create(&self, _: &K, _: &V, _: u64) -> Duration {
        NEVER
    }
}

/// Entries expire a fixed duration after they were created or last replaced.
#[derive(Debug, Clone, Copy)]
pub struct TtlExpiry {
    ttl: Duration,
}

impl TtlExpiry {
    /// Expire entries `ttl` after write.
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }
}

impl<K, V> Expiry<K, V> for TtlExpiry
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn after_create(&self, _: &K, _: &V, _: u64) -> Duration {
        self.ttl
    }
}

/// Entries expire a fixed duration after they were last touched, reads included.
#[derive(Debug, Clone, Copy)]
pub struct TtiExpiry {
    tti: Duration,
}

impl TtiExpiry {
    /// Expire entries `tti` after the last access.
    pub fn new(tti: Duration) -> Self {
        Self { tti }
    }
}

impl<K, V> Expiry<K, V> for TtiExpiry
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn after_create(&self, _: &K, _: &V, _: u64) -> Duration {
        self.tti
    }

    fn after_read(&self, _: &K, _: &V, _: u64, _: Duration) -> Duration {
        self.tti
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let ttl = TtlExpiry::new(Duration::from_secs(60));
        // Updates re-run the creation policy, reads keep the remaining lifetime.
        assert_eq!(Expiry::<u64, u64>::after_update(&ttl, &1, &1, 0, Duration::from_secs(3)), Duration::from_secs(60));
        assert_eq!(Expiry::<u64, u64>::after_read(&ttl, &1, &1, 0, Duration::from_secs(3)), Duration::from_secs(3));

        let tti = TtiExpiry::new(Duration::from_secs(60));
        assert_eq!(Expiry::<u64, u64>::after_read(&tti, &1, &1, 0, Duration::from_secs(3)), Duration::from_secs(60));

        assert_eq!(Expiry::<u64, u64>::after_create(&NeverExpiry, &1, &1, 0), NEVER);
    }
}
