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

//! The synchronous cache.
//!
//! [`Cache`] is a sharded key/value store with weighted capacity eviction,
//! pluggable per-entry expiry, and optional statistics and event listening.
//! Entries are evicted in insertion order when a shard overflows its share of
//! the capacity; expired entries are reclaimed lazily on access.
//!
//! All mutation goes through a shard's lock, and in-flight computations are
//! registered in the same critical section that observed the miss, which is
//! what makes [`Cache::get_with`] single-flight.

use std::{collections::VecDeque, fmt::Debug, hash::Hash, sync::Arc, time::Duration};

use ahash::RandomState;
use alcove_common::{
    code::{HashBuilder, Key, Value},
    error::{Error, ErrorKind, Result},
    event::{Event, EventListener},
    metrics::{AtomicStatsRecorder, CacheStats, GuardedStatsRecorder, NoopStatsRecorder, StatsRecorder},
    scheduler::{Scheduler, SystemScheduler},
    scope::Scope,
    spawn::Spawner,
    ticker::{SystemTicker, Ticker},
};
use equivalent::Equivalent;
use hashbrown::HashMap;
use itertools::Itertools;
use parking_lot::RwLock;

use crate::{
    expiry::{Expiry, NeverExpiry},
    inflight::{InflightTable, Join, LoadResult, Waiter},
    loader::Loader,
    loading::LoadingCache,
    record::Record,
    weighter::Weighter,
};

/// An entry that left a shard, with the reason, to be reported out of the
/// lock critical section.
type Garbage<K, V> = (Event, K, V, usize);

struct Shard<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    table: HashMap<K, Record<V>, S>,
    /// Insertion order for capacity eviction. Keys whose record was removed
    /// through another path stay behind as ghosts and are skipped.
    order: VecDeque<K>,

    inflights: InflightTable<K, V>,

    capacity: usize,
    usage: usize,
}

impl<K, V, S> Shard<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    /// Evict entries in insertion order until the usage fits `target`.
    fn evict(&mut self, target: usize, garbages: &mut Vec<Garbage<K, V>>) {
        while self.usage > target {
            let key = match self.order.pop_front() {
                Some(key) => key,
                None => break,
            };
            if let Some(record) = self.table.remove(&key) {
                let weight = record.weight();
                self.usage -= weight;
                garbages.push((Event::Evict, key, record.into_value(), weight));
            }
        }
    }

    /// Insert or replace the record for `key`. Returns the replaced value.
    fn emplace(
        &mut self,
        key: K,
        value: V,
        weight: usize,
        now: u64,
        expiry: &dyn Expiry<K, V>,
        garbages: &mut Vec<Garbage<K, V>>,
    ) -> Option<V> {
        // Evict overflow records first. A single entry heavier than the whole
        // shard still gets in; usage may transiently exceed the capacity.
        self.evict(self.capacity.saturating_sub(weight), garbages);

        match self.table.get_mut(&key) {
            Some(record) => {
                let remaining = record.remaining(now);
                let lifetime = expiry.after_update(&key, &value, now, remaining);
                let (old_value, old_weight) = record.update(value, weight, now, lifetime);
                self.usage = self.usage - old_weight + weight;
                garbages.push((Event::Replace, key, old_value.clone(), old_weight));
                Some(old_value)
            }
            None => {
                let lifetime = expiry.after_create(&key, &value, now);
                self.table.insert(key.clone(), Record::new(value, weight, now, lifetime));
                self.order.push_back(key);
                self.usage += weight;
                None
            }
        }
    }

    /// Live value for `key`, re-armed through the read expiry. An expired
    /// record is reclaimed and reported as a miss.
    fn lookup<Q>(
        &mut self,
        key: &Q,
        now: u64,
        expiry: &dyn Expiry<K, V>,
        garbages: &mut Vec<Garbage<K, V>>,
    ) -> Option<(V, Duration)>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let lifetime = match self.table.get_key_value(key) {
            None => return None,
            Some((_, record)) if record.is_expired(now) => None,
            Some((k, record)) => Some(expiry.after_read(k, record.value(), now, record.remaining(now))),
        };
        match lifetime {
            Some(lifetime) => {
                let record = self.table.get_mut(key).expect("record vanished under the shard lock");
                record.touch(now, lifetime);
                Some((record.value().clone(), record.written_ago(now)))
            }
            None => {
                let (k, record) = self.table.remove_entry(key).expect("record vanished under the shard lock");
                let weight = record.weight();
                self.usage -= weight;
                garbages.push((Event::Expire, k, record.into_value(), weight));
                None
            }
        }
    }

    /// Live value for `key` without stats or expiry bookkeeping.
    fn peek<Q>(&self, key: &Q, now: u64) -> Option<V>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.table
            .get(key)
            .filter(|record| !record.is_expired(now))
            .map(|record| record.value().clone())
    }

    fn remove<Q>(&mut self, key: &Q) -> Option<(K, V, usize)>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let (key, record) = self.table.remove_entry(key)?;
        let weight = record.weight();
        self.usage -= weight;
        Some((key, record.into_value(), weight))
    }

    fn clear(&mut self, garbages: &mut Vec<Garbage<K, V>>) {
        for (key, record) in self.table.drain() {
            let weight = record.weight();
            garbages.push((Event::Clear, key, record.into_value(), weight));
        }
        self.order.clear();
        self.usage = 0;
    }
}

struct CacheInner<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    shards: Vec<RwLock<Shard<K, V, S>>>,

    capacity: usize,
    hash_builder: S,

    weighter: Arc<dyn Weighter<K, V>>,
    expiry: Arc<dyn Expiry<K, V>>,
    ticker: Arc<dyn Ticker>,

    recorder: Arc<dyn StatsRecorder>,
    event_listener: Option<Arc<dyn EventListener<Key = K, Value = V>>>,
}

impl<K, V, S> CacheInner<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    /// Report removed entries out of the lock critical section. Only
    /// policy-driven removals feed the eviction counters.
    fn flush(&self, garbages: Vec<Garbage<K, V>>) {
        for (event, key, value, weight) in garbages {
            if event.is_eviction() {
                self.recorder.record_eviction(weight, event);
            }
            if let Some(listener) = self.event_listener.as_ref() {
                listener.on_leave(event, &key, &value);
            }
        }
    }
}

/// Result of a lookup that registers an in-flight computation on a miss.
pub(crate) enum Attempt<V> {
    /// A live value was found. `written` is the age of its last write.
    Hit { value: V, written: Duration },
    /// Another caller is computing the value; wait for its outcome.
    Wait(Waiter<V>),
    /// The caller must drive the computation and complete it through
    /// [`Cache::complete_load`]. The waiter observes the broadcast outcome.
    Lead(Waiter<V>),
}

/// Result of registering a refresh.
pub(crate) enum RefreshAttempt<V> {
    /// A computation is already in flight; the refresh joins it.
    Wait(Waiter<V>),
    /// The caller must drive the reload (or the load, when `old` is absent).
    Lead { waiter: Waiter<V>, old: Option<V> },
}

/// A sharded key/value cache with weighted capacity eviction, pluggable
/// expiry, and single-flight value computation.
///
/// Cloning is shallow; clones share the same store.
pub struct Cache<K, V, S = RandomState>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    inner: Arc<CacheInner<K, V, S>>,
}

impl<K, V, S> Debug for Cache<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("capacity", &self.inner.capacity)
            .field("shards", &self.inner.shards.len())
            .finish()
    }
}

impl<K, V, S> Clone for Cache<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V, S> Cache<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    /// Insert `value` for `key`, returning the value it replaced.
    ///
    /// Replacement is reported to the event listener but is never an
    /// eviction. Callers coalesced on an in-flight computation for `key` are
    /// resolved with the inserted value.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let now = self.inner.ticker.now();
        let weight = (self.inner.weighter)(&key, &value);

        let mut garbages = vec![];
        let (old, notifiers, broadcast) = self.inner.shards[self.shard_index(&key)].write().with(|mut shard| {
            let notifiers = shard.inflights.take(&key);
            let broadcast = (!notifiers.is_empty()).then(|| value.clone());
            let old = shard.emplace(key, value, weight, now, self.inner.expiry.as_ref(), &mut garbages);
            (old, notifiers, broadcast)
        });

        // Notify waiters out of the lock critical section.
        if let Some(value) = broadcast {
            for notifier in notifiers {
                let _ = notifier.send(Ok(Some(value.clone())));
            }
        }
        self.inner.flush(garbages);

        old
    }

    /// Live value for `key`. Records a hit or a miss and re-arms the entry
    /// through the read expiry.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let now = self.inner.ticker.now();
        let mut garbages = vec![];
        let hit = self.inner.shards[self.shard_index(key)]
            .write()
            .with(|mut shard| shard.lookup(key, now, self.inner.expiry.as_ref(), &mut garbages));

        match &hit {
            Some(_) => self.inner.recorder.record_hits(1),
            None => self.inner.recorder.record_misses(1),
        }
        self.inner.flush(garbages);

        hit.map(|(value, _)| value)
    }

    /// Live value for `key` without recording stats or touching expiry.
    pub fn peek<Q>(&self, key: &Q) -> Option<V>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let now = self.inner.ticker.now();
        self.inner.shards[self.shard_index(key)]
            .read()
            .with(|shard| shard.peek(key, now))
    }

    /// Whether a live entry exists for `key`. No stats are recorded.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.peek(key).is_some()
    }

    /// Get the value for `key`, computing and storing it with `f` if absent.
    ///
    /// At most one execution of `f` happens per key across concurrent
    /// callers: later arrivals block until the computation completes and
    /// observe the same value, or the same error when it fails. On failure
    /// the mapping is left unchanged.
    ///
    /// The computing caller runs `f` on its own thread; waiting callers block
    /// on the outcome, so this must not be called from an async context.
    pub fn get_with<F>(&self, key: K, f: F) -> Result<V>
    where
        F: FnOnce() -> Result<V>,
    {
        match self.attempt(&key, true) {
            Attempt::Hit { value, .. } => Ok(value),
            Attempt::Wait(waiter) => Self::wait_blocking(waiter),
            Attempt::Lead(waiter) => {
                // This caller consumes its own outcome directly.
                drop(waiter);
                let start = self.inner.ticker.now();
                let outcome = f().map(Some);
                let load_nanos = self.inner.ticker.now().saturating_sub(start);
                match self.complete_load(&key, outcome, load_nanos) {
                    Ok(Some(value)) => Ok(value),
                    Ok(None) => Err(Error::new(ErrorKind::External, "computation completed without a value")),
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// Remove the entry for `key`, returning its value.
    ///
    /// Explicit removal is reported to the event listener but is never
    /// recorded as an eviction.
    pub fn invalidate<Q>(&self, key: &Q) -> Option<V>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let removed = self.inner.shards[self.shard_index(key)]
            .write()
            .with(|mut shard| shard.remove(key));

        removed.map(|(key, value, weight)| {
            self.inner.flush(vec![(Event::Remove, key, value.clone(), weight)]);
            value
        })
    }

    /// Remove every entry.
    pub fn invalidate_all(&self) {
        let mut garbages = vec![];
        for shard in self.inner.shards.iter() {
            shard.write().with(|mut shard| shard.clear(&mut garbages));
        }
        self.inner.flush(garbages);
    }

    /// Weakly-consistent traversal over the live entries. No stats are
    /// recorded and expiry is not re-armed.
    pub fn iter(&self) -> impl Iterator<Item = (K, V)> {
        let now = self.inner.ticker.now();
        let mut entries = Vec::new();
        for shard in self.inner.shards.iter() {
            shard.read().with(|shard| {
                entries.extend(
                    shard
                        .table
                        .iter()
                        .filter(|(_, record)| !record.is_expired(now))
                        .map(|(key, record)| (key.clone(), record.value().clone())),
                );
            });
        }
        entries.into_iter()
    }

    /// Approximate number of entries, including not-yet-reclaimed expired ones.
    pub fn estimated_len(&self) -> usize {
        self.inner.shards.iter().map(|shard| shard.read().table.len()).sum()
    }

    /// Total weight currently charged against the capacity.
    pub fn weight(&self) -> usize {
        self.inner.shards.iter().map(|shard| shard.read().usage).sum()
    }

    /// Configured capacity, in weight units.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Number of shards.
    pub fn shards(&self) -> usize {
        self.inner.shards.len()
    }

    /// Snapshot of the statistics recorder.
    pub fn stats(&self) -> CacheStats {
        self.inner.recorder.snapshot()
    }

    fn shard_index<Q>(&self, key: &Q) -> usize
    where
        Q: Hash + ?Sized,
    {
        self.inner.hash_builder.hash_one(key) as usize % self.inner.shards.len()
    }

    fn wait_blocking(waiter: Waiter<V>) -> Result<V> {
        match waiter.blocking_recv() {
            Ok(Ok(Some(value))) => Ok(value),
            Ok(Ok(None)) => Err(Error::new(ErrorKind::External, "computation completed without a value")),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::new(ErrorKind::ChannelClosed, "in-flight computation dropped")),
        }
    }

    /// Look `key` up and register an in-flight computation when it misses.
    ///
    /// The lookup and the registration happen in the same lock critical
    /// section, which is what bounds each key to one concurrent computation.
    pub(crate) fn attempt(&self, key: &K, record_stats: bool) -> Attempt<V> {
        let now = self.inner.ticker.now();
        let mut garbages = vec![];
        let attempt = self.inner.shards[self.shard_index(key)].write().with(|mut shard| {
            if let Some((value, written)) = shard.lookup(key, now, self.inner.expiry.as_ref(), &mut garbages) {
                return Attempt::Hit { value, written };
            }
            let Join { lead, waiter } = shard.inflights.join(key);
            if lead {
                Attempt::Lead(waiter)
            } else {
                Attempt::Wait(waiter)
            }
        });

        if record_stats {
            match &attempt {
                Attempt::Hit { .. } => self.inner.recorder.record_hits(1),
                _ => self.inner.recorder.record_misses(1),
            }
        }
        self.inner.flush(garbages);

        attempt
    }

    /// Register a refresh for `key`, joining whatever computation is already
    /// in flight.
    pub(crate) fn refresh_attempt(&self, key: &K) -> RefreshAttempt<V> {
        let now = self.inner.ticker.now();
        self.inner.shards[self.shard_index(key)].write().with(|mut shard| {
            let Join { lead, waiter } = shard.inflights.join(key);
            if lead {
                let old = shard.peek(key, now);
                RefreshAttempt::Lead { waiter, old }
            } else {
                RefreshAttempt::Wait(waiter)
            }
        })
    }

    /// Close the in-flight load for `key` with `outcome` and broadcast it.
    ///
    /// A value is stored; a failure or an empty outcome leaves the mapping
    /// untouched. Exactly one of the load counters is recorded per call.
    pub(crate) fn complete_load(&self, key: &K, outcome: LoadResult<V>, load_nanos: u64) -> LoadResult<V> {
        let mut garbages = vec![];
        let shard = &self.inner.shards[self.shard_index(key)];

        let notifiers = match &outcome {
            Ok(Some(value)) => {
                let weight = (self.inner.weighter)(key, value);
                let now = self.inner.ticker.now();
                shard.write().with(|mut shard| {
                    let notifiers = shard.inflights.take(key);
                    shard.emplace(
                        key.clone(),
                        value.clone(),
                        weight,
                        now,
                        self.inner.expiry.as_ref(),
                        &mut garbages,
                    );
                    notifiers
                })
            }
            _ => shard.write().with(|mut shard| shard.inflights.take(key)),
        };

        match &outcome {
            Ok(Some(_)) => self.inner.recorder.record_load_success(load_nanos),
            _ => self.inner.recorder.record_load_failure(load_nanos),
        }

        // Notify waiters out of the lock critical section.
        for notifier in notifiers {
            let _ = notifier.send(outcome.clone());
        }
        self.inner.flush(garbages);

        outcome
    }

    /// Close the in-flight reload for `key` with `outcome` and broadcast it.
    ///
    /// A value replaces the previous one, an empty outcome removes the
    /// mapping, and a failure retains the previous value untouched.
    pub(crate) fn complete_refresh(&self, key: &K, outcome: LoadResult<V>, load_nanos: u64) -> LoadResult<V> {
        let mut garbages = vec![];
        let shard = &self.inner.shards[self.shard_index(key)];

        let notifiers = match &outcome {
            Ok(Some(value)) => {
                let weight = (self.inner.weighter)(key, value);
                let now = self.inner.ticker.now();
                shard.write().with(|mut shard| {
                    let notifiers = shard.inflights.take(key);
                    shard.emplace(
                        key.clone(),
                        value.clone(),
                        weight,
                        now,
                        self.inner.expiry.as_ref(),
                        &mut garbages,
                    );
                    notifiers
                })
            }
            Ok(None) => shard.write().with(|mut shard| {
                // The reload resolved to no value: drop the mapping.
                let notifiers = shard.inflights.take(key);
                if let Some((key, value, weight)) = shard.remove(key) {
                    garbages.push((Event::Remove, key, value, weight));
                }
                notifiers
            }),
            Err(_) => shard.write().with(|mut shard| shard.inflights.take(key)),
        };

        match &outcome {
            Ok(_) => self.inner.recorder.record_load_success(load_nanos),
            Err(_) => self.inner.recorder.record_load_failure(load_nanos),
        }

        for notifier in notifiers {
            let _ = notifier.send(outcome.clone());
        }
        self.inner.flush(garbages);

        outcome
    }

    pub(crate) fn ticker(&self) -> &Arc<dyn Ticker> {
        &self.inner.ticker
    }

    pub(crate) fn recorder(&self) -> &Arc<dyn StatsRecorder> {
        &self.inner.recorder
    }
}

/// Builder for [`Cache`] and [`LoadingCache`].
pub struct CacheBuilder<K, V, S = RandomState>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    capacity: usize,
    shards: usize,
    hash_builder: S,

    weighter: Arc<dyn Weighter<K, V>>,
    expiry: Arc<dyn Expiry<K, V>>,
    ticker: Arc<dyn Ticker>,

    recorder: Arc<dyn StatsRecorder>,
    guard_recorder: bool,
    event_listener: Option<Arc<dyn EventListener<Key = K, Value = V>>>,

    spawner: Option<Spawner>,
    scheduler: Arc<dyn Scheduler>,
    refresh_after_write: Option<Duration>,
}

impl<K, V> CacheBuilder<K, V, RandomState>
where
    K: Key,
    V: Value,
{
    /// Builder for a cache bounded by `capacity` weight units.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            shards: 8,
            hash_builder: RandomState::default(),
            weighter: Arc::new(|_: &K, _: &V| 1),
            expiry: Arc::new(NeverExpiry),
            ticker: Arc::new(SystemTicker::default()),
            recorder: Arc::new(NoopStatsRecorder),
            guard_recorder: false,
            event_listener: None,
            spawner: None,
            scheduler: Arc::new(SystemScheduler::new()),
            refresh_after_write: None,
        }
    }
}

impl<K, V, S> CacheBuilder<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    /// Set the sharding count. Entries are distributed over shards by their
    /// hash, and operations on different shards run in parallel.
    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    /// Set the hash builder shared by shard selection and the shard tables.
    pub fn with_hash_builder<OS>(self, hash_builder: OS) -> CacheBuilder<K, V, OS>
    where
        OS: HashBuilder,
    {
        CacheBuilder {
            capacity: self.capacity,
            shards: self.shards,
            hash_builder,
            weighter: self.weighter,
            expiry: self.expiry,
            ticker: self.ticker,
            recorder: self.recorder,
            guard_recorder: self.guard_recorder,
            event_listener: self.event_listener,
            spawner: self.spawner,
            scheduler: self.scheduler,
            refresh_after_write: self.refresh_after_write,
        }
    }

    /// Set the entry weighter. The default charges every entry 1.
    pub fn with_weighter(mut self, weighter: impl Weighter<K, V>) -> Self {
        self.weighter = Arc::new(weighter);
        self
    }

    /// Set the per-entry expiry policy. The default never expires.
    pub fn with_expiry(mut self, expiry: impl Expiry<K, V>) -> Self {
        self.expiry = Arc::new(expiry);
        self
    }

    /// Set the time source for expiry and load timing.
    pub fn with_ticker(mut self, ticker: Arc<dyn Ticker>) -> Self {
        self.ticker = ticker;
        self
    }

    /// Record statistics with the default atomic recorder.
    pub fn record_stats(mut self) -> Self {
        self.recorder = Arc::new(AtomicStatsRecorder::default());
        self.guard_recorder = false;
        self
    }

    /// Record statistics with a caller-supplied recorder.
    ///
    /// The recorder is wrapped in a
    /// [`GuardedStatsRecorder`](alcove_common::metrics::GuardedStatsRecorder),
    /// so a panicking implementation cannot break cache operations.
    pub fn with_stats_recorder(mut self, recorder: Arc<dyn StatsRecorder>) -> Self {
        self.recorder = recorder;
        self.guard_recorder = true;
        self
    }

    /// Set the entry event listener.
    pub fn with_event_listener(mut self, event_listener: Arc<dyn EventListener<Key = K, Value = V>>) -> Self {
        self.event_listener = Some(event_listener);
        self
    }

    /// Set the spawner that loads, refreshes and scheduled jobs run on.
    ///
    /// Only used by [`CacheBuilder::build_loading`]. Defaults to the runtime
    /// of the context the loading cache is built in.
    pub fn with_spawner(mut self, spawner: impl Into<Spawner>) -> Self {
        self.spawner = Some(spawner.into());
        self
    }

    /// Set the scheduler used for refresh-ahead.
    ///
    /// Only used by [`CacheBuilder::build_loading`]. The scheduler is wrapped
    /// in a [`GuardedScheduler`](alcove_common::scheduler::GuardedScheduler),
    /// so a panicking implementation degrades to no scheduling. The default
    /// probes for a tokio runtime once and degrades the same way without one.
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    /// Proactively reload entries older than `threshold` when they are read,
    /// while still serving the present value.
    ///
    /// Only used by [`CacheBuilder::build_loading`].
    pub fn refresh_after_write(mut self, threshold: Duration) -> Self {
        self.refresh_after_write = Some(threshold);
        self
    }

    /// Build the cache with the given configuration.
    pub fn build(self) -> Cache<K, V, S> {
        assert!(self.shards > 0, "shards must be greater than zero.");

        let shards = (0..self.shards)
            .map(|index| Shard {
                table: HashMap::with_hasher(self.hash_builder.clone()),
                order: VecDeque::new(),
                inflights: InflightTable::default(),
                capacity: shard_capacity_for(self.capacity, self.shards, index),
                usage: 0,
            })
            .map(RwLock::new)
            .collect_vec();

        let recorder = if self.guard_recorder {
            Arc::new(GuardedStatsRecorder::new(self.recorder)) as Arc<dyn StatsRecorder>
        } else {
            self.recorder
        };

        let inner = CacheInner {
            shards,
            capacity: self.capacity,
            hash_builder: self.hash_builder,
            weighter: self.weighter,
            expiry: self.expiry,
            ticker: self.ticker,
            recorder,
            event_listener: self.event_listener,
        };

        Cache { inner: Arc::new(inner) }
    }

    /// Build a [`LoadingCache`] that computes absent values with `loader`.
    ///
    /// # Panics
    ///
    /// Panics when no spawner was configured and there is no tokio runtime in
    /// the current context.
    pub fn build_loading<L>(self, loader: L) -> LoadingCache<K, V, S>
    where
        L: Loader<Key = K, Value = V>,
    {
        let spawner = self
            .spawner
            .clone()
            .or_else(Spawner::try_current)
            .expect("a loading cache needs a tokio runtime: configure one with `with_spawner` or build inside a runtime context");
        let scheduler = Arc::new(alcove_common::scheduler::GuardedScheduler::new(self.scheduler.clone()));
        let refresh_after_write = self.refresh_after_write;

        LoadingCache::new(self.build(), Arc::new(loader), spawner, scheduler, refresh_after_write)
    }
}

fn shard_capacity_for(total: usize, shards: usize, index: usize) -> usize {
    let base = total / shards;
    let remainder = total % shards;
    base + usize::from(index < remainder)
}
