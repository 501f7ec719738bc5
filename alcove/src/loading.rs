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

//! The loading cache.
//!
//! [`LoadingCache`] pairs a [`Cache`] with a [`Loader`] and computes absent
//! values on demand. Lookups for the same missing key coalesce onto one load,
//! and [`LoadingCache::refresh`] reloads entries in the background while the
//! present value keeps serving reads. With
//! [`refresh_after_write`](crate::cache::CacheBuilder::refresh_after_write)
//! configured, reads of an aging entry trigger that reload by themselves.
//!
//! Loads and reloads run on the cache's [`Spawner`], so the futures returned
//! here are observers: dropping one does not cancel the computation it
//! watches.

use std::{
    fmt::Debug,
    future::Future,
    hash::Hash,
    mem,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use ahash::RandomState;
use alcove_common::{
    code::{HashBuilder, Key, Value},
    error::{Error, ErrorKind, Result},
    metrics::CacheStats,
    scheduler::Scheduler,
    spawn::Spawner,
};
use equivalent::Equivalent;
use futures_util::FutureExt;
use hashbrown::{HashMap, HashSet};

use crate::{
    cache::{Attempt, Cache, RefreshAttempt},
    inflight::Waiter,
    loader::Loader,
};

/// A cache that computes absent values with a [`Loader`].
///
/// Built with [`CacheBuilder::build_loading`](crate::cache::CacheBuilder::build_loading).
/// Cloning is shallow; clones share the same store, loader and spawner.
pub struct LoadingCache<K, V, S = RandomState>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    cache: Cache<K, V, S>,
    loader: Arc<dyn Loader<Key = K, Value = V>>,
    spawner: Spawner,
    scheduler: Arc<dyn Scheduler>,
    refresh_after_write: Option<Duration>,
}

impl<K, V, S> Debug for LoadingCache<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadingCache")
            .field("cache", &self.cache)
            .field("refresh_after_write", &self.refresh_after_write)
            .finish()
    }
}

impl<K, V, S> Clone for LoadingCache<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            loader: self.loader.clone(),
            spawner: self.spawner.clone(),
            scheduler: self.scheduler.clone(),
            refresh_after_write: self.refresh_after_write,
        }
    }
}

impl<K, V, S> LoadingCache<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    pub(crate) fn new(
        cache: Cache<K, V, S>,
        loader: Arc<dyn Loader<Key = K, Value = V>>,
        spawner: Spawner,
        scheduler: Arc<dyn Scheduler>,
        refresh_after_write: Option<Duration>,
    ) -> Self {
        Self {
            cache,
            loader,
            spawner,
            scheduler,
            refresh_after_write,
        }
    }

    /// Get the value for `key`, loading it if absent.
    ///
    /// A hit resolves immediately. On a miss, callers coalesce onto one load
    /// per key: the load runs on the spawner and every caller observes the
    /// same outcome. `Ok(None)` means the loader produced no value and the
    /// mapping stays absent; an error is broadcast to every coalesced caller
    /// and counts as one load failure.
    pub fn fetch(&self, key: &K) -> Fetch<V> {
        match self.cache.attempt(key, true) {
            Attempt::Hit { value, written } => {
                self.refresh_ahead(key, written);
                Fetch {
                    state: FetchState::Ready(Some(Ok(Some(value)))),
                }
            }
            Attempt::Wait(waiter) => Fetch {
                state: FetchState::Wait(waiter),
            },
            Attempt::Lead(waiter) => {
                self.spawn_load(key.clone());
                Fetch {
                    state: FetchState::Wait(waiter),
                }
            }
        }
    }

    /// Get the values for `keys`, loading the absent ones in one bulk call.
    ///
    /// Hits are served from the cache; the missing keys go through
    /// [`Loader::load_all`] as a single computation. A partial result is not
    /// an error: keys the loader omitted stay absent, and entries it returned
    /// beyond the request are cached for future lookups. The returned map
    /// holds the requested keys that resolved to a value.
    pub async fn fetch_all(&self, keys: &[K]) -> Result<HashMap<K, V>> {
        let mut found = HashMap::with_capacity(keys.len());
        let mut missing = Vec::new();
        for key in keys {
            match self.cache.get(key) {
                Some(value) => {
                    found.insert(key.clone(), value);
                }
                None => missing.push(key.clone()),
            }
        }
        if missing.is_empty() {
            return Ok(found);
        }

        let start = self.cache.ticker().now();
        let outcome = self.loader.load_all(&missing).await;
        let load_nanos = self.cache.ticker().now().saturating_sub(start);

        let loaded = match outcome {
            Ok(loaded) => {
                self.cache.recorder().record_load_success(load_nanos);
                loaded
            }
            Err(e) => {
                self.cache.recorder().record_load_failure(load_nanos);
                return Err(e);
            }
        };

        let requested: HashSet<&K> = missing.iter().collect();
        for (key, value) in loaded {
            if requested.contains(&key) {
                found.insert(key.clone(), value.clone());
            }
            self.cache.insert(key, value);
        }

        Ok(found)
    }

    /// Synchronous counterpart of [`LoadingCache::fetch`], blocking the
    /// calling thread until the load completes.
    ///
    /// The load still runs on the spawner; this thread only waits for its
    /// outcome. Must not be called from an async context.
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        match self.cache.attempt(key, true) {
            Attempt::Hit { value, written } => {
                self.refresh_ahead(key, written);
                Ok(Some(value))
            }
            Attempt::Wait(waiter) => wait_blocking(waiter),
            Attempt::Lead(waiter) => {
                self.spawn_load(key.clone());
                wait_blocking(waiter)
            }
        }
    }

    /// Reload the value for `key` in the background.
    ///
    /// With a value cached, [`Loader::reload`] recomputes it while the present
    /// value keeps serving reads; with nothing cached, this behaves as a load.
    /// A successful reload replaces the value atomically, `Ok(None)` removes
    /// the mapping, and a failure is logged and swallowed with the present
    /// value retained. A second `refresh` while one is pending joins the
    /// in-flight reload instead of starting another.
    ///
    /// The returned [`Refresh`] resolves to the new value, or `None` when the
    /// reload failed or removed the mapping.
    pub fn refresh(&self, key: &K) -> Refresh<V> {
        match self.cache.refresh_attempt(key) {
            RefreshAttempt::Wait(waiter) => Refresh { waiter },
            RefreshAttempt::Lead { waiter, old } => {
                self.spawn_reload(key.clone(), old);
                Refresh { waiter }
            }
        }
    }

    /// Reload several keys in the background, in one composed future.
    ///
    /// The result map holds only the keys whose reload completed with a
    /// value; failures are dropped from the map, each already logged by its
    /// own reload.
    pub fn refresh_all(&self, keys: &[K]) -> RefreshAll<K, V> {
        RefreshAll {
            pending: keys.iter().map(|key| (key.clone(), self.refresh(key))).collect(),
            completed: HashMap::new(),
        }
    }

    /// Insert `value` for `key` directly, returning the value it replaced.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.cache.insert(key, value)
    }

    /// Live value for `key` without recording stats, touching expiry, or
    /// triggering a load.
    pub fn peek<Q>(&self, key: &Q) -> Option<V>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.cache.peek(key)
    }

    /// Whether a live entry exists for `key`. No stats are recorded.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.cache.contains(key)
    }

    /// Remove the entry for `key`, returning its value.
    pub fn invalidate<Q>(&self, key: &Q) -> Option<V>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        self.cache.invalidate(key)
    }

    /// Remove every entry.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all()
    }

    /// Approximate number of entries, including not-yet-reclaimed expired ones.
    pub fn estimated_len(&self) -> usize {
        self.cache.estimated_len()
    }

    /// Total weight currently charged against the capacity.
    pub fn weight(&self) -> usize {
        self.cache.weight()
    }

    /// Snapshot of the statistics recorder.
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// The underlying cache.
    pub fn cache(&self) -> &Cache<K, V, S> {
        &self.cache
    }

    /// Drive the load for `key` on the spawner. The outcome is broadcast to
    /// every waiter coalesced on the in-flight computation.
    fn spawn_load(&self, key: K) {
        let cache = self.cache.clone();
        let loader = self.loader.clone();
        // Dropping the handle detaches the task; waiters hold the channel.
        let _ = self.spawner.spawn(async move {
            let start = cache.ticker().now();
            let outcome = loader.load(&key).await;
            let load_nanos = cache.ticker().now().saturating_sub(start);
            cache.complete_load(&key, outcome, load_nanos);
        });
    }

    /// Drive the reload for `key` on the spawner. With no old value the
    /// reload degenerates to a load.
    fn spawn_reload(&self, key: K, old: Option<V>) {
        let cache = self.cache.clone();
        let loader = self.loader.clone();
        let _ = self.spawner.spawn(async move {
            let start = cache.ticker().now();
            let outcome = match old {
                Some(old) => loader.reload(&key, old).await,
                None => loader.load(&key).await,
            };
            let load_nanos = cache.ticker().now().saturating_sub(start);
            if let Err(error) = &outcome {
                tracing::warn!(key = ?key, %error, "refresh failed, the present value is retained");
            }
            cache.complete_refresh(&key, outcome, load_nanos);
        });
    }

    /// Schedule an advisory refresh when the entry's last write is older than
    /// the configured threshold.
    fn refresh_ahead(&self, key: &K, written: Duration) {
        let Some(threshold) = self.refresh_after_write else {
            return;
        };
        if written < threshold {
            return;
        }

        let this = self.clone();
        let key = key.clone();
        let task = async move {
            this.refresh(&key).await;
        }
        .boxed();
        // Scheduling is advisory: a disabled or broken scheduler drops the
        // task and the entry simply stays until it expires or is replaced.
        let _ = self.scheduler.schedule(&self.spawner, Duration::ZERO, task);
    }
}

fn wait_blocking<V>(waiter: Waiter<V>) -> Result<Option<V>> {
    match waiter.blocking_recv() {
        Ok(outcome) => outcome,
        Err(_) => Err(Error::new(ErrorKind::ChannelClosed, "in-flight computation dropped")),
    }
}

enum FetchState<V> {
    Ready(Option<Result<Option<V>>>),
    Wait(Waiter<V>),
}

/// Future returned by [`LoadingCache::fetch`].
///
/// Resolves to the value, `Ok(None)` when the loader produced none, or the
/// load error. The load itself runs on the spawner; dropping this future does
/// not cancel it.
#[must_use = "fetch resolves through this future"]
pub struct Fetch<V> {
    state: FetchState<V>,
}

// No pinned state: the ready outcome and the waiter are both plain movable
// values, whatever `V` is.
impl<V> Unpin for Fetch<V> {}

impl<V> Future for Fetch<V> {
    type Output = Result<Option<V>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.state {
            FetchState::Ready(outcome) => Poll::Ready(outcome.take().expect("fetch polled after completion")),
            FetchState::Wait(waiter) => Pin::new(waiter).poll(cx).map(|received| match received {
                Ok(outcome) => outcome,
                Err(_) => Err(Error::new(ErrorKind::ChannelClosed, "in-flight computation dropped")),
            }),
        }
    }
}

/// Future returned by [`LoadingCache::refresh`].
///
/// Resolves to the new value, or `None` when the reload failed or removed the
/// mapping. The reload runs on the spawner; dropping this future does not
/// cancel it.
#[must_use = "dropping the future does not cancel the reload, but the outcome is lost"]
pub struct Refresh<V> {
    waiter: Waiter<V>,
}

impl<V> Future for Refresh<V> {
    type Output = Option<V>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.waiter).poll(cx).map(|received| match received {
            Ok(Ok(value)) => value,
            // Reload failures are logged by the driving task and never
            // propagate; the present value keeps serving.
            Ok(Err(_)) | Err(_) => None,
        })
    }
}

/// Future returned by [`LoadingCache::refresh_all`].
///
/// Resolves to the map of keys whose reload completed with a value.
#[must_use = "dropping the future does not cancel the reloads, but the outcome is lost"]
pub struct RefreshAll<K, V> {
    pending: Vec<(K, Refresh<V>)>,
    completed: HashMap<K, V>,
}

// No pinned state, as for `Fetch`.
impl<K, V> Unpin for RefreshAll<K, V> {}

impl<K, V> Future for RefreshAll<K, V>
where
    K: Key,
    V: Value,
{
    type Output = HashMap<K, V>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        let mut index = 0;
        while index < this.pending.len() {
            let (_, refresh) = &mut this.pending[index];
            match Pin::new(refresh).poll(cx) {
                Poll::Ready(outcome) => {
                    let (key, _) = this.pending.swap_remove(index);
                    if let Some(value) = outcome {
                        this.completed.insert(key, value);
                    }
                }
                Poll::Pending => index += 1,
            }
        }

        if this.pending.is_empty() {
            Poll::Ready(mem::take(&mut this.completed))
        } else {
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        convert::Infallible,
        sync::atomic::{AtomicBool, AtomicUsize, Ordering},
        time::Duration,
    };

    use alcove_common::{scheduler::DisabledScheduler, ticker::ManualTicker};
    use futures_util::future::{join_all, BoxFuture};
    use itertools::Itertools;

    use super::*;
    use crate::{
        cache::CacheBuilder,
        loader::{bulk, loader_fn},
    };

    /// Loader computing the length of the key, with switchable reload failure.
    #[derive(Default)]
    struct LengthLoader {
        loads: AtomicUsize,
        reloads: AtomicUsize,
        fail_reloads: AtomicBool,
    }

    impl Loader for LengthLoader {
        type Key = String;
        type Value = usize;

        fn load(&self, key: &String) -> BoxFuture<'static, Result<Option<usize>>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            let len = key.len();
            async move { Ok(Some(len)) }.boxed()
        }

        fn reload(&self, key: &String, _: usize) -> BoxFuture<'static, Result<Option<usize>>> {
            self.reloads.fetch_add(1, Ordering::SeqCst);
            if self.fail_reloads.load(Ordering::SeqCst) {
                return async { Err(Error::new(ErrorKind::External, "reload failed")) }.boxed();
            }
            let len = key.len();
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(Some(len))
            }
            .boxed()
        }
    }

    fn loading_cache_for_test(loader: Arc<LengthLoader>) -> LoadingCache<String, usize> {
        CacheBuilder::new(64).with_shards(1).record_stats().build_loading(loader)
    }

    #[tokio::test]
    async fn test_fetch_miss_then_hit() {
        let loader = Arc::new(LengthLoader::default());
        let cache = loading_cache_for_test(loader.clone());

        assert_eq!(cache.fetch(&"alcove".to_string()).await.unwrap(), Some(6));
        assert_eq!(cache.fetch(&"alcove".to_string()).await.unwrap(), Some(6));
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.load_successes, 1);
    }

    #[tokio::test]
    async fn test_fetch_single_flight() {
        let loads = Arc::new(AtomicUsize::new(0));
        let cache: LoadingCache<u64, u64> = CacheBuilder::new(64).with_shards(1).record_stats().build_loading(loader_fn({
            let loads = loads.clone();
            move |key: u64| {
                let loads = loads.clone();
                async move {
                    loads.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, Infallible>(Some(key + 1))
                }
            }
        }));

        const CALLERS: usize = 8;
        let fetches = (0..CALLERS).map(|_| cache.fetch(&42)).collect_vec();
        for outcome in join_all(fetches).await {
            assert_eq!(outcome.unwrap(), Some(43));
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.misses, CALLERS as u64);
        assert_eq!(stats.load_successes, 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_broadcasts_and_leaves_mapping_absent() {
        let cache: LoadingCache<u64, u64> =
            CacheBuilder::new(64).with_shards(1).record_stats().build_loading(loader_fn(|_: u64| async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                Err::<Option<u64>, _>(std::io::Error::other("backend down"))
            }));

        let fetches = (0..4).map(|_| cache.fetch(&7)).collect_vec();
        for outcome in join_all(fetches).await {
            let err = outcome.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::External);
            assert!(err.downcast_ref::<std::io::Error>().is_some());
        }

        assert!(!cache.contains(&7));
        let stats = cache.stats();
        assert_eq!(stats.load_failures, 1);
        assert_eq!(stats.load_successes, 0);
    }

    #[tokio::test]
    async fn test_fetch_no_value_stays_absent() {
        let cache: LoadingCache<u64, u64> = CacheBuilder::new(64)
            .record_stats()
            .build_loading(loader_fn(|_: u64| async move { Ok::<_, Infallible>(None) }));

        assert_eq!(cache.fetch(&1).await.unwrap(), None);
        assert!(!cache.contains(&1));
        assert_eq!(cache.stats().load_failures, 1);
    }

    #[test]
    fn test_sync_get_single_flight() {
        let loads = Arc::new(AtomicUsize::new(0));
        let cache: LoadingCache<u64, u64> = CacheBuilder::new(64)
            .with_shards(1)
            .record_stats()
            .with_spawner(tokio::runtime::Runtime::new().unwrap())
            .build_loading(loader_fn({
                let loads = loads.clone();
                move |key: u64| {
                    let loads = loads.clone();
                    async move {
                        loads.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, Infallible>(Some(key * 10))
                    }
                }
            }));

        const THREADS: usize = 4;
        let barrier = Arc::new(std::sync::Barrier::new(THREADS));
        let handles = (0..THREADS)
            .map(|_| {
                let cache = cache.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    cache.get(&5)
                })
            })
            .collect_vec();
        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), Some(50));
        }

        assert_eq!(loads.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.misses, THREADS as u64);
        assert_eq!(stats.load_successes, 1);
    }

    #[tokio::test]
    async fn test_fetch_all_partial_result_with_extras() {
        let cache: LoadingCache<String, usize> =
            CacheBuilder::new(64).with_shards(1).record_stats().build_loading(bulk(|keys: Vec<String>| async move {
                // Loads everything but "c", plus an entry nobody asked for.
                let mut loaded: HashMap<_, _> =
                    keys.iter().filter(|k| *k != "c").map(|k| (k.clone(), k.len())).collect();
                loaded.insert("extra".to_string(), 5);
                Ok::<_, Infallible>(loaded)
            }));

        let keys = ["a".to_string(), "bb".to_string(), "c".to_string()];
        let found = cache.fetch_all(&keys).await.unwrap();

        assert_eq!(found.len(), 2);
        assert_eq!(found.get("a"), Some(&1));
        assert_eq!(found.get("bb"), Some(&2));
        // The omitted key stays absent without an error; the extra entry is
        // cached for future lookups.
        assert!(!cache.contains("c"));
        assert_eq!(cache.peek("extra"), Some(5));

        let stats = cache.stats();
        assert_eq!(stats.misses, 3);
        assert_eq!(stats.load_successes, 1);
    }

    #[tokio::test]
    async fn test_fetch_all_serves_hits_from_cache() {
        let bulk_loads = Arc::new(AtomicUsize::new(0));
        let cache: LoadingCache<String, usize> = CacheBuilder::new(64).with_shards(1).record_stats().build_loading(bulk({
            let bulk_loads = bulk_loads.clone();
            move |keys: Vec<String>| {
                let bulk_loads = bulk_loads.clone();
                async move {
                    bulk_loads.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Infallible>(keys.iter().map(|k| (k.clone(), k.len())).collect::<HashMap<_, _>>())
                }
            }
        }));

        cache.insert("aa".to_string(), 2);
        let keys = ["aa".to_string(), "bbb".to_string()];
        let found = cache.fetch_all(&keys).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(bulk_loads.load(Ordering::SeqCst), 1);

        // Everything is cached now; no further bulk load happens.
        let found = cache.fetch_all(&keys).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(bulk_loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fetch_all_unsupported_loader() {
        let cache: LoadingCache<String, usize> = CacheBuilder::new(64)
            .record_stats()
            .build_loading(loader_fn(|key: String| async move { Ok::<_, Infallible>(Some(key.len())) }));

        let err = cache.fetch_all(&["a".to_string()]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        assert_eq!(cache.stats().load_failures, 1);
    }

    #[tokio::test]
    async fn test_refresh_without_cached_value_loads() {
        let loader = Arc::new(LengthLoader::default());
        let cache = loading_cache_for_test(loader.clone());

        assert_eq!(cache.refresh(&"abc".to_string()).await, Some(3));
        assert_eq!(cache.peek("abc"), Some(3));
        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert_eq!(loader.reloads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_refresh_failure_retains_present_value() {
        let loader = Arc::new(LengthLoader::default());
        let cache = loading_cache_for_test(loader.clone());

        assert_eq!(cache.refresh(&"abc".to_string()).await, Some(3));

        loader.fail_reloads.store(true, Ordering::SeqCst);
        let before = cache.stats();
        assert_eq!(cache.refresh(&"abc".to_string()).await, None);

        // The failed reload is swallowed: the previous value keeps serving
        // and exactly one load failure is recorded.
        assert_eq!(cache.fetch(&"abc".to_string()).await.unwrap(), Some(3));
        assert_eq!(cache.stats().minus(&before).load_failures, 1);
    }

    #[tokio::test]
    async fn test_refresh_serves_stale_value_while_reloading() {
        let loader = Arc::new(LengthLoader::default());
        let cache = loading_cache_for_test(loader.clone());

        cache.insert("abcd".to_string(), 999);
        let refresh = cache.refresh(&"abcd".to_string());

        // The reload sleeps; the present value keeps serving reads meanwhile.
        assert_eq!(cache.peek("abcd"), Some(999));

        assert_eq!(refresh.await, Some(4));
        assert_eq!(cache.peek("abcd"), Some(4));
    }

    #[tokio::test]
    async fn test_concurrent_refresh_coalesces() {
        let loader = Arc::new(LengthLoader::default());
        let cache = loading_cache_for_test(loader.clone());

        cache.insert("ab".to_string(), 0);
        let refreshes = (0..4).map(|_| cache.refresh(&"ab".to_string())).collect_vec();
        for outcome in join_all(refreshes).await {
            assert_eq!(outcome, Some(2));
        }
        assert_eq!(loader.reloads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reload_none_removes_mapping() {
        let cache: LoadingCache<u64, u64> = CacheBuilder::new(64)
            .record_stats()
            .build_loading(loader_fn(|_: u64| async move { Ok::<_, Infallible>(None) }));

        cache.insert(1, 10);
        assert_eq!(cache.refresh(&1).await, None);
        assert!(!cache.contains(&1));
    }

    #[tokio::test]
    async fn test_refresh_all_drops_failures_from_result() {
        struct SelectiveLoader;
        impl Loader for SelectiveLoader {
            type Key = String;
            type Value = usize;

            fn load(&self, key: &String) -> BoxFuture<'static, Result<Option<usize>>> {
                let len = key.len();
                async move { Ok(Some(len)) }.boxed()
            }

            fn reload(&self, key: &String, _: usize) -> BoxFuture<'static, Result<Option<usize>>> {
                if key == "x" {
                    return async { Err(Error::new(ErrorKind::External, "reload failed")) }.boxed();
                }
                self.load(key)
            }
        }

        let cache: LoadingCache<String, usize> =
            CacheBuilder::new(64).with_shards(1).record_stats().build_loading(SelectiveLoader);
        cache.insert("a".to_string(), 0);
        cache.insert("bb".to_string(), 0);
        cache.insert("x".to_string(), 42);

        let keys = ["a".to_string(), "bb".to_string(), "x".to_string()];
        let refreshed = cache.refresh_all(&keys).await;

        assert_eq!(refreshed.len(), 2);
        assert_eq!(refreshed.get("a"), Some(&1));
        assert_eq!(refreshed.get("bb"), Some(&2));
        // The failed key is dropped from the result but keeps its old value.
        assert_eq!(cache.peek("x"), Some(42));
    }

    #[tokio::test]
    async fn test_refresh_ahead_reloads_aging_entry() {
        let ticker = Arc::new(ManualTicker::default());
        let reloaded = Arc::new(AtomicUsize::new(0));
        let cache: LoadingCache<u64, u64> = CacheBuilder::new(64)
            .with_shards(1)
            .with_ticker(ticker.clone())
            .refresh_after_write(Duration::from_nanos(100))
            .build_loading(loader_fn({
                let reloaded = reloaded.clone();
                move |key: u64| {
                    let reloads = reloaded.fetch_add(1, Ordering::SeqCst) as u64;
                    async move { Ok::<_, Infallible>(Some(key + reloads)) }
                }
            }));

        assert_eq!(cache.fetch(&100).await.unwrap(), Some(100));

        // Young entry: a hit does not trigger a reload.
        ticker.advance(Duration::from_nanos(50));
        assert_eq!(cache.fetch(&100).await.unwrap(), Some(100));

        // Past the threshold the hit still serves the present value, and the
        // reload replaces it in the background.
        ticker.advance(Duration::from_nanos(60));
        assert_eq!(cache.fetch(&100).await.unwrap(), Some(100));
        for _ in 0..100 {
            if cache.peek(&100) == Some(101) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(cache.peek(&100), Some(101));
        assert_eq!(reloaded.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_refresh_ahead_disabled_scheduler_never_reloads() {
        let ticker = Arc::new(ManualTicker::default());
        let loads = Arc::new(AtomicUsize::new(0));
        let cache: LoadingCache<u64, u64> = CacheBuilder::new(64)
            .with_ticker(ticker.clone())
            .with_scheduler(Arc::new(DisabledScheduler))
            .refresh_after_write(Duration::from_nanos(100))
            .build_loading(loader_fn({
                let loads = loads.clone();
                move |key: u64| {
                    loads.fetch_add(1, Ordering::SeqCst);
                    async move { Ok::<_, Infallible>(Some(key)) }
                }
            }));

        assert_eq!(cache.fetch(&1).await.unwrap(), Some(1));
        ticker.advance(Duration::from_nanos(200));
        assert_eq!(cache.fetch(&1).await.unwrap(), Some(1));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }
}
