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

//! Value loading strategies.
//!
//! A [`Loader`] computes values for keys the cache does not hold. Only
//! [`Loader::load`] is mandatory; bulk retrieval and reload can be overridden
//! for efficiency. A loader must not call back into the cache that owns it
//! (no `insert` or `invalidate` from inside a load); that contract is
//! documented, not enforced.

use std::{future::Future, sync::Arc};

use alcove_common::{
    code::{Key, Value},
    error::{Error, ErrorKind, Result},
};
use futures_util::{future, future::BoxFuture, FutureExt};
use hashbrown::HashMap;

/// A key to value computation strategy.
pub trait Loader: Send + Sync + 'static {
    /// Associated key type.
    type Key: Key;
    /// Associated value type.
    type Value: Value;

    /// Compute the value for `key`.
    ///
    /// `Ok(None)` means the key has no value: the mapping stays absent and the
    /// attempt counts as a load failure.
    fn load(&self, key: &Self::Key) -> BoxFuture<'static, Result<Option<Self::Value>>>;

    /// Compute values for several keys at once.
    ///
    /// A partial result is not an error: keys omitted from the returned map
    /// simply stay uncached, and entries beyond the requested keys are cached
    /// for future lookups. The default fails with
    /// [`ErrorKind::Unsupported`](alcove_common::error::ErrorKind::Unsupported).
    fn load_all(&self, keys: &[Self::Key]) -> BoxFuture<'static, Result<HashMap<Self::Key, Self::Value>>> {
        let _ = keys;
        future::err(Error::unsupported("load_all")).boxed()
    }

    /// Recompute the value for `key`, given the value currently cached.
    ///
    /// Used by refresh. `Ok(None)` signals that the mapping should be removed.
    /// The default discards `old` and delegates to [`Loader::load`].
    fn reload(&self, key: &Self::Key, old: Self::Value) -> BoxFuture<'static, Result<Option<Self::Value>>> {
        let _ = old;
        self.load(key)
    }
}

/// A shared loader loads through the shared instance, so strategies holding
/// state (counters, connections) can be handed to a cache by `Arc`.
impl<L> Loader for Arc<L>
where
    L: Loader,
{
    type Key = L::Key;
    type Value = L::Value;

    fn load(&self, key: &Self::Key) -> BoxFuture<'static, Result<Option<Self::Value>>> {
        self.as_ref().load(key)
    }

    fn load_all(&self, keys: &[Self::Key]) -> BoxFuture<'static, Result<HashMap<Self::Key, Self::Value>>> {
        self.as_ref().load_all(keys)
    }

    fn reload(&self, key: &Self::Key, old: Self::Value) -> BoxFuture<'static, Result<Option<Self::Value>>> {
        self.as_ref().reload(key, old)
    }
}

type LoadFn<K, V> = Box<dyn Fn(K) -> BoxFuture<'static, Result<Option<V>>> + Send + Sync>;
type LoadAllFn<K, V> = Box<dyn Fn(Vec<K>) -> BoxFuture<'static, Result<HashMap<K, V>>> + Send + Sync>;

/// Loader built from a single-key closure. See [`loader_fn`].
pub struct FnLoader<K, V> {
    load: LoadFn<K, V>,
}

impl<K, V> Loader for FnLoader<K, V>
where
    K: Key,
    V: Value,
{
    type Key = K;
    type Value = V;

    fn load(&self, key: &K) -> BoxFuture<'static, Result<Option<V>>> {
        (self.load)(key.clone())
    }
}

/// Build a [`Loader`] from a single-key closure.
///
/// The closure's error is wrapped into an
/// [`ErrorKind::External`](alcove_common::error::ErrorKind::External) error,
/// preserving it as the source.
pub fn loader_fn<K, V, F, FU, E>(f: F) -> FnLoader<K, V>
where
    K: Key,
    V: Value,
    F: Fn(K) -> FU + Send + Sync + 'static,
    FU: Future<Output = std::result::Result<Option<V>, E>> + Send + 'static,
    E: Into<anyhow::Error>,
{
    FnLoader {
        load: Box::new(move |key| {
            let future = f(key);
            async move {
                future
                    .await
                    .map_err(|e| Error::new(ErrorKind::External, "load failed").with_source(e))
            }
            .boxed()
        }),
    }
}

/// Loader built from a bulk closure. See [`bulk`].
pub struct BulkLoader<K, V> {
    load_all: LoadAllFn<K, V>,
}

impl<K, V> Loader for BulkLoader<K, V>
where
    K: Key,
    V: Value,
{
    type Key = K;
    type Value = V;

    fn load(&self, key: &K) -> BoxFuture<'static, Result<Option<V>>> {
        let key = key.clone();
        let future = (self.load_all)(vec![key.clone()]);
        async move {
            // Entries beyond the requested key are discarded here; bulk cache
            // operations go through `load_all` and retain them.
            future.await.map(|mut loaded| loaded.remove(&key))
        }
        .boxed()
    }

    fn load_all(&self, keys: &[K]) -> BoxFuture<'static, Result<HashMap<K, V>>> {
        (self.load_all)(keys.to_vec())
    }
}

/// Adapt a bulk closure into a full [`Loader`].
///
/// Single-key loads call the closure with one key and keep only that key's
/// entry; bulk loads pass through unchanged.
pub fn bulk<K, V, F, FU, E>(f: F) -> BulkLoader<K, V>
where
    K: Key,
    V: Value,
    F: Fn(Vec<K>) -> FU + Send + Sync + 'static,
    FU: Future<Output = std::result::Result<HashMap<K, V>, E>> + Send + 'static,
    E: Into<anyhow::Error>,
{
    BulkLoader {
        load_all: Box::new(move |keys| {
            let future = f(keys);
            async move {
                future
                    .await
                    .map_err(|e| Error::new(ErrorKind::External, "bulk load failed").with_source(e))
            }
            .boxed()
        }),
    }
}
