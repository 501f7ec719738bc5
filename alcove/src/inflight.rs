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

use alcove_common::error::Result;
use hashbrown::HashMap;
use tokio::sync::oneshot;

/// Outcome of one load, reload or compute, broadcast to every coalesced caller.
pub(crate) type LoadResult<V> = Result<Option<V>>;

pub(crate) type Waiter<V> = oneshot::Receiver<LoadResult<V>>;
pub(crate) type Notifier<V> = oneshot::Sender<LoadResult<V>>;

pub(crate) struct Join<V> {
    /// Whether the caller is the one that must drive the computation.
    pub lead: bool,
    pub waiter: Waiter<V>,
}

/// Per-shard registry of in-flight computations.
///
/// At most one computation per key is in flight at a time; every caller that
/// arrives while one is pending is handed a waiter on its outcome. The table
/// is keyed independently of the entry table, so evicting an entry never
/// races with a computation for its key.
pub(crate) struct InflightTable<K, V> {
    inflights: HashMap<K, Vec<Notifier<V>>>,
}

impl<K, V> Default for InflightTable<K, V> {
    fn default() -> Self {
        Self {
            inflights: HashMap::new(),
        }
    }
}

impl<K, V> InflightTable<K, V>
where
    K: std::hash::Hash + Eq + Clone,
{
    /// Join the in-flight computation for `key`, registering one if there is none.
    pub fn join(&mut self, key: &K) -> Join<V> {
        let (tx, rx) = oneshot::channel();
        match self.inflights.entry(key.clone()) {
            hashbrown::hash_map::Entry::Vacant(v) => {
                v.insert(vec![tx]);
                Join { lead: true, waiter: rx }
            }
            hashbrown::hash_map::Entry::Occupied(mut o) => {
                o.get_mut().push(tx);
                Join { lead: false, waiter: rx }
            }
        }
    }

    /// Close the in-flight computation for `key` and take its notifiers.
    pub fn take(&mut self, key: &K) -> Vec<Notifier<V>> {
        self.inflights.remove(key).unwrap_or_default()
    }
}
