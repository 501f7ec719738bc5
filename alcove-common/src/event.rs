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

//! Entry lifecycle events.

/// Event identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// Capacity-driven eviction on insertion.
    Evict,
    /// Lifetime-driven eviction on access.
    Expire,
    /// Replacement on insertion or reload.
    Replace,
    /// Explicit removal.
    Remove,
    /// Cache clear.
    Clear,
}

impl Event {
    /// Whether the event is driven by the eviction policy rather than by an
    /// explicit caller operation.
    pub fn is_eviction(&self) -> bool {
        matches!(self, Event::Evict | Event::Expire)
    }
}

/// Trait for the customized event listener.
pub trait EventListener: Send + Sync + 'static {
    /// Associated key type.
    type Key;
    /// Associated value type.
    type Value;

    /// Called when a cache entry leaves the cache with the reason.
    #[expect(unused_variables)]
    fn on_leave(&self, event: Event, key: &Self::Key, value: &Self::Value) {}
}
