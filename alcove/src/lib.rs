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

//! A pluggable loading cache.
//!
//! alcove is a sharded in-memory key/value cache with single-flight value
//! loading, background refresh, weighted capacity eviction, per-entry expiry,
//! and statistics. The engine owns no threads: loads, reloads and scheduled
//! jobs run on a caller-supplied [`Spawner`](alcove_common::spawn::Spawner).
//!
//! ```rust
//! use std::convert::Infallible;
//!
//! use alcove::prelude::*;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let cache: LoadingCache<String, usize> = CacheBuilder::new(1024)
//!         .record_stats()
//!         .build_loading(loader_fn(|key: String| async move { Ok::<_, Infallible>(Some(key.len())) }));
//!
//!     assert_eq!(cache.fetch(&"alcove".to_string()).await.unwrap(), Some(6));
//!     assert_eq!(cache.stats().misses, 1);
//! }
//! ```

pub mod cache;
pub mod expiry;
pub mod loader;
pub mod loading;
pub mod weighter;

mod inflight;
mod record;

pub mod prelude;
