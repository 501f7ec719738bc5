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

//! Marker traits for the types a cache is generic over.

use std::{
    fmt::Debug,
    hash::{BuildHasher, Hash},
};

/// Requirements for a cache key.
///
/// Keys are cloned when they are stored and when in-flight computations are
/// registered, so an expensive-to-clone key should be wrapped in an `Arc`.
pub trait Key: Send + Sync + 'static + Hash + Eq + Clone + Debug {}
impl<T> Key for T where T: Send + Sync + 'static + Hash + Eq + Clone + Debug {}

/// Requirements for a cache value.
///
/// Values are returned by clone, so an expensive-to-clone value should be
/// wrapped in an `Arc`.
pub trait Value: Send + Sync + 'static + Clone {}
impl<T> Value for T where T: Send + Sync + 'static + Clone {}

/// Requirements for the hash builder shared by a cache and its shards.
pub trait HashBuilder: BuildHasher + Clone + Send + Sync + 'static {}
impl<T> HashBuilder for T where T: BuildHasher + Clone + Send + Sync + 'static {}
