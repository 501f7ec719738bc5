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

//! The re-exported components of the crate and its common crate.

pub use alcove_common::{
    code::{HashBuilder, Key, Value},
    error::{Error, ErrorKind, Result},
    event::{Event, EventListener},
    metrics::{AtomicStatsRecorder, CacheStats, GuardedStatsRecorder, NoopStatsRecorder, StatsRecorder},
    scheduler::{DisabledScheduler, GuardedScheduler, JobHandle, Scheduler, SystemScheduler, TimerScheduler},
    spawn::{SpawnHandle, Spawner},
    ticker::{ManualTicker, SystemTicker, Ticker, ZeroTicker},
};

pub use crate::{
    cache::{Cache, CacheBuilder},
    expiry::{Expiry, NeverExpiry, TtiExpiry, TtlExpiry, NEVER},
    loader::{bulk, loader_fn, BulkLoader, FnLoader, Loader},
    loading::{Fetch, LoadingCache, Refresh, RefreshAll},
    weighter::Weighter,
};
