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

//! Delayed task scheduling.
//!
//! Scheduling is advisory: it drives refresh-ahead, not correctness. Every
//! failure path (no runtime, a panicking delegate) degrades to the disabled
//! handle and drops the task instead of surfacing an error to the caller.

use std::{
    future::Future,
    panic::{catch_unwind, AssertUnwindSafe},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use futures_util::future::BoxFuture;

use crate::{
    panic,
    spawn::{SpawnHandle, Spawner},
};

/// Submit a task to run on `spawner` after `delay`.
pub trait Scheduler: Send + Sync + 'static {
    /// Schedule `task` to run once after `delay`, returning a cancelable handle.
    fn schedule(&self, spawner: &Spawner, delay: Duration, task: BoxFuture<'static, ()>) -> JobHandle;
}

/// A cancelable handle for a scheduled task.
///
/// The handle resolves when the task has run, was cancelled, or was never
/// scheduled at all (the disabled handle, which is already finished and
/// cannot be cancelled).
#[derive(Debug)]
pub struct JobHandle {
    inner: Option<SpawnHandle<()>>,
}

impl JobHandle {
    /// A handle for a task that was dropped instead of scheduled.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    /// A handle for a task spawned on a runtime.
    pub fn spawned(handle: SpawnHandle<()>) -> Self {
        Self { inner: Some(handle) }
    }

    /// Whether the task has run, was cancelled, or was never scheduled.
    pub fn is_finished(&self) -> bool {
        self.inner.as_ref().map(|handle| handle.is_finished()).unwrap_or(true)
    }

    /// Request cancellation. Returns whether a pending task was cancelled.
    pub fn cancel(&self) -> bool {
        match &self.inner {
            None => false,
            Some(handle) if handle.is_finished() => false,
            Some(handle) => {
                handle.abort();
                true
            }
        }
    }
}

impl Future for JobHandle {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.inner.as_mut() {
            None => Poll::Ready(()),
            // A cancelled or panicked task resolves the handle as well.
            Some(handle) => Pin::new(handle).poll(cx).map(|_| ()),
        }
    }
}

/// Scheduler that never runs anything.
///
/// For caches that opt out of scheduling entirely, e.g. with refresh-ahead
/// disabled. The task is dropped and the returned handle is already finished.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledScheduler;

impl Scheduler for DisabledScheduler {
    fn schedule(&self, _: &Spawner, _: Duration, task: BoxFuture<'static, ()>) -> JobHandle {
        drop(task);
        JobHandle::disabled()
    }
}

/// Scheduler backed by the tokio timer.
///
/// The task is spawned on the given spawner and sleeps out its delay there,
/// so the spawner's runtime must have the time driver enabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimerScheduler;

impl Scheduler for TimerScheduler {
    fn schedule(&self, spawner: &Spawner, delay: Duration, task: BoxFuture<'static, ()>) -> JobHandle {
        let handle = spawner.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            task.await;
        });
        JobHandle::spawned(handle)
    }
}

/// Scheduler that uses the timer when a runtime is reachable and degrades to
/// [`DisabledScheduler`] otherwise.
///
/// The capability check runs once at construction, so a `SystemScheduler`
/// built outside any runtime context stays disabled for its lifetime.
#[derive(Debug)]
pub struct SystemScheduler {
    delegate: Option<TimerScheduler>,
}

impl Default for SystemScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemScheduler {
    /// Probe the current context for a tokio runtime and pick the delegate.
    pub fn new() -> Self {
        let delegate = tokio::runtime::Handle::try_current().ok().map(|_| TimerScheduler);
        Self { delegate }
    }
}

impl Scheduler for SystemScheduler {
    fn schedule(&self, spawner: &Spawner, delay: Duration, task: BoxFuture<'static, ()>) -> JobHandle {
        match &self.delegate {
            Some(timer) => timer.schedule(spawner, delay, task),
            None => DisabledScheduler.schedule(spawner, delay, task),
        }
    }
}

/// [`Scheduler`] wrapper that isolates the caller from a misbehaving delegate.
///
/// A panic raised by the delegate is caught and logged, and the task is
/// silently dropped: the caller receives the disabled handle instead of the
/// panic.
pub struct GuardedScheduler {
    inner: Arc<dyn Scheduler>,
}

impl GuardedScheduler {
    /// Wrap `inner` with the isolation boundary.
    pub fn new(inner: Arc<dyn Scheduler>) -> Self {
        Self { inner }
    }
}

impl Scheduler for GuardedScheduler {
    fn schedule(&self, spawner: &Spawner, delay: Duration, task: BoxFuture<'static, ()>) -> JobHandle {
        match catch_unwind(AssertUnwindSafe(|| self.inner.schedule(spawner, delay, task))) {
            Ok(handle) => handle,
            Err(payload) => {
                tracing::warn!(panic = panic::message(payload.as_ref()), "scheduler panicked, task dropped");
                JobHandle::disabled()
            }
        }
    }
}
