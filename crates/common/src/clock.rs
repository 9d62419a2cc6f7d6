// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of PlexLock.
//
// PlexLock is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// PlexLock is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with PlexLock. If not, see <https://www.gnu.org/licenses/>.

//! Injectable time source.
//!
//! ## Purpose
//! The expiration scheduler and the client-side lock runner both wait for
//! real time to pass. Neither reads the wall clock directly; they take an
//! `Arc<dyn Clock>` so tests can substitute [`FakeClock`] and advance time
//! explicitly instead of sleeping.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};

/// Time capability: current instant plus cancellable sleeps.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Suspend the calling task for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Production clock backed by `chrono` and `tokio::time`.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

struct Sleeper {
    deadline: DateTime<Utc>,
    waker: oneshot::Sender<()>,
}

struct FakeClockInner {
    now: DateTime<Utc>,
    sleepers: Vec<Sleeper>,
}

/// Deterministic clock for tests.
///
/// Sleeping tasks park until [`FakeClock::advance`] moves the current time
/// past their deadline. [`FakeClock::wait_for_sleepers`] lets a test block
/// until the code under test has actually gone to sleep, so an `advance`
/// cannot race ahead of the sleeper it is meant to wake.
#[derive(Clone)]
pub struct FakeClock {
    inner: Arc<Mutex<FakeClockInner>>,
    sleeper_added: Arc<Notify>,
}

impl FakeClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FakeClockInner {
                now: start,
                sleepers: Vec::new(),
            })),
            sleeper_added: Arc::new(Notify::new()),
        }
    }

    /// Move time forward, waking every sleeper whose deadline has passed.
    pub fn advance(&self, duration: Duration) {
        let due = {
            let mut inner = self.inner.lock().unwrap();
            inner.now += chrono::Duration::from_std(duration)
                .unwrap_or_else(|_| chrono::Duration::max_value());
            let now = inner.now;
            let (due, pending): (Vec<_>, Vec<_>) = inner
                .sleepers
                .drain(..)
                .partition(|sleeper| sleeper.deadline <= now);
            inner.sleepers = pending;
            due
        };
        for sleeper in due {
            let _ = sleeper.waker.send(());
        }
    }

    /// Number of tasks currently parked in [`Clock::sleep`].
    pub fn sleeper_count(&self) -> usize {
        self.inner.lock().unwrap().sleepers.len()
    }

    /// Wait until at least `count` tasks are parked in [`Clock::sleep`].
    pub async fn wait_for_sleepers(&self, count: usize) {
        loop {
            let notified = self.sleeper_added.notified();
            if self.sleeper_count() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        self.inner.lock().unwrap().now
    }

    async fn sleep(&self, duration: Duration) {
        if duration.is_zero() {
            tokio::task::yield_now().await;
            return;
        }
        let rx = {
            let mut inner = self.inner.lock().unwrap();
            let deadline = inner.now
                + chrono::Duration::from_std(duration)
                    .unwrap_or_else(|_| chrono::Duration::max_value());
            let (tx, rx) = oneshot::channel();
            inner.sleepers.push(Sleeper {
                deadline,
                waker: tx,
            });
            rx
        };
        self.sleeper_added.notify_waiters();
        // A dropped FakeClock wakes its sleepers rather than leaving them
        // parked forever.
        let _ = rx.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_time() -> DateTime<Utc> {
        Utc::now()
    }

    #[tokio::test]
    async fn test_fake_clock_advance_wakes_sleeper() {
        let clock = FakeClock::new(start_time());
        let sleeper_clock = clock.clone();
        let handle = tokio::spawn(async move {
            sleeper_clock.sleep(Duration::from_secs(5)).await;
        });

        clock.wait_for_sleepers(1).await;
        assert_eq!(clock.sleeper_count(), 1);

        clock.advance(Duration::from_secs(5));
        handle.await.unwrap();
        assert_eq!(clock.sleeper_count(), 0);
    }

    #[tokio::test]
    async fn test_fake_clock_partial_advance_keeps_sleeper_parked() {
        let clock = FakeClock::new(start_time());
        let sleeper_clock = clock.clone();
        let handle = tokio::spawn(async move {
            sleeper_clock.sleep(Duration::from_secs(10)).await;
        });

        clock.wait_for_sleepers(1).await;
        clock.advance(Duration::from_secs(4));
        assert_eq!(clock.sleeper_count(), 1);

        clock.advance(Duration::from_secs(6));
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_fake_clock_now_tracks_advances() {
        let start = start_time();
        let clock = FakeClock::new(start);
        clock.advance(Duration::from_secs(30));
        assert_eq!(clock.now(), start + chrono::Duration::seconds(30));
    }

    #[tokio::test]
    async fn test_system_clock_sleep_returns() {
        let clock = SystemClock::new();
        clock.sleep(Duration::from_millis(5)).await;
        let now = clock.now();
        assert!(now <= Utc::now());
    }
}
