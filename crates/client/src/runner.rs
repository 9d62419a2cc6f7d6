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

//! The lock-holding runner.
//!
//! ## Purpose
//! Owns the lifecycle of a single lock on behalf of an application:
//! acquire it (retrying until success or cancellation), hold it by
//! renewing every interval, and release it when the owning task is
//! cancelled. Loss of the lock is fatal and surfaces as an error.
//!
//! ## Design
//! - All sleeps go through the injected [`Clock`], never the wall clock
//! - Renewal is just another Lock RPC; the server treats a same-owner
//!   acquire as a refresh
//! - Any error on an initial acquire is retryable; any error on a renewal
//!   means the lock may have changed hands and the runner must die

use async_trait::async_trait;
use plexlock_common::Clock;
use plexlock_proto::v1::Resource;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};
use tonic::Status;

/// Result type for the runner.
pub type RunnerResult<T> = Result<T, RunnerError>;

/// Fatal runner errors.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// A renewal failed while the lock was held
    #[error("lost lock '{key}': {status}")]
    LockLost { key: String, status: Status },
}

/// The two RPCs the runner issues. [`LockClient`](crate::LockClient)
/// implements this; tests substitute a programmable fake.
#[async_trait]
pub trait LockApi: Send + Sync {
    async fn lock(&self, resource: Resource, ttl_in_seconds: i64) -> Result<(), Status>;
    async fn release(&self, resource: Resource) -> Result<(), Status>;
}

/// Long-lived task that acquires, heartbeats, and releases one lock.
pub struct LockRunner {
    api: Arc<dyn LockApi>,
    resource: Resource,
    ttl_in_seconds: i64,
    clock: Arc<dyn Clock>,
    retry_interval: Duration,
}

impl LockRunner {
    pub fn new(
        api: Arc<dyn LockApi>,
        resource: Resource,
        ttl_in_seconds: i64,
        clock: Arc<dyn Clock>,
        retry_interval: Duration,
    ) -> Self {
        Self {
            api,
            resource,
            ttl_in_seconds,
            clock,
            retry_interval,
        }
    }

    /// Run until cancellation or loss of the lock.
    ///
    /// `ready` fires once, after the first successful acquire. Cancelling
    /// `shutdown` before that point exits without a release (nothing was
    /// acquired); cancelling afterwards releases best-effort first.
    #[instrument(skip(self, ready, shutdown), fields(lock_key = %self.resource.key, owner = %self.resource.owner))]
    pub async fn run(
        self,
        ready: oneshot::Sender<()>,
        shutdown: CancellationToken,
    ) -> RunnerResult<()> {
        // Acquire, retrying on every failure
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("cancelled before acquiring");
                    return Ok(());
                }
                result = self.api.lock(self.resource.clone(), self.ttl_in_seconds) => {
                    match result {
                        Ok(()) => break,
                        Err(status) => {
                            debug!(%status, "failed to acquire lock, retrying");
                            tokio::select! {
                                _ = shutdown.cancelled() => {
                                    debug!("cancelled while waiting to retry");
                                    return Ok(());
                                }
                                _ = self.clock.sleep(self.retry_interval) => {}
                            }
                        }
                    }
                }
            }
        }

        info!("lock acquired");
        let _ = ready.send(());

        // Hold: renew every interval until cancelled or the renewal fails
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    if let Err(status) = self.api.release(self.resource.clone()).await {
                        debug!(%status, "best-effort release failed");
                    }
                    info!("lock released");
                    return Ok(());
                }
                _ = self.clock.sleep(self.retry_interval) => {
                    if let Err(status) = self.api.lock(self.resource.clone(), self.ttl_in_seconds).await {
                        error!(%status, "lost lock");
                        return Err(RunnerError::LockLost {
                            key: self.resource.key.clone(),
                            status,
                        });
                    }
                    debug!("lock renewed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use plexlock_common::FakeClock;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const RETRY: Duration = Duration::from_secs(5);

    struct FakeLockApi {
        default_result: Result<(), Status>,
        queued_results: Mutex<VecDeque<Result<(), Status>>>,
        lock_requests: Mutex<Vec<(Resource, i64)>>,
        release_requests: Mutex<Vec<Resource>>,
    }

    impl FakeLockApi {
        fn new(default_result: Result<(), Status>) -> Arc<Self> {
            Arc::new(Self {
                default_result,
                queued_results: Mutex::new(VecDeque::new()),
                lock_requests: Mutex::new(Vec::new()),
                release_requests: Mutex::new(Vec::new()),
            })
        }

        fn queue(&self, result: Result<(), Status>) {
            self.queued_results.lock().unwrap().push_back(result);
        }

        fn lock_count(&self) -> usize {
            self.lock_requests.lock().unwrap().len()
        }

        fn release_count(&self) -> usize {
            self.release_requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LockApi for FakeLockApi {
        async fn lock(&self, resource: Resource, ttl_in_seconds: i64) -> Result<(), Status> {
            self.lock_requests
                .lock()
                .unwrap()
                .push((resource, ttl_in_seconds));
            let queued = self.queued_results.lock().unwrap().pop_front();
            queued.unwrap_or_else(|| self.default_result.clone())
        }

        async fn release(&self, resource: Resource) -> Result<(), Status> {
            self.release_requests.lock().unwrap().push(resource);
            Ok(())
        }
    }

    fn test_resource() -> Resource {
        Resource {
            key: "test".to_string(),
            owner: "jim".to_string(),
            value: "is pretty sweet.".to_string(),
            r#type: String::new(),
        }
    }

    fn runner(api: Arc<FakeLockApi>, clock: &FakeClock) -> LockRunner {
        LockRunner::new(
            api,
            test_resource(),
            5,
            Arc::new(clock.clone()),
            RETRY,
        )
    }

    async fn eventually<F>(mut condition: F)
    where
        F: FnMut() -> bool,
    {
        for _ in 0..500 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_locks_the_key_and_heartbeats() {
        let api = FakeLockApi::new(Ok(()));
        let clock = FakeClock::new(Utc::now());
        let (ready_tx, ready_rx) = oneshot::channel();
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(runner(api.clone(), &clock).run(ready_tx, shutdown.clone()));

        tokio::time::timeout(Duration::from_secs(5), ready_rx)
            .await
            .expect("runner should become ready")
            .unwrap();
        assert_eq!(api.lock_count(), 1);
        {
            let requests = api.lock_requests.lock().unwrap();
            assert_eq!(requests[0].0, test_resource());
            assert_eq!(requests[0].1, 5);
        }

        // Each interval tick issues another Lock RPC
        clock.wait_for_sleepers(1).await;
        clock.advance(RETRY);
        eventually(|| api.lock_count() == 2).await;

        clock.wait_for_sleepers(1).await;
        clock.advance(RETRY);
        eventually(|| api.lock_count() == 3).await;

        shutdown.cancel();
        handle.await.unwrap().unwrap();
        assert_eq!(api.release_count(), 1);
    }

    #[tokio::test]
    async fn test_retries_after_the_retry_interval() {
        let api = FakeLockApi::new(Err(Status::unavailable("no-lock-for-you")));
        let clock = FakeClock::new(Utc::now());
        let (ready_tx, mut ready_rx) = oneshot::channel();
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(runner(api.clone(), &clock).run(ready_tx, shutdown.clone()));

        eventually(|| api.lock_count() == 1).await;

        clock.wait_for_sleepers(1).await;
        clock.advance(RETRY);
        eventually(|| api.lock_count() == 2).await;

        // Still not ready
        assert!(ready_rx.try_recv().is_err());

        shutdown.cancel();
        handle.await.unwrap().unwrap();
        // Nothing was acquired, so nothing is released
        assert_eq!(api.release_count(), 0);
    }

    #[tokio::test]
    async fn test_grabs_the_lock_once_it_becomes_available() {
        let api = FakeLockApi::new(Ok(()));
        api.queue(Err(Status::unavailable("no-lock-for-you")));
        api.queue(Err(Status::unavailable("no-lock-for-you")));
        let clock = FakeClock::new(Utc::now());
        let (ready_tx, ready_rx) = oneshot::channel();
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(runner(api.clone(), &clock).run(ready_tx, shutdown.clone()));

        eventually(|| api.lock_count() == 1).await;
        clock.wait_for_sleepers(1).await;
        clock.advance(RETRY);
        eventually(|| api.lock_count() == 2).await;

        // Third attempt succeeds and the runner reports ready
        clock.wait_for_sleepers(1).await;
        clock.advance(RETRY);
        eventually(|| api.lock_count() == 3).await;
        tokio::time::timeout(Duration::from_secs(5), ready_rx)
            .await
            .expect("runner should become ready")
            .unwrap();

        // And then continues to heartbeat
        clock.wait_for_sleepers(1).await;
        clock.advance(RETRY);
        eventually(|| api.lock_count() == 4).await;

        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_renewal_failure_is_fatal() {
        let api = FakeLockApi::new(Err(Status::unavailable("no-lock-for-you")));
        api.queue(Ok(()));
        let clock = FakeClock::new(Utc::now());
        let (ready_tx, ready_rx) = oneshot::channel();
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(runner(api.clone(), &clock).run(ready_tx, shutdown));

        tokio::time::timeout(Duration::from_secs(5), ready_rx)
            .await
            .expect("runner should become ready")
            .unwrap();

        clock.wait_for_sleepers(1).await;
        clock.advance(RETRY);

        let result = handle.await.unwrap();
        assert!(matches!(result, Err(RunnerError::LockLost { .. })));
        // A lost lock is not released
        assert_eq!(api.release_count(), 0);
    }

    #[tokio::test]
    async fn test_cancellation_releases_the_lock() {
        let api = FakeLockApi::new(Ok(()));
        let clock = FakeClock::new(Utc::now());
        let (ready_tx, ready_rx) = oneshot::channel();
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(runner(api.clone(), &clock).run(ready_tx, shutdown.clone()));

        tokio::time::timeout(Duration::from_secs(5), ready_rx)
            .await
            .expect("runner should become ready")
            .unwrap();

        shutdown.cancel();
        handle.await.unwrap().unwrap();

        assert_eq!(api.release_count(), 1);
        let released = api.release_requests.lock().unwrap();
        assert_eq!(released[0], test_resource());
    }

    #[tokio::test]
    async fn test_cancellation_while_acquiring_skips_release() {
        let api = FakeLockApi::new(Err(Status::unavailable("no-lock-for-you")));
        let clock = FakeClock::new(Utc::now());
        let (ready_tx, _ready_rx) = oneshot::channel();
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(runner(api.clone(), &clock).run(ready_tx, shutdown.clone()));

        // Cancel while the runner waits out the retry interval
        eventually(|| api.lock_count() == 1).await;
        clock.wait_for_sleepers(1).await;
        shutdown.cancel();

        handle.await.unwrap().unwrap();
        assert_eq!(api.release_count(), 0);
    }
}
