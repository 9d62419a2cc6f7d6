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

//! Per-record TTL timers.

use plexlock_common::Clock;
use plexlock_store::{CompactOutcome, LockError, LockRecord, LockStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Backoff cap for store failures on the fire path.
const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(30);

/// Capability the lock engine uses to arm expiration timers.
pub trait TtlRegistry: Send + Sync {
    /// Schedule an expiration check `record.ttl_seconds` from now.
    ///
    /// Idempotent per `(key, modified_id)`: if a timer is already armed
    /// for that pair, this is a no-op. Never blocks the caller.
    fn register_ttl(&self, record: &LockRecord);
}

struct ReaperInner {
    store: Arc<dyn LockStore>,
    clock: Arc<dyn Clock>,
    timers: Mutex<HashMap<(String, String), JoinHandle<()>>>,
}

/// Arms one timer per live lock record and compacts rows whose TTL has
/// elapsed without renewal.
///
/// ## Concurrency
/// Timer firings run as independent tasks, concurrently with RPC handling.
/// The timer table mutex is held only to insert or remove entries; all
/// store traffic happens outside it.
#[derive(Clone)]
pub struct LockReaper {
    inner: Arc<ReaperInner>,
}

impl LockReaper {
    pub fn new(store: Arc<dyn LockStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(ReaperInner {
                store,
                clock,
                timers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Number of armed timers.
    pub fn timer_count(&self) -> usize {
        self.inner.timers.lock().unwrap().len()
    }

    /// Abort every armed timer. Records persisted in the store are
    /// re-registered on the next server boot, so nothing is lost.
    pub fn shutdown(&self) {
        let mut timers = self.inner.timers.lock().unwrap();
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }
}

impl TtlRegistry for LockReaper {
    fn register_ttl(&self, record: &LockRecord) {
        let slot = (record.resource.key.clone(), record.modified_id.clone());
        let mut timers = self.inner.timers.lock().unwrap();
        if timers.contains_key(&slot) {
            debug!(
                lock_key = %record.resource.key,
                modified_id = %record.modified_id,
                "timer already armed"
            );
            return;
        }

        debug!(
            lock_key = %record.resource.key,
            modified_id = %record.modified_id,
            ttl_seconds = record.ttl_seconds,
            "arming expiration timer"
        );
        let handle = tokio::spawn(run_timer(self.inner.clone(), record.clone()));
        timers.insert(slot, handle);
    }
}

/// One record's expiration loop: sleep, re-check, and either re-arm or
/// compact. Exits when the record is gone or superseded by a new
/// incarnation.
async fn run_timer(inner: Arc<ReaperInner>, armed: LockRecord) {
    let key = armed.resource.key.clone();
    let modified_id = armed.modified_id.clone();
    let mut armed_index = armed.modified_index;

    let backoff_cap = MAX_RETRY_BACKOFF.min(Duration::from_secs(armed.ttl_seconds.max(1) as u64));
    let mut backoff = Duration::from_secs(1);
    let mut wait = Duration::from_secs(armed.ttl_seconds.max(0) as u64);

    loop {
        inner.clock.sleep(wait).await;

        let current = match inner.store.fetch(&key).await {
            Ok(current) => current,
            Err(LockError::NotFound(_)) => break,
            Err(err) => {
                warn!(lock_key = %key, error = %err, "expiration check failed, backing off");
                wait = backoff;
                backoff = (backoff * 2).min(backoff_cap);
                continue;
            }
        };
        backoff = Duration::from_secs(1);

        // A different incarnation owns the slot now; it has its own timer.
        if current.modified_id != modified_id {
            debug!(lock_key = %key, "record re-created, dropping stale timer");
            break;
        }

        if current.modified_index > armed_index {
            // Renewed since arming. Re-arm for what is left of the TTL.
            armed_index = current.modified_index;
            let elapsed = inner
                .clock
                .now()
                .signed_duration_since(current.modified_at)
                .num_seconds();
            let remaining = current.ttl_seconds - elapsed;
            if remaining > 0 {
                wait = Duration::from_secs(remaining as u64);
                continue;
            }
            // The renewed TTL has already elapsed too; compact now.
        }

        match inner.store.compact(&key, armed_index).await {
            Ok(CompactOutcome::Compacted) => {
                info!(lock_key = %key, "expired lock compacted");
                break;
            }
            Ok(CompactOutcome::NotFound) => break,
            Ok(CompactOutcome::Stale) => {
                // A renewal won the race; re-evaluate immediately.
                wait = Duration::ZERO;
            }
            Err(err) => {
                warn!(lock_key = %key, error = %err, "compaction failed, backing off");
                wait = backoff;
                backoff = (backoff * 2).min(backoff_cap);
            }
        }
    }

    inner.timers.lock().unwrap().remove(&(key, modified_id));
}
