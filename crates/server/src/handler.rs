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

//! The lock engine behind the RPC surface.

use plexlock_expiration::TtlRegistry;
use plexlock_proto::v1::Resource;
use plexlock_store::{LockError, LockResult, LockStore};
use std::sync::Arc;
use tracing::{info, instrument};

/// Validates acquires, reserves rows in the store, and arms expiration
/// timers.
///
/// ## Ordering
/// `lock` reserves first and registers the TTL second: an accepted acquire
/// without an armed timer would never be reclaimed. Registration is
/// synchronous and infallible, so there is no window between the two.
///
/// No operation performs background work after returning.
pub struct LockHandler {
    store: Arc<dyn LockStore>,
    ttl_registry: Arc<dyn TtlRegistry>,
}

impl LockHandler {
    pub fn new(store: Arc<dyn LockStore>, ttl_registry: Arc<dyn TtlRegistry>) -> Self {
        Self {
            store,
            ttl_registry,
        }
    }

    /// Acquire or renew `resource.key` for `ttl_in_seconds`.
    #[instrument(skip(self, resource), fields(lock_key = %resource.key, owner = %resource.owner, ttl_in_seconds))]
    pub async fn lock(&self, resource: &Resource, ttl_in_seconds: i64) -> LockResult<()> {
        info!("started");
        if ttl_in_seconds <= 0 {
            return Err(LockError::InvalidTtl(ttl_in_seconds));
        }

        let record = self.store.reserve(resource, ttl_in_seconds).await?;
        self.ttl_registry.register_ttl(&record);

        info!("complete");
        Ok(())
    }

    /// Release `resource.key` on behalf of `resource.owner`.
    #[instrument(skip(self, resource), fields(lock_key = %resource.key, owner = %resource.owner))]
    pub async fn release(&self, resource: &Resource) -> LockResult<()> {
        info!("started");
        self.store.release(&resource.key, &resource.owner).await?;
        info!("complete");
        Ok(())
    }

    /// Look up the resource held under `key`.
    #[instrument(skip(self), fields(lock_key = %key))]
    pub async fn fetch(&self, key: &str) -> LockResult<Resource> {
        info!("started");
        let record = self.store.fetch(key).await?;
        info!("complete");
        Ok(record.resource)
    }

    /// All held resources, optionally filtered by exact type match.
    #[instrument(skip(self))]
    pub async fn fetch_all(&self, type_filter: Option<&str>) -> LockResult<Vec<Resource>> {
        info!("started");
        let records = self.store.fetch_all(type_filter).await?;
        info!("complete");
        Ok(records.into_iter().map(|record| record.resource).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plexlock_store::memory::InMemoryLockStore;
    use plexlock_store::LockRecord;
    use std::sync::Mutex;

    /// Records registrations instead of arming timers.
    #[derive(Default)]
    struct RecordingRegistry {
        registered: Mutex<Vec<LockRecord>>,
    }

    impl TtlRegistry for RecordingRegistry {
        fn register_ttl(&self, record: &LockRecord) {
            self.registered.lock().unwrap().push(record.clone());
        }
    }

    fn resource(key: &str, owner: &str, value: &str) -> Resource {
        Resource {
            key: key.to_string(),
            owner: owner.to_string(),
            value: value.to_string(),
            r#type: String::new(),
        }
    }

    fn handler() -> (LockHandler, Arc<InMemoryLockStore>, Arc<RecordingRegistry>) {
        let store = Arc::new(InMemoryLockStore::new());
        let registry = Arc::new(RecordingRegistry::default());
        let handler = LockHandler::new(store.clone(), registry.clone());
        (handler, store, registry)
    }

    #[tokio::test]
    async fn test_lock_reserves_then_registers() {
        let (handler, store, registry) = handler();

        handler.lock(&resource("k", "a", "v"), 10).await.unwrap();

        let stored = store.fetch("k").await.unwrap();
        let registered = registry.registered.lock().unwrap();
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0].resource.key, "k");
        assert_eq!(registered[0].modified_id, stored.modified_id);
        assert_eq!(registered[0].ttl_seconds, 10);
    }

    #[tokio::test]
    async fn test_lock_rejects_non_positive_ttl() {
        let (handler, store, registry) = handler();

        for ttl in [0, -1] {
            let result = handler.lock(&resource("k", "a", "v"), ttl).await;
            assert!(matches!(result, Err(LockError::InvalidTtl(_))));
        }

        assert!(matches!(store.fetch("k").await, Err(LockError::NotFound(_))));
        assert!(registry.registered.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lock_collision_does_not_register() {
        let (handler, _store, registry) = handler();

        handler.lock(&resource("k", "a", "v"), 10).await.unwrap();
        let result = handler.lock(&resource("k", "b", "w"), 10).await;

        assert!(matches!(result, Err(LockError::LockCollision(_))));
        assert_eq!(registry.registered.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_renewal_registers_same_incarnation() {
        let (handler, _store, registry) = handler();

        handler.lock(&resource("k", "a", "v1"), 10).await.unwrap();
        handler.lock(&resource("k", "a", "v2"), 10).await.unwrap();

        let registered = registry.registered.lock().unwrap();
        assert_eq!(registered.len(), 2);
        assert_eq!(registered[0].modified_id, registered[1].modified_id);
        assert!(registered[1].modified_index > registered[0].modified_index);
    }

    #[tokio::test]
    async fn test_release_and_fetch_round_trip() {
        let (handler, _store, _registry) = handler();

        handler.lock(&resource("k", "a", "v"), 10).await.unwrap();
        let fetched = handler.fetch("k").await.unwrap();
        assert_eq!(fetched, resource("k", "a", "v"));

        handler.release(&resource("k", "a", "")).await.unwrap();
        assert!(matches!(handler.fetch("k").await, Err(LockError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_fetch_all_passes_filter_through() {
        let (handler, _store, _registry) = handler();

        let mut presence = resource("p", "a", "v");
        presence.r#type = "presence".to_string();
        handler.lock(&presence, 10).await.unwrap();
        handler.lock(&resource("k", "b", "v"), 10).await.unwrap();

        assert_eq!(handler.fetch_all(None).await.unwrap().len(), 2);
        let filtered = handler.fetch_all(Some("presence")).await.unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].key, "p");
    }
}
