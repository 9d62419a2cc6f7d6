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

//! In-memory lock store implementation (for testing).

use async_trait::async_trait;
use plexlock_common::{Clock, SystemClock};
use plexlock_proto::v1::Resource;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::error::{LockError, LockResult};
use crate::store::{CompactOutcome, LockRecord, LockStore};

/// In-memory lock store (for testing).
///
/// ## Purpose
/// Provides a simple in-memory implementation of [`LockStore`] for tests
/// and single-process scenarios. The write lock around the map gives the
/// same one-winner-per-key serialization the SQL backends get from the
/// database.
///
/// ## Limitations
/// - Not persistent (locks lost on restart)
/// - Not distributed (single process only)
#[derive(Clone)]
pub struct InMemoryLockStore {
    clock: Arc<dyn Clock>,
    locks: Arc<RwLock<HashMap<String, LockRecord>>>,
}

impl InMemoryLockStore {
    /// Create a store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    /// Create a store with an injected clock, so expiration tests can
    /// control `modified_at`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            locks: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryLockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn reserve(&self, resource: &Resource, ttl_seconds: i64) -> LockResult<LockRecord> {
        let mut locks = self.locks.write().await;
        let now = self.clock.now();

        if let Some(existing) = locks.get_mut(&resource.key) {
            if existing.resource.owner != resource.owner {
                return Err(LockError::LockCollision(resource.key.clone()));
            }
            // Same owner: refresh in place, keep the record's identity
            existing.resource.value = resource.value.clone();
            existing.resource.r#type = resource.r#type.clone();
            existing.ttl_seconds = ttl_seconds;
            existing.modified_index += 1;
            existing.modified_at = now;
            return Ok(existing.clone());
        }

        let record = LockRecord {
            resource: resource.clone(),
            ttl_seconds,
            modified_index: 1,
            modified_id: Ulid::new().to_string(),
            modified_at: now,
        };
        locks.insert(resource.key.clone(), record.clone());
        Ok(record)
    }

    async fn compact(
        &self,
        key: &str,
        expected_modified_index: i64,
    ) -> LockResult<CompactOutcome> {
        let mut locks = self.locks.write().await;
        match locks.get(key) {
            None => Ok(CompactOutcome::NotFound),
            Some(record) if record.modified_index == expected_modified_index => {
                locks.remove(key);
                Ok(CompactOutcome::Compacted)
            }
            Some(_) => Ok(CompactOutcome::Stale),
        }
    }

    async fn release(&self, key: &str, owner: &str) -> LockResult<()> {
        let mut locks = self.locks.write().await;
        match locks.get(key) {
            None => Err(LockError::NotFound(key.to_string())),
            Some(record) if record.resource.owner == owner => {
                locks.remove(key);
                Ok(())
            }
            Some(_) => Err(LockError::NotOwner(key.to_string())),
        }
    }

    async fn fetch(&self, key: &str) -> LockResult<LockRecord> {
        let locks = self.locks.read().await;
        locks
            .get(key)
            .cloned()
            .ok_or_else(|| LockError::NotFound(key.to_string()))
    }

    async fn fetch_all(&self, type_filter: Option<&str>) -> LockResult<Vec<LockRecord>> {
        let locks = self.locks.read().await;
        let mut records: Vec<LockRecord> = locks
            .values()
            .filter(|record| match type_filter {
                None | Some("") => true,
                Some(filter) => record.resource.r#type == filter,
            })
            .cloned()
            .collect();
        records.sort_by(|a, b| a.resource.key.cmp(&b.resource.key));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(key: &str, owner: &str, value: &str) -> Resource {
        Resource {
            key: key.to_string(),
            owner: owner.to_string(),
            value: value.to_string(),
            r#type: String::new(),
        }
    }

    #[tokio::test]
    async fn test_reserve_inserts_fresh_record() {
        let store = InMemoryLockStore::new();
        let record = store.reserve(&resource("k", "a", "v"), 10).await.unwrap();

        assert_eq!(record.modified_index, 1);
        assert!(!record.modified_id.is_empty());
        assert_eq!(record.resource.owner, "a");
        assert_eq!(record.ttl_seconds, 10);
    }

    #[tokio::test]
    async fn test_reserve_different_owner_collides() {
        let store = InMemoryLockStore::new();
        store.reserve(&resource("k", "a", "v"), 10).await.unwrap();

        let result = store.reserve(&resource("k", "b", "w"), 10).await;
        assert!(matches!(result, Err(LockError::LockCollision(_))));

        // The original holder is untouched
        let current = store.fetch("k").await.unwrap();
        assert_eq!(current.resource.owner, "a");
        assert_eq!(current.resource.value, "v");
    }

    #[tokio::test]
    async fn test_reserve_same_owner_is_idempotent_renewal() {
        let store = InMemoryLockStore::new();
        let first = store.reserve(&resource("k", "a", "v1"), 5).await.unwrap();
        let second = store.reserve(&resource("k", "a", "v2"), 5).await.unwrap();

        assert_eq!(second.resource.owner, "a");
        assert_eq!(second.resource.value, "v2");
        assert_eq!(second.modified_index, first.modified_index + 1);
        assert_eq!(second.modified_id, first.modified_id);
    }

    #[tokio::test]
    async fn test_modified_index_strictly_increases() {
        let store = InMemoryLockStore::new();
        let mut last = 0;
        for _ in 0..5 {
            let record = store.reserve(&resource("k", "a", "v"), 5).await.unwrap();
            assert!(record.modified_index > last);
            last = record.modified_index;
        }
    }

    #[tokio::test]
    async fn test_recreated_record_gets_new_modified_id() {
        let store = InMemoryLockStore::new();
        let first = store.reserve(&resource("k", "a", "v"), 5).await.unwrap();
        store.release("k", "a").await.unwrap();
        let second = store.reserve(&resource("k", "b", "w"), 5).await.unwrap();

        assert_ne!(first.modified_id, second.modified_id);
        assert_eq!(second.modified_index, 1);
    }

    #[tokio::test]
    async fn test_release_requires_owner() {
        let store = InMemoryLockStore::new();
        store.reserve(&resource("k", "a", "v"), 5).await.unwrap();

        let result = store.release("k", "b").await;
        assert!(matches!(result, Err(LockError::NotOwner(_))));

        // Record is intact
        assert_eq!(store.fetch("k").await.unwrap().resource.owner, "a");

        store.release("k", "a").await.unwrap();
        assert!(matches!(store.fetch("k").await, Err(LockError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_release_missing_key_is_not_found() {
        let store = InMemoryLockStore::new();
        let result = store.release("nope", "a").await;
        assert!(matches!(result, Err(LockError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_compact_matches_index() {
        let store = InMemoryLockStore::new();
        let record = store.reserve(&resource("k", "a", "v"), 5).await.unwrap();

        let outcome = store.compact("k", record.modified_index).await.unwrap();
        assert_eq!(outcome, CompactOutcome::Compacted);
        assert!(matches!(store.fetch("k").await, Err(LockError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_compact_stale_after_renewal() {
        let store = InMemoryLockStore::new();
        let record = store.reserve(&resource("k", "a", "v"), 5).await.unwrap();
        store.reserve(&resource("k", "a", "v"), 5).await.unwrap();

        let outcome = store.compact("k", record.modified_index).await.unwrap();
        assert_eq!(outcome, CompactOutcome::Stale);
        // The renewed record survives
        assert!(store.fetch("k").await.is_ok());
    }

    #[tokio::test]
    async fn test_compact_missing_key_is_not_found() {
        let store = InMemoryLockStore::new();
        let outcome = store.compact("k", 1).await.unwrap();
        assert_eq!(outcome, CompactOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_fetch_all_filters_by_type() {
        let store = InMemoryLockStore::new();
        let mut lock = resource("a", "o1", "v");
        lock.r#type = "lock".to_string();
        let mut presence = resource("b", "o2", "v");
        presence.r#type = "presence".to_string();
        store.reserve(&lock, 5).await.unwrap();
        store.reserve(&presence, 5).await.unwrap();

        let all = store.fetch_all(None).await.unwrap();
        assert_eq!(all.len(), 2);
        // Wildcard via empty string
        assert_eq!(store.fetch_all(Some("")).await.unwrap().len(), 2);

        let only_locks = store.fetch_all(Some("lock")).await.unwrap();
        assert_eq!(only_locks.len(), 1);
        assert_eq!(only_locks[0].resource.key, "a");
    }

    #[tokio::test]
    async fn test_concurrent_reserve_single_winner() {
        let store = Arc::new(InMemoryLockStore::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .reserve(&resource("contested", &format!("owner-{}", i), "v"), 10)
                    .await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
