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

//! SQLite lock store integration tests.
//!
//! These tests verify the store contract against a real database:
//! - Atomic reserve (insert, same-owner refresh, collision)
//! - Concurrent-reserve serialization across pool connections
//! - Conditional compaction keyed on `modified_index`
//! - Owner-checked release
//! - Fetch and type-filtered fetch-all

#[cfg(feature = "sqlite-backend")]
mod tests {
    use plexlock_proto::v1::Resource;
    use plexlock_store::{
        sql::SqliteLockStore, CompactOutcome, LockError, LockStore,
    };
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    fn resource(key: &str, owner: &str, value: &str, lock_type: &str) -> Resource {
        Resource {
            key: key.to_string(),
            owner: owner.to_string(),
            value: value.to_string(),
            r#type: lock_type.to_string(),
        }
    }

    /// Create a store over an in-memory database. A single connection is
    /// required: every SQLite connection gets its own `:memory:` database.
    async fn create_store() -> SqliteLockStore {
        SqliteLockStore::new("sqlite::memory:", 1).await.unwrap()
    }

    /// Create a store over a file-backed database so the pool can hold
    /// several real connections. `sqlite::memory:` cannot be shared
    /// between connections, and cross-connection contention is exactly
    /// what the serialization test needs.
    async fn create_shared_store(name: &str, max_connections: u32) -> (SqliteLockStore, PathBuf) {
        let path = std::env::temp_dir().join(format!("plexlock-{}-{}.db", name, std::process::id()));
        remove_database(&path);
        let url = format!("sqlite://{}?mode=rwc", path.display());
        let store = SqliteLockStore::new(&url, max_connections).await.unwrap();
        (store, path)
    }

    fn remove_database(path: &Path) {
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }

    #[tokio::test]
    async fn test_sqlite_reserve_inserts_row() {
        let store = create_store().await;

        let record = store
            .reserve(&resource("test-lock", "node-1", "10.0.0.5:8891", "lock"), 30)
            .await
            .unwrap();

        assert_eq!(record.resource.key, "test-lock");
        assert_eq!(record.resource.owner, "node-1");
        assert_eq!(record.modified_index, 1);
        assert!(!record.modified_id.is_empty());

        let fetched = store.fetch("test-lock").await.unwrap();
        assert_eq!(fetched.resource, record.resource);
        assert_eq!(fetched.modified_id, record.modified_id);
    }

    #[tokio::test]
    async fn test_sqlite_reserve_collision_leaves_row_intact() {
        let store = create_store().await;

        store
            .reserve(&resource("test-lock", "node-1", "v", "lock"), 30)
            .await
            .unwrap();

        let result = store
            .reserve(&resource("test-lock", "node-2", "w", "lock"), 30)
            .await;
        assert!(matches!(result, Err(LockError::LockCollision(_))));

        let current = store.fetch("test-lock").await.unwrap();
        assert_eq!(current.resource.owner, "node-1");
        assert_eq!(current.resource.value, "v");
        assert_eq!(current.modified_index, 1);
    }

    #[tokio::test]
    async fn test_sqlite_concurrent_reserve_single_winner() {
        let (store, path) = create_shared_store("concurrent-reserve", 8).await;
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .reserve(
                        &resource("contested", &format!("owner-{}", i), "v", "lock"),
                        30,
                    )
                    .await
            }));
        }

        let mut winners = Vec::new();
        let mut collisions = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(record) => winners.push(record),
                Err(LockError::LockCollision(key)) => {
                    assert_eq!(key, "contested");
                    collisions += 1;
                }
                Err(err) => panic!("unexpected reserve error: {}", err),
            }
        }
        assert_eq!(winners.len(), 1);
        assert_eq!(collisions, 15);

        // The surviving row belongs to the single winner and saw one write
        let current = store.fetch("contested").await.unwrap();
        assert_eq!(current.resource.owner, winners[0].resource.owner);
        assert_eq!(current.modified_index, 1);
        assert_eq!(current.modified_id, winners[0].modified_id);

        remove_database(&path);
    }

    #[tokio::test]
    async fn test_sqlite_reserve_same_owner_refreshes() {
        let store = create_store().await;

        let first = store
            .reserve(&resource("test-lock", "node-1", "v1", "lock"), 30)
            .await
            .unwrap();
        let second = store
            .reserve(&resource("test-lock", "node-1", "v2", "lock"), 45)
            .await
            .unwrap();

        assert_eq!(second.modified_index, first.modified_index + 1);
        assert_eq!(second.modified_id, first.modified_id);
        assert_eq!(second.resource.value, "v2");
        assert_eq!(second.ttl_seconds, 45);
    }

    #[tokio::test]
    async fn test_sqlite_modified_id_changes_across_incarnations() {
        let store = create_store().await;

        let first = store
            .reserve(&resource("test-lock", "node-1", "v", "lock"), 30)
            .await
            .unwrap();
        store.release("test-lock", "node-1").await.unwrap();
        let second = store
            .reserve(&resource("test-lock", "node-1", "v", "lock"), 30)
            .await
            .unwrap();

        assert_ne!(first.modified_id, second.modified_id);
        assert_eq!(second.modified_index, 1);
    }

    #[tokio::test]
    async fn test_sqlite_compact_outcomes() {
        let store = create_store().await;

        let record = store
            .reserve(&resource("test-lock", "node-1", "v", "lock"), 30)
            .await
            .unwrap();

        // Renewal bumps the index; compacting with the old index is stale
        store
            .reserve(&resource("test-lock", "node-1", "v", "lock"), 30)
            .await
            .unwrap();
        let stale = store
            .compact("test-lock", record.modified_index)
            .await
            .unwrap();
        assert_eq!(stale, CompactOutcome::Stale);
        assert!(store.fetch("test-lock").await.is_ok());

        // Compacting with the current index deletes the row
        let current = store.fetch("test-lock").await.unwrap();
        let compacted = store
            .compact("test-lock", current.modified_index)
            .await
            .unwrap();
        assert_eq!(compacted, CompactOutcome::Compacted);
        assert!(matches!(
            store.fetch("test-lock").await,
            Err(LockError::NotFound(_))
        ));

        let missing = store.compact("test-lock", 1).await.unwrap();
        assert_eq!(missing, CompactOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_sqlite_release_authorization() {
        let store = create_store().await;

        store
            .reserve(&resource("test-lock", "node-1", "v", "lock"), 30)
            .await
            .unwrap();

        let denied = store.release("test-lock", "node-2").await;
        assert!(matches!(denied, Err(LockError::NotOwner(_))));
        assert!(store.fetch("test-lock").await.is_ok());

        store.release("test-lock", "node-1").await.unwrap();
        let missing = store.release("test-lock", "node-1").await;
        assert!(matches!(missing, Err(LockError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_sqlite_fetch_all_type_filter() {
        let store = create_store().await;

        store
            .reserve(&resource("a-lock", "node-1", "v", "lock"), 30)
            .await
            .unwrap();
        store
            .reserve(&resource("b-presence", "node-2", "v", "presence"), 30)
            .await
            .unwrap();
        store
            .reserve(&resource("c-lock", "node-3", "v", "lock"), 30)
            .await
            .unwrap();

        let all = store.fetch_all(None).await.unwrap();
        assert_eq!(all.len(), 3);
        // Ordered by key within a call
        let keys: Vec<_> = all.iter().map(|r| r.resource.key.as_str()).collect();
        assert_eq!(keys, vec!["a-lock", "b-presence", "c-lock"]);

        let locks = store.fetch_all(Some("lock")).await.unwrap();
        assert_eq!(locks.len(), 2);
        assert!(locks.iter().all(|r| r.resource.r#type == "lock"));

        // Empty string is a wildcard
        assert_eq!(store.fetch_all(Some("")).await.unwrap().len(), 3);
    }
}
