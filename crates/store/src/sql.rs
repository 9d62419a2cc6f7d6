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

//! SQL-based lock store implementations (SQLite and PostgreSQL).
//!
//! Both backends share one design:
//!
//! - One `locks` table keyed by `lock_key`
//! - `reserve` is a single `INSERT .. ON CONFLICT DO UPDATE .. WHERE owner
//!   matches .. RETURNING` statement, so the one-winner-per-key guarantee
//!   comes from the database, not from a read-then-write transaction
//! - `compact` and `release` are single conditional `DELETE`s; when zero
//!   rows match, a follow-up read only classifies the failure
//!
//! Timestamps are stored as UNIX epoch seconds.

use chrono::{DateTime, Utc};
use plexlock_proto::v1::Resource;
use tracing::instrument;
use ulid::Ulid;

use crate::error::{LockError, LockResult};
use crate::store::{CompactOutcome, LockRecord, LockStore};

use async_trait::async_trait;
use sqlx::Row;

#[cfg(feature = "sqlite-backend")]
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

#[cfg(feature = "postgres-backend")]
use sqlx::postgres::{PgPool, PgPoolOptions};

fn now_epoch_secs() -> i64 {
    Utc::now().timestamp()
}

#[allow(clippy::too_many_arguments)]
fn record_from_parts(
    lock_key: String,
    owner: String,
    value: String,
    lock_type: String,
    ttl_seconds: i64,
    modified_index: i64,
    modified_id: String,
    modified_at: i64,
) -> LockResult<LockRecord> {
    let modified_at = DateTime::<Utc>::from_timestamp(modified_at, 0)
        .ok_or_else(|| LockError::Backend(format!("invalid modified_at: {}", modified_at)))?;
    Ok(LockRecord {
        resource: Resource {
            key: lock_key,
            owner,
            value,
            r#type: lock_type,
        },
        ttl_seconds,
        modified_index,
        modified_id,
        modified_at,
    })
}

/// SQLite-backed lock store.
///
/// Schema, created on connect:
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS locks (
///   lock_key       TEXT PRIMARY KEY,
///   owner          TEXT NOT NULL,
///   value          TEXT NOT NULL,
///   lock_type      TEXT NOT NULL DEFAULT '',
///   ttl_seconds    BIGINT NOT NULL,
///   modified_index BIGINT NOT NULL,
///   modified_id    TEXT NOT NULL,
///   modified_at    BIGINT NOT NULL
/// );
/// ```
#[cfg(feature = "sqlite-backend")]
#[derive(Clone)]
pub struct SqliteLockStore {
    pool: SqlitePool,
}

#[cfg(feature = "sqlite-backend")]
impl SqliteLockStore {
    /// Connect and initialize the schema.
    ///
    /// `database_url` is any valid `sqlx` SQLite URL, e.g.
    /// `sqlite::memory:` or `sqlite://locks.db`. In-memory databases
    /// should use `max_connections = 1`, since every SQLite connection
    /// gets its own private memory database.
    #[instrument(skip(database_url))]
    pub async fn new(database_url: &str, max_connections: u32) -> LockResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| LockError::Backend(format!("failed to connect SQLite: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS locks (
              lock_key       TEXT PRIMARY KEY,
              owner          TEXT NOT NULL,
              value          TEXT NOT NULL,
              lock_type      TEXT NOT NULL DEFAULT '',
              ttl_seconds    BIGINT NOT NULL,
              modified_index BIGINT NOT NULL,
              modified_id    TEXT NOT NULL,
              modified_at    BIGINT NOT NULL
            );
        "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| LockError::Backend(format!("failed to create locks table: {}", e)))?;

        sqlx::query(
            r#"CREATE INDEX IF NOT EXISTS idx_locks_type ON locks(lock_type);"#,
        )
        .execute(&pool)
        .await
        .map_err(|e| LockError::Backend(format!("failed to create index: {}", e)))?;

        Ok(Self { pool })
    }

    fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> LockResult<LockRecord> {
        record_from_parts(
            row.get("lock_key"),
            row.get("owner"),
            row.get("value"),
            row.get("lock_type"),
            row.get("ttl_seconds"),
            row.get("modified_index"),
            row.get("modified_id"),
            row.get("modified_at"),
        )
    }
}

#[cfg(feature = "sqlite-backend")]
#[async_trait]
impl LockStore for SqliteLockStore {
    #[instrument(skip(self, resource), fields(lock_key = %resource.key, owner = %resource.owner))]
    async fn reserve(&self, resource: &Resource, ttl_seconds: i64) -> LockResult<LockRecord> {
        let modified_id = Ulid::new().to_string();
        let row = sqlx::query(
            r#"INSERT INTO locks
               (lock_key, owner, value, lock_type, ttl_seconds, modified_index, modified_id, modified_at)
               VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?7)
               ON CONFLICT (lock_key) DO UPDATE SET
                 value = excluded.value,
                 lock_type = excluded.lock_type,
                 ttl_seconds = excluded.ttl_seconds,
                 modified_index = locks.modified_index + 1,
                 modified_at = excluded.modified_at
               WHERE locks.owner = excluded.owner
               RETURNING lock_key, owner, value, lock_type, ttl_seconds,
                         modified_index, modified_id, modified_at"#,
        )
        .bind(&resource.key)
        .bind(&resource.owner)
        .bind(&resource.value)
        .bind(&resource.r#type)
        .bind(ttl_seconds)
        .bind(&modified_id)
        .bind(now_epoch_secs())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LockError::Backend(format!("reserve: {}", e)))?;

        match row {
            Some(row) => Self::record_from_row(&row),
            None => Err(LockError::LockCollision(resource.key.clone())),
        }
    }

    #[instrument(skip(self), fields(lock_key = %key, expected = expected_modified_index))]
    async fn compact(
        &self,
        key: &str,
        expected_modified_index: i64,
    ) -> LockResult<CompactOutcome> {
        let deleted = sqlx::query(
            r#"DELETE FROM locks WHERE lock_key = ?1 AND modified_index = ?2"#,
        )
        .bind(key)
        .bind(expected_modified_index)
        .execute(&self.pool)
        .await
        .map_err(|e| LockError::Backend(format!("compact: {}", e)))?
        .rows_affected();

        if deleted > 0 {
            return Ok(CompactOutcome::Compacted);
        }

        // Classification only: the conditional delete above is the atomic step
        let row = sqlx::query(r#"SELECT modified_index FROM locks WHERE lock_key = ?1"#)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| LockError::Backend(format!("compact classify: {}", e)))?;

        match row {
            None => Ok(CompactOutcome::NotFound),
            Some(_) => Ok(CompactOutcome::Stale),
        }
    }

    #[instrument(skip(self), fields(lock_key = %key, owner = %owner))]
    async fn release(&self, key: &str, owner: &str) -> LockResult<()> {
        let deleted = sqlx::query(r#"DELETE FROM locks WHERE lock_key = ?1 AND owner = ?2"#)
            .bind(key)
            .bind(owner)
            .execute(&self.pool)
            .await
            .map_err(|e| LockError::Backend(format!("release: {}", e)))?
            .rows_affected();

        if deleted > 0 {
            return Ok(());
        }

        let row = sqlx::query(r#"SELECT owner FROM locks WHERE lock_key = ?1"#)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| LockError::Backend(format!("release classify: {}", e)))?;

        match row {
            None => Err(LockError::NotFound(key.to_string())),
            Some(_) => Err(LockError::NotOwner(key.to_string())),
        }
    }

    #[instrument(skip(self), fields(lock_key = %key))]
    async fn fetch(&self, key: &str) -> LockResult<LockRecord> {
        let row = sqlx::query(
            r#"SELECT lock_key, owner, value, lock_type, ttl_seconds,
                      modified_index, modified_id, modified_at
               FROM locks WHERE lock_key = ?1"#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LockError::Backend(format!("fetch: {}", e)))?;

        match row {
            Some(row) => Self::record_from_row(&row),
            None => Err(LockError::NotFound(key.to_string())),
        }
    }

    #[instrument(skip(self))]
    async fn fetch_all(&self, type_filter: Option<&str>) -> LockResult<Vec<LockRecord>> {
        let rows = sqlx::query(
            r#"SELECT lock_key, owner, value, lock_type, ttl_seconds,
                      modified_index, modified_id, modified_at
               FROM locks
               WHERE ?1 = '' OR lock_type = ?1
               ORDER BY lock_key"#,
        )
        .bind(type_filter.unwrap_or(""))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LockError::Backend(format!("fetch_all: {}", e)))?;

        rows.iter().map(Self::record_from_row).collect()
    }
}

/// PostgreSQL-backed lock store.
///
/// Same schema and statement shapes as [`SqliteLockStore`]; this is the
/// backend for multi-replica deployments, where the shared database
/// serializes concurrent reserves.
#[cfg(feature = "postgres-backend")]
#[derive(Clone)]
pub struct PostgresLockStore {
    pool: PgPool,
}

#[cfg(feature = "postgres-backend")]
impl PostgresLockStore {
    /// Connect, size the pool, and initialize the schema.
    #[instrument(skip(database_url))]
    pub async fn new(database_url: &str, max_connections: u32) -> LockResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| LockError::Backend(format!("failed to connect PostgreSQL: {}", e)))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS locks (
              lock_key       TEXT PRIMARY KEY,
              owner          TEXT NOT NULL,
              value          TEXT NOT NULL,
              lock_type      TEXT NOT NULL DEFAULT '',
              ttl_seconds    BIGINT NOT NULL,
              modified_index BIGINT NOT NULL,
              modified_id    TEXT NOT NULL,
              modified_at    BIGINT NOT NULL
            );
        "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| LockError::Backend(format!("failed to create locks table: {}", e)))?;

        sqlx::query(
            r#"CREATE INDEX IF NOT EXISTS idx_locks_type ON locks(lock_type);"#,
        )
        .execute(&pool)
        .await
        .map_err(|e| LockError::Backend(format!("failed to create index: {}", e)))?;

        Ok(Self { pool })
    }

    fn record_from_row(row: &sqlx::postgres::PgRow) -> LockResult<LockRecord> {
        record_from_parts(
            row.get("lock_key"),
            row.get("owner"),
            row.get("value"),
            row.get("lock_type"),
            row.get("ttl_seconds"),
            row.get("modified_index"),
            row.get("modified_id"),
            row.get("modified_at"),
        )
    }
}

#[cfg(feature = "postgres-backend")]
#[async_trait]
impl LockStore for PostgresLockStore {
    #[instrument(skip(self, resource), fields(lock_key = %resource.key, owner = %resource.owner))]
    async fn reserve(&self, resource: &Resource, ttl_seconds: i64) -> LockResult<LockRecord> {
        let modified_id = Ulid::new().to_string();
        let row = sqlx::query(
            r#"INSERT INTO locks
               (lock_key, owner, value, lock_type, ttl_seconds, modified_index, modified_id, modified_at)
               VALUES ($1, $2, $3, $4, $5, 1, $6, $7)
               ON CONFLICT (lock_key) DO UPDATE SET
                 value = excluded.value,
                 lock_type = excluded.lock_type,
                 ttl_seconds = excluded.ttl_seconds,
                 modified_index = locks.modified_index + 1,
                 modified_at = excluded.modified_at
               WHERE locks.owner = excluded.owner
               RETURNING lock_key, owner, value, lock_type, ttl_seconds,
                         modified_index, modified_id, modified_at"#,
        )
        .bind(&resource.key)
        .bind(&resource.owner)
        .bind(&resource.value)
        .bind(&resource.r#type)
        .bind(ttl_seconds)
        .bind(&modified_id)
        .bind(now_epoch_secs())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LockError::Backend(format!("reserve: {}", e)))?;

        match row {
            Some(row) => Self::record_from_row(&row),
            None => Err(LockError::LockCollision(resource.key.clone())),
        }
    }

    #[instrument(skip(self), fields(lock_key = %key, expected = expected_modified_index))]
    async fn compact(
        &self,
        key: &str,
        expected_modified_index: i64,
    ) -> LockResult<CompactOutcome> {
        let deleted = sqlx::query(
            r#"DELETE FROM locks WHERE lock_key = $1 AND modified_index = $2"#,
        )
        .bind(key)
        .bind(expected_modified_index)
        .execute(&self.pool)
        .await
        .map_err(|e| LockError::Backend(format!("compact: {}", e)))?
        .rows_affected();

        if deleted > 0 {
            return Ok(CompactOutcome::Compacted);
        }

        let row = sqlx::query(r#"SELECT modified_index FROM locks WHERE lock_key = $1"#)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| LockError::Backend(format!("compact classify: {}", e)))?;

        match row {
            None => Ok(CompactOutcome::NotFound),
            Some(_) => Ok(CompactOutcome::Stale),
        }
    }

    #[instrument(skip(self), fields(lock_key = %key, owner = %owner))]
    async fn release(&self, key: &str, owner: &str) -> LockResult<()> {
        let deleted = sqlx::query(r#"DELETE FROM locks WHERE lock_key = $1 AND owner = $2"#)
            .bind(key)
            .bind(owner)
            .execute(&self.pool)
            .await
            .map_err(|e| LockError::Backend(format!("release: {}", e)))?
            .rows_affected();

        if deleted > 0 {
            return Ok(());
        }

        let row = sqlx::query(r#"SELECT owner FROM locks WHERE lock_key = $1"#)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| LockError::Backend(format!("release classify: {}", e)))?;

        match row {
            None => Err(LockError::NotFound(key.to_string())),
            Some(_) => Err(LockError::NotOwner(key.to_string())),
        }
    }

    #[instrument(skip(self), fields(lock_key = %key))]
    async fn fetch(&self, key: &str) -> LockResult<LockRecord> {
        let row = sqlx::query(
            r#"SELECT lock_key, owner, value, lock_type, ttl_seconds,
                      modified_index, modified_id, modified_at
               FROM locks WHERE lock_key = $1"#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LockError::Backend(format!("fetch: {}", e)))?;

        match row {
            Some(row) => Self::record_from_row(&row),
            None => Err(LockError::NotFound(key.to_string())),
        }
    }

    #[instrument(skip(self))]
    async fn fetch_all(&self, type_filter: Option<&str>) -> LockResult<Vec<LockRecord>> {
        let rows = sqlx::query(
            r#"SELECT lock_key, owner, value, lock_type, ttl_seconds,
                      modified_index, modified_id, modified_at
               FROM locks
               WHERE $1 = '' OR lock_type = $1
               ORDER BY lock_key"#,
        )
        .bind(type_filter.unwrap_or(""))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LockError::Backend(format!("fetch_all: {}", e)))?;

        rows.iter().map(Self::record_from_row).collect()
    }
}
