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

//! Lock store trait and the record it persists.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use plexlock_proto::v1::Resource;

use crate::error::LockResult;

/// A row in the lock table.
///
/// `modified_index` starts at 1 when a key transitions from absent to
/// present and increments on every successful write to the row.
/// `modified_id` is regenerated only on the absent-to-present transition,
/// so the expiration scheduler can tell a renewed lock apart from a
/// re-created one. `modified_at` records the instant of the last write and
/// drives remaining-TTL computation after a renewal.
#[derive(Debug, Clone, PartialEq)]
pub struct LockRecord {
    pub resource: Resource,
    pub ttl_seconds: i64,
    pub modified_index: i64,
    pub modified_id: String,
    pub modified_at: DateTime<Utc>,
}

/// Outcome of a conditional delete keyed on `modified_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactOutcome {
    /// The row matched the expected index and was deleted.
    Compacted,
    /// No row exists for the key.
    NotFound,
    /// The row's index advanced past the expected one; a renewal or
    /// re-acquire won the race.
    Stale,
}

/// Trait for the durable lock table.
///
/// ## Purpose
/// Serialized, durable reads and compare-and-set writes over the lock
/// table. The store is the single point of serialization between
/// otherwise-concurrent acquires: two `reserve` calls with different
/// owners for the same empty key must see exactly one winner.
///
/// ## Atomicity
/// `reserve` and `compact` execute as single atomic statements against the
/// backing store; there is no read-then-write across two round-trips.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Atomically claim or refresh `resource.key`.
    ///
    /// ## Behavior
    /// - No row for the key: insert one with `modified_index = 1` and a
    ///   fresh `modified_id`.
    /// - Row held by the same owner: update `value`, `type`, and TTL, bump
    ///   `modified_index`, keep `modified_id`.
    /// - Row held by a different owner: fail with
    ///   [`LockError::LockCollision`](crate::LockError::LockCollision).
    async fn reserve(&self, resource: &Resource, ttl_seconds: i64) -> LockResult<LockRecord>;

    /// Delete the row for `key` iff its `modified_index` still equals
    /// `expected_modified_index`.
    async fn compact(&self, key: &str, expected_modified_index: i64)
        -> LockResult<CompactOutcome>;

    /// Delete the row for `key` iff it is held by `owner`.
    ///
    /// ## Returns
    /// - `Err(NotFound)` when no row exists
    /// - `Err(NotOwner)` when the row is held by somebody else
    async fn release(&self, key: &str, owner: &str) -> LockResult<()>;

    /// Look up the row for `key`, or `Err(NotFound)`.
    async fn fetch(&self, key: &str) -> LockResult<LockRecord>;

    /// All rows, optionally filtered by exact `type` match. An empty or
    /// absent filter is a wildcard. Order is stable within a single call.
    async fn fetch_all(&self, type_filter: Option<&str>) -> LockResult<Vec<LockRecord>>;
}
