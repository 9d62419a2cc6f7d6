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

//! # PlexLock Store
//!
//! ## Purpose
//! The durable lock table behind the PlexLock server: one row per held
//! key, claimed and refreshed through atomic compare-and-set writes. The
//! store is shared across server replicas and is the single point of
//! serialization between concurrent acquires.
//!
//! ## Design Decisions
//! - **Single-statement writes**: `reserve` and `compact` are one atomic
//!   statement each; the one-winner guarantee comes from the database
//! - **Index-based staleness**: every write bumps `modified_index`, so the
//!   expiration scheduler can detect renewals without coordination
//! - **Incarnation tokens**: `modified_id` changes only when a row is
//!   re-created, distinguishing a re-acquired key from a renewed one
//!
//! ## Backend Support
//!
//! - **InMemory**: HashMap-based (always available, for testing)
//! - **SQLite**: Persistent, single-node (feature: `sqlite-backend`)
//! - **PostgreSQL**: Distributed, multi-node (feature: `postgres-backend`)
//!
//! ## Example
//! ```rust,no_run
//! use plexlock_store::{memory::InMemoryLockStore, LockStore};
//! use plexlock_proto::v1::Resource;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryLockStore::new();
//!
//! let record = store
//!     .reserve(
//!         &Resource {
//!             key: "migrations".to_string(),
//!             owner: "node-1".to_string(),
//!             value: "10.0.0.5:8891".to_string(),
//!             r#type: "lock".to_string(),
//!         },
//!         15,
//!     )
//!     .await?;
//!
//! assert_eq!(record.modified_index, 1);
//! store.release("migrations", "node-1").await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod memory;
pub mod store;

#[cfg(any(feature = "sqlite-backend", feature = "postgres-backend"))]
pub mod sql;

pub use error::{LockError, LockResult};
pub use store::{CompactOutcome, LockRecord, LockStore};
