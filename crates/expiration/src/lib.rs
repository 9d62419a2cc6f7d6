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

//! # PlexLock Expiration
//!
//! ## Purpose
//! Ensures every lock record disappears from the store once its TTL passes
//! without a renewal. Each accepted acquire arms a per-record timer; when
//! the timer fires it re-checks the store, re-arms if the holder renewed in
//! the meantime, and otherwise compacts the row.
//!
//! ## Design
//! - Timers are keyed by `(key, modified_id)`, so a re-created row gets its
//!   own timer and a stale timer discards itself on fire
//! - Arming is idempotent per `(key, modified_id)` and never blocks
//! - The timer table mutex is held only for map updates, never across
//!   store calls
//! - Store failures on the fire path re-arm with bounded backoff; a record
//!   is never leaked, only collected late

pub mod reaper;

pub use reaper::{LockReaper, TtlRegistry};
