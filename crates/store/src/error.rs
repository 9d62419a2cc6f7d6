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

//! Error types for lock operations.

use thiserror::Error;

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

/// Errors that can occur during lock operations.
#[derive(Error, Debug)]
pub enum LockError {
    /// Requested TTL was zero or negative
    #[error("invalid TTL: {0}")]
    InvalidTtl(i64),

    /// Key is held by a different owner
    #[error("lock collision: key '{0}' is held by another owner")]
    LockCollision(String),

    /// Referenced key is absent
    #[error("lock not found: '{0}'")]
    NotFound(String),

    /// Release attempted by an owner that does not hold the lock
    #[error("lock '{0}' is not owned by the caller")]
    NotOwner(String),

    /// Transport or serialization failure in the backing store
    #[error("backend error: {0}")]
    Backend(String),
}

impl LockError {
    /// Whether a caller may retry the failed operation verbatim.
    ///
    /// Only backend failures are transient; the logical outcomes
    /// (collision, not-found, not-owner, invalid TTL) will not change on
    /// retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LockError::Backend(_))
    }
}

#[cfg(any(feature = "sqlite-backend", feature = "postgres-backend"))]
impl From<sqlx::Error> for LockError {
    fn from(err: sqlx::Error) -> Self {
        LockError::Backend(format!("SQL error: {}", err))
    }
}
