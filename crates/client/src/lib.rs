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

//! # PlexLock Client
//!
//! ## Purpose
//! The client half of PlexLock: a thin gRPC wrapper ([`LockClient`]) and
//! the long-lived task that owns one lock on behalf of an application
//! ([`LockRunner`]). The runner acquires with retries, renews on an
//! interval, surfaces loss of the lock as a fatal error, and releases on
//! cancellation.
//!
//! ## Example
//! ```rust,no_run
//! use plexlock_client::{LockClient, LockRunner, RETRY_INTERVAL, DEFAULT_SESSION_TTL_SECONDS};
//! use plexlock_common::SystemClock;
//! use plexlock_proto::v1::Resource;
//! use std::sync::Arc;
//! use tokio::sync::oneshot;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = LockClient::connect("localhost:8891", None).await?;
//!
//! let runner = LockRunner::new(
//!     Arc::new(client),
//!     Resource {
//!         key: "migrations".to_string(),
//!         owner: "worker-7".to_string(),
//!         value: "10.0.0.5:8080".to_string(),
//!         r#type: "lock".to_string(),
//!     },
//!     DEFAULT_SESSION_TTL_SECONDS,
//!     Arc::new(SystemClock::new()),
//!     RETRY_INTERVAL,
//! );
//!
//! let (ready_tx, ready_rx) = oneshot::channel();
//! let shutdown = CancellationToken::new();
//! let handle = tokio::spawn(runner.run(ready_tx, shutdown.clone()));
//!
//! ready_rx.await?;
//! // ... the lock is held while `handle` is running ...
//! shutdown.cancel();
//! handle.await??;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod runner;

use std::time::Duration;

/// How long the runner waits between acquisition attempts and renewals.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Default lock lifetime requested by the runner.
pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 15;

pub use client::{ClientError, ClientTlsSettings, LockClient};
pub use runner::{LockApi, LockRunner, RunnerError, RunnerResult};
