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

//! # PlexLock Server
//!
//! ## Purpose
//! The server half of PlexLock: validates acquires, reserves rows in the
//! shared store, arms expiration timers, and answers lookups — all behind
//! a four-method gRPC surface.
//!
//! ## Architecture Context
//! - [`handler::LockHandler`] is the engine the RPC layer calls; it
//!   composes the store and the expiration registry
//! - [`grpc::LockServiceImpl`] is pure marshalling over the handler
//! - [`config`], [`tls`], and [`tracing_setup`] wire up the process

pub mod config;
pub mod grpc;
pub mod handler;
pub mod tls;
pub mod tracing_setup;

pub use config::{DatabaseDriver, ServerConfig};
pub use grpc::LockServiceImpl;
pub use handler::LockHandler;
