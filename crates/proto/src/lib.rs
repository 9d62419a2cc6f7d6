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

//! PlexLock Protocol Buffers
//!
//! Generated protobuf definitions for the PlexLock lock service wire
//! surface. The generated sources are vendored under `src/generated/` so
//! builds do not require `protoc`.

// Allow clippy warnings for generated code
#![allow(clippy::doc_lazy_continuation)]
#![allow(clippy::large_enum_variant)]

// Include generated modules - these match the buf generated file names
pub mod v1 {
    // Note: The plexlock.v1.rs file already includes plexlock.v1.tonic.rs at the end
    include!("generated/plexlock.v1.rs");
}

// Re-export the service entry points for convenience
pub use v1::lock_service_client::LockServiceClient;
pub use v1::lock_service_server::{LockService, LockServiceServer};
