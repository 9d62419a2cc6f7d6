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

//! gRPC surface: marshalling between the wire and the lock handler.

use plexlock_proto::v1::{
    FetchAllRequest, FetchAllResponse, FetchRequest, FetchResponse, LockRequest, LockResponse,
    ReleaseRequest, ReleaseResponse,
};
use plexlock_proto::LockService;
use plexlock_store::LockError;
use std::sync::Arc;
use tonic::{Request, Response, Status};

use crate::handler::LockHandler;

/// LockService gRPC implementation. Pure dispatch: unwrap the request,
/// call the handler, map domain errors onto status codes.
pub struct LockServiceImpl {
    handler: Arc<LockHandler>,
}

impl LockServiceImpl {
    pub fn new(handler: Arc<LockHandler>) -> Self {
        Self { handler }
    }
}

fn status_from_lock_error(err: LockError) -> Status {
    match &err {
        LockError::InvalidTtl(_) => Status::invalid_argument(err.to_string()),
        LockError::LockCollision(_) => Status::already_exists(err.to_string()),
        LockError::NotFound(_) => Status::not_found(err.to_string()),
        LockError::NotOwner(_) => Status::permission_denied(err.to_string()),
        LockError::Backend(_) => Status::unavailable(err.to_string()),
    }
}

#[tonic::async_trait]
impl LockService for LockServiceImpl {
    async fn lock(
        &self,
        request: Request<LockRequest>,
    ) -> Result<Response<LockResponse>, Status> {
        let req = request.into_inner();
        let resource = req
            .resource
            .ok_or_else(|| Status::invalid_argument("missing resource"))?;

        self.handler
            .lock(&resource, req.ttl_in_seconds)
            .await
            .map_err(status_from_lock_error)?;

        Ok(Response::new(LockResponse {}))
    }

    async fn release(
        &self,
        request: Request<ReleaseRequest>,
    ) -> Result<Response<ReleaseResponse>, Status> {
        let req = request.into_inner();
        let resource = req
            .resource
            .ok_or_else(|| Status::invalid_argument("missing resource"))?;

        self.handler
            .release(&resource)
            .await
            .map_err(status_from_lock_error)?;

        Ok(Response::new(ReleaseResponse {}))
    }

    async fn fetch(
        &self,
        request: Request<FetchRequest>,
    ) -> Result<Response<FetchResponse>, Status> {
        let req = request.into_inner();

        let resource = self
            .handler
            .fetch(&req.key)
            .await
            .map_err(status_from_lock_error)?;

        Ok(Response::new(FetchResponse {
            resource: Some(resource),
        }))
    }

    async fn fetch_all(
        &self,
        request: Request<FetchAllRequest>,
    ) -> Result<Response<FetchAllResponse>, Status> {
        let req = request.into_inner();

        let resources = self
            .handler
            .fetch_all(Some(req.r#type.as_str()))
            .await
            .map_err(status_from_lock_error)?;

        Ok(Response::new(FetchAllResponse { resources }))
    }
}
