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

//! gRPC client wrapper for the PlexLock service.

use async_trait::async_trait;
use plexlock_proto::v1::{FetchAllRequest, FetchRequest, LockRequest, ReleaseRequest, Resource};
use plexlock_proto::LockServiceClient;
use thiserror::Error;
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Identity};
use tonic::Status;

use crate::runner::LockApi;

/// Connection errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid endpoint '{0}'")]
    InvalidEndpoint(String),
    #[error("failed to read TLS file '{path}': {source}")]
    Tls {
        path: String,
        source: std::io::Error,
    },
    #[error("connection failed: {0}")]
    Connection(String),
}

/// Paths to the client's mutual-TLS material.
#[derive(Debug, Clone)]
pub struct ClientTlsSettings {
    /// CA bundle the server certificate is verified against
    pub ca_file: String,
    /// Client certificate (PEM)
    pub cert_file: String,
    /// Client private key (PEM)
    pub key_file: String,
    /// Override for the hostname expected in the server certificate
    pub domain_name: Option<String>,
}

/// Client for the PlexLock gRPC service.
///
/// Cloning is cheap: tonic channels are reference-counted internally.
#[derive(Clone)]
pub struct LockClient {
    inner: LockServiceClient<Channel>,
}

impl LockClient {
    /// Connect to a PlexLock server.
    ///
    /// `address` may omit the scheme; `http://` (or `https://` with TLS
    /// settings) is assumed.
    pub async fn connect(
        address: &str,
        tls: Option<ClientTlsSettings>,
    ) -> Result<Self, ClientError> {
        let scheme = if tls.is_some() { "https" } else { "http" };
        let endpoint = if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("{}://{}", scheme, address)
        };

        let mut endpoint = Channel::from_shared(endpoint.clone())
            .map_err(|_| ClientError::InvalidEndpoint(endpoint))?;

        if let Some(tls) = tls {
            let read = |path: String| async move {
                tokio::fs::read(&path)
                    .await
                    .map_err(|e| ClientError::Tls { path, source: e })
            };
            let ca = Certificate::from_pem(read(tls.ca_file).await?);
            let identity =
                Identity::from_pem(read(tls.cert_file).await?, read(tls.key_file).await?);

            let mut tls_config = ClientTlsConfig::new().ca_certificate(ca).identity(identity);
            if let Some(domain) = tls.domain_name {
                tls_config = tls_config.domain_name(domain);
            }
            endpoint = endpoint
                .tls_config(tls_config)
                .map_err(|e| ClientError::Connection(e.to_string()))?;
        }

        let channel = endpoint
            .connect()
            .await
            .map_err(|e| ClientError::Connection(e.to_string()))?;

        Ok(Self {
            inner: LockServiceClient::new(channel),
        })
    }

    /// Look up the resource currently held under `key`.
    pub async fn fetch(&self, key: &str) -> Result<Resource, Status> {
        let mut client = self.inner.clone();
        let response = client
            .fetch(FetchRequest {
                key: key.to_string(),
            })
            .await?;
        response
            .into_inner()
            .resource
            .ok_or_else(|| Status::internal("fetch response carried no resource"))
    }

    /// All held resources, optionally filtered by exact type match.
    pub async fn fetch_all(&self, type_filter: &str) -> Result<Vec<Resource>, Status> {
        let mut client = self.inner.clone();
        let response = client
            .fetch_all(FetchAllRequest {
                r#type: type_filter.to_string(),
            })
            .await?;
        Ok(response.into_inner().resources)
    }
}

#[async_trait]
impl LockApi for LockClient {
    async fn lock(&self, resource: Resource, ttl_in_seconds: i64) -> Result<(), Status> {
        let mut client = self.inner.clone();
        client
            .lock(LockRequest {
                resource: Some(resource),
                ttl_in_seconds,
            })
            .await?;
        Ok(())
    }

    async fn release(&self, resource: Resource) -> Result<(), Status> {
        let mut client = self.inner.clone();
        client
            .release(ReleaseRequest {
                resource: Some(resource),
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_endpoint_is_rejected() {
        let result = LockClient::connect("http://\u{0}bad", None).await;
        assert!(matches!(result, Err(ClientError::InvalidEndpoint(_))));
    }

    #[tokio::test]
    async fn test_missing_tls_files_surface_error() {
        let result = LockClient::connect(
            "localhost:8891",
            Some(ClientTlsSettings {
                ca_file: "/nonexistent/ca.pem".to_string(),
                cert_file: "/nonexistent/cert.pem".to_string(),
                key_file: "/nonexistent/key.pem".to_string(),
                domain_name: None,
            }),
        )
        .await;
        assert!(matches!(result, Err(ClientError::Tls { .. })));
    }
}
