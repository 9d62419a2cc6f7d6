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

//! Mutual-TLS wiring for the gRPC listener.

use thiserror::Error;
use tonic::transport::{Certificate, Identity, ServerTlsConfig};

use crate::config::ServerConfig;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read TLS file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("TLS material is not configured")]
    NotConfigured,
}

async fn read_pem(path: &str) -> Result<Vec<u8>, TlsError> {
    tokio::fs::read(path).await.map_err(|e| TlsError::Io {
        path: path.to_string(),
        source: e,
    })
}

/// Build the tonic server TLS config from the configured PEM files.
///
/// The CA file is installed as the client certificate root, so every
/// client must present a certificate signed by it (mutual TLS).
pub async fn server_tls_config(config: &ServerConfig) -> Result<ServerTlsConfig, TlsError> {
    let (ca_file, cert_file, key_file) = match (&config.ca_file, &config.cert_file, &config.key_file)
    {
        (Some(ca), Some(cert), Some(key)) => (ca, cert, key),
        _ => return Err(TlsError::NotConfigured),
    };

    let cert = read_pem(cert_file).await?;
    let key = read_pem(key_file).await?;
    let identity = Identity::from_pem(cert, key);

    let ca = read_pem(ca_file).await?;
    let client_ca = Certificate::from_pem(ca);

    Ok(ServerTlsConfig::new()
        .identity(identity)
        .client_ca_root(client_ca))
}
