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

//! Server configuration.
//!
//! ## Purpose
//! Loads [`ServerConfig`] from a YAML file with environment variable
//! substitution (`${VAR_NAME}` or `${VAR_NAME:-default}`), so credentials
//! like the database connection string can live in the environment rather
//! than on disk.

use regex::Regex;
use serde::Deserialize;
use std::env;
use thiserror::Error;

/// Config loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File I/O error
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    /// YAML parsing error
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    /// Environment variable substitution error
    #[error("environment variable substitution failed: {0}")]
    EnvSubstitution(String),
    /// Semantic validation error
    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Which SQL backend to connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    Sqlite,
    Postgres,
}

/// PlexLock server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// gRPC listen endpoint, e.g. `0.0.0.0:8891`
    pub listen_address: String,
    /// CA bundle used to verify client certificates (mutual TLS). TLS is
    /// enabled only when all three of `ca_file`, `cert_file`, and
    /// `key_file` are set.
    pub ca_file: Option<String>,
    /// Server certificate (PEM)
    pub cert_file: Option<String>,
    /// Server private key (PEM)
    pub key_file: Option<String>,
    pub database_driver: DatabaseDriver,
    pub database_connection_string: String,
    pub max_open_database_connections: u32,
    /// Default log filter; `RUST_LOG` overrides it
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:8891".to_string(),
            ca_file: None,
            cert_file: None,
            key_file: None,
            database_driver: DatabaseDriver::Sqlite,
            database_connection_string: "sqlite://plexlock.db".to_string(),
            max_open_database_connections: 5,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load from a YAML file with environment variable substitution.
    pub async fn load(path: &str) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ConfigError::Io {
                path: path.to_string(),
                source: e,
            })?;
        Self::from_yaml(&content)
    }

    /// Parse from YAML content (exposed for tests).
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let substituted = substitute_env_vars(content)?;
        let config: ServerConfig = serde_yaml::from_str(&substituted)?;
        config.validate()?;
        Ok(config)
    }

    /// Whether TLS material is configured.
    pub fn tls_enabled(&self) -> bool {
        self.ca_file.is_some() && self.cert_file.is_some() && self.key_file.is_some()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let tls_fields = [&self.ca_file, &self.cert_file, &self.key_file];
        let set = tls_fields.iter().filter(|f| f.is_some()).count();
        if set != 0 && set != tls_fields.len() {
            return Err(ConfigError::Validation(
                "ca_file, cert_file, and key_file must be set together".to_string(),
            ));
        }
        if self.listen_address.is_empty() {
            return Err(ConfigError::Validation(
                "listen_address must not be empty".to_string(),
            ));
        }
        if self.max_open_database_connections == 0 {
            return Err(ConfigError::Validation(
                "max_open_database_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Substitute `${VAR_NAME}` and `${VAR_NAME:-default}` in `content`.
///
/// A referenced variable that is unset and carries no default is an error,
/// not an empty string.
fn substitute_env_vars(content: &str) -> Result<String, ConfigError> {
    // Unwrap is safe: the pattern is a literal
    let pattern = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(:-([^}]*))?\}").unwrap();

    let mut result = String::with_capacity(content.len());
    let mut last_end = 0;
    for captures in pattern.captures_iter(content) {
        let whole = captures.get(0).unwrap();
        let name = &captures[1];
        let default = captures.get(3).map(|m| m.as_str());

        let value = match env::var(name) {
            Ok(value) => value,
            Err(_) => match default {
                Some(default) => default.to_string(),
                None => {
                    return Err(ConfigError::EnvSubstitution(format!(
                        "environment variable '{}' is not set and has no default",
                        name
                    )))
                }
            },
        };

        result.push_str(&content[last_end..whole.start()]);
        result.push_str(&value);
        last_end = whole.end();
    }
    result.push_str(&content[last_end..]);
    Ok(result)
}
