// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from the environment once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `LISTEN_ADDRESS` | Server bind address | `127.0.0.1` |
//! | `LISTEN_PORT` | Server bind port | `8080` |
//! | `STORAGE_BACKEND` | `gcs`, `fs` or `memory` | `gcs` |
//! | `GCS_BUCKET` | Bucket holding encrypted objects | `encrypted_data` |
//! | `GCS_ENDPOINT` | Cloud Storage API base URL (emulators) | `https://storage.googleapis.com` |
//! | `GCS_AUTH` | `default` (Application Default Credentials) or `none` | `default` |
//! | `GCS_ACCESS_TOKEN` | Fixed OAuth bearer token, overrides `GCS_AUTH` | Optional |
//! | `DATA_DIR` | Root directory for the `fs` backend | `/data` |
//! | `MASTER_KEY` | Base64 256-bit key-encryption key | Random per process |
//! | `MASTER_KEY_FILE` | File holding the base64 key-encryption key | Optional |
//! | `RECIPIENT_PUBLIC_KEY` | PEM file, secp256k1 public key for `pubkey` uploads | Optional |
//! | `RECIPIENT_PRIVATE_KEY` | PEM file, secp256k1 private key for `pubkey` downloads | Optional |
//! | `MAX_UPLOAD_BYTES` | Request body limit | `67108864` (64 MiB) |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |
//!
//! With `GCS_AUTH=default` tokens come from Application Default Credentials
//! (`GOOGLE_APPLICATION_CREDENTIALS`, gcloud user credentials or the metadata
//! server) and are refreshed before they expire. A fixed `GCS_ACCESS_TOKEN`
//! is never refreshed and suits emulators and short-lived jobs only.
//!
//! Without `MASTER_KEY` or `MASTER_KEY_FILE` the key-encryption key is
//! random, and `plain` objects become unreadable after a restart.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use crate::crypto::KeySource;
use crate::storage::gcs::DEFAULT_ENDPOINT;
use crate::storage::paths::DATA_ROOT;

pub const LISTEN_ADDRESS_ENV: &str = "LISTEN_ADDRESS";
pub const LISTEN_PORT_ENV: &str = "LISTEN_PORT";
pub const STORAGE_BACKEND_ENV: &str = "STORAGE_BACKEND";
pub const GCS_BUCKET_ENV: &str = "GCS_BUCKET";
pub const GCS_ENDPOINT_ENV: &str = "GCS_ENDPOINT";
pub const GCS_AUTH_ENV: &str = "GCS_AUTH";
pub const GCS_ACCESS_TOKEN_ENV: &str = "GCS_ACCESS_TOKEN";
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const MASTER_KEY_ENV: &str = "MASTER_KEY";
pub const MASTER_KEY_FILE_ENV: &str = "MASTER_KEY_FILE";
pub const RECIPIENT_PUBLIC_KEY_ENV: &str = "RECIPIENT_PUBLIC_KEY";
pub const RECIPIENT_PRIVATE_KEY_ENV: &str = "RECIPIENT_PRIVATE_KEY";
pub const MAX_UPLOAD_BYTES_ENV: &str = "MAX_UPLOAD_BYTES";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1";
pub const DEFAULT_LISTEN_PORT: u16 = 8080;
pub const DEFAULT_GCS_BUCKET: &str = "encrypted_data";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} and {1} are mutually exclusive")]
    Conflict(&'static str, &'static str),
}

/// How the GCS backend authenticates.
#[derive(Clone, PartialEq, Eq)]
pub enum GcsAuth {
    /// Application Default Credentials, refreshed as they expire.
    DefaultCredentials,
    /// Fixed bearer token.
    Token(String),
    /// No `Authorization` header (emulators).
    Anonymous,
}

impl fmt::Debug for GcsAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GcsAuth::DefaultCredentials => f.write_str("DefaultCredentials"),
            GcsAuth::Token(_) => f.write_str("Token([REDACTED])"),
            GcsAuth::Anonymous => f.write_str("Anonymous"),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Gcs {
        bucket: String,
        endpoint: String,
        auth: GcsAuth,
    },
    Filesystem {
        root: PathBuf,
    },
    Memory,
}

impl fmt::Debug for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::Gcs {
                bucket,
                endpoint,
                auth,
            } => f
                .debug_struct("Gcs")
                .field("bucket", bucket)
                .field("endpoint", endpoint)
                .field("auth", auth)
                .finish(),
            StorageBackend::Filesystem { root } => {
                f.debug_struct("Filesystem").field("root", root).finish()
            }
            StorageBackend::Memory => f.write_str("Memory"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub listen: SocketAddr,
    pub storage: StorageBackend,
    pub master_key: KeySource,
    pub recipient_public_key: Option<PathBuf>,
    pub recipient_private_key: Option<PathBuf>,
    pub max_upload_bytes: usize,
    pub log_format: LogFormat,
}

/// Resolve `MASTER_KEY` / `MASTER_KEY_FILE`. Neither set yields
/// [`KeySource::Random`].
pub fn master_key_source(
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<KeySource, ConfigError> {
    let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
    match (var(MASTER_KEY_ENV), var(MASTER_KEY_FILE_ENV)) {
        (Some(_), Some(_)) => Err(ConfigError::Conflict(MASTER_KEY_ENV, MASTER_KEY_FILE_ENV)),
        (Some(encoded), None) => Ok(KeySource::Base64(encoded)),
        (None, Some(path)) => Ok(KeySource::File(PathBuf::from(path))),
        (None, None) => Ok(KeySource::Random),
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let address = var(LISTEN_ADDRESS_ENV).unwrap_or_else(|| DEFAULT_LISTEN_ADDRESS.to_string());
        let ip: IpAddr = address
            .trim()
            .parse()
            .map_err(|e| invalid(LISTEN_ADDRESS_ENV, &address, e))?;
        let port = match var(LISTEN_PORT_ENV) {
            Some(port) => port
                .trim()
                .parse::<u16>()
                .map_err(|e| invalid(LISTEN_PORT_ENV, &port, e))?,
            None => DEFAULT_LISTEN_PORT,
        };

        let storage = match var(STORAGE_BACKEND_ENV)
            .map(|b| b.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("gcs") => StorageBackend::Gcs {
                bucket: var(GCS_BUCKET_ENV).unwrap_or_else(|| DEFAULT_GCS_BUCKET.to_string()),
                endpoint: var(GCS_ENDPOINT_ENV).unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
                auth: gcs_auth(&var)?,
            },
            Some("fs") => StorageBackend::Filesystem {
                root: PathBuf::from(var(DATA_DIR_ENV).unwrap_or_else(|| DATA_ROOT.to_string())),
            },
            Some("memory") => StorageBackend::Memory,
            Some(other) => {
                return Err(invalid(
                    STORAGE_BACKEND_ENV,
                    other,
                    "expected gcs, fs or memory",
                ))
            }
        };

        let master_key = master_key_source(&var)?;

        let max_upload_bytes = match var(MAX_UPLOAD_BYTES_ENV) {
            Some(limit) => match limit.trim().parse::<usize>() {
                Ok(0) => return Err(invalid(MAX_UPLOAD_BYTES_ENV, &limit, "must be positive")),
                Ok(n) => n,
                Err(e) => return Err(invalid(MAX_UPLOAD_BYTES_ENV, &limit, e)),
            },
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let log_format = match var(LOG_FORMAT_ENV).map(|f| f.trim().to_ascii_lowercase()) {
            None => LogFormat::default(),
            Some(f) if f == "pretty" => LogFormat::Pretty,
            Some(f) if f == "json" => LogFormat::Json,
            Some(other) => return Err(invalid(LOG_FORMAT_ENV, &other, "expected json or pretty")),
        };

        Ok(Self {
            listen: SocketAddr::new(ip, port),
            storage,
            master_key,
            recipient_public_key: var(RECIPIENT_PUBLIC_KEY_ENV).map(PathBuf::from),
            recipient_private_key: var(RECIPIENT_PRIVATE_KEY_ENV).map(PathBuf::from),
            max_upload_bytes,
            log_format,
        })
    }
}

fn gcs_auth(var: &impl Fn(&str) -> Option<String>) -> Result<GcsAuth, ConfigError> {
    let mode = var(GCS_AUTH_ENV).map(|m| m.trim().to_ascii_lowercase());
    match (mode.as_deref(), var(GCS_ACCESS_TOKEN_ENV)) {
        (Some("none"), Some(_)) => Err(ConfigError::Conflict(GCS_AUTH_ENV, GCS_ACCESS_TOKEN_ENV)),
        (None | Some("default"), Some(token)) => Ok(GcsAuth::Token(token)),
        (None | Some("default"), None) => Ok(GcsAuth::DefaultCredentials),
        (Some("none"), None) => Ok(GcsAuth::Anonymous),
        (Some(other), _) => Err(invalid(GCS_AUTH_ENV, other, "expected default or none")),
    }
}

fn invalid(name: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        name,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<GatewayConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GatewayConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = config(&[]).unwrap();
        assert_eq!(config.listen, "127.0.0.1:8080".parse().unwrap());
        assert_eq!(
            config.storage,
            StorageBackend::Gcs {
                bucket: "encrypted_data".to_string(),
                endpoint: "https://storage.googleapis.com".to_string(),
                auth: GcsAuth::DefaultCredentials,
            }
        );
        assert!(matches!(config.master_key, KeySource::Random));
        assert_eq!(config.max_upload_bytes, 64 * 1024 * 1024);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.recipient_public_key.is_none());
    }

    #[test]
    fn overrides_are_applied() {
        let config = config(&[
            (LISTEN_ADDRESS_ENV, "0.0.0.0"),
            (LISTEN_PORT_ENV, "9000"),
            (STORAGE_BACKEND_ENV, "FS"),
            (DATA_DIR_ENV, "/srv/objects"),
            (MASTER_KEY_FILE_ENV, "/run/secrets/kek"),
            (RECIPIENT_PUBLIC_KEY_ENV, "/keys/recipient.pub.pem"),
            (MAX_UPLOAD_BYTES_ENV, "1024"),
            (LOG_FORMAT_ENV, "json"),
        ])
        .unwrap();

        assert_eq!(config.listen, "0.0.0.0:9000".parse().unwrap());
        assert_eq!(
            config.storage,
            StorageBackend::Filesystem {
                root: PathBuf::from("/srv/objects")
            }
        );
        assert!(matches!(
            config.master_key,
            KeySource::File(ref p) if p == &PathBuf::from("/run/secrets/kek")
        ));
        assert_eq!(
            config.recipient_public_key,
            Some(PathBuf::from("/keys/recipient.pub.pem"))
        );
        assert_eq!(config.max_upload_bytes, 1024);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn empty_values_count_as_unset() {
        let config = config(&[(LISTEN_PORT_ENV, ""), (MASTER_KEY_ENV, "  ")]).unwrap();
        assert_eq!(config.listen.port(), DEFAULT_LISTEN_PORT);
        assert!(matches!(config.master_key, KeySource::Random));
    }

    #[test]
    fn invalid_values_are_rejected() {
        for (name, value) in [
            (LISTEN_PORT_ENV, "http"),
            (LISTEN_ADDRESS_ENV, "localhost:80"),
            (STORAGE_BACKEND_ENV, "s3"),
            (MAX_UPLOAD_BYTES_ENV, "0"),
            (LOG_FORMAT_ENV, "xml"),
            (GCS_AUTH_ENV, "oauth"),
        ] {
            assert!(
                matches!(
                    config(&[(name, value)]),
                    Err(ConfigError::Invalid { name: n, .. }) if n == name
                ),
                "{name}={value} should be rejected"
            );
        }
    }

    #[test]
    fn both_master_key_sources_conflict() {
        assert_eq!(
            config(&[(MASTER_KEY_ENV, "a2V5"), (MASTER_KEY_FILE_ENV, "/kek")]).unwrap_err(),
            ConfigError::Conflict(MASTER_KEY_ENV, MASTER_KEY_FILE_ENV)
        );
    }

    #[test]
    fn gcs_auth_selection() {
        let auth = |vars: &[(&str, &str)]| match config(vars).unwrap().storage {
            StorageBackend::Gcs { auth, .. } => auth,
            other => panic!("unexpected backend {other:?}"),
        };

        assert_eq!(auth(&[]), GcsAuth::DefaultCredentials);
        assert_eq!(auth(&[(GCS_AUTH_ENV, "NONE")]), GcsAuth::Anonymous);
        assert_eq!(
            auth(&[(GCS_ACCESS_TOKEN_ENV, "ya29.token")]),
            GcsAuth::Token("ya29.token".to_string())
        );
        assert_eq!(
            config(&[(GCS_AUTH_ENV, "none"), (GCS_ACCESS_TOKEN_ENV, "ya29.token")]).unwrap_err(),
            ConfigError::Conflict(GCS_AUTH_ENV, GCS_ACCESS_TOKEN_ENV)
        );
    }

    #[test]
    fn access_token_is_redacted_in_debug_output() {
        let config = config(&[(GCS_ACCESS_TOKEN_ENV, "ya29.secret")]).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("ya29.secret"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
