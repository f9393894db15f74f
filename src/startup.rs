// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Process bootstrap: turns a [`GatewayConfig`] into a ready [`AppState`].
//!
//! Every failure here is fatal and maps to its own process exit code:
//!
//! | Code | Failure |
//! |------|---------|
//! | 1 | Blob store client could not be built |
//! | 2 | Configured bucket does not exist |
//! | 3 | Recipient key unreadable or invalid |
//! | 4 | Master key source invalid |
//! | 5 | Configuration invalid |
//! | 6 | Listener could not bind |
//! | 7 | Server error while serving |
//! | 42 | Any other storage startup failure |

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use crate::config::{ConfigError, GatewayConfig, GcsAuth, StorageBackend};
use crate::crypto::{
    CryptoError, EnvelopeDecryptor, EnvelopeEncryptor, KeyManager, RecipientKey, RecipientSecret,
};
use crate::gateway::ObjectGateway;
use crate::state::AppState;
use crate::storage::{
    BlobStore, DefaultCredentials, FsBlobStore, GcsBlobStore, InMemoryBlobStore, StaticToken,
    StorageError, StoragePaths, TokenSource,
};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to create storage client: {0}")]
    StorageClient(#[source] StorageError),

    #[error("bucket {0} does not exist")]
    BucketMissing(String),

    #[error("storage unavailable at startup: {0}")]
    StorageCheck(#[source] StorageError),

    #[error("failed to load recipient key: {0}")]
    RecipientKey(#[source] CryptoError),

    #[error("failed to load master key: {0}")]
    MasterKey(#[source] CryptoError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] io::Error),
}

impl StartupError {
    pub fn exit_code(&self) -> u8 {
        match self {
            StartupError::StorageClient(_) => 1,
            StartupError::BucketMissing(_) => 2,
            StartupError::RecipientKey(_) => 3,
            StartupError::MasterKey(_) => 4,
            StartupError::Config(_) => 5,
            StartupError::Bind { .. } => 6,
            StartupError::Serve(_) => 7,
            StartupError::StorageCheck(_) => 42,
        }
    }
}

/// Construct the configured backend. Only credential discovery touches
/// the network.
pub async fn build_store(backend: &StorageBackend) -> Result<Arc<dyn BlobStore>, StartupError> {
    let store: Arc<dyn BlobStore> = match backend {
        StorageBackend::Gcs {
            bucket,
            endpoint,
            auth,
        } => {
            let credentials: Option<Arc<dyn TokenSource>> = match auth {
                GcsAuth::DefaultCredentials => Some(Arc::new(
                    DefaultCredentials::discover()
                        .await
                        .map_err(StartupError::StorageClient)?,
                )),
                GcsAuth::Token(token) => Some(Arc::new(StaticToken::new(token.clone()))),
                GcsAuth::Anonymous => None,
            };
            Arc::new(
                GcsBlobStore::new(bucket.clone(), endpoint, credentials)
                    .map_err(StartupError::StorageClient)?,
            )
        }
        StorageBackend::Filesystem { root } => Arc::new(
            FsBlobStore::open(StoragePaths::new(root)).map_err(StartupError::StorageClient)?,
        ),
        StorageBackend::Memory => Arc::new(InMemoryBlobStore::new()),
    };
    Ok(store)
}

/// Run the backend's health check once. For GCS this is the bucket
/// existence check.
pub async fn check_store(store: &dyn BlobStore) -> Result<(), StartupError> {
    store.health_check().await.map_err(|e| match e {
        StorageError::BucketNotFound(bucket) => StartupError::BucketMissing(bucket),
        other => StartupError::StorageCheck(other),
    })
}

/// Load the recipient key pair. A private key alone also yields the public
/// half. When both are given they must belong together.
pub fn load_recipient_keys(
    config: &GatewayConfig,
) -> Result<(Option<RecipientKey>, Option<RecipientSecret>), StartupError> {
    let secret = config
        .recipient_private_key
        .as_deref()
        .map(RecipientSecret::load)
        .transpose()
        .map_err(StartupError::RecipientKey)?;
    let public = config
        .recipient_public_key
        .as_deref()
        .map(RecipientKey::load)
        .transpose()
        .map_err(StartupError::RecipientKey)?;

    let public = match (public, &secret) {
        (Some(public), Some(secret)) if public != secret.public_key() => {
            return Err(StartupError::RecipientKey(CryptoError::InvalidKey(
                "recipient public key does not match the private key".to_string(),
            )));
        }
        (Some(public), _) => Some(public),
        (None, Some(secret)) => Some(secret.public_key()),
        (None, None) => None,
    };

    Ok((public, secret))
}

/// Build the application state: keys, store and gateway. Verifies the
/// store is reachable before returning.
pub async fn build_state(config: &GatewayConfig) -> Result<AppState, StartupError> {
    let keys = KeyManager::new(config.master_key.clone()).map_err(StartupError::MasterKey)?;
    let keys = Arc::new(keys);
    let (public, secret) = load_recipient_keys(config)?;

    let store = build_store(&config.storage).await?;
    check_store(store.as_ref()).await?;

    info!(
        backend = store.backend(),
        key_fingerprint = %keys.fingerprint(),
        pubkey_upload = public.is_some(),
        pubkey_download = secret.is_some(),
        "gateway initialized"
    );

    let gateway = ObjectGateway::new(
        store,
        EnvelopeEncryptor::new(keys.clone(), public),
        EnvelopeDecryptor::new(keys, secret),
    );

    Ok(AppState::new(Arc::new(gateway)).with_max_upload_bytes(config.max_upload_bytes))
}
