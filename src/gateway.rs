// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Object Gateway
//!
//! Orchestrates uploads (validate → encrypt → encode metadata → store) and
//! downloads (fetch → decode metadata → decrypt) against a [`BlobStore`].
//!
//! ## Processing Contract
//!
//! Validation always runs before anything is dispatched, so a bad request is
//! rejected the same way in both processing modes.
//!
//! - [`Processing::Sync`]: the pipeline completes before `upload` returns and
//!   every failure reaches the caller.
//! - [`Processing::Async`]: the pipeline runs on a detached task and `upload`
//!   returns immediately. Failures after that point are only logged. There is
//!   no handle, cancellation or timeout. Callers that need a storage
//!   guarantee use sync processing.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::crypto::mode::PASSPHRASE_PARAM;
use crate::crypto::{
    CryptoError, EncryptionEnvelope, EncryptionMode, EnvelopeDecryptor, EnvelopeEncryptor,
    EnvelopeHeader, ModeError, ModeParams, ModeSelector, Opened, Passphrase, ValidatedMode,
};
use crate::metadata::{MetadataCodec, MetadataError, ObjectMetadata};
use crate::storage::{BlobStore, ObjectLocator, StorageError, StoredObject};

/// Longest object name accepted, in bytes.
pub const MAX_NAME_LEN: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Processing {
    Sync,
    Async,
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Explicit object name. When absent or empty, the name is the hex
    /// SHA-256 of the plaintext.
    pub name: Option<String>,
    /// Optional path prefix, joined as `prefix/name`.
    pub prefix: Option<String>,
    pub body: Vec<u8>,
    /// Requested mode name, matched case-insensitively.
    pub mode: String,
    pub passphrase: Option<String>,
    /// Caller metadata. Only `__`-prefixed entries are kept.
    pub custom_metadata: ObjectMetadata,
    pub processing: Processing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub name: String,
    pub locator: ObjectLocator,
    pub mode: EncryptionMode,
    pub processing: Processing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub name: String,
    pub body: Vec<u8>,
    /// Caller metadata with the `__` marker stripped.
    pub custom_metadata: ObjectMetadata,
    pub mode: EncryptionMode,
    /// True when a `pubkey` object is returned still sealed.
    pub sealed: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("missing required parameter: {0}")]
    MissingParameter(String),

    #[error("unsupported encryption type: {0}")]
    UnsupportedMode(String),

    #[error("invalid object name: {0}")]
    InvalidName(String),

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("authentication failed: stored object or key material was tampered with")]
    AuthenticationFailed,

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("object not found: {0}")]
    NotFound(String),
}

impl GatewayError {
    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::MissingParameter(_) => "missing_parameter",
            GatewayError::UnsupportedMode(_) => "unsupported_mode",
            GatewayError::InvalidName(_) => "invalid_name",
            GatewayError::EncryptionFailed(_) => "encryption_failed",
            GatewayError::DecryptionFailed(_) => "decryption_failed",
            GatewayError::AuthenticationFailed => "authentication_failed",
            GatewayError::StorageUnavailable(_) => "storage_unavailable",
            GatewayError::NotFound(_) => "not_found",
        }
    }

    /// Whether the caller sent a bad request.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            GatewayError::MissingParameter(_)
                | GatewayError::UnsupportedMode(_)
                | GatewayError::InvalidName(_)
        )
    }

    fn from_encrypt(e: CryptoError) -> Self {
        match e {
            CryptoError::KeyUnavailable(what) => {
                GatewayError::UnsupportedMode(format!("pubkey ({what} not configured)"))
            }
            other => GatewayError::EncryptionFailed(other.to_string()),
        }
    }

    fn from_decrypt(e: CryptoError) -> Self {
        match e {
            CryptoError::AuthenticationFailed => GatewayError::AuthenticationFailed,
            CryptoError::KeyUnavailable(what) => GatewayError::MissingParameter(what.to_string()),
            CryptoError::DecryptionFailed(reason) => GatewayError::DecryptionFailed(reason),
            other => GatewayError::DecryptionFailed(other.to_string()),
        }
    }
}

impl From<ModeError> for GatewayError {
    fn from(e: ModeError) -> Self {
        match e {
            ModeError::MissingParameter(name) => GatewayError::MissingParameter(name.to_string()),
            ModeError::UnsupportedMode(name) => GatewayError::UnsupportedMode(name),
        }
    }
}

impl From<StorageError> for GatewayError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(name) => GatewayError::NotFound(name),
            other => GatewayError::StorageUnavailable(other.to_string()),
        }
    }
}

impl From<MetadataError> for GatewayError {
    fn from(e: MetadataError) -> Self {
        GatewayError::DecryptionFailed(format!("stored envelope is unreadable: {e}"))
    }
}

/// Derive the stored name for an upload.
pub fn object_name(
    given: Option<&str>,
    prefix: Option<&str>,
    plaintext: &[u8],
) -> Result<String, GatewayError> {
    let name = match given.map(|n| n.trim_matches('/')).filter(|n| !n.is_empty()) {
        Some(name) => name.to_string(),
        None => Sha256::digest(plaintext)
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect(),
    };
    let name = match prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{prefix}/{name}"),
        None => name,
    };
    validate_name(&name)?;
    Ok(name)
}

pub fn validate_name(name: &str) -> Result<(), GatewayError> {
    let invalid = |reason: &str| Err(GatewayError::InvalidName(format!("{name:?}: {reason}")));

    if name.is_empty() {
        return invalid("empty");
    }
    if name.len() > MAX_NAME_LEN {
        return invalid("longer than 1024 bytes");
    }
    if name.contains(['\0', '\r', '\n']) {
        return invalid("contains a control character");
    }
    if name
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return invalid("contains an empty, '.' or '..' segment");
    }
    Ok(())
}

pub struct ObjectGateway {
    store: Arc<dyn BlobStore>,
    encryptor: EnvelopeEncryptor,
    decryptor: EnvelopeDecryptor,
}

impl ObjectGateway {
    pub fn new(
        store: Arc<dyn BlobStore>,
        encryptor: EnvelopeEncryptor,
        decryptor: EnvelopeDecryptor,
    ) -> Self {
        Self {
            store,
            encryptor,
            decryptor,
        }
    }

    pub fn store(&self) -> &Arc<dyn BlobStore> {
        &self.store
    }

    pub async fn upload(
        self: &Arc<Self>,
        request: UploadRequest,
    ) -> Result<UploadReceipt, GatewayError> {
        let UploadRequest {
            name,
            prefix,
            body,
            mode,
            passphrase,
            custom_metadata,
            processing,
        } = request;

        let mode = ModeSelector::validate(&mode, &ModeParams { passphrase })?;
        self.encryptor
            .check_available(&mode)
            .map_err(GatewayError::from_encrypt)?;
        let name = object_name(name.as_deref(), prefix.as_deref(), &body)?;

        let receipt = UploadReceipt {
            locator: self.store.locator(&name),
            mode: mode.mode(),
            name,
            processing,
        };

        match processing {
            Processing::Sync => {
                self.encrypt_and_store(receipt.name.clone(), body, mode, custom_metadata)
                    .await?;
                info!(object = %receipt.name, mode = %receipt.mode, "object stored");
            }
            Processing::Async => {
                let gateway = Arc::clone(self);
                let name = receipt.name.clone();
                tokio::spawn(async move {
                    let mode_name = mode.mode();
                    match gateway
                        .encrypt_and_store(name.clone(), body, mode, custom_metadata)
                        .await
                    {
                        Ok(()) => info!(object = %name, mode = %mode_name, "object stored (async)"),
                        Err(e) => error!(
                            object = %name,
                            mode = %mode_name,
                            error = %e,
                            "async upload failed"
                        ),
                    }
                });
                info!(object = %receipt.name, mode = %receipt.mode, "async upload started");
            }
        }
        Ok(receipt)
    }

    async fn encrypt_and_store(
        &self,
        name: String,
        body: Vec<u8>,
        mode: ValidatedMode,
        custom_metadata: ObjectMetadata,
    ) -> Result<(), GatewayError> {
        let encryptor = self.encryptor.clone();
        let envelope = tokio::task::spawn_blocking(move || encryptor.encrypt(&body, &mode))
            .await
            .map_err(|e| GatewayError::EncryptionFailed(format!("encryption task failed: {e}")))?
            .map_err(GatewayError::from_encrypt)?;

        let metadata = MetadataCodec::encode(&envelope.header, &custom_metadata);
        self.store
            .put(StoredObject {
                name,
                body: envelope.ciphertext,
                metadata,
            })
            .await?;
        Ok(())
    }

    /// Fetch and decrypt `name`. `passphrase` is required for `symmetric`
    /// objects and ignored otherwise.
    pub async fn download(
        &self,
        name: &str,
        passphrase: Option<&str>,
    ) -> Result<Download, GatewayError> {
        validate_name(name)?;
        let stored = self.store.get(name).await?;
        let (header, custom_metadata) = MetadataCodec::decode(&stored.metadata)?;
        let mode = header.mode();

        let passphrase = passphrase.and_then(Passphrase::new);
        if matches!(header, EnvelopeHeader::Symmetric) && passphrase.is_none() {
            return Err(GatewayError::MissingParameter(PASSPHRASE_PARAM.to_string()));
        }

        let decryptor = self.decryptor.clone();
        let envelope = EncryptionEnvelope {
            header,
            ciphertext: stored.body,
        };
        let opened = tokio::task::spawn_blocking(move || {
            decryptor.decrypt(envelope, passphrase.as_ref())
        })
        .await
        .map_err(|e| GatewayError::DecryptionFailed(format!("decryption task failed: {e}")))?
        .map_err(|e| {
            let e = GatewayError::from_decrypt(e);
            warn!(object = %name, mode = %mode, error = %e, "download failed");
            e
        })?;

        let (body, sealed) = match opened {
            Opened::Plaintext(body) => (body, false),
            Opened::Sealed(body) => (body, true),
        };
        Ok(Download {
            name: stored.name,
            body,
            custom_metadata,
            mode,
            sealed,
        })
    }
}

impl std::fmt::Debug for ObjectGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectGateway")
            .field("store", &self.store.backend())
            .finish_non_exhaustive()
    }
}
