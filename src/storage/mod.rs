// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Blob Storage
//!
//! Storage backends for encrypted object bodies and their metadata bags.
//! The gateway only sees the [`BlobStore`] trait.
//!
//! ## Backends
//!
//! | Backend              | Use                         | Locator                    |
//! |----------------------|-----------------------------|----------------------------|
//! | [`GcsBlobStore`]     | production (Cloud Storage)  | `gcs://<bucket>/<name>`    |
//! | [`FsBlobStore`]      | single host, local volume   | `file://<path>`            |
//! | [`InMemoryBlobStore`]| development and tests       | `memory://<name>`          |
//!
//! ## Important Notes
//!
//! - Bodies reaching a backend are already encrypted (unless mode `none`).
//! - Writes to the same name are last-writer-wins.
//! - Backends do not retry. Retry policy belongs to the transport.

pub mod fs;
pub mod gcs;
pub mod memory;
pub mod paths;

use std::io;

use async_trait::async_trait;

use crate::metadata::ObjectMetadata;

pub use fs::{read_object_file, FsBlobStore};
pub use gcs::{DefaultCredentials, GcsBlobStore, StaticToken, TokenSource};
pub use memory::InMemoryBlobStore;
pub use paths::StoragePaths;

/// An object as held by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub name: String,
    pub body: Vec<u8>,
    pub metadata: ObjectMetadata,
}

/// Where an object lives, as reported back to the uploader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocator {
    pub uri: String,
    /// Browser link, for backends that have one.
    pub link_url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("integrity violation: {0}")]
    IntegrityViolation(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait BlobStore: Send + Sync + 'static {
    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;

    fn locator(&self, name: &str) -> ObjectLocator;

    async fn put(&self, object: StoredObject) -> StorageResult<()>;

    /// Returns [`StorageError::NotFound`] if the object is absent.
    async fn get(&self, name: &str) -> StorageResult<StoredObject>;

    /// Verify the backend is reachable and writable (or, for remote stores,
    /// that the bucket exists).
    async fn health_check(&self) -> StorageResult<()>;
}
