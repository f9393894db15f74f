// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Directory layout of the filesystem blob store.
//!
//! ```text
//! {root}/
//!   objects/
//!     {sha256(name)}.obj    # header (name, metadata, size, stored_at) + body
//!   .health_check
//! ```
//!
//! Object names are hashed so that caller-chosen names (with `/`, `..`,
//! unicode) never become filesystem paths.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

/// Default root for the filesystem backend.
pub const DATA_ROOT: &str = "/data";

#[derive(Debug, Clone)]
pub struct StoragePaths {
    root: PathBuf,
}

impl Default for StoragePaths {
    fn default() -> Self {
        Self::new(DATA_ROOT)
    }
}

impl StoragePaths {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.root.join("objects")
    }

    /// Stable on-disk key for an object name.
    pub fn object_key(name: &str) -> String {
        Sha256::digest(name.as_bytes())
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    /// Single file holding an object's header and body.
    pub fn object_file(&self, name: &str) -> PathBuf {
        self.objects_dir()
            .join(format!("{}.obj", Self::object_key(name)))
    }

    pub fn health_check_file(&self) -> PathBuf {
        self.root.join(".health_check")
    }
}
