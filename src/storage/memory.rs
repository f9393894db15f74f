// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory blob store for development and tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BlobStore, ObjectLocator, StorageError, StorageResult, StoredObject};

#[derive(Clone, Default)]
pub struct InMemoryBlobStore {
    objects: Arc<RwLock<HashMap<String, StoredObject>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Apply `f` to a stored object in place. Returns false if it is absent.
    pub async fn modify<F>(&self, name: &str, f: F) -> bool
    where
        F: FnOnce(&mut StoredObject),
    {
        match self.objects.write().await.get_mut(name) {
            Some(object) => {
                f(object);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn locator(&self, name: &str) -> ObjectLocator {
        ObjectLocator {
            uri: format!("memory://{name}"),
            link_url: None,
        }
    }

    async fn put(&self, object: StoredObject) -> StorageResult<()> {
        self.objects
            .write()
            .await
            .insert(object.name.clone(), object);
        Ok(())
    }

    async fn get(&self, name: &str) -> StorageResult<StoredObject> {
        self.objects
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    async fn health_check(&self) -> StorageResult<()> {
        Ok(())
    }
}
