// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Filesystem blob store.
//!
//! Each object is one file (see [`StoragePaths`]) laid out as
//!
//! ```text
//! | magic "EGW1" (4) | header length, u32 BE (4) | JSON header | body |
//! ```
//!
//! The header carries the name, metadata bag, body size and store time. The
//! whole file is written to a temp file and renamed into place in one step,
//! so a reader sees either the previous object or the new one, never a mix
//! of two writers. All file I/O runs on the blocking pool.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BlobStore, ObjectLocator, StorageError, StorageResult, StoragePaths, StoredObject};
use crate::metadata::ObjectMetadata;

const MAGIC: &[u8; 4] = b"EGW1";
const PREAMBLE_LEN: usize = MAGIC.len() + 4;

#[derive(Debug, Serialize, Deserialize)]
struct ObjectHeader {
    name: String,
    metadata: ObjectMetadata,
    size: u64,
    stored_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct FsBlobStore {
    paths: StoragePaths,
}

impl FsBlobStore {
    /// Open a store rooted at `paths`, creating the directory layout.
    /// Safe to call on an existing root.
    pub fn open(paths: StoragePaths) -> StorageResult<Self> {
        fs::create_dir_all(paths.objects_dir())?;
        Ok(Self { paths })
    }

    pub fn paths(&self) -> &StoragePaths {
        &self.paths
    }

    fn put_blocking(paths: &StoragePaths, object: StoredObject) -> StorageResult<()> {
        let header = serde_json::to_vec(&ObjectHeader {
            name: object.name.clone(),
            metadata: object.metadata,
            size: object.body.len() as u64,
            stored_at: Utc::now(),
        })?;
        let header_len = u32::try_from(header.len()).map_err(|_| {
            StorageError::IntegrityViolation(format!("header of {} is too large", object.name))
        })?;

        write_atomic(&paths.object_file(&object.name), |w| {
            w.write_all(MAGIC)?;
            w.write_all(&header_len.to_be_bytes())?;
            w.write_all(&header)?;
            w.write_all(&object.body)
        })?;
        Ok(())
    }

    fn get_blocking(paths: &StoragePaths, name: &str) -> StorageResult<StoredObject> {
        let bytes = match fs::read(paths.object_file(name)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        decode_object(name, bytes)
    }

    /// Write, read back and delete a scratch file.
    fn health_check_blocking(paths: &StoragePaths) -> StorageResult<()> {
        let test_file = paths.health_check_file();
        let test_data = b"health_check_data";

        fs::write(&test_file, test_data)?;
        let read_data = fs::read(&test_file)?;
        fs::remove_file(&test_file)?;

        if read_data != test_data {
            return Err(StorageError::IntegrityViolation(
                "health check data mismatch".to_string(),
            ));
        }
        Ok(())
    }
}

fn decode_object(name: &str, bytes: Vec<u8>) -> StorageResult<StoredObject> {
    let object = parse_object(name, bytes)?;
    if object.name != name {
        return Err(StorageError::IntegrityViolation(format!(
            "{name}: file names {}",
            object.name
        )));
    }
    Ok(object)
}

/// Read an object file directly, outside any store. Used by offline tools
/// that are handed a file copied off a gateway volume.
pub fn read_object_file(path: &Path) -> StorageResult<StoredObject> {
    let bytes = fs::read(path)?;
    parse_object(&path.display().to_string(), bytes)
}

fn parse_object(label: &str, mut bytes: Vec<u8>) -> StorageResult<StoredObject> {
    let corrupt = |reason: String| StorageError::IntegrityViolation(format!("{label}: {reason}"));

    if bytes.len() < PREAMBLE_LEN || &bytes[..MAGIC.len()] != MAGIC {
        return Err(corrupt("not an object file".to_string()));
    }
    let mut len = [0u8; 4];
    len.copy_from_slice(&bytes[MAGIC.len()..PREAMBLE_LEN]);
    let header_end = PREAMBLE_LEN + u32::from_be_bytes(len) as usize;
    if bytes.len() < header_end {
        return Err(corrupt("header is truncated".to_string()));
    }

    let header: ObjectHeader = serde_json::from_slice(&bytes[PREAMBLE_LEN..header_end])?;
    let body = bytes.split_off(header_end);
    if body.len() as u64 != header.size {
        return Err(corrupt(format!(
            "body is {} bytes, header says {}",
            body.len(),
            header.size
        )));
    }

    Ok(StoredObject {
        name: header.name,
        body,
        metadata: header.metadata,
    })
}

/// Write through a uniquely named temp file in the same directory, then
/// rename over `path`.
fn write_atomic<F>(path: &Path, write: F) -> io::Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let temp_path = temp_path_for(path);
    let result = (|| {
        let mut writer = BufWriter::new(File::create(&temp_path)?);
        write(&mut writer)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        fs::rename(&temp_path, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}.tmp", uuid::Uuid::new_v4()));
    path.with_file_name(name)
}

fn join_error(e: tokio::task::JoinError) -> StorageError {
    StorageError::Unavailable(format!("storage task failed: {e}"))
}

#[async_trait]
impl BlobStore for FsBlobStore {
    fn backend(&self) -> &'static str {
        "fs"
    }

    fn locator(&self, name: &str) -> ObjectLocator {
        ObjectLocator {
            uri: format!("file://{}", self.paths.object_file(name).display()),
            link_url: None,
        }
    }

    async fn put(&self, object: StoredObject) -> StorageResult<()> {
        let paths = self.paths.clone();
        tokio::task::spawn_blocking(move || Self::put_blocking(&paths, object))
            .await
            .map_err(join_error)?
    }

    async fn get(&self, name: &str) -> StorageResult<StoredObject> {
        let paths = self.paths.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || Self::get_blocking(&paths, &name))
            .await
            .map_err(join_error)?
    }

    async fn health_check(&self) -> StorageResult<()> {
        let paths = self.paths.clone();
        tokio::task::spawn_blocking(move || Self::health_check_blocking(&paths))
            .await
            .map_err(join_error)?
    }
}
