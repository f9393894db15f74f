// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Key hierarchy: one master key-encryption key (KEK) per process, and a
//! fresh data key per object.
//!
//! ## Key Sources
//!
//! The master key is injected when the [`KeyManager`] is built:
//!
//! - [`KeySource::Random`] generates an ephemeral key. Objects wrapped
//!   under it cannot be read after a restart.
//! - [`KeySource::Base64`] takes the key from configuration (`MASTER_KEY`).
//! - [`KeySource::File`] reads a base64 key from a mounted secret file.
//!
//! ## Nonce Policy
//!
//! Key wrapping and data encryption use **independent** nonces. The wrap
//! nonce travels inside [`WrappedDataKey`].

use std::fmt;
use std::fs;
use std::path::PathBuf;

use base64ct::{Base64, Encoding};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::cipher::{self, Iv, KEY_LEN};
use super::CryptoError;

/// Number of fingerprint bytes shown in logs.
const FINGERPRINT_LEN: usize = 8;

#[derive(Zeroize, ZeroizeOnDrop)]
struct MasterKey([u8; KEY_LEN]);

impl MasterKey {
    fn generate() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; KEY_LEN];
        cipher::fill_random(&mut bytes)?;
        Ok(Self(bytes))
    }

    fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let mut decoded = Base64::decode_vec(encoded.trim())
            .map_err(|e| CryptoError::InvalidKey(format!("master key is not base64: {e}")))?;
        let result = <[u8; KEY_LEN]>::try_from(decoded.as_slice())
            .map(Self)
            .map_err(|_| {
                CryptoError::InvalidKey(format!(
                    "master key must be {KEY_LEN} bytes, got {}",
                    decoded.len()
                ))
            });
        decoded.zeroize();
        result
    }
}

/// A per-object 256-bit data key. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DataKey([u8; KEY_LEN]);

impl DataKey {
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DataKey([REDACTED])")
    }
}

/// A data key sealed under the master key, with the nonce used to seal it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrappedDataKey {
    pub iv: Iv,
    /// Encrypted key bytes followed by the GCM tag.
    pub ciphertext: Vec<u8>,
}

/// Where the master key comes from.
#[derive(Clone)]
pub enum KeySource {
    Random,
    Base64(String),
    File(PathBuf),
}

impl fmt::Debug for KeySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySource::Random => f.write_str("Random"),
            KeySource::Base64(_) => f.write_str("Base64([REDACTED])"),
            KeySource::File(path) => f.debug_tuple("File").field(path).finish(),
        }
    }
}

/// Owns the master key and performs every wrap/unwrap for the process.
///
/// Read-only after construction, so a single instance is shared through
/// `Arc` across all request tasks without locking.
pub struct KeyManager {
    master: MasterKey,
    fingerprint: String,
}

impl KeyManager {
    pub fn new(source: KeySource) -> Result<Self, CryptoError> {
        let master = match source {
            KeySource::Random => MasterKey::generate()?,
            KeySource::Base64(encoded) => MasterKey::from_base64(&encoded)?,
            KeySource::File(path) => {
                let mut text = fs::read_to_string(&path).map_err(|e| {
                    CryptoError::InvalidKey(format!("cannot read {}: {e}", path.display()))
                })?;
                let key = MasterKey::from_base64(&text);
                text.zeroize();
                key?
            }
        };

        let digest = Sha256::digest(&master.0);
        let fingerprint = digest[..FINGERPRINT_LEN]
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();

        Ok(Self {
            master,
            fingerprint,
        })
    }

    /// Short, non-secret identifier of the master key, safe to log.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn generate_data_key(&self) -> Result<DataKey, CryptoError> {
        let mut bytes = [0u8; KEY_LEN];
        cipher::fill_random(&mut bytes)?;
        let key = DataKey(bytes);
        bytes.zeroize();
        Ok(key)
    }

    /// Seal `key` under the master key with `iv`, which must not have been
    /// used with the master key before.
    pub fn wrap(&self, key: &DataKey, iv: &Iv) -> Result<WrappedDataKey, CryptoError> {
        let ciphertext = cipher::seal(&self.master.0, iv, key.as_bytes())?;
        Ok(WrappedDataKey { iv: *iv, ciphertext })
    }

    /// Recover a data key. Fails closed with `AuthenticationFailed` if the
    /// wrapped key, its nonce, or the master key do not match.
    pub fn unwrap(&self, wrapped: &WrappedDataKey) -> Result<DataKey, CryptoError> {
        let mut bytes = cipher::open(&self.master.0, &wrapped.iv, &wrapped.ciphertext)?;
        let key = <[u8; KEY_LEN]>::try_from(bytes.as_slice())
            .map(DataKey)
            .map_err(|_| CryptoError::AuthenticationFailed);
        bytes.zeroize();
        key
    }
}

impl fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyManager")
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}
