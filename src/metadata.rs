// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Object Metadata Codec
//!
//! Maps an [`EnvelopeHeader`] plus caller metadata onto the blob store's flat
//! string-to-string metadata bag, and back.
//!
//! ## Key Layout
//!
//! ```text
//! __envelope-mode     none | plain | pubkey | symmetric   (always written)
//! __envelope-key      base64 wrapped data key             (plain only)
//! __envelope-key-iv   base64 nonce used to wrap the key   (plain only)
//! __envelope-iv       base64 nonce used for the body      (plain only)
//! __<anything else>   caller metadata, value verbatim
//! ```
//!
//! Callers mark metadata with the `__` prefix. The `__envelope-` namespace is
//! reserved: caller entries in it are dropped on encode and never surfaced on
//! decode. Keys are lowercased because they arrive as HTTP header names.

use std::collections::BTreeMap;

use base64ct::{Base64, Encoding};

use crate::crypto::{EncryptionMode, EnvelopeHeader, Iv, WrappedDataKey};

/// Flat metadata bag as held by the blob store.
pub type ObjectMetadata = BTreeMap<String, String>;

/// Marker prefix callers use for custom metadata.
pub const CUSTOM_PREFIX: &str = "__";

/// Namespace reserved for envelope fields.
pub const RESERVED_PREFIX: &str = "__envelope-";

pub const MODE_KEY: &str = "__envelope-mode";
pub const WRAPPED_KEY_KEY: &str = "__envelope-key";
pub const WRAPPED_KEY_IV_KEY: &str = "__envelope-key-iv";
pub const DATA_IV_KEY: &str = "__envelope-iv";

const PLAIN_ONLY_KEYS: [&str; 3] = [WRAPPED_KEY_KEY, WRAPPED_KEY_IV_KEY, DATA_IV_KEY];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetadataError {
    #[error("envelope field {0} is missing")]
    MissingField(&'static str),

    #[error("envelope field {0} is not valid for mode {1}")]
    UnexpectedField(&'static str, EncryptionMode),

    #[error("envelope field {field} is malformed: {reason}")]
    Malformed { field: &'static str, reason: String },

    #[error("unknown stored encryption mode: {0}")]
    UnknownMode(String),
}

pub struct MetadataCodec;

impl MetadataCodec {
    /// Build the stored metadata bag. Caller entries without the `__` marker
    /// or inside the reserved namespace are dropped.
    pub fn encode(header: &EnvelopeHeader, custom: &ObjectMetadata) -> ObjectMetadata {
        let mut stored: ObjectMetadata = custom
            .iter()
            .map(|(key, value)| (key.to_ascii_lowercase(), value))
            .filter(|(key, _)| {
                key.len() > CUSTOM_PREFIX.len()
                    && key.starts_with(CUSTOM_PREFIX)
                    && !key.starts_with(RESERVED_PREFIX)
            })
            .map(|(key, value)| (key, value.clone()))
            .collect();

        stored.insert(MODE_KEY.to_string(), header.mode().to_string());
        if let EnvelopeHeader::Plain { wrapped_key, iv } = header {
            stored.insert(
                WRAPPED_KEY_KEY.to_string(),
                Base64::encode_string(&wrapped_key.ciphertext),
            );
            stored.insert(
                WRAPPED_KEY_IV_KEY.to_string(),
                Base64::encode_string(wrapped_key.iv.as_bytes()),
            );
            stored.insert(DATA_IV_KEY.to_string(), Base64::encode_string(iv.as_bytes()));
        }
        stored
    }

    /// Split a stored bag into the envelope header and caller metadata with
    /// the `__` marker stripped.
    pub fn decode(
        stored: &ObjectMetadata,
    ) -> Result<(EnvelopeHeader, ObjectMetadata), MetadataError> {
        let stored: ObjectMetadata = stored
            .iter()
            .map(|(key, value)| (key.to_ascii_lowercase(), value.clone()))
            .collect();

        let header = Self::decode_header(&stored)?;
        let custom = stored
            .iter()
            .filter(|(key, _)| !key.starts_with(RESERVED_PREFIX))
            .filter_map(|(key, value)| {
                key.strip_prefix(CUSTOM_PREFIX)
                    .filter(|name| !name.is_empty())
                    .map(|name| (name.to_string(), value.clone()))
            })
            .collect();
        Ok((header, custom))
    }

    fn decode_header(stored: &ObjectMetadata) -> Result<EnvelopeHeader, MetadataError> {
        let Some(mode) = stored.get(MODE_KEY) else {
            // Written out of band: no envelope at all means passthrough.
            return match PLAIN_ONLY_KEYS.iter().find(|key| stored.contains_key(**key)) {
                Some(_) => Err(MetadataError::MissingField(MODE_KEY)),
                None => Ok(EnvelopeHeader::None),
            };
        };
        let mode: EncryptionMode = mode
            .parse()
            .map_err(|_| MetadataError::UnknownMode(mode.clone()))?;

        if mode != EncryptionMode::Plain {
            if let Some(key) = PLAIN_ONLY_KEYS.iter().find(|key| stored.contains_key(**key)) {
                return Err(MetadataError::UnexpectedField(*key, mode));
            }
        }

        let header = match mode {
            EncryptionMode::None => EnvelopeHeader::None,
            EncryptionMode::PubKey => EnvelopeHeader::PubKey,
            EncryptionMode::Symmetric => EnvelopeHeader::Symmetric,
            EncryptionMode::Plain => EnvelopeHeader::Plain {
                wrapped_key: WrappedDataKey {
                    iv: decode_iv(stored, WRAPPED_KEY_IV_KEY)?,
                    ciphertext: decode_field(stored, WRAPPED_KEY_KEY)?,
                },
                iv: decode_iv(stored, DATA_IV_KEY)?,
            },
        };
        Ok(header)
    }
}

fn decode_field(stored: &ObjectMetadata, field: &'static str) -> Result<Vec<u8>, MetadataError> {
    let encoded = stored.get(field).ok_or(MetadataError::MissingField(field))?;
    Base64::decode_vec(encoded).map_err(|e| MetadataError::Malformed {
        field,
        reason: e.to_string(),
    })
}

fn decode_iv(stored: &ObjectMetadata, field: &'static str) -> Result<Iv, MetadataError> {
    let bytes = decode_field(stored, field)?;
    Iv::from_slice(&bytes).ok_or_else(|| MetadataError::Malformed {
        field,
        reason: format!("expected 12 bytes, got {}", bytes.len()),
    })
}
