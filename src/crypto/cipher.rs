// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! AES-256-GCM primitives and CSPRNG helpers.
//!
//! Every seal takes an explicit [`Iv`] and callers always pass a freshly
//! generated one. There is no API for a fixed or derived nonce.

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM};
use ring::rand::{SecureRandom, SystemRandom};

use super::CryptoError;

/// AES-256 key size in bytes.
pub const KEY_LEN: usize = 32;

/// AES-GCM nonce size in bytes (96 bits).
pub const IV_LEN: usize = 12;

/// AES-GCM authentication tag size in bytes.
pub const TAG_LEN: usize = 16;

/// A 96-bit AES-GCM nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Iv([u8; IV_LEN]);

impl Iv {
    /// Draw a fresh nonce from the system CSPRNG.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; IV_LEN];
        fill_random(&mut bytes)?;
        Ok(Self(bytes))
    }

    /// Rebuild a nonce from stored bytes. Returns `None` unless exactly 12 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; IV_LEN]>::try_from(bytes).ok().map(Self)
    }

    pub fn as_bytes(&self) -> &[u8; IV_LEN] {
        &self.0
    }

    fn nonce(&self) -> Nonce {
        Nonce::assume_unique_for_key(self.0)
    }
}

/// Fill `buf` from the operating system's CSPRNG.
pub fn fill_random(buf: &mut [u8]) -> Result<(), CryptoError> {
    SystemRandom::new()
        .fill(buf)
        .map_err(|_| CryptoError::EntropyUnavailable)
}

/// Build an AES-256-GCM key from raw bytes.
pub(crate) fn aead_key(key: &[u8]) -> Result<LessSafeKey, CryptoError> {
    UnboundKey::new(&AES_256_GCM, key)
        .map(LessSafeKey::new)
        .map_err(|_| CryptoError::InvalidKey(format!("AES-256 key must be {KEY_LEN} bytes")))
}

/// Encrypt `plaintext` and append the authentication tag.
pub fn seal(key: &[u8], iv: &Iv, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    seal_with(&aead_key(key)?, iv, plaintext)
}

/// Verify the tag and decrypt. A tag mismatch is `AuthenticationFailed`; no
/// plaintext is returned in that case.
pub fn open(key: &[u8], iv: &Iv, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    open_with(&aead_key(key)?, iv, ciphertext)
}

pub(crate) fn seal_with(
    key: &LessSafeKey,
    iv: &Iv,
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let mut in_out = Vec::with_capacity(plaintext.len() + TAG_LEN);
    in_out.extend_from_slice(plaintext);
    key.seal_in_place_append_tag(iv.nonce(), Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::EncryptionFailed("AES-GCM seal failed".to_string()))?;
    Ok(in_out)
}

pub(crate) fn open_with(
    key: &LessSafeKey,
    iv: &Iv,
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let mut in_out = ciphertext.to_vec();
    let plaintext_len = key
        .open_in_place(iv.nonce(), Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::AuthenticationFailed)?
        .len();
    in_out.truncate(plaintext_len);
    Ok(in_out)
}
