// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Passphrase-based container for the `symmetric` mode.
//!
//! The caller supplies the passphrase on upload and again on download; the
//! gateway never stores it. The key is derived with PBKDF2-HMAC-SHA256 over a
//! random per-object salt.
//!
//! ```text
//! | version (1) | salt (16) | nonce (12) | ciphertext + tag |
//! ```

use std::fmt;
use std::num::NonZeroU32;

use ring::pbkdf2;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::cipher::{self, Iv, IV_LEN, KEY_LEN, TAG_LEN};
use super::CryptoError;

const VERSION: u8 = 1;
const SALT_LEN: usize = 16;
const HEADER_LEN: usize = 1 + SALT_LEN + IV_LEN;

/// PBKDF2 work factor (OWASP 2023 guidance for HMAC-SHA256).
const ITERATIONS: NonZeroU32 = match NonZeroU32::new(210_000) {
    Some(n) => n,
    None => panic!("iteration count must be non-zero"),
};

/// Caller-supplied secret for the `symmetric` mode. Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Passphrase(String);

impl Passphrase {
    /// Returns `None` for an empty passphrase.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase([REDACTED])")
    }
}

pub fn seal(passphrase: &Passphrase, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut salt = [0u8; SALT_LEN];
    cipher::fill_random(&mut salt)?;
    let iv = Iv::generate()?;

    let key = derive_key(passphrase, &salt);
    let sealed = cipher::seal(key.as_slice(), &iv, plaintext)?;

    let mut container = Vec::with_capacity(HEADER_LEN + sealed.len());
    container.push(VERSION);
    container.extend_from_slice(&salt);
    container.extend_from_slice(iv.as_bytes());
    container.extend_from_slice(&sealed);
    Ok(container)
}

/// Open a container. A wrong passphrase and a corrupted container are
/// indistinguishable and both yield `DecryptionFailed`.
pub fn open(passphrase: &Passphrase, container: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if container.len() < HEADER_LEN + TAG_LEN {
        return Err(CryptoError::DecryptionFailed(
            "passphrase container is truncated".to_string(),
        ));
    }
    if container[0] != VERSION {
        return Err(CryptoError::DecryptionFailed(format!(
            "unsupported passphrase container version {}",
            container[0]
        )));
    }

    let (salt, rest) = container[1..].split_at(SALT_LEN);
    let (iv, ciphertext) = rest.split_at(IV_LEN);
    let iv = Iv::from_slice(iv)
        .ok_or_else(|| CryptoError::DecryptionFailed("malformed container nonce".to_string()))?;

    let key = derive_key(passphrase, salt);
    cipher::open(key.as_slice(), &iv, ciphertext).map_err(|e| match e {
        CryptoError::AuthenticationFailed => CryptoError::DecryptionFailed(
            "wrong passphrase or corrupted container".to_string(),
        ),
        other => other,
    })
}

fn derive_key(passphrase: &Passphrase, salt: &[u8]) -> Zeroizing<[u8; KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        ITERATIONS,
        salt,
        passphrase.as_bytes(),
        key.as_mut_slice(),
    );
    key
}
