// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Public-key container for the `pubkey` mode (ECIES over secp256k1).
//!
//! Each seal generates an ephemeral secp256k1 key, performs ECDH with the
//! recipient's public key, and derives an AES-256-GCM key with HKDF-SHA256.
//! Everything needed to open the container (apart from the recipient's
//! private key) is inside it:
//!
//! ```text
//! | version (1) | ephemeral point, SEC1 compressed (33) | nonce (12) | ciphertext + tag |
//! ```
//!
//! The gateway only needs the public key to upload. The private key is
//! optional and lives outside the upload path's trust boundary.

use std::fs;
use std::path::Path;

use k256::ecdh::diffie_hellman;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::pkcs8::{DecodePrivateKey, DecodePublicKey};
use k256::{PublicKey, SecretKey};
use ring::aead::{LessSafeKey, UnboundKey, AES_256_GCM};
use ring::hkdf;
use zeroize::Zeroize;

use super::cipher::{self, Iv, IV_LEN, KEY_LEN, TAG_LEN};
use super::CryptoError;

const VERSION: u8 = 1;
const POINT_LEN: usize = 33;
const HEADER_LEN: usize = 1 + POINT_LEN + IV_LEN;
const HKDF_INFO: &[&[u8]] = &[b"envelope-gateway/pubkey/v1"];

/// Recipient public key used to seal `pubkey` uploads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientKey(PublicKey);

impl RecipientKey {
    /// Parse a `PUBLIC KEY` (SPKI) PEM block.
    pub fn from_pem(pem_text: &str) -> Result<Self, CryptoError> {
        let block = pem::parse(pem_text)
            .map_err(|e| CryptoError::InvalidKey(format!("invalid PEM: {e}")))?;
        match block.tag() {
            "PUBLIC KEY" => PublicKey::from_public_key_der(block.contents())
                .map(Self)
                .map_err(|e| CryptoError::InvalidKey(format!("invalid public key: {e}"))),
            other => Err(CryptoError::InvalidKey(format!(
                "expected a PUBLIC KEY block, found {other}"
            ))),
        }
    }

    pub fn load(path: &Path) -> Result<Self, CryptoError> {
        let text = fs::read_to_string(path)
            .map_err(|e| CryptoError::InvalidKey(format!("cannot read {}: {e}", path.display())))?;
        Self::from_pem(&text)
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let ephemeral = RecipientSecret::generate()?;
        let ephemeral_point = ephemeral.0.public_key().to_encoded_point(true);
        let shared = diffie_hellman(ephemeral.0.to_nonzero_scalar(), self.0.as_affine());

        let key = derive_aead_key(
            ephemeral_point.as_bytes(),
            shared.raw_secret_bytes().as_slice(),
        )?;
        let iv = Iv::generate()?;
        let sealed = cipher::seal_with(&key, &iv, plaintext)?;

        let mut container = Vec::with_capacity(HEADER_LEN + sealed.len());
        container.push(VERSION);
        container.extend_from_slice(ephemeral_point.as_bytes());
        container.extend_from_slice(iv.as_bytes());
        container.extend_from_slice(&sealed);
        Ok(container)
    }
}

/// Recipient private key. Only needed when the gateway itself serves
/// decrypted `pubkey` objects.
#[derive(Clone)]
pub struct RecipientSecret(SecretKey);

impl RecipientSecret {
    pub fn generate() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; KEY_LEN];
        // Out-of-range scalars are astronomically rare; draw again if one appears.
        loop {
            cipher::fill_random(&mut bytes)?;
            if let Ok(secret) = SecretKey::from_slice(&bytes) {
                bytes.zeroize();
                return Ok(Self(secret));
            }
        }
    }

    /// Parse a `PRIVATE KEY` (PKCS#8) or `EC PRIVATE KEY` (SEC1) PEM block.
    pub fn from_pem(pem_text: &str) -> Result<Self, CryptoError> {
        let block = pem::parse(pem_text)
            .map_err(|e| CryptoError::InvalidKey(format!("invalid PEM: {e}")))?;
        let secret = match block.tag() {
            "PRIVATE KEY" => SecretKey::from_pkcs8_der(block.contents())
                .map_err(|e| CryptoError::InvalidKey(format!("invalid PKCS#8 key: {e}")))?,
            "EC PRIVATE KEY" => SecretKey::from_sec1_der(block.contents())
                .map_err(|e| CryptoError::InvalidKey(format!("invalid SEC1 key: {e}")))?,
            other => {
                return Err(CryptoError::InvalidKey(format!(
                    "expected a PRIVATE KEY block, found {other}"
                )))
            }
        };
        Ok(Self(secret))
    }

    pub fn load(path: &Path) -> Result<Self, CryptoError> {
        let mut text = fs::read_to_string(path)
            .map_err(|e| CryptoError::InvalidKey(format!("cannot read {}: {e}", path.display())))?;
        let secret = Self::from_pem(&text);
        text.zeroize();
        secret
    }

    pub fn public_key(&self) -> RecipientKey {
        RecipientKey(self.0.public_key())
    }

    /// Open a container sealed to this key's public half.
    pub fn open(&self, container: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if container.len() < HEADER_LEN + TAG_LEN {
            return Err(CryptoError::DecryptionFailed(
                "public-key container is truncated".to_string(),
            ));
        }
        if container[0] != VERSION {
            return Err(CryptoError::DecryptionFailed(format!(
                "unsupported public-key container version {}",
                container[0]
            )));
        }

        let (point, rest) = container[1..].split_at(POINT_LEN);
        let (iv, ciphertext) = rest.split_at(IV_LEN);
        let ephemeral = PublicKey::from_sec1_bytes(point).map_err(|_| {
            CryptoError::DecryptionFailed("container holds an invalid ephemeral key".to_string())
        })?;
        let iv = Iv::from_slice(iv)
            .ok_or_else(|| CryptoError::DecryptionFailed("malformed container nonce".to_string()))?;

        let shared = diffie_hellman(self.0.to_nonzero_scalar(), ephemeral.as_affine());
        let key = derive_aead_key(point, shared.raw_secret_bytes().as_slice())?;

        cipher::open_with(&key, &iv, ciphertext).map_err(|e| match e {
            CryptoError::AuthenticationFailed => CryptoError::DecryptionFailed(
                "container was not sealed to this key or is corrupted".to_string(),
            ),
            other => other,
        })
    }
}

impl std::fmt::Debug for RecipientSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RecipientSecret([REDACTED])")
    }
}

/// HKDF-SHA256 with the ephemeral point as salt.
fn derive_aead_key(salt: &[u8], shared_secret: &[u8]) -> Result<LessSafeKey, CryptoError> {
    let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, salt).extract(shared_secret);
    let okm = prk
        .expand(HKDF_INFO, &AES_256_GCM)
        .map_err(|_| CryptoError::EncryptionFailed("HKDF expansion failed".to_string()))?;
    Ok(LessSafeKey::new(UnboundKey::from(okm)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};

    #[test]
    fn sealed_container_opens_with_matching_secret() {
        let secret = RecipientSecret::generate().unwrap();
        let container = secret.public_key().seal(b"quarterly report").unwrap();

        assert_eq!(container[0], VERSION);
        assert_eq!(container.len(), HEADER_LEN + 16 + TAG_LEN);
        assert_eq!(secret.open(&container).unwrap(), b"quarterly report");
    }

    #[test]
    fn other_secret_cannot_open() {
        let recipient = RecipientSecret::generate().unwrap();
        let stranger = RecipientSecret::generate().unwrap();
        let container = recipient.public_key().seal(b"for recipient only").unwrap();

        assert!(matches!(
            stranger.open(&container),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn tampered_container_is_rejected() {
        let secret = RecipientSecret::generate().unwrap();
        let mut container = secret.public_key().seal(b"payload").unwrap();
        let last = container.len() - 1;
        container[last] ^= 0x01;

        assert!(matches!(
            secret.open(&container),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn invalid_ephemeral_point_is_rejected() {
        let secret = RecipientSecret::generate().unwrap();
        let mut container = secret.public_key().seal(b"payload").unwrap();
        container[1] = 0x05;

        assert!(matches!(
            secret.open(&container),
            Err(CryptoError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn keys_load_from_pem() {
        let secret = RecipientSecret::generate().unwrap();
        let private_pem = secret.0.to_pkcs8_pem(LineEnding::LF).unwrap();
        let public_pem = secret.0.public_key().to_public_key_pem(LineEnding::LF).unwrap();

        let loaded_public = RecipientKey::from_pem(&public_pem).unwrap();
        let loaded_secret = RecipientSecret::from_pem(&private_pem).unwrap();
        assert_eq!(loaded_public, secret.public_key());

        let container = loaded_public.seal(b"via pem").unwrap();
        assert_eq!(loaded_secret.open(&container).unwrap(), b"via pem");
    }

    #[test]
    fn pem_with_wrong_block_type_is_rejected() {
        let secret = RecipientSecret::generate().unwrap();
        let private_pem = secret.0.to_pkcs8_pem(LineEnding::LF).unwrap();

        assert!(matches!(
            RecipientKey::from_pem(&private_pem),
            Err(CryptoError::InvalidKey(_))
        ));
        assert!(matches!(
            RecipientKey::from_pem("not pem at all"),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn keys_load_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let secret = RecipientSecret::generate().unwrap();
        let public_path = dir.path().join("recipient.pub.pem");
        let private_path = dir.path().join("recipient.pem");
        fs::write(
            &public_path,
            secret.0.public_key().to_public_key_pem(LineEnding::LF).unwrap(),
        )
        .unwrap();
        fs::write(
            &private_path,
            secret.0.to_pkcs8_pem(LineEnding::LF).unwrap().as_bytes(),
        )
        .unwrap();

        let public = RecipientKey::load(&public_path).unwrap();
        let private = RecipientSecret::load(&private_path).unwrap();
        assert_eq!(private.public_key(), public);
    }
}
