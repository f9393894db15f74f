// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Envelope encryptor and decryptor: the per-mode state machine.

use std::sync::Arc;

use super::cipher::{self, Iv};
use super::keys::{KeyManager, WrappedDataKey};
use super::mode::{EncryptionMode, ValidatedMode, PASSPHRASE_PARAM};
use super::passphrase::{self, Passphrase};
use super::pubkey::{RecipientKey, RecipientSecret};
use super::CryptoError;

/// Mode-dependent fields needed to reverse an encryption.
///
/// Only `Plain` carries external key material; the other modes keep
/// everything inside the ciphertext container, or with the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeHeader {
    None,
    Plain {
        wrapped_key: WrappedDataKey,
        /// Nonce used to encrypt the body. Independent of `wrapped_key.iv`.
        iv: Iv,
    },
    PubKey,
    Symmetric,
}

impl EnvelopeHeader {
    pub fn mode(&self) -> EncryptionMode {
        match self {
            EnvelopeHeader::None => EncryptionMode::None,
            EnvelopeHeader::Plain { .. } => EncryptionMode::Plain,
            EnvelopeHeader::PubKey => EncryptionMode::PubKey,
            EnvelopeHeader::Symmetric => EncryptionMode::Symmetric,
        }
    }
}

/// Ciphertext plus the header needed to open it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionEnvelope {
    pub header: EnvelopeHeader,
    pub ciphertext: Vec<u8>,
}

/// Upload-side transform.
#[derive(Debug, Clone)]
pub struct EnvelopeEncryptor {
    keys: Arc<KeyManager>,
    recipient: Option<RecipientKey>,
}

impl EnvelopeEncryptor {
    pub fn new(keys: Arc<KeyManager>, recipient: Option<RecipientKey>) -> Self {
        Self { keys, recipient }
    }

    /// Whether this encryptor has the key material `mode` needs.
    pub fn check_available(&self, mode: &ValidatedMode) -> Result<(), CryptoError> {
        match mode {
            ValidatedMode::PubKey if self.recipient.is_none() => {
                Err(CryptoError::KeyUnavailable("recipient public key"))
            }
            _ => Ok(()),
        }
    }

    pub fn encrypt(
        &self,
        plaintext: &[u8],
        mode: &ValidatedMode,
    ) -> Result<EncryptionEnvelope, CryptoError> {
        let envelope = match mode {
            ValidatedMode::None => EncryptionEnvelope {
                header: EnvelopeHeader::None,
                ciphertext: plaintext.to_vec(),
            },
            ValidatedMode::Plain => {
                let data_key = self.keys.generate_data_key()?;
                let iv = Iv::generate()?;
                let ciphertext = cipher::seal(data_key.as_bytes(), &iv, plaintext)?;
                let wrapped_key = self.keys.wrap(&data_key, &Iv::generate()?)?;
                EncryptionEnvelope {
                    header: EnvelopeHeader::Plain { wrapped_key, iv },
                    ciphertext,
                }
            }
            ValidatedMode::PubKey => {
                let recipient = self
                    .recipient
                    .as_ref()
                    .ok_or(CryptoError::KeyUnavailable("recipient public key"))?;
                EncryptionEnvelope {
                    header: EnvelopeHeader::PubKey,
                    ciphertext: recipient.seal(plaintext)?,
                }
            }
            ValidatedMode::Symmetric(secret) => EncryptionEnvelope {
                header: EnvelopeHeader::Symmetric,
                ciphertext: passphrase::seal(secret, plaintext)?,
            },
        };
        Ok(envelope)
    }
}

/// Result of [`EnvelopeDecryptor::decrypt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Opened {
    Plaintext(Vec<u8>),
    /// A `pubkey` container returned as stored, because the private key
    /// lives outside this gateway.
    Sealed(Vec<u8>),
}

/// Download-side transform.
#[derive(Debug, Clone)]
pub struct EnvelopeDecryptor {
    keys: Arc<KeyManager>,
    recipient: Option<RecipientSecret>,
}

impl EnvelopeDecryptor {
    pub fn new(keys: Arc<KeyManager>, recipient: Option<RecipientSecret>) -> Self {
        Self { keys, recipient }
    }

    /// `passphrase` is required for `symmetric` envelopes and ignored otherwise.
    pub fn decrypt(
        &self,
        envelope: EncryptionEnvelope,
        passphrase: Option<&Passphrase>,
    ) -> Result<Opened, CryptoError> {
        let EncryptionEnvelope { header, ciphertext } = envelope;
        let opened = match header {
            EnvelopeHeader::None => Opened::Plaintext(ciphertext),
            EnvelopeHeader::Plain { wrapped_key, iv } => {
                let data_key = self.keys.unwrap(&wrapped_key)?;
                Opened::Plaintext(cipher::open(data_key.as_bytes(), &iv, &ciphertext)?)
            }
            EnvelopeHeader::PubKey => match &self.recipient {
                Some(secret) => Opened::Plaintext(secret.open(&ciphertext)?),
                None => Opened::Sealed(ciphertext),
            },
            EnvelopeHeader::Symmetric => {
                let secret = passphrase.ok_or(CryptoError::KeyUnavailable(PASSPHRASE_PARAM))?;
                Opened::Plaintext(passphrase::open(secret, &ciphertext)?)
            }
        };
        Ok(opened)
    }
}
