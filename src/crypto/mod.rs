// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Envelope Encryption
//!
//! Confidentiality transforms applied to objects before they reach the blob
//! store, and reversed on retrieval.
//!
//! ## Modes
//!
//! | Mode        | Key material                                     | Stored alongside the body    |
//! |-------------|--------------------------------------------------|------------------------------|
//! | `none`      | none (passthrough)                               | mode only                    |
//! | `plain`     | per-object data key, wrapped by the master key   | wrapped key, key IV, data IV |
//! | `pubkey`    | ephemeral ECDH to a recipient secp256k1 key      | mode only (self-contained)   |
//! | `symmetric` | PBKDF2 from a caller passphrase                  | mode only (self-contained)   |
//!
//! `plain` is the only mode where the gateway holds key material. The master
//! key never leaves [`KeyManager`].

pub mod cipher;
pub mod envelope;
pub mod keys;
pub mod mode;
pub mod passphrase;
pub mod pubkey;

pub use cipher::Iv;
pub use envelope::{
    EncryptionEnvelope, EnvelopeDecryptor, EnvelopeEncryptor, EnvelopeHeader, Opened,
};
pub use keys::{DataKey, KeyManager, KeySource, WrappedDataKey};
pub use mode::{EncryptionMode, ModeError, ModeParams, ModeSelector, ValidatedMode};
pub use passphrase::Passphrase;
pub use pubkey::{RecipientKey, RecipientSecret};

/// Errors from cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// The system CSPRNG failed. Fatal and not retriable.
    #[error("secure random source unavailable")]
    EntropyUnavailable,

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// AES-GCM tag verification failed.
    #[error("authentication failed: ciphertext or key material was tampered with")]
    AuthenticationFailed,

    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The mode needs key material this gateway was not configured with.
    #[error("{0} is not configured")]
    KeyUnavailable(&'static str),
}
