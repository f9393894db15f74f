// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Encryption mode negotiation.

use std::fmt;
use std::str::FromStr;

use super::passphrase::Passphrase;

/// Name of the request parameter carrying the mode.
pub const MODE_PARAM: &str = "Encryption-Type";

/// Name of the request parameter carrying the `symmetric` passphrase.
pub const PASSPHRASE_PARAM: &str = "Symmkey";

/// The confidentiality transform applied to an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncryptionMode {
    /// Plaintext passthrough. Insecure; for data that is already protected.
    None,
    /// AES-256-GCM with a per-object data key wrapped by the master key.
    Plain,
    /// Self-contained container sealed to a recipient public key.
    PubKey,
    /// Self-contained container keyed by a caller passphrase.
    Symmetric,
}

impl EncryptionMode {
    pub const ALL: [EncryptionMode; 4] = [
        EncryptionMode::None,
        EncryptionMode::Plain,
        EncryptionMode::PubKey,
        EncryptionMode::Symmetric,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EncryptionMode::None => "none",
            EncryptionMode::Plain => "plain",
            EncryptionMode::PubKey => "pubkey",
            EncryptionMode::Symmetric => "symmetric",
        }
    }
}

impl fmt::Display for EncryptionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncryptionMode {
    type Err = ModeError;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ModeError::MissingParameter(MODE_PARAM));
        }
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| ModeError::UnsupportedMode(value.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModeError {
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("unsupported encryption type: {0}")]
    UnsupportedMode(String),
}

/// Per-request inputs that some modes require.
#[derive(Debug, Clone, Default)]
pub struct ModeParams {
    pub passphrase: Option<String>,
}

/// A mode that passed validation, carrying whatever it needs to run.
#[derive(Debug, Clone)]
pub enum ValidatedMode {
    None,
    Plain,
    PubKey,
    Symmetric(Passphrase),
}

impl ValidatedMode {
    pub fn mode(&self) -> EncryptionMode {
        match self {
            ValidatedMode::None => EncryptionMode::None,
            ValidatedMode::Plain => EncryptionMode::Plain,
            ValidatedMode::PubKey => EncryptionMode::PubKey,
            ValidatedMode::Symmetric(_) => EncryptionMode::Symmetric,
        }
    }
}

/// Validates a requested mode against the supported set. Pure.
pub struct ModeSelector;

impl ModeSelector {
    pub fn validate(mode_name: &str, params: &ModeParams) -> Result<ValidatedMode, ModeError> {
        let validated = match mode_name.parse::<EncryptionMode>()? {
            EncryptionMode::None => ValidatedMode::None,
            EncryptionMode::Plain => ValidatedMode::Plain,
            EncryptionMode::PubKey => ValidatedMode::PubKey,
            EncryptionMode::Symmetric => {
                let passphrase = params
                    .passphrase
                    .as_deref()
                    .and_then(Passphrase::new)
                    .ok_or(ModeError::MissingParameter(PASSPHRASE_PARAM))?;
                ValidatedMode::Symmetric(passphrase)
            }
        };
        Ok(validated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_passphrase(value: &str) -> ModeParams {
        ModeParams {
            passphrase: Some(value.to_string()),
        }
    }

    #[test]
    fn names_match_case_insensitively() {
        for (name, expected) in [
            ("none", EncryptionMode::None),
            ("PLAIN", EncryptionMode::Plain),
            ("PubKey", EncryptionMode::PubKey),
            (" symmetric ", EncryptionMode::Symmetric),
        ] {
            let validated = ModeSelector::validate(name, &with_passphrase("pw")).unwrap();
            assert_eq!(validated.mode(), expected, "mode name {name:?}");
        }
    }

    #[test]
    fn symmetric_without_passphrase_is_missing_parameter() {
        let result = ModeSelector::validate("Symmetric", &ModeParams::default());
        assert_eq!(result.unwrap_err(), ModeError::MissingParameter(PASSPHRASE_PARAM));

        let result = ModeSelector::validate("symmetric", &with_passphrase(""));
        assert_eq!(result.unwrap_err(), ModeError::MissingParameter(PASSPHRASE_PARAM));
    }

    #[test]
    fn unknown_name_is_unsupported_mode() {
        let result = ModeSelector::validate("bogus", &ModeParams::default());
        assert_eq!(
            result.unwrap_err(),
            ModeError::UnsupportedMode("bogus".to_string())
        );
    }

    #[test]
    fn empty_name_is_missing_parameter() {
        for name in ["", "   "] {
            let result = ModeSelector::validate(name, &ModeParams::default());
            assert_eq!(result.unwrap_err(), ModeError::MissingParameter(MODE_PARAM));
        }
    }

    #[test]
    fn display_round_trips_through_from_str() {
        for mode in EncryptionMode::ALL {
            assert_eq!(mode.to_string().parse::<EncryptionMode>().unwrap(), mode);
        }
    }
}
