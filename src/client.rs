// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Client tools behind the `envelope-client` binary.
//!
//! - [`upload_file`] posts a file to a running gateway the way browsers and
//!   scripts do: a multipart form with a `file` field plus request headers.
//! - [`decrypt_stored`] opens an object copied straight out of a blob store,
//!   without a gateway. The body comes either from a filesystem-backend
//!   object file or from a raw body plus its metadata bag as JSON.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::Value;
use tracing::debug;

use crate::api::objects::FILE_FIELD;
use crate::config::ConfigError;
use crate::crypto::{
    CryptoError, EncryptionEnvelope, EnvelopeDecryptor, EnvelopeHeader, KeyManager, KeySource,
    Opened, Passphrase, RecipientSecret,
};
use crate::metadata::{MetadataCodec, MetadataError, ObjectMetadata};
use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid header {0:?}: expected NAME:VALUE")]
    InvalidHeader(String),

    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("metadata is not a JSON object of strings: {0}")]
    MetadataJson(#[source] serde_json::Error),

    #[error(transparent)]
    Envelope(#[from] MetadataError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("object is mode plain: set MASTER_KEY or MASTER_KEY_FILE")]
    MasterKeyRequired,

    #[error("object is mode pubkey: pass the recipient private key")]
    Sealed,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Parse a `NAME:VALUE` pair. Splits on the first colon, so values may
/// contain colons. Values may be any UTF-8.
pub fn parse_header(raw: &str) -> Result<(HeaderName, HeaderValue), ClientError> {
    let invalid = || ClientError::InvalidHeader(raw.to_string());
    let (name, value) = raw.split_once(':').ok_or_else(invalid)?;
    let name = HeaderName::from_bytes(name.trim().as_bytes()).map_err(|_| invalid())?;
    let value = HeaderValue::from_bytes(value.trim().as_bytes()).map_err(|_| invalid())?;
    Ok((name, value))
}

pub fn header_map<'a>(raw: impl IntoIterator<Item = &'a str>) -> Result<HeaderMap, ClientError> {
    let mut headers = HeaderMap::new();
    for pair in raw {
        let (name, value) = parse_header(pair)?;
        headers.append(name, value);
    }
    Ok(headers)
}

/// What the gateway answered.
#[derive(Debug)]
pub struct UploadOutcome {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

/// Post `file` to `url` as the `file` field of a multipart form. The part
/// is named after the file's base name.
pub async fn upload_file(
    client: &reqwest::Client,
    url: &str,
    file: &Path,
    headers: HeaderMap,
) -> Result<UploadOutcome, ClientError> {
    let body = read(file)?;
    let file_name = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| FILE_FIELD.to_string());
    debug!(url, file = %file.display(), bytes = body.len(), "uploading");

    let form = Form::new().part(FILE_FIELD, Part::bytes(body).file_name(file_name));
    let response = client
        .post(url)
        .headers(headers)
        .multipart(form)
        .send()
        .await?;

    let status = response.status();
    let headers = response.headers().clone();
    let body = response.text().await?;
    Ok(UploadOutcome {
        status,
        headers,
        body,
    })
}

/// Parse a metadata bag. Accepts the flat bag itself or a Cloud Storage
/// object resource, whose bag sits under `metadata`.
pub fn parse_metadata(text: &str) -> Result<ObjectMetadata, ClientError> {
    let value: Value = serde_json::from_str(text).map_err(ClientError::MetadataJson)?;
    let bag = match value {
        Value::Object(mut resource) => match resource.remove("metadata") {
            Some(inner @ Value::Object(_)) => inner,
            Some(other) => {
                resource.insert("metadata".to_string(), other);
                Value::Object(resource)
            }
            None => Value::Object(resource),
        },
        other => other,
    };
    serde_json::from_value(bag).map_err(ClientError::MetadataJson)
}

/// Key material for offline decryption. Each field is only needed by the
/// mode that uses it.
#[derive(Debug)]
pub struct DecryptKeys {
    /// [`KeySource::Random`] means no master key was supplied.
    pub master_key: KeySource,
    pub recipient: Option<RecipientSecret>,
    pub passphrase: Option<Passphrase>,
}

/// Reverse the envelope recorded in `metadata` over `body`.
pub fn decrypt_stored(
    metadata: &ObjectMetadata,
    body: Vec<u8>,
    keys: DecryptKeys,
) -> Result<Vec<u8>, ClientError> {
    let (header, _custom) = MetadataCodec::decode(metadata)?;
    let mode = header.mode();
    let plain = matches!(header, EnvelopeHeader::Plain { .. });
    if plain && matches!(keys.master_key, KeySource::Random) {
        return Err(ClientError::MasterKeyRequired);
    }
    debug!(mode = %mode, bytes = body.len(), "decrypting");

    let master = Arc::new(KeyManager::new(keys.master_key)?);
    let decryptor = EnvelopeDecryptor::new(master, keys.recipient);
    let envelope = EncryptionEnvelope {
        header,
        ciphertext: body,
    };
    match decryptor.decrypt(envelope, keys.passphrase.as_ref())? {
        Opened::Plaintext(plaintext) => Ok(plaintext),
        Opened::Sealed(_) => Err(ClientError::Sealed),
    }
}

pub fn read(path: &Path) -> Result<Vec<u8>, ClientError> {
    fs::read(path).map_err(|source| ClientError::Read {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    use base64ct::{Base64, Encoding};

    use crate::api::router;
    use crate::crypto::{EnvelopeEncryptor, ValidatedMode};
    use crate::gateway::tests::test_gateway;
    use crate::state::AppState;
    use crate::storage::{read_object_file, BlobStore, FsBlobStore, StoragePaths, StoredObject};

    const MASTER_KEY: [u8; 32] = [7u8; 32];

    fn master() -> KeySource {
        KeySource::Base64(Base64::encode_string(&MASTER_KEY))
    }

    fn seal(
        mode: &ValidatedMode,
        recipient: Option<&RecipientSecret>,
        plaintext: &[u8],
    ) -> StoredObject {
        let keys = Arc::new(KeyManager::new(master()).unwrap());
        let encryptor = EnvelopeEncryptor::new(keys, recipient.map(RecipientSecret::public_key));
        let envelope = encryptor.encrypt(plaintext, mode).unwrap();
        StoredObject {
            name: "doc.txt".to_string(),
            body: envelope.ciphertext,
            metadata: MetadataCodec::encode(&envelope.header, &ObjectMetadata::new()),
        }
    }

    fn no_keys() -> DecryptKeys {
        DecryptKeys {
            master_key: KeySource::Random,
            recipient: None,
            passphrase: None,
        }
    }

    #[test]
    fn header_splits_on_first_colon() {
        let (name, value) = parse_header("Object-Name: a:b.txt").unwrap();
        assert_eq!(name, "object-name");
        assert_eq!(value, "a:b.txt");

        let (_, value) = parse_header("Symmkey:pässwort").unwrap();
        assert_eq!(value.as_bytes(), "pässwort".as_bytes());
    }

    #[test]
    fn malformed_headers_are_rejected() {
        for raw in ["no-colon", ": value", "bad name: v"] {
            assert!(
                matches!(parse_header(raw), Err(ClientError::InvalidHeader(_))),
                "{raw}"
            );
        }
    }

    #[test]
    fn repeated_headers_are_kept() {
        let headers = header_map(["__tag: a", "__tag: b", "Encryption-Type: plain"]).unwrap();
        assert_eq!(headers.get_all("__tag").iter().count(), 2);
        assert_eq!(headers["encryption-type"], "plain");
    }

    #[test]
    fn metadata_accepts_flat_bag_and_object_resource() {
        let flat = parse_metadata(r#"{"__envelope-mode":"none","__owner":"alice"}"#).unwrap();
        assert_eq!(flat["__owner"], "alice");

        let resource = parse_metadata(
            r#"{"name":"doc.txt","size":"5","metadata":{"__envelope-mode":"none"}}"#,
        )
        .unwrap();
        assert_eq!(resource.len(), 1);
        assert_eq!(resource["__envelope-mode"], "none");

        assert!(matches!(
            parse_metadata(r#"{"__envelope-mode": 3}"#),
            Err(ClientError::MetadataJson(_))
        ));
    }

    #[test]
    fn plain_object_decrypts_with_master_key() {
        let stored = seal(&ValidatedMode::Plain, None, b"quarterly numbers");
        let keys = DecryptKeys {
            master_key: master(),
            ..no_keys()
        };
        let plaintext = decrypt_stored(&stored.metadata, stored.body, keys).unwrap();
        assert_eq!(plaintext, b"quarterly numbers");
    }

    #[test]
    fn plain_object_without_master_key_is_refused() {
        let stored = seal(&ValidatedMode::Plain, None, b"x");
        let err = decrypt_stored(&stored.metadata, stored.body, no_keys()).unwrap_err();
        assert!(matches!(err, ClientError::MasterKeyRequired));
    }

    #[test]
    fn wrong_master_key_fails_authentication() {
        let stored = seal(&ValidatedMode::Plain, None, b"x");
        let keys = DecryptKeys {
            master_key: KeySource::Base64(Base64::encode_string(&[9u8; 32])),
            ..no_keys()
        };
        let err = decrypt_stored(&stored.metadata, stored.body, keys).unwrap_err();
        assert!(matches!(err, ClientError::Crypto(CryptoError::AuthenticationFailed)));
    }

    #[test]
    fn symmetric_and_pubkey_objects_decrypt_with_their_secrets() {
        let passphrase = Passphrase::new("open sesame").unwrap();
        let stored = seal(&ValidatedMode::Symmetric(passphrase.clone()), None, b"sym");
        let keys = DecryptKeys {
            passphrase: Some(passphrase),
            ..no_keys()
        };
        assert_eq!(decrypt_stored(&stored.metadata, stored.body, keys).unwrap(), b"sym");

        let recipient = RecipientSecret::generate().unwrap();
        let stored = seal(&ValidatedMode::PubKey, Some(&recipient), b"pub");
        let err = decrypt_stored(&stored.metadata, stored.body.clone(), no_keys()).unwrap_err();
        assert!(matches!(err, ClientError::Sealed));

        let keys = DecryptKeys {
            recipient: Some(recipient),
            ..no_keys()
        };
        assert_eq!(decrypt_stored(&stored.metadata, stored.body, keys).unwrap(), b"pub");
    }

    #[tokio::test]
    async fn filesystem_object_file_decrypts_offline() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(StoragePaths::new(dir.path())).unwrap();
        store
            .put(seal(&ValidatedMode::Plain, None, b"from disk"))
            .await
            .unwrap();

        let object = read_object_file(&store.paths().object_file("doc.txt")).unwrap();
        let keys = DecryptKeys {
            master_key: master(),
            ..no_keys()
        };
        assert_eq!(
            decrypt_stored(&object.metadata, object.body, keys).unwrap(),
            b"from disk"
        );
    }

    async fn serve_gateway() -> (SocketAddr, crate::storage::InMemoryBlobStore) {
        let (gateway, store) = test_gateway();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(AppState::new(gateway));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, store)
    }

    #[tokio::test]
    async fn upload_posts_multipart_file_with_headers() {
        let (addr, store) = serve_gateway().await;
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        fs::write(&file, b"meeting notes").unwrap();

        let headers = header_map(["Encryption-Type: none", "__owner: alice"]).unwrap();
        let outcome = upload_file(
            &reqwest::Client::new(),
            &format!("http://{addr}/team/notes.txt"),
            &file,
            headers,
        )
        .await
        .unwrap();

        assert_eq!(outcome.status, StatusCode::OK);
        assert!(outcome.headers.contains_key("x-request-id"));
        let body: Value = serde_json::from_str(&outcome.body).unwrap();
        assert_eq!(body["objectName"], "team/notes.txt");

        let stored = store.get("team/notes.txt").await.unwrap();
        assert_eq!(stored.body, b"meeting notes");
        assert_eq!(stored.metadata["__owner"], "alice");
    }

    #[tokio::test]
    async fn upload_reports_gateway_rejection() {
        let (addr, _store) = serve_gateway().await;
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.txt");
        fs::write(&file, b"x").unwrap();

        let outcome = upload_file(
            &reqwest::Client::new(),
            &format!("http://{addr}/notes.txt"),
            &file,
            HeaderMap::new(),
        )
        .await
        .unwrap();
        assert_eq!(outcome.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn missing_file_is_a_read_error() {
        let err = upload_file(
            &reqwest::Client::new(),
            "http://127.0.0.1:9/",
            Path::new("/nonexistent/notes.txt"),
            HeaderMap::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ClientError::Read { .. }));
    }
}
