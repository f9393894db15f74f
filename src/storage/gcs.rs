// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Google Cloud Storage backend over the JSON API.
//!
//! ## Requests
//!
//! | Operation    | Request                                                          |
//! |--------------|------------------------------------------------------------------|
//! | put          | `POST /upload/storage/v1/b/{bucket}/o?uploadType=multipart`      |
//! | get          | `GET /storage/v1/b/{bucket}/o/{name}` then `?alt=media&generation=N` |
//! | health check | `GET /storage/v1/b/{bucket}`                                     |
//!
//! `put` sends the metadata bag and the body in one `multipart/related`
//! request, so an object never exists without its envelope fields. `get`
//! pins the media download to the generation whose metadata it read.
//!
//! Every request asks its [`TokenSource`] for a bearer token.
//! [`DefaultCredentials`] resolves Application Default Credentials and
//! caches tokens until shortly before they expire. [`StaticToken`] sends a
//! fixed token. Without a source, requests are anonymous (emulators).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::{BlobStore, ObjectLocator, StorageError, StorageResult, StoredObject};
use crate::metadata::ObjectMetadata;

pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

const BROWSER_BASE_URL: &str = "https://storage.cloud.google.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const STORAGE_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";

/// Supplies the bearer token for each Cloud Storage request.
#[async_trait]
pub trait TokenSource: Send + Sync + 'static {
    async fn token(&self) -> StorageResult<String>;
}

/// A fixed token. Never refreshed.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> StorageResult<String> {
        Ok(self.0.clone())
    }
}

/// Application Default Credentials via `gcp_auth`, which caches each token
/// and fetches a new one before it expires.
pub struct DefaultCredentials(Arc<dyn gcp_auth::TokenProvider>);

impl DefaultCredentials {
    /// Look up credentials from `GOOGLE_APPLICATION_CREDENTIALS`, the gcloud
    /// configuration or the metadata server.
    pub async fn discover() -> StorageResult<Self> {
        gcp_auth::provider()
            .await
            .map(Self)
            .map_err(|e| StorageError::Unavailable(format!("no GCS credentials found: {e}")))
    }
}

#[async_trait]
impl TokenSource for DefaultCredentials {
    async fn token(&self) -> StorageResult<String> {
        let token = self
            .0
            .token(&[STORAGE_SCOPE])
            .await
            .map_err(|e| StorageError::Unavailable(format!("failed to obtain GCS token: {e}")))?;
        Ok(token.as_str().to_string())
    }
}

/// Subset of the object resource we read.
#[derive(Debug, Deserialize)]
struct ObjectResource {
    name: String,
    generation: String,
    #[serde(default)]
    metadata: Option<ObjectMetadata>,
}

#[derive(Clone)]
pub struct GcsBlobStore {
    bucket: String,
    endpoint: Url,
    credentials: Option<Arc<dyn TokenSource>>,
    http: Client,
}

impl GcsBlobStore {
    pub fn new(
        bucket: impl Into<String>,
        endpoint: &str,
        credentials: Option<Arc<dyn TokenSource>>,
    ) -> StorageResult<Self> {
        let endpoint = Url::parse(endpoint).map_err(|e| {
            StorageError::Unavailable(format!("invalid GCS endpoint {endpoint}: {e}"))
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(StorageError::Unavailable(format!(
                "GCS endpoint {endpoint} cannot be a base URL"
            )));
        }
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StorageError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            bucket: bucket.into(),
            endpoint,
            credentials,
            http,
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// `{endpoint}/{prefix...}/b/{bucket}/{rest...}`, each segment
    /// percent-encoded (object names keep their `/` as `%2F`).
    fn url(&self, prefix: &[&str], rest: &[&str]) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(prefix)
                .push("b")
                .push(&self.bucket)
                .extend(rest);
        }
        url
    }

    fn object_url(&self, name: &str) -> Url {
        self.url(&["storage", "v1"], &["o", name])
    }

    async fn authorized(&self, request: RequestBuilder) -> StorageResult<RequestBuilder> {
        match &self.credentials {
            Some(source) => Ok(request.bearer_auth(source.token().await?)),
            None => Ok(request),
        }
    }

    async fn send(&self, request: RequestBuilder) -> StorageResult<Response> {
        self.authorized(request)
            .await?
            .send()
            .await
            .map_err(|e| StorageError::Unavailable(format!("GCS request failed: {e}")))
    }
}

async fn unexpected(response: Response, action: &str) -> StorageError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return StorageError::Unavailable(format!(
            "GCS {action} rejected the credentials (HTTP {status}): {body}"
        ));
    }
    StorageError::Unavailable(format!("GCS {action} returned HTTP {status}: {body}"))
}

/// Build a `multipart/related` body: JSON resource part, then media part.
fn multipart_related(boundary: &str, resource: &serde_json::Value, media: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(media.len() + 512);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(resource.to_string().as_bytes());
    body.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(media);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

#[async_trait]
impl BlobStore for GcsBlobStore {
    fn backend(&self) -> &'static str {
        "gcs"
    }

    fn locator(&self, name: &str) -> ObjectLocator {
        ObjectLocator {
            uri: format!("gcs://{}/{name}", self.bucket),
            link_url: Some(format!("{BROWSER_BASE_URL}/{}/{name}", self.bucket)),
        }
    }

    async fn put(&self, object: StoredObject) -> StorageResult<()> {
        let boundary = format!("envelope-{}", uuid::Uuid::new_v4().simple());
        let resource = json!({
            "name": object.name,
            "metadata": object.metadata,
        });
        let body = multipart_related(&boundary, &resource, &object.body);

        let mut url = self.url(&["upload", "storage", "v1"], &["o"]);
        url.query_pairs_mut().append_pair("uploadType", "multipart");

        let request = self
            .http
            .post(url)
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body);
        let response = self.send(request).await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(StorageError::BucketNotFound(self.bucket.clone())),
            _ => Err(unexpected(response, "upload").await),
        }
    }

    async fn get(&self, name: &str) -> StorageResult<StoredObject> {
        let response = self.send(self.http.get(self.object_url(name))).await?;
        let resource: ObjectResource = match response.status() {
            status if status.is_success() => response
                .json()
                .await
                .map_err(|e| StorageError::Unavailable(format!("invalid object resource: {e}")))?,
            StatusCode::NOT_FOUND => return Err(StorageError::NotFound(name.to_string())),
            _ => return Err(unexpected(response, "metadata read").await),
        };

        let mut media_url = self.object_url(name);
        media_url
            .query_pairs_mut()
            .append_pair("alt", "media")
            .append_pair("generation", &resource.generation);
        let response = self.send(self.http.get(media_url)).await?;
        let body = match response.status() {
            status if status.is_success() => response
                .bytes()
                .await
                .map_err(|e| StorageError::Unavailable(format!("media read failed: {e}")))?,
            // Replaced between the two reads; a retry sees the new generation.
            StatusCode::NOT_FOUND => return Err(StorageError::NotFound(name.to_string())),
            _ => return Err(unexpected(response, "media read").await),
        };

        Ok(StoredObject {
            name: resource.name,
            body: body.to_vec(),
            metadata: resource.metadata.unwrap_or_default(),
        })
    }

    async fn health_check(&self) -> StorageResult<()> {
        let url = self.url(&["storage", "v1"], &[]);
        let response = self.send(self.http.get(url)).await?;
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(StorageError::BucketNotFound(self.bucket.clone())),
            _ => Err(unexpected(response, "bucket lookup").await),
        }
    }
}

impl std::fmt::Debug for GcsBlobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcsBlobStore")
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint.as_str())
            .field("authenticated", &self.credentials.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::sync::Arc;

    use axum::body::Bytes;
    use axum::extract::{Path, Query, Request, State};
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::middleware::{self, Next};
    use axum::response::{IntoResponse, Response as AxumResponse};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use tokio::sync::Mutex;

    const BUCKET: &str = "encrypted_data";
    const TOKEN: &str = "test-token";

    #[derive(Default)]
    struct FakeGcs {
        objects: Mutex<HashMap<String, (u64, ObjectMetadata, Vec<u8>)>>,
        generation: Mutex<u64>,
        /// The only bearer token currently accepted.
        valid_token: Mutex<String>,
    }

    /// Hands out whatever token it currently holds, like a refreshing
    /// credential provider.
    struct RotatingToken(std::sync::Mutex<String>);

    #[async_trait]
    impl TokenSource for RotatingToken {
        async fn token(&self) -> StorageResult<String> {
            Ok(self.0.lock().unwrap().clone())
        }
    }

    async fn require_token(
        State(fake): State<Arc<FakeGcs>>,
        request: Request,
        next: Next,
    ) -> AxumResponse {
        let expected = format!("Bearer {}", fake.valid_token.lock().await);
        let given = request
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok());
        if given != Some(expected.as_str()) {
            return (
                AxumStatus::UNAUTHORIZED,
                Json(serde_json::json!({"error": {"code": 401, "message": "Invalid Credentials"}})),
            )
                .into_response();
        }
        next.run(request).await
    }

    fn boundary(headers: &HeaderMap) -> String {
        headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split("boundary=").nth(1))
            .unwrap()
            .to_string()
    }

    /// Split a multipart/related body into (resource JSON, media bytes).
    fn split_related(boundary: &str, body: &[u8]) -> (serde_json::Value, Vec<u8>) {
        let opening = format!("--{boundary}\r\n");
        let middle = format!("\r\n--{boundary}\r\n");
        let closing = format!("\r\n--{boundary}--\r\n");
        let find = |haystack: &[u8], needle: &[u8]| {
            haystack
                .windows(needle.len())
                .position(|w| w == needle)
                .unwrap()
        };

        let body = &body[opening.len()..];
        let split = find(body, middle.as_bytes());
        let (json_part, rest) = (&body[..split], &body[split + middle.len()..]);
        let rest = &rest[..rest.len() - closing.len()];

        let json_start = find(json_part, b"\r\n\r\n") + 4;
        let media_start = find(rest, b"\r\n\r\n") + 4;
        (
            serde_json::from_slice(&json_part[json_start..]).unwrap(),
            rest[media_start..].to_vec(),
        )
    }

    async fn bucket(Path(name): Path<String>) -> AxumStatus {
        if name == BUCKET {
            AxumStatus::OK
        } else {
            AxumStatus::NOT_FOUND
        }
    }

    async fn upload(
        State(fake): State<Arc<FakeGcs>>,
        Path(name): Path<String>,
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
        body: Bytes,
    ) -> AxumStatus {
        if name != BUCKET {
            return AxumStatus::NOT_FOUND;
        }
        assert_eq!(query.get("uploadType").map(String::as_str), Some("multipart"));

        let (resource, media) = split_related(&boundary(&headers), &body);
        let object_name = resource["name"].as_str().unwrap().to_string();
        let metadata: ObjectMetadata =
            serde_json::from_value(resource["metadata"].clone()).unwrap();

        let mut generation = fake.generation.lock().await;
        *generation += 1;
        fake.objects
            .lock()
            .await
            .insert(object_name, (*generation, metadata, media));
        AxumStatus::OK
    }

    async fn object(
        State(fake): State<Arc<FakeGcs>>,
        Path((_bucket, name)): Path<(String, String)>,
        Query(query): Query<HashMap<String, String>>,
    ) -> AxumResponse {
        let objects = fake.objects.lock().await;
        let Some((generation, metadata, media)) = objects.get(&name) else {
            return AxumStatus::NOT_FOUND.into_response();
        };
        if query.get("alt").map(String::as_str) == Some("media") {
            assert_eq!(query.get("generation"), Some(&generation.to_string()));
            return media.clone().into_response();
        }
        Json(serde_json::json!({
            "name": name,
            "bucket": BUCKET,
            "generation": generation.to_string(),
            "metadata": metadata,
        }))
        .into_response()
    }

    async fn fake_server() -> (String, Arc<FakeGcs>) {
        let fake = Arc::new(FakeGcs {
            valid_token: Mutex::new(TOKEN.to_string()),
            ..FakeGcs::default()
        });
        let app = Router::new()
            .route("/storage/v1/b/{bucket}", get(bucket))
            .route("/storage/v1/b/{bucket}/o/{object}", get(object))
            .route("/upload/storage/v1/b/{bucket}/o", post(upload))
            .layer(middleware::from_fn_with_state(fake.clone(), require_token))
            .with_state(fake.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), fake)
    }

    fn store(endpoint: &str, bucket: &str) -> GcsBlobStore {
        GcsBlobStore::new(bucket, endpoint, Some(Arc::new(StaticToken::new(TOKEN)))).unwrap()
    }

    fn object_named(name: &str) -> StoredObject {
        StoredObject {
            name: name.to_string(),
            body: b"ciphertext".to_vec(),
            metadata: ObjectMetadata::from([("__envelope-mode".to_string(), "none".to_string())]),
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips_through_json_api() {
        let (endpoint, fake) = fake_server().await;
        let gcs = store(&endpoint, BUCKET);
        let object = StoredObject {
            name: "reports/2026/q3.bin".to_string(),
            body: vec![0, 1, 2, 0xff, b'\r', b'\n'],
            metadata: ObjectMetadata::from([
                ("__envelope-mode".to_string(), "none".to_string()),
                ("__owner".to_string(), "alice".to_string()),
            ]),
        };

        gcs.put(object.clone()).await.unwrap();
        assert!(fake.objects.lock().await.contains_key("reports/2026/q3.bin"));

        assert_eq!(gcs.get("reports/2026/q3.bin").await.unwrap(), object);
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let (endpoint, _fake) = fake_server().await;
        assert!(matches!(
            store(&endpoint, BUCKET).get("nope").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn health_check_distinguishes_missing_bucket() {
        let (endpoint, _fake) = fake_server().await;
        store(&endpoint, BUCKET).health_check().await.unwrap();

        assert!(matches!(
            store(&endpoint, "other-bucket").health_check().await,
            Err(StorageError::BucketNotFound(b)) if b == "other-bucket"
        ));
    }

    #[tokio::test]
    async fn expired_static_token_is_rejected() {
        let (endpoint, fake) = fake_server().await;
        let gcs = store(&endpoint, BUCKET);
        gcs.put(object_named("a")).await.unwrap();

        *fake.valid_token.lock().await = "refreshed-token".to_string();

        let err = gcs.put(object_named("b")).await.unwrap_err();
        assert!(
            matches!(&err, StorageError::Unavailable(msg) if msg.contains("rejected the credentials")),
            "{err}"
        );
        assert!(!fake.objects.lock().await.contains_key("b"));
    }

    #[tokio::test]
    async fn token_is_fetched_for_every_request() {
        let (endpoint, fake) = fake_server().await;
        let source = Arc::new(RotatingToken(std::sync::Mutex::new(TOKEN.to_string())));
        let credentials: Arc<dyn TokenSource> = source.clone();
        let gcs = GcsBlobStore::new(BUCKET, &endpoint, Some(credentials)).unwrap();
        gcs.put(object_named("a")).await.unwrap();

        // The old token expires and the source has already refreshed.
        *fake.valid_token.lock().await = "refreshed-token".to_string();
        *source.0.lock().unwrap() = "refreshed-token".to_string();

        gcs.put(object_named("b")).await.unwrap();
        assert_eq!(gcs.get("a").await.unwrap(), object_named("a"));
        gcs.health_check().await.unwrap();
    }

    #[tokio::test]
    async fn anonymous_requests_carry_no_token() {
        let (endpoint, _fake) = fake_server().await;
        let gcs = GcsBlobStore::new(BUCKET, &endpoint, None).unwrap();
        assert!(matches!(
            gcs.health_check().await,
            Err(StorageError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unavailable() {
        let gcs = store("http://127.0.0.1:1", BUCKET);
        assert!(matches!(
            gcs.health_check().await,
            Err(StorageError::Unavailable(_))
        ));
    }

    #[test]
    fn urls_and_locators() {
        let gcs = GcsBlobStore::new(BUCKET, DEFAULT_ENDPOINT, None).unwrap();
        assert_eq!(
            gcs.object_url("a/b c.txt").as_str(),
            "https://storage.googleapis.com/storage/v1/b/encrypted_data/o/a%2Fb%20c.txt"
        );

        let locator = gcs.locator("a/b.txt");
        assert_eq!(locator.uri, "gcs://encrypted_data/a/b.txt");
        assert_eq!(
            locator.link_url.as_deref(),
            Some("https://storage.cloud.google.com/encrypted_data/a/b.txt")
        );
    }

    #[test]
    fn invalid_endpoint_is_rejected() {
        assert!(matches!(
            GcsBlobStore::new(BUCKET, "not a url", None),
            Err(StorageError::Unavailable(_))
        ));
        assert!(!format!("{:?}", store(DEFAULT_ENDPOINT, BUCKET)).contains(TOKEN));
    }
}
