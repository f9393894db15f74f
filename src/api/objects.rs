// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
        HeaderMap, HeaderName, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};

use crate::{
    crypto::mode::{MODE_PARAM, PASSPHRASE_PARAM},
    error::{ApiError, ErrorBody},
    gateway::{GatewayError, Processing, UploadRequest},
    metadata::{ObjectMetadata, CUSTOM_PREFIX},
    models::UploadResponse,
    state::AppState,
};

pub const OBJECT_NAME_HEADER: &str = "object-name";
pub const OBJECT_PATH_HEADER: &str = "object-path";
pub const ASYNC_PROCESSING_HEADER: &str = "async-processing";
/// Set on downloads of `pubkey` objects returned still encrypted.
pub const SEALED_HEADER: &str = "encryption-sealed";
/// Multipart field carrying the upload.
pub const FILE_FIELD: &str = "file";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, ApiError> {
    headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| ApiError::bad_request(format!("header {name} is not valid text")))
        })
        .transpose()
}

/// Like [`header`] but accepts any UTF-8, for values such as passphrases
/// that are not limited to visible ASCII.
fn utf8_header(headers: &HeaderMap, name: &str) -> Result<Option<String>, ApiError> {
    headers
        .get(name)
        .map(|value| {
            String::from_utf8(value.as_bytes().to_vec())
                .map_err(|_| ApiError::bad_request(format!("header {name} is not valid UTF-8")))
        })
        .transpose()
}

/// Response headers a stored custom entry may never set: framing,
/// hop-by-hop, cookies, redirects and the headers this handler owns.
fn is_protected_header(name: &str) -> bool {
    const PROTECTED: &[&str] = &[
        "connection",
        "keep-alive",
        "location",
        "proxy-authenticate",
        "proxy-connection",
        "refresh",
        "set-cookie",
        "set-cookie2",
        "te",
        "trailer",
        "transfer-encoding",
        "upgrade",
        "www-authenticate",
        "x-request-id",
        "encryption-type",
        SEALED_HEADER,
    ];
    name.starts_with("content-") || PROTECTED.contains(&name)
}

/// `attachment` disposition for the last path segment of `name`. The plain
/// `filename` is an escaped ASCII fallback; non-ASCII names also get an
/// RFC 5987 `filename*`.
fn content_disposition(name: &str) -> HeaderValue {
    let basename = name.rsplit('/').next().unwrap_or(name);

    let mut value = String::from("attachment; filename=\"");
    for c in basename.chars() {
        match c {
            '"' | '\\' => {
                value.push('\\');
                value.push(c);
            }
            c if c.is_ascii() && !c.is_ascii_control() => value.push(c),
            _ => value.push('_'),
        }
    }
    value.push('"');

    if !basename.is_ascii() {
        value.push_str("; filename*=UTF-8''");
        for b in basename.bytes() {
            if b.is_ascii_alphanumeric() || b"!#$&+-.^_`|~".contains(&b) {
                value.push(char::from(b));
            } else {
                value.push_str(&format!("%{b:02X}"));
            }
        }
    }

    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// Collect `__`-prefixed request headers. The first value of a repeated
/// header wins.
fn custom_metadata(headers: &HeaderMap) -> Result<ObjectMetadata, ApiError> {
    let mut metadata = ObjectMetadata::new();
    for (name, value) in headers {
        if !name.as_str().starts_with(CUSTOM_PREFIX) {
            continue;
        }
        let value = value
            .to_str()
            .map_err(|_| ApiError::bad_request(format!("header {name} is not valid text")))?;
        metadata
            .entry(name.as_str().to_string())
            .or_insert_with(|| value.to_string());
    }
    Ok(metadata)
}

fn multipart_error(e: MultipartError) -> ApiError {
    let status = e.status();
    let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
        "payload_too_large"
    } else {
        "invalid_multipart"
    };
    ApiError::new(status, code, e.body_text())
}

async fn read_file_field(mut multipart: Multipart) -> Result<Vec<u8>, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some(FILE_FIELD) {
            return Ok(field.bytes().await.map_err(multipart_error)?.to_vec());
        }
    }
    Err(GatewayError::MissingParameter(FILE_FIELD.to_string()).into())
}

async fn upload(
    state: AppState,
    path: Option<String>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let name = header(&headers, OBJECT_NAME_HEADER)?
        .map(str::to_string)
        .or(path);
    let processing = match header(&headers, ASYNC_PROCESSING_HEADER)? {
        Some(flag) if flag.trim().eq_ignore_ascii_case("true") => Processing::Async,
        _ => Processing::Sync,
    };

    let request = UploadRequest {
        name,
        prefix: header(&headers, OBJECT_PATH_HEADER)?.map(str::to_string),
        body: read_file_field(multipart).await?,
        mode: header(&headers, MODE_PARAM)?.unwrap_or_default().to_string(),
        passphrase: utf8_header(&headers, PASSPHRASE_PARAM)?,
        custom_metadata: custom_metadata(&headers)?,
        processing,
    };

    let receipt = state.gateway.upload(request).await?;
    Ok(Json(UploadResponse::from(receipt)))
}

/// Upload an object under `path` (or the `Object-Name` header).
#[utoipa::path(
    post,
    path = "/{path}",
    params(
        ("path" = String, Path, description = "Object name, may contain '/'"),
        ("Object-Name" = Option<String>, Header, description = "Overrides the name taken from the path"),
        ("Object-Path" = Option<String>, Header, description = "Prefix joined as prefix/name"),
        ("Encryption-Type" = String, Header, description = "none, plain, pubkey or symmetric"),
        ("Symmkey" = Option<String>, Header, description = "Passphrase, required for symmetric"),
        ("Async-processing" = Option<String>, Header, description = "`true` to store in the background")
    ),
    request_body(content = String, content_type = "multipart/form-data", description = "Multipart form with a `file` field"),
    tag = "Objects",
    responses(
        (status = 200, description = "Stored, or accepted for background storage", body = UploadResponse),
        (status = 400, description = "Missing or invalid parameter", body = ErrorBody),
        (status = 413, description = "Upload exceeds the body limit", body = ErrorBody),
        (status = 500, description = "Encryption or storage failure", body = ErrorBody)
    )
)]
pub async fn upload_object(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    upload(state, Some(path), headers, multipart).await
}

/// Upload an object named by `Object-Name`, or by the SHA-256 of its content.
#[utoipa::path(
    post,
    path = "/",
    params(
        ("Object-Name" = Option<String>, Header, description = "Object name; defaults to the hex SHA-256 of the content"),
        ("Object-Path" = Option<String>, Header, description = "Prefix joined as prefix/name"),
        ("Encryption-Type" = String, Header, description = "none, plain, pubkey or symmetric"),
        ("Symmkey" = Option<String>, Header, description = "Passphrase, required for symmetric"),
        ("Async-processing" = Option<String>, Header, description = "`true` to store in the background")
    ),
    request_body(content = String, content_type = "multipart/form-data", description = "Multipart form with a `file` field"),
    tag = "Objects",
    responses(
        (status = 200, description = "Stored, or accepted for background storage", body = UploadResponse),
        (status = 400, description = "Missing or invalid parameter", body = ErrorBody),
        (status = 500, description = "Encryption or storage failure", body = ErrorBody)
    )
)]
pub async fn upload_root(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    upload(state, None, headers, multipart).await
}

/// Download and decrypt an object.
#[utoipa::path(
    get,
    path = "/{path}",
    params(
        ("path" = String, Path, description = "Object name, may contain '/'"),
        ("Symmkey" = Option<String>, Header, description = "Passphrase, required for symmetric objects")
    ),
    tag = "Objects",
    responses(
        (status = 200, description = "Object bytes", content_type = "application/octet-stream", body = Vec<u8>),
        (status = 400, description = "Missing passphrase", body = ErrorBody),
        (status = 404, description = "No such object", body = ErrorBody),
        (status = 500, description = "Decryption, authentication or storage failure", body = ErrorBody)
    )
)]
pub async fn download_object(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let passphrase = utf8_header(&headers, PASSPHRASE_PARAM)?;
    let download = state.gateway.download(&path, passphrase.as_deref()).await?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    response_headers.insert(CONTENT_DISPOSITION, content_disposition(&download.name));
    response_headers.insert(CONTENT_LENGTH, HeaderValue::from(download.body.len()));
    response_headers.insert(
        HeaderName::from_static("encryption-type"),
        HeaderValue::from_static(download.mode.as_str()),
    );
    if download.sealed {
        response_headers.insert(
            HeaderName::from_static(SEALED_HEADER),
            HeaderValue::from_static("true"),
        );
    }
    for (name, value) in &download.custom_metadata {
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) else {
            continue;
        };
        if !is_protected_header(name.as_str()) && !response_headers.contains_key(&name) {
            response_headers.insert(name, value);
        }
    }

    Ok((StatusCode::OK, response_headers, download.body).into_response())
}
