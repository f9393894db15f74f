// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! HTTP surface.
//!
//! | Method | Path | Handler |
//! |--------|------|---------|
//! | `GET` | `/health/live` | [`health::liveness`] |
//! | `GET` | `/health/ready` | [`health::readiness`] |
//! | `POST` | `/` | [`objects::upload_root`] |
//! | `POST` | `/{*path}` | [`objects::upload_object`] |
//! | `GET` | `/{*path}` | [`objects::download_object`] |
//!
//! Swagger UI is served at `/docs`, the OpenAPI document at
//! `/api-doc/openapi.json`. Objects cannot be stored under those paths.

use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::Request,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    api::health::{HealthChecks, HealthResponse, ReadyResponse},
    error::ErrorBody,
    models::{UploadResponse, UploadStatus},
    state::AppState,
};

pub mod health;
pub mod objects;

const REQUEST_ID_HEADER: &str = "x-request-id";

pub fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;

    let routes = Router::new()
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/", post(objects::upload_root))
        .route(
            "/{*path}",
            get(objects::download_object).post(objects::upload_object),
        )
        .with_state(state);

    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("-");
        tracing::info_span!(
            "http_request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    });

    Router::new()
        .merge(routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(trace)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::liveness,
        health::readiness,
        objects::upload_root,
        objects::upload_object,
        objects::download_object
    ),
    components(
        schemas(
            UploadResponse,
            UploadStatus,
            ErrorBody,
            ReadyResponse,
            HealthChecks,
            HealthResponse
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness checks"),
        (name = "Objects", description = "Encrypted object upload and download")
    )
)]
struct ApiDoc;
