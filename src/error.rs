// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::gateway::GatewayError;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

/// JSON body of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Always `"error"`.
    pub status: String,
    pub error: String,
    /// Machine-readable kind, e.g. `missing_parameter`.
    pub error_code: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "bad_request", message)
    }
}

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        let status = match &e {
            GatewayError::MissingParameter(_)
            | GatewayError::UnsupportedMode(_)
            | GatewayError::InvalidName(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::EncryptionFailed(_)
            | GatewayError::DecryptionFailed(_)
            | GatewayError::AuthenticationFailed
            | GatewayError::StorageUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.error_code(), e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            status: "error".to_string(),
            error: self.message,
            error_code: self.code.to_string(),
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn gateway_errors_map_to_status_and_code() {
        let cases = [
            (
                GatewayError::MissingParameter("Symmkey".into()),
                StatusCode::BAD_REQUEST,
                "missing_parameter",
            ),
            (
                GatewayError::UnsupportedMode("rot13".into()),
                StatusCode::BAD_REQUEST,
                "unsupported_mode",
            ),
            (
                GatewayError::InvalidName("..".into()),
                StatusCode::BAD_REQUEST,
                "invalid_name",
            ),
            (
                GatewayError::NotFound("x".into()),
                StatusCode::NOT_FOUND,
                "not_found",
            ),
            (
                GatewayError::AuthenticationFailed,
                StatusCode::INTERNAL_SERVER_ERROR,
                "authentication_failed",
            ),
            (
                GatewayError::StorageUnavailable("down".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_unavailable",
            ),
        ];

        for (error, status, code) in cases {
            let api = ApiError::from(error);
            assert_eq!(api.status, status);
            assert_eq!(api.code, code);
        }
    }

    #[tokio::test]
    async fn into_response_returns_json_body() {
        let response = ApiError::bad_request("bad data").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert_eq!(
            body,
            r#"{"status":"error","error":"bad data","error_code":"bad_request"}"#
        );
    }
}
