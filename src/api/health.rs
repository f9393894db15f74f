// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use tracing::warn;
use utoipa::ToSchema;

use crate::state::AppState;

/// Readiness response with individual component status.
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadyResponse {
    /// Overall health status ("ok" or "degraded").
    pub status: String,
    pub checks: HealthChecks,
}

/// Individual health check results.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthChecks {
    /// Whether the service process is running.
    pub service: String,
    /// Blob store backend in use (`gcs`, `fs` or `memory`).
    pub backend: String,
    /// Blob store reachability ("ok" or "unavailable").
    pub storage: String,
}

/// Simple health check response for liveness checks.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Liveness handler.
///
/// Always returns 200 if the process is running.
/// Does not check dependencies - use readiness for that.
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn liveness() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness handler.
///
/// Returns 200 only if the blob store answers its health check.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse),
        (status = 503, description = "Blob store is unavailable", body = ReadyResponse)
    )
)]
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let store = state.gateway.store();
    let storage_ok = match store.health_check().await {
        Ok(()) => true,
        Err(e) => {
            warn!(backend = store.backend(), error = %e, "storage health check failed");
            false
        }
    };

    let response = ReadyResponse {
        status: if storage_ok { "ok" } else { "degraded" }.to_string(),
        checks: HealthChecks {
            service: "ok".to_string(),
            backend: store.backend().to_string(),
            storage: if storage_ok { "ok" } else { "unavailable" }.to_string(),
        },
    };

    let status = if storage_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::crypto::{EnvelopeDecryptor, EnvelopeEncryptor, KeyManager, KeySource};
    use crate::gateway::{tests::test_gateway, ObjectGateway};
    use crate::storage::{FsBlobStore, StoragePaths};

    #[tokio::test]
    async fn liveness_is_always_ok() {
        let Json(body) = liveness().await;
        assert_eq!(body.status, "ok");
    }

    #[tokio::test]
    async fn readiness_reports_backend() {
        let (gateway, _store) = test_gateway();
        let (status, Json(body)) = readiness(State(AppState::new(gateway))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ok");
        assert_eq!(body.checks.backend, "memory");
        assert_eq!(body.checks.storage, "ok");
    }

    #[tokio::test]
    async fn readiness_degrades_when_storage_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::open(StoragePaths::new(dir.path().join("root"))).unwrap();
        // Remove the root out from under the store.
        std::fs::remove_dir_all(dir.path().join("root")).unwrap();

        let keys = Arc::new(KeyManager::new(KeySource::Random).unwrap());
        let gateway = ObjectGateway::new(
            Arc::new(store),
            EnvelopeEncryptor::new(keys.clone(), None),
            EnvelopeDecryptor::new(keys, None),
        );
        let (status, Json(body)) = readiness(State(AppState::new(Arc::new(gateway)))).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.status, "degraded");
        assert_eq!(body.checks.backend, "fs");
        assert_eq!(body.checks.storage, "unavailable");
    }
}
