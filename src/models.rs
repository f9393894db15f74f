// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::gateway::{Processing, UploadReceipt};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// Stored before the response was sent.
    Success,
    /// Accepted for background processing; not yet guaranteed to be stored.
    Started,
}

/// Response to an upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub status: UploadStatus,
    pub details: String,
    pub object_name: String,
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_url: Option<String>,
}

impl From<UploadReceipt> for UploadResponse {
    fn from(receipt: UploadReceipt) -> Self {
        let (status, details) = match receipt.processing {
            Processing::Sync => (UploadStatus::Success, "file successfully uploaded"),
            Processing::Async => (UploadStatus::Started, "upload in progress"),
        };
        Self {
            status,
            details: details.to_string(),
            object_name: receipt.name,
            uri: receipt.locator.uri,
            link_url: receipt.locator.link_url,
        }
    }
}
