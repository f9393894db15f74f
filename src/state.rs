// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::config::DEFAULT_MAX_UPLOAD_BYTES;
use crate::gateway::ObjectGateway;

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<ObjectGateway>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(gateway: Arc<ObjectGateway>) -> Self {
        Self {
            gateway,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_max_upload_bytes(mut self, limit: usize) -> Self {
        self.max_upload_bytes = limit;
        self
    }
}
