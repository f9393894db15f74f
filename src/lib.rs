// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Envelope Gateway - Encrypting Object Storage Gateway
//!
//! Accepts file uploads over HTTP, encrypts each object under a fresh data
//! key (or a recipient public key, or a passphrase) and stores ciphertext
//! plus envelope metadata in a blob store. Downloads reverse the transform.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum) and OpenAPI docs
//! - `client` - Upload and offline decryption tools for `envelope-client`
//! - `config` - Environment configuration
//! - `crypto` - Key management, encryption modes and envelopes
//! - `gateway` - Upload/download orchestration
//! - `metadata` - Envelope header and custom metadata codec
//! - `startup` - Process bootstrap and exit codes
//! - `storage` - Blob store backends (GCS, filesystem, memory)

pub mod api;
pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod gateway;
pub mod metadata;
pub mod models;
pub mod startup;
pub mod state;
pub mod storage;
