// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Authentication error: {0}")]
    AuthError(String),
    #[error("Server error: {0}")]
    ServerError(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for StorageError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            StorageError::SerializationError(e.to_string())
        } else {
            StorageError::NetworkError(e.to_string())
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::SerializationError(e.to_string())
    }
}

impl From<object_store::Error> for StorageError {
    fn from(e: object_store::Error) -> Self {
        match e {
            object_store::Error::NotFound { path, .. } => StorageError::NotFound(path),
            object_store::Error::InvalidPath { source } => {
                StorageError::InvalidPath(source.to_string())
            }
            e @ (object_store::Error::Unauthenticated { .. }
            | object_store::Error::PermissionDenied { .. }) => StorageError::AuthError(e.to_string()),
            e => StorageError::ServerError(e.to_string()),
        }
    }
}

/// Map a non-success HTTP status from a Google API to a storage error
pub(crate) fn status_error(status: reqwest::StatusCode, what: &str, body: &str) -> StorageError {
    let detail = if body.is_empty() {
        format!("{} failed: {}", what, status)
    } else {
        format!("{} failed: {}: {}", what, status, body)
    };

    match status.as_u16() {
        401 | 403 => StorageError::AuthError(detail),
        404 => StorageError::NotFound(detail),
        _ => StorageError::ServerError(detail),
    }
}
