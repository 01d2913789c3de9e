// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Object storage for uploaded images
//!
//! Wraps an `object_store` backend (Cloud Storage, a local directory or
//! memory) and pairs it with the URL prefix under which stored objects are
//! publicly reachable.

use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectStorePath;
use object_store::{Attribute, Attributes, ObjectStore, ObjectStoreExt, PutOptions};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::error::StorageError;

/// Public host of Cloud Storage objects
pub const GCS_PUBLIC_BASE: &str = "https://storage.googleapis.com";
/// Object metadata key holding the hex SHA-256 of the upload
pub const DIGEST_METADATA_KEY: &str = "sha256";

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredObject {
    pub name: String,
    pub public_url: String,
    pub size: u64,
    /// Hex SHA-256 of the uploaded bytes
    pub sha256: String,
}

/// Reject names that could escape the bucket or directory
pub fn validate_object_name(name: &str) -> Result<(), StorageError> {
    if name.is_empty() {
        return Err(StorageError::InvalidPath("Empty object name".to_string()));
    }

    if name.starts_with('/') {
        return Err(StorageError::InvalidPath(
            "Object name cannot start with /".to_string(),
        ));
    }

    if name.contains('\\') || name.split('/').any(|segment| segment == ".." || segment.is_empty())
    {
        return Err(StorageError::InvalidPath(format!(
            "Invalid object name: {}",
            name
        )));
    }

    Ok(())
}

pub fn content_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Validated `object_store` path for `name`
pub fn object_path(name: &str) -> Result<ObjectStorePath, StorageError> {
    validate_object_name(name)?;
    ObjectStorePath::parse(name).map_err(|e| StorageError::InvalidPath(e.to_string()))
}

#[derive(Clone)]
pub struct ImageStore {
    store: Arc<dyn ObjectStore>,
    public_base: String,
    backend: &'static str,
    /// Local directories cannot hold content type or custom metadata
    with_attributes: bool,
}

impl std::fmt::Debug for ImageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageStore")
            .field("backend", &self.backend)
            .field("public_base", &self.public_base)
            .finish_non_exhaustive()
    }
}

impl ImageStore {
    /// Cloud Storage bucket, authenticated with a service-account key file
    pub fn gcs(bucket: &str, service_account_path: &Path) -> Result<Self, StorageError> {
        if bucket.trim().is_empty() {
            return Err(StorageError::ConfigError(
                "Bucket name must not be empty".to_string(),
            ));
        }

        let store = GoogleCloudStorageBuilder::new()
            .with_bucket_name(bucket)
            .with_service_account_path(service_account_path.to_string_lossy())
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(Self {
            store: Arc::new(store),
            public_base: format!("{}/{}", GCS_PUBLIC_BASE, bucket),
            backend: "gcs",
            with_attributes: true,
        })
    }

    /// Files below `root`, which must already exist
    pub fn local(root: &Path, public_base: impl Into<String>) -> Result<Self, StorageError> {
        let store = LocalFileSystem::new_with_prefix(root)
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        Ok(Self {
            store: Arc::new(store),
            public_base: public_base.into(),
            backend: "local",
            with_attributes: false,
        })
    }

    pub fn memory(public_base: impl Into<String>) -> Self {
        Self::in_memory(Arc::new(InMemory::new()), public_base)
    }

    /// Use an existing in-memory store, e.g. one a caller keeps inspecting
    pub fn in_memory(store: Arc<InMemory>, public_base: impl Into<String>) -> Self {
        Self {
            store,
            public_base: public_base.into(),
            backend: "memory",
            with_attributes: true,
        }
    }

    /// Store `data` under `name`, replacing any existing object
    pub async fn put(
        &self,
        name: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject, StorageError> {
        let path = object_path(name)?;

        let stored = StoredObject {
            name: name.to_string(),
            public_url: self.public_url(name),
            size: data.len() as u64,
            sha256: content_digest(&data),
        };

        let mut attributes = Attributes::new();
        if self.with_attributes {
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
            attributes.insert(
                Attribute::Metadata(DIGEST_METADATA_KEY.into()),
                stored.sha256.clone().into(),
            );
        }
        let options = PutOptions {
            attributes,
            ..Default::default()
        };

        self.store.put_opts(&path, data.into(), options).await?;
        debug!(
            "Stored {} in {} ({} bytes)",
            stored.name, self.backend, stored.size
        );

        Ok(stored)
    }

    pub async fn delete(&self, name: &str) -> Result<(), StorageError> {
        let path = object_path(name)?;
        self.store.delete(&path).await?;
        Ok(())
    }

    /// Publicly reachable URL of `name`
    pub fn public_url(&self, name: &str) -> String {
        format!("{}/{}", self.public_base.trim_end_matches('/'), name)
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend
    }
}
