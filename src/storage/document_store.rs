// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Schemaless document storage, grouped into named collections

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::error::StorageError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Store-assigned identifier
    pub id: String,
    /// JSON object holding the fields
    pub data: Value,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Add `data` (a JSON object) as a new document with a generated id
    async fn insert(&self, collection: &str, data: Value) -> Result<Document, StorageError>;

    /// Every document in `collection`
    async fn list(&self, collection: &str) -> Result<Vec<Document>, StorageError>;

    /// Documents whose top-level `field` equals `value`
    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StorageError>;

    fn backend_name(&self) -> &'static str;
}

pub(crate) fn validate_collection(collection: &str) -> Result<(), StorageError> {
    if collection.is_empty() || collection.contains('/') {
        return Err(StorageError::InvalidPath(format!(
            "Invalid collection name: {:?}",
            collection
        )));
    }
    Ok(())
}

pub(crate) fn require_object(data: &Value) -> Result<(), StorageError> {
    if data.is_object() {
        Ok(())
    } else {
        Err(StorageError::SerializationError(
            "Document data must be a JSON object".to_string(),
        ))
    }
}

/// In-memory store; documents are returned in insertion order
#[derive(Debug, Clone, Default)]
pub struct MemoryDocumentStore {
    collections: Arc<Mutex<HashMap<String, Vec<Document>>>>,
    injected_error: Arc<Mutex<Option<StorageError>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next operation fail with `error`
    pub async fn inject_error(&self, error: StorageError) {
        *self.injected_error.lock().await = Some(error);
    }

    /// Insert a document with a caller-chosen id
    pub async fn insert_with_id(
        &self,
        collection: &str,
        id: &str,
        data: Value,
    ) -> Result<Document, StorageError> {
        validate_collection(collection)?;
        require_object(&data)?;

        let document = Document {
            id: id.to_string(),
            data,
        };
        self.collections
            .lock()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(document.clone());
        Ok(document)
    }

    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .await
            .get(collection)
            .map(Vec::len)
            .unwrap_or(0)
    }

    async fn check_injected_error(&self) -> Result<(), StorageError> {
        if let Some(error) = self.injected_error.lock().await.take() {
            return Err(error);
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert(&self, collection: &str, data: Value) -> Result<Document, StorageError> {
        self.check_injected_error().await?;
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.insert_with_id(collection, &id, data).await
    }

    async fn list(&self, collection: &str) -> Result<Vec<Document>, StorageError> {
        self.check_injected_error().await?;
        validate_collection(collection)?;

        Ok(self
            .collections
            .lock()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_by_field(
        &self,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Document>, StorageError> {
        Ok(self
            .list(collection)
            .await?
            .into_iter()
            .filter(|doc| doc.data.get(field) == Some(value))
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
