// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod credentials;
pub mod document_store;
pub mod error;
pub mod firestore;
pub mod image_store;

// Re-export main types for convenience
pub use credentials::{
    AccessTokenSource, CachedToken, ServiceAccountKey, ServiceAccountTokenProvider, StaticToken,
};
pub use document_store::{Document, DocumentStore, MemoryDocumentStore};
pub use error::StorageError;
pub use firestore::{FirestoreConfig, FirestoreDocumentStore};
pub use image_store::{ImageStore, StoredObject};
