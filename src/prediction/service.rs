// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! The predict pipeline and history queries
//!
//! `predict` runs: decode -> eye gate -> classify -> upload -> record write.
//! Vision work happens on the blocking pool; storage calls are async.

use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::record::{PredictionRecord, TimestampFormat};
use crate::storage::{Document, DocumentStore, ImageStore, StorageError};
use crate::vision::image_utils::{decode_image_bytes, ImageError, ImageInfo, MAX_IMAGE_SIZE};
use crate::vision::preprocessing::to_grayscale;
use crate::vision::{Classification, VisionModelManager};

/// Field of a stored record holding the caller's user id
pub const USER_ID_FIELD: &str = "id";
/// Prefix of uploaded object names
pub const OBJECT_PREFIX: &str = "predictions";
/// Logged for user documents that carry no id
pub const UNKNOWN_USER_ID: &str = "N/A";

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid image: {0}")]
    InvalidImage(#[from] ImageError),

    #[error("No eye detected in image")]
    NoEyeDetected,

    #[error("Inference failed: {0:#}")]
    Inference(anyhow::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to render timestamp")]
    Timestamp(#[from] std::fmt::Error),

    #[error("{0}")]
    NotFound(String),
}

#[derive(Debug, Clone)]
pub struct PredictionServiceConfig {
    pub predictions_collection: String,
    pub users_collection: String,
    pub max_upload_bytes: usize,
    pub timestamp: TimestampFormat,
}

impl Default for PredictionServiceConfig {
    fn default() -> Self {
        Self {
            predictions_collection: "predictions".to_string(),
            users_collection: "users".to_string(),
            max_upload_bytes: MAX_IMAGE_SIZE,
            timestamp: TimestampFormat::default(),
        }
    }
}

pub struct PredictionService {
    models: VisionModelManager,
    images: ImageStore,
    documents: Arc<dyn DocumentStore>,
    config: PredictionServiceConfig,
}

impl std::fmt::Debug for PredictionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PredictionService")
            .field("models", &self.models)
            .field("image_store", &self.images.backend_name())
            .field("document_store", &self.documents.backend_name())
            .field("config", &self.config)
            .finish()
    }
}

/// What the blocking vision stage hands back
struct Analysis {
    classification: Classification,
    info: ImageInfo,
    bytes: Vec<u8>,
}

impl PredictionService {
    pub fn new(
        models: VisionModelManager,
        images: ImageStore,
        documents: Arc<dyn DocumentStore>,
        config: PredictionServiceConfig,
    ) -> Self {
        Self {
            models,
            images,
            documents,
            config,
        }
    }

    pub fn models(&self) -> &VisionModelManager {
        &self.models
    }

    pub fn image_store(&self) -> &ImageStore {
        &self.images
    }

    pub fn document_store(&self) -> &Arc<dyn DocumentStore> {
        &self.documents
    }

    pub fn config(&self) -> &PredictionServiceConfig {
        &self.config
    }

    /// Classify one uploaded eye image and persist the result
    pub async fn predict(
        &self,
        user_id: &str,
        image: Vec<u8>,
    ) -> Result<PredictionRecord, PredictionError> {
        if user_id.trim().is_empty() {
            return Err(PredictionError::MissingField("user_id"));
        }
        if image.is_empty() {
            return Err(PredictionError::MissingField("my_image"));
        }

        let analysis = self.analyze(image).await?;
        let Analysis {
            classification,
            info,
            bytes,
        } = analysis;

        let timestamp = self.config.timestamp.now()?;

        let object_name = format!("{}/{}.{}", OBJECT_PREFIX, Uuid::new_v4(), info.extension());
        let stored = self
            .images
            .put(&object_name, bytes, info.mime_type())
            .await
            .map_err(|e| {
                error!("Image upload failed for {}: {}", object_name, e);
                e
            })?;
        debug!("Uploaded {} ({} bytes, sha256 {})", stored.name, stored.size, stored.sha256);

        let record = PredictionRecord::new(
            user_id,
            classification.label,
            classification.probability,
            timestamp,
            stored.public_url.clone(),
        );

        if let Err(e) = self.write_record(&record).await {
            error!("Failed to store prediction for {}: {}", user_id, e);
            self.discard_upload(&stored.name).await;
            return Err(e);
        }

        info!(
            "Prediction for {}: {} ({})",
            record.user_id, record.result, record.confidence
        );

        Ok(record)
    }

    async fn analyze(&self, image: Vec<u8>) -> Result<Analysis, PredictionError> {
        let detector = self.models.eye_detector();
        let classifier = self.models.classifier();
        let max_size = self.config.max_upload_bytes;

        tokio::task::spawn_blocking(move || -> Result<Analysis, PredictionError> {
            let (decoded, info) = decode_image_bytes(&image, max_size)?;
            debug!(
                "Decoded {}x{} {:?} ({} bytes)",
                info.width, info.height, info.format, info.size_bytes
            );

            let gray = to_grayscale(&decoded);
            let has_eyes = detector
                .has_eyes(&gray)
                .map_err(PredictionError::Inference)?;
            if !has_eyes {
                return Err(PredictionError::NoEyeDetected);
            }

            let classification = classifier
                .classify(&decoded)
                .map_err(PredictionError::Inference)?;

            Ok(Analysis {
                classification,
                info,
                bytes: image,
            })
        })
        .await
        .map_err(|e| PredictionError::Inference(anyhow::anyhow!("Vision task failed: {}", e)))?
    }

    async fn write_record(&self, record: &PredictionRecord) -> Result<Document, PredictionError> {
        let data = serde_json::to_value(record).map_err(StorageError::from)?;
        Ok(self
            .documents
            .insert(&self.config.predictions_collection, data)
            .await?)
    }

    async fn discard_upload(&self, name: &str) {
        match self.images.delete(name).await {
            Ok(()) => debug!("Removed orphaned upload {}", name),
            Err(e) => warn!("Could not remove orphaned upload {}: {}", name, e),
        }
    }

    /// Every stored prediction
    pub async fn history(&self) -> Result<Vec<PredictionRecord>, PredictionError> {
        let documents = self
            .documents
            .list(&self.config.predictions_collection)
            .await?;

        let records = parse_records(documents);
        if records.is_empty() {
            return Err(PredictionError::NotFound(
                "No prediction history".to_string(),
            ));
        }
        Ok(records)
    }

    /// Predictions whose user id equals `user_id` exactly
    pub async fn history_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<PredictionRecord>, PredictionError> {
        let documents = self
            .documents
            .find_by_field(
                &self.config.predictions_collection,
                USER_ID_FIELD,
                &json!(user_id),
            )
            .await?;

        let records = parse_records(documents);
        if records.is_empty() {
            return Err(PredictionError::NotFound(format!(
                "No prediction history for user {}",
                user_id
            )));
        }
        Ok(records)
    }

    /// The `id` field of every document in the users collection, or
    /// [`UNKNOWN_USER_ID`] for documents without one
    pub async fn registered_user_ids(&self) -> Result<Vec<String>, PredictionError> {
        Ok(self
            .documents
            .list(&self.config.users_collection)
            .await?
            .into_iter()
            .map(|doc| {
                doc.data
                    .get(USER_ID_FIELD)
                    .and_then(Value::as_str)
                    .unwrap_or(UNKNOWN_USER_ID)
                    .to_string()
            })
            .collect())
    }
}

/// Decode stored documents, skipping any that no longer match the record shape
fn parse_records(documents: Vec<Document>) -> Vec<PredictionRecord> {
    documents
        .into_iter()
        .filter_map(|doc| match serde_json::from_value::<PredictionRecord>(doc.data) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping malformed prediction document {}: {}", doc.id, e);
                None
            }
        })
        .collect()
}
