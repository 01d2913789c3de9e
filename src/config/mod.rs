// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Service configuration
//!
//! Every option can be given on the command line or through the environment
//! (a `.env` file is loaded first by `main`).

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::prediction::{PredictionServiceConfig, TimestampFormat};
use crate::vision::image_utils::MAX_IMAGE_SIZE;
use crate::vision::{DetectorParams, VisionModelConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ObjectStoreKind {
    /// Google Cloud Storage bucket
    Gcs,
    /// Directory on local disk, served under /static
    Local,
    /// Process memory (lost on exit)
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DocumentStoreKind {
    Firestore,
    Memory,
}

/// Anemia eye-image classification service
#[derive(Parser, Debug, Clone)]
#[command(name = "anemia-eye-service")]
#[command(version)]
#[command(about = "Classifies eye photographs for signs of anemia", long_about = None)]
pub struct ServiceConfig {
    /// Bind address
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Listen port
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub port: u16,

    /// Service-account key file
    #[arg(
        long = "credentials",
        env = "GOOGLE_APPLICATION_CREDENTIALS",
        default_value = "keys/keyModel.json"
    )]
    pub credentials_path: PathBuf,

    /// Firestore project (defaults to the key's project_id)
    #[arg(long, env = "GCP_PROJECT_ID")]
    pub project_id: Option<String>,

    /// Cloud Storage bucket for uploaded images
    #[arg(long = "bucket", env = "BUCKET_NAME")]
    pub bucket_name: Option<String>,

    #[arg(long, env = "OBJECT_STORE", value_enum, default_value_t = ObjectStoreKind::Gcs)]
    pub object_store: ObjectStoreKind,

    #[arg(long, env = "DOCUMENT_STORE", value_enum, default_value_t = DocumentStoreKind::Firestore)]
    pub document_store: DocumentStoreKind,

    /// Directory used by the local object store
    #[arg(long, env = "LOCAL_STORAGE_DIR", default_value = "static")]
    pub local_storage_dir: PathBuf,

    /// URL prefix for images stored by the local object store
    #[arg(long, env = "PUBLIC_BASE_URL")]
    pub public_base_url: Option<String>,

    #[arg(long, env = "FIRESTORE_DATABASE", default_value = "(default)")]
    pub firestore_database: String,

    #[arg(long, env = "PREDICTIONS_COLLECTION", default_value = "predictions")]
    pub predictions_collection: String,

    #[arg(long, env = "USERS_COLLECTION", default_value = "users")]
    pub users_collection: String,

    #[arg(
        long = "classifier-model",
        env = "CLASSIFIER_MODEL_PATH",
        default_value = "models/anemia_mobilenet.onnx"
    )]
    pub classifier_model_path: PathBuf,

    #[arg(
        long = "eye-detector-model",
        env = "EYE_DETECTOR_MODEL_PATH",
        default_value = "models/eye_detector.onnx"
    )]
    pub eye_detector_model_path: PathBuf,

    /// Divisor applied to pixel values before classification
    #[arg(long, env = "PIXEL_SCALE", default_value_t = 255.0)]
    pub pixel_scale: f32,

    /// Zone of record timestamps, in hours east of UTC
    #[arg(long, env = "UTC_OFFSET_HOURS", default_value_t = 7, allow_negative_numbers = true)]
    pub utc_offset_hours: i32,

    /// chrono format string for record timestamps
    #[arg(long, env = "TIMESTAMP_FORMAT", default_value = "%Y-%m-%d %H:%M:%S")]
    pub timestamp_format: String,

    /// Request body limit in bytes
    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = MAX_IMAGE_SIZE)]
    pub max_upload_bytes: usize,
}

impl ServiceConfig {
    /// Reject option combinations the service cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.object_store == ObjectStoreKind::Gcs
            && self.bucket_name.as_deref().map_or(true, |b| b.trim().is_empty())
        {
            bail!("BUCKET_NAME is required when OBJECT_STORE=gcs");
        }

        if !(self.pixel_scale.is_finite() && self.pixel_scale > 0.0) {
            bail!("PIXEL_SCALE must be positive, got {}", self.pixel_scale);
        }

        if self.max_upload_bytes == 0 {
            bail!("MAX_UPLOAD_BYTES must be greater than zero");
        }

        for (name, value) in [
            ("PREDICTIONS_COLLECTION", &self.predictions_collection),
            ("USERS_COLLECTION", &self.users_collection),
        ] {
            if value.is_empty() || value.contains('/') {
                bail!("{} must be a single collection name, got {:?}", name, value);
            }
        }

        self.timestamp()?;
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether Google credentials are needed at all
    pub fn needs_credentials(&self) -> bool {
        self.object_store == ObjectStoreKind::Gcs
            || self.document_store == DocumentStoreKind::Firestore
    }

    pub fn public_base_url(&self) -> String {
        self.public_base_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}/static", self.port))
    }

    pub fn timestamp(&self) -> Result<TimestampFormat> {
        TimestampFormat::new(self.utc_offset_hours, self.timestamp_format.clone())
            .context("Invalid UTC_OFFSET_HOURS or TIMESTAMP_FORMAT")
    }

    pub fn vision_config(&self) -> VisionModelConfig {
        VisionModelConfig {
            classifier_model_path: self.classifier_model_path.clone(),
            eye_detector_model_path: self.eye_detector_model_path.clone(),
            pixel_scale: self.pixel_scale,
            detector_params: DetectorParams::default(),
        }
    }

    pub fn prediction_config(&self) -> Result<PredictionServiceConfig> {
        Ok(PredictionServiceConfig {
            predictions_collection: self.predictions_collection.clone(),
            users_collection: self.users_collection.clone(),
            max_upload_bytes: self.max_upload_bytes,
            timestamp: self.timestamp()?,
        })
    }
}
