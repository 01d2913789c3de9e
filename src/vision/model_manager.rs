// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Loads the eye detector and the classifier once at start-up and hands them
//! out as shared trait objects

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use super::classifier::{Classifier, OnnxAnemiaClassifier};
use super::eye_detection::{DetectorParams, EyeDetector, OnnxEyeDetector};

/// Configuration for loading vision models
#[derive(Debug, Clone)]
pub struct VisionModelConfig {
    pub classifier_model_path: PathBuf,
    pub eye_detector_model_path: PathBuf,
    /// Divisor applied to pixel values before classification
    pub pixel_scale: f32,
    pub detector_params: DetectorParams,
}

impl Default for VisionModelConfig {
    fn default() -> Self {
        Self {
            classifier_model_path: PathBuf::from("./models/anemia_mobilenet.onnx"),
            eye_detector_model_path: PathBuf::from("./models/eye_detector.onnx"),
            pixel_scale: 255.0,
            detector_params: DetectorParams::default(),
        }
    }
}

/// Information about a loaded vision model
#[derive(Debug, Clone, Serialize)]
pub struct VisionModelInfo {
    pub name: String,
    pub model_type: String,
    pub available: bool,
}

/// Holds the two models used by the prediction pipeline
///
/// Both models are required: the service refuses to start without them.
#[derive(Clone)]
pub struct VisionModelManager {
    eye_detector: Arc<dyn EyeDetector>,
    classifier: Arc<dyn Classifier>,
    models: Vec<VisionModelInfo>,
}

impl std::fmt::Debug for VisionModelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VisionModelManager")
            .field("models", &self.models)
            .finish_non_exhaustive()
    }
}

impl VisionModelManager {
    pub async fn new(config: VisionModelConfig) -> Result<Self> {
        let eye_detector = OnnxEyeDetector::new(
            &config.eye_detector_model_path,
            config.detector_params.clone(),
        )
        .await
        .context("Eye detector unavailable")?;

        let classifier =
            OnnxAnemiaClassifier::new(&config.classifier_model_path, config.pixel_scale)
                .await
                .context("Anemia classifier unavailable")?;

        let models = vec![
            VisionModelInfo {
                name: model_name(&config.eye_detector_model_path),
                model_type: "eye-detector".to_string(),
                available: true,
            },
            VisionModelInfo {
                name: model_name(&config.classifier_model_path),
                model_type: "classifier".to_string(),
                available: true,
            },
        ];

        Ok(Self {
            eye_detector: Arc::new(eye_detector),
            classifier: Arc::new(classifier),
            models,
        })
    }

    /// Build from already constructed models
    pub fn from_parts(eye_detector: Arc<dyn EyeDetector>, classifier: Arc<dyn Classifier>) -> Self {
        let models = vec![
            VisionModelInfo {
                name: "eye-detector".to_string(),
                model_type: "eye-detector".to_string(),
                available: true,
            },
            VisionModelInfo {
                name: "classifier".to_string(),
                model_type: "classifier".to_string(),
                available: true,
            },
        ];

        Self {
            eye_detector,
            classifier,
            models,
        }
    }

    pub fn eye_detector(&self) -> Arc<dyn EyeDetector> {
        self.eye_detector.clone()
    }

    pub fn classifier(&self) -> Arc<dyn Classifier> {
        self.classifier.clone()
    }

    pub fn list_models(&self) -> Vec<VisionModelInfo> {
        self.models.clone()
    }
}

fn model_name(path: &std::path::Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
