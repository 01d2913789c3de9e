// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Vision model manager tests
//!
//! Configuration defaults and the start-up failure paths. Loading real
//! sessions is covered in `test_onnx_models.rs`.

use anemia_eye_service::vision::{
    Classification, Classifier, EyeDetector, EyeRegion, VisionModelConfig, VisionModelManager,
};
use image::{DynamicImage, GrayImage, RgbImage};
use std::path::PathBuf;
use std::sync::Arc;

struct OneEye;

impl EyeDetector for OneEye {
    fn detect(&self, _gray: &GrayImage) -> anyhow::Result<Vec<EyeRegion>> {
        Ok(vec![EyeRegion {
            x: 0.0,
            y: 0.0,
            width: 20.0,
            height: 20.0,
            score: 1.0,
            neighbors: 6,
        }])
    }
}

struct Broken;

impl Classifier for Broken {
    fn classify(&self, _image: &DynamicImage) -> anyhow::Result<Classification> {
        anyhow::bail!("session unavailable")
    }
}

#[cfg(test)]
mod model_manager_tests {
    use super::*;

    #[test]
    fn test_default_config_has_expected_paths() {
        let config = VisionModelConfig::default();
        assert!(config
            .classifier_model_path
            .to_string_lossy()
            .ends_with("anemia_mobilenet.onnx"));
        assert!(config
            .eye_detector_model_path
            .to_string_lossy()
            .ends_with("eye_detector.onnx"));
        assert_eq!(config.pixel_scale, 255.0);
    }

    #[tokio::test]
    async fn test_missing_classifier_fails_startup() {
        let dir = tempfile::tempdir().unwrap();
        // Detector file exists but is not a model; loading must still fail
        let detector_path = dir.path().join("eye_detector.onnx");
        std::fs::write(&detector_path, b"not onnx").unwrap();

        let config = VisionModelConfig {
            eye_detector_model_path: detector_path,
            classifier_model_path: PathBuf::from("/nonexistent/anemia_mobilenet.onnx"),
            ..Default::default()
        };

        assert!(VisionModelManager::new(config).await.is_err());
    }

    #[test]
    fn test_from_parts_shares_models() {
        let manager = VisionModelManager::from_parts(Arc::new(OneEye), Arc::new(Broken));
        let gray = GrayImage::new(30, 30);

        assert!(manager.eye_detector().has_eyes(&gray).unwrap());

        let image = DynamicImage::ImageRgb8(RgbImage::new(8, 8));
        let err = manager.classifier().classify(&image).unwrap_err();
        assert!(err.to_string().contains("session unavailable"));

        let names: Vec<String> = manager
            .list_models()
            .into_iter()
            .map(|m| m.model_type)
            .collect();
        assert_eq!(names, vec!["eye-detector", "classifier"]);
    }
}
