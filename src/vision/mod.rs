// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision processing for the anemia check
//!
//! This module provides:
//! - Upload decoding and format detection
//! - The eye-presence gate (cascade-style ONNX detector)
//! - The anemia classifier (ONNX)
//!
//! Both models run on CPU.

pub mod classifier;
pub mod eye_detection;
pub mod image_utils;
pub mod model_manager;
pub mod preprocessing;

pub use classifier::{Classification, Classifier, OnnxAnemiaClassifier};
pub use eye_detection::{DetectorParams, EyeDetector, EyeRegion, OnnxEyeDetector};
pub use image_utils::{decode_image_bytes, detect_format, ImageError, ImageInfo, MAX_IMAGE_SIZE};
pub use model_manager::{VisionModelConfig, VisionModelInfo, VisionModelManager};
