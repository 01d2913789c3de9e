// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Anemia classifier (MobileNet-style network exported to ONNX)

use anyhow::{anyhow, Context, Result};
use image::DynamicImage;
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::preprocessing::{classifier_tensor, CLASSIFIER_INPUT_SIZE};
use crate::prediction::label::{Label, LABEL_COUNT};

/// Tolerance when deciding whether raw output already sums to one
const PROBABILITY_SUM_TOLERANCE: f32 = 1e-3;

/// Arg-max class of one image
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: Label,
    /// Probability of `label`, in [0, 1]
    pub probability: f32,
    /// Per-class probabilities, indexed like `Label::from_index`
    pub probabilities: Vec<f32>,
}

/// Classifies an eye image into the closed label set
#[cfg_attr(test, mockall::automock)]
pub trait Classifier: Send + Sync {
    fn classify(&self, image: &DynamicImage) -> Result<Classification>;
}

/// ONNX classifier taking NHWC `[1, 224, 224, 3]` input
pub struct OnnxAnemiaClassifier {
    session: Arc<Mutex<Session>>,
    input_name: String,
    /// Divisor applied to 8-bit channel values
    pixel_scale: f32,
}

impl std::fmt::Debug for OnnxAnemiaClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxAnemiaClassifier")
            .field("input_name", &self.input_name)
            .field("pixel_scale", &self.pixel_scale)
            .finish_non_exhaustive()
    }
}

impl OnnxAnemiaClassifier {
    pub async fn new<P: AsRef<Path>>(model_path: P, pixel_scale: f32) -> Result<Self> {
        let model_path = model_path.as_ref();

        if !model_path.exists() {
            anyhow::bail!("Classifier model not found: {}", model_path.display());
        }
        if !(pixel_scale.is_finite() && pixel_scale > 0.0) {
            anyhow::bail!("Pixel scale must be positive, got {}", pixel_scale);
        }

        info!("Loading anemia classifier from {}", model_path.display());

        let session = Session::builder()
            .context("Failed to create session builder")?
            .with_execution_providers([CPUExecutionProvider::default().build()])
            .context("Failed to set CPU execution provider")?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .context("Failed to set optimization level")?
            .with_intra_threads(4)
            .context("Failed to set intra threads")?
            .commit_from_file(model_path)
            .context(format!(
                "Failed to load classifier model from {}",
                model_path.display()
            ))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "input_1".to_string());

        if let Some(input) = session.inputs.first() {
            debug!("Classifier input {}: {:?}", input.name, input.input_type);
        }

        info!("✅ Anemia classifier loaded (CPU-only)");

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
            pixel_scale,
        })
    }
}

impl Classifier for OnnxAnemiaClassifier {
    fn classify(&self, image: &DynamicImage) -> Result<Classification> {
        let tensor = classifier_tensor(image, CLASSIFIER_INPUT_SIZE, self.pixel_scale);
        let input_value = Value::from_array(tensor).context("Failed to create input tensor")?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("Classifier session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_value])
            .context("Classifier inference failed")?;

        let output = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract classifier output")?;

        debug!("Classifier output shape: {:?}", output.shape());
        let raw: Vec<f32> = output.iter().copied().collect();

        classification_from_output(&raw)
    }
}

/// Numerically stable softmax
pub fn softmax(values: &[f32]) -> Vec<f32> {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = values.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Return a probability distribution for raw network output
///
/// Output that already is one (non-negative, summing to 1) passes through;
/// anything else is treated as logits.
pub fn normalize_probabilities(raw: &[f32]) -> Vec<f32> {
    let non_negative = raw.iter().all(|v| *v >= 0.0);
    let sum: f32 = raw.iter().sum();

    if non_negative && (sum - 1.0).abs() <= PROBABILITY_SUM_TOLERANCE {
        raw.to_vec()
    } else {
        softmax(raw)
    }
}

/// Pick the arg-max label from one image's output vector
pub fn classification_from_output(raw: &[f32]) -> Result<Classification> {
    if raw.len() != LABEL_COUNT {
        anyhow::bail!(
            "Classifier returned {} classes, expected {}",
            raw.len(),
            LABEL_COUNT
        );
    }
    if raw.iter().any(|v| !v.is_finite()) {
        anyhow::bail!("Classifier returned non-finite values: {:?}", raw);
    }

    let probabilities = normalize_probabilities(raw);

    let (index, probability) = probabilities
        .iter()
        .copied()
        .enumerate()
        .fold((0usize, f32::MIN), |best, (i, p)| if p > best.1 { (i, p) } else { best });

    let label = Label::from_index(index)
        .ok_or_else(|| anyhow!("Classifier index {} outside label table", index))?;

    Ok(Classification {
        label,
        probability,
        probabilities,
    })
}
