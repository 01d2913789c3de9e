// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Eye-presence gate
//!
//! Cascade-style multi-scale detection: the grayscale image is scanned over a
//! pyramid shrinking by `scale_factor`, a fully convolutional ONNX network
//! scores every detector window of each level, and overlapping candidate
//! windows are grouped. A group survives only with more than
//! `min_neighbors` members.

use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::GrayImage;
use ndarray::{ArrayViewD, IxDyn};
use ort::execution_providers::CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::preprocessing::{
    gray_tensor, limit_size, pyramid_scales, DETECTOR_MAX_SIDE, DETECTOR_WINDOW,
};

/// A detected eye region in input image coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    /// Mean window score of the group (or the raw score for a candidate)
    pub score: f32,
    /// Number of candidate windows merged into this region
    pub neighbors: usize,
}

impl EyeRegion {
    fn candidate(x: f32, y: f32, size: f32, score: f32) -> Self {
        Self {
            x,
            y,
            width: size,
            height: size,
            score,
            neighbors: 1,
        }
    }
}

/// Fixed detection parameters
#[derive(Debug, Clone)]
pub struct DetectorParams {
    /// Pyramid shrink factor between levels
    pub scale_factor: f32,
    /// A group needs strictly more members than this to be reported
    pub min_neighbors: usize,
    /// Window score at or above which a cell becomes a candidate
    pub score_threshold: f32,
    /// Relative tolerance for two windows to be considered the same object
    pub group_eps: f32,
    pub window: u32,
    pub max_side: u32,
}

impl Default for DetectorParams {
    fn default() -> Self {
        Self {
            scale_factor: 1.3,
            min_neighbors: 5,
            score_threshold: 0.5,
            group_eps: 0.2,
            window: DETECTOR_WINDOW,
            max_side: DETECTOR_MAX_SIDE,
        }
    }
}

/// Finds eye regions in a grayscale image
#[cfg_attr(test, mockall::automock)]
pub trait EyeDetector: Send + Sync {
    fn detect(&self, gray: &GrayImage) -> Result<Vec<EyeRegion>>;

    /// Whether at least one eye region is present
    fn has_eyes(&self, gray: &GrayImage) -> Result<bool> {
        Ok(!self.detect(gray)?.is_empty())
    }
}

/// ONNX eye detector
///
/// The network takes `[1, 1, H, W]` grayscale input in [0, 1] and returns a
/// window score map `[1, 1, h, w]` (or `[1, h, w]`); cell `(y, x)` scores the
/// detector window whose top-left corner is at the cell's stride offset.
pub struct OnnxEyeDetector {
    session: Arc<Mutex<Session>>,
    input_name: String,
    params: DetectorParams,
}

impl std::fmt::Debug for OnnxEyeDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxEyeDetector")
            .field("input_name", &self.input_name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl OnnxEyeDetector {
    /// Load the detector model
    ///
    /// # Errors
    /// Returns error if the file is missing or ONNX Runtime cannot load it.
    pub async fn new<P: AsRef<Path>>(model_path: P, params: DetectorParams) -> Result<Self> {
        let model_path = model_path.as_ref();

        if !model_path.exists() {
            anyhow::bail!("Eye detector model not found: {}", model_path.display());
        }

        info!("Loading eye detector model from {}", model_path.display());

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
                "Failed to load eye detector model from {}",
                model_path.display()
            ))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .unwrap_or_else(|| "input".to_string());

        debug!("Eye detector input: {}", input_name);
        info!("✅ Eye detector model loaded (CPU-only)");

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            input_name,
            params,
        })
    }

    /// Score one pyramid level and return its candidates in input coordinates
    fn scan_level(&self, level: &GrayImage, to_input: f32) -> Result<Vec<EyeRegion>> {
        let input_value =
            Value::from_array(gray_tensor(level)).context("Failed to create input tensor")?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("Eye detector session lock poisoned"))?;

        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_value])
            .context("Eye detection inference failed")?;

        let scores = outputs[0]
            .try_extract_array::<f32>()
            .context("Failed to extract score map")?;

        let candidates = candidates_from_score_map(
            scores.view(),
            level.width(),
            level.height(),
            to_input,
            &self.params,
        )?;

        Ok(candidates)
    }
}

impl EyeDetector for OnnxEyeDetector {
    fn detect(&self, gray: &GrayImage) -> Result<Vec<EyeRegion>> {
        let (base, base_factor) = limit_size(gray, self.params.max_side);
        let scales = pyramid_scales(
            base.width(),
            base.height(),
            self.params.window,
            self.params.scale_factor,
        );

        let mut candidates = Vec::new();
        for scale in &scales {
            let level_w = ((base.width() as f32 / scale).floor() as u32).max(1);
            let level_h = ((base.height() as f32 / scale).floor() as u32).max(1);
            let level = if level_w == base.width() && level_h == base.height() {
                base.clone()
            } else {
                image::imageops::resize(&base, level_w, level_h, FilterType::Triangle)
            };

            let to_input = base_factor * (base.width() as f32 / level_w as f32);
            candidates.extend(self.scan_level(&level, to_input)?);
        }

        let regions = group_rectangles(
            &candidates,
            self.params.min_neighbors,
            self.params.group_eps,
        );

        debug!(
            "Eye detection: {} levels, {} candidates, {} regions",
            scales.len(),
            candidates.len(),
            regions.len()
        );

        Ok(regions)
    }
}

/// Turn a window score map into candidate regions
///
/// `level_width`/`level_height` are the dimensions of the pyramid level that
/// produced the map; `to_input` maps level coordinates to input coordinates.
pub fn candidates_from_score_map(
    scores: ArrayViewD<f32>,
    level_width: u32,
    level_height: u32,
    to_input: f32,
    params: &DetectorParams,
) -> Result<Vec<EyeRegion>> {
    let shape = scores.shape();
    let (map_h, map_w) = match shape.len() {
        4 => (shape[2], shape[3]),
        3 => (shape[1], shape[2]),
        _ => anyhow::bail!("Unexpected score map shape: {:?}", shape),
    };

    if map_h == 0 || map_w == 0 {
        return Ok(Vec::new());
    }

    let stride_x = level_width as f32 / map_w as f32;
    let stride_y = level_height as f32 / map_h as f32;
    let size = params.window as f32 * to_input;

    let mut candidates = Vec::new();
    for y in 0..map_h {
        for x in 0..map_w {
            let score = if shape.len() == 4 {
                scores[IxDyn(&[0, 0, y, x])]
            } else {
                scores[IxDyn(&[0, y, x])]
            };

            if score >= params.score_threshold {
                candidates.push(EyeRegion::candidate(
                    x as f32 * stride_x * to_input,
                    y as f32 * stride_y * to_input,
                    size,
                    score,
                ));
            }
        }
    }

    Ok(candidates)
}

/// Whether two windows describe the same object
fn similar(a: &EyeRegion, b: &EyeRegion, eps: f32) -> bool {
    let delta = eps * (a.width.min(b.width) + a.height.min(b.height)) * 0.5;
    (a.x - b.x).abs() <= delta
        && (a.y - b.y).abs() <= delta
        && (a.x + a.width - b.x - b.width).abs() <= delta
        && (a.y + a.height - b.y - b.height).abs() <= delta
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Cluster similar candidates and average each cluster
///
/// Clusters with `min_neighbors` or fewer members are dropped. Output is
/// ordered by cluster size, largest first.
pub fn group_rectangles(candidates: &[EyeRegion], min_neighbors: usize, eps: f32) -> Vec<EyeRegion> {
    let n = candidates.len();
    let mut parent: Vec<usize> = (0..n).collect();

    for i in 0..n {
        for j in (i + 1)..n {
            if similar(&candidates[i], &candidates[j], eps) {
                let ri = find(&mut parent, i);
                let rj = find(&mut parent, j);
                if ri != rj {
                    parent[rj] = ri;
                }
            }
        }
    }

    // root -> (sum x, sum y, sum w, sum h, sum score, count)
    let mut sums: std::collections::BTreeMap<usize, (f32, f32, f32, f32, f32, usize)> =
        std::collections::BTreeMap::new();
    for i in 0..n {
        let root = find(&mut parent, i);
        let c = &candidates[i];
        let entry = sums.entry(root).or_insert((0.0, 0.0, 0.0, 0.0, 0.0, 0));
        entry.0 += c.x;
        entry.1 += c.y;
        entry.2 += c.width;
        entry.3 += c.height;
        entry.4 += c.score;
        entry.5 += 1;
    }

    let mut regions: Vec<EyeRegion> = sums
        .into_values()
        .filter(|&(.., count)| count > min_neighbors)
        .map(|(x, y, w, h, score, count)| {
            let k = count as f32;
            EyeRegion {
                x: x / k,
                y: y / k,
                width: w / k,
                height: h / k,
                score: score / k,
                neighbors: count,
            }
        })
        .collect();

    regions.sort_by(|a, b| b.neighbors.cmp(&a.neighbors));
    regions
}
