// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image preprocessing for the eye detector and the anemia classifier

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma};
use ndarray::Array4;

/// Base window of the eye detector (pixels, square)
pub const DETECTOR_WINDOW: u32 = 20;

/// Longer image side fed to the detector pyramid
pub const DETECTOR_MAX_SIDE: u32 = 640;

/// Classifier input resolution (square)
pub const CLASSIFIER_INPUT_SIZE: u32 = 224;

/// Convert to 8-bit grayscale with BT.601 luma weights
pub fn to_grayscale(image: &DynamicImage) -> GrayImage {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();

    GrayImage::from_fn(width, height, |x, y| {
        let p = rgb.get_pixel(x, y);
        let luma = 0.299 * p[0] as f32 + 0.587 * p[1] as f32 + 0.114 * p[2] as f32;
        Luma([luma.round().clamp(0.0, 255.0) as u8])
    })
}

/// Shrink so that the longer side is at most `max_side`
///
/// Returns the (possibly) resized image and the factor that maps its
/// coordinates back to the input (`>= 1.0`).
pub fn limit_size(gray: &GrayImage, max_side: u32) -> (GrayImage, f32) {
    let (width, height) = gray.dimensions();
    let longer = width.max(height);

    if longer <= max_side || longer == 0 {
        return (gray.clone(), 1.0);
    }

    let factor = longer as f32 / max_side as f32;
    let new_w = ((width as f32 / factor).round() as u32).max(1);
    let new_h = ((height as f32 / factor).round() as u32).max(1);

    let resized = image::imageops::resize(gray, new_w, new_h, FilterType::Triangle);
    (resized, factor)
}

/// Downscale factors of the detection pyramid
///
/// Starts at 1.0 and grows geometrically by `scale_factor` while the scaled
/// image still fits at least one detector window.
pub fn pyramid_scales(width: u32, height: u32, window: u32, scale_factor: f32) -> Vec<f32> {
    let mut scales = Vec::new();

    if scale_factor <= 1.0 || window == 0 {
        return scales;
    }

    let mut scale = 1.0f32;
    loop {
        let level_w = (width as f32 / scale).floor() as u32;
        let level_h = (height as f32 / scale).floor() as u32;
        if level_w < window || level_h < window {
            break;
        }
        scales.push(scale);
        scale *= scale_factor;
    }

    scales
}

/// Grayscale image to a `[1, 1, H, W]` tensor with values in [0, 1]
pub fn gray_tensor(gray: &GrayImage) -> Array4<f32> {
    let (width, height) = gray.dimensions();
    let mut tensor = Array4::zeros((1, 1, height as usize, width as usize));

    for (x, y, pixel) in gray.enumerate_pixels() {
        tensor[[0, 0, y as usize, x as usize]] = pixel[0] as f32 / 255.0;
    }

    tensor
}

/// Prepare the classifier input
///
/// Steps:
/// 1. Resize to `size` x `size` (nearest neighbour, aspect ratio not kept)
/// 2. Convert to RGB
/// 3. Divide every channel by `pixel_scale`
/// 4. Lay out as NHWC `[1, size, size, 3]`
pub fn classifier_tensor(image: &DynamicImage, size: u32, pixel_scale: f32) -> Array4<f32> {
    let resized = image.resize_exact(size, size, FilterType::Nearest);
    let rgb = resized.to_rgb8();

    let mut tensor = Array4::zeros((1, size as usize, size as usize, 3));

    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, y as usize, x as usize, c]] = pixel[c] as f32 / pixel_scale;
        }
    }

    tensor
}
