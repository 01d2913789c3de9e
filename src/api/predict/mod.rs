// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Prediction endpoint module
//!
//! Provides POST /predict for classifying an uploaded eye image.

pub mod handler;
pub mod request;

pub use handler::predict_handler;
pub use request::{PredictForm, IMAGE_FIELD, USER_ID_FIELD};
