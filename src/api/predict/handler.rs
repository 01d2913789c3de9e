// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Prediction endpoint handler

use axum::{extract::State, Json};
use axum_extra::extract::multipart::{Multipart, MultipartRejection};
use tracing::{debug, error, warn};

use super::request::PredictForm;
use crate::api::errors::ApiError;
use crate::api::http_server::AppState;
use crate::prediction::PredictionRecord;

/// POST /predict - Classify an eye photograph
///
/// # Request
/// Multipart form with:
/// - `my_image`: the image file (JPEG, PNG, ...)
/// - `user_id`: identifier the record is filed under
///
/// # Response
/// The stored prediction record.
///
/// # Errors
/// - 400 Bad Request: missing fields, undecodable image, or no eye found
/// - 500 Internal Server Error: model or storage failure
pub async fn predict_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionRecord>, ApiError> {
    let multipart = multipart.map_err(|e| {
        warn!("Rejected non-multipart predict request: {}", e);
        ApiError::missing_field(super::request::IMAGE_FIELD)
    })?;

    let form = PredictForm::from_multipart(multipart).await.map_err(|e| {
        warn!("Predict form unreadable: {}", e);
        e
    })?;
    debug!(
        "Predict request: file {:?}, {} bytes",
        form.file_name,
        form.image.as_ref().map_or(0, Vec::len)
    );

    let (user_id, image) = form.into_parts().map_err(|e| {
        warn!("Predict validation failed: {}", e);
        e
    })?;

    match state.prediction_service.predict(&user_id, image).await {
        Ok(record) => Ok(Json(record)),
        Err(e) => {
            let api_error = ApiError::from(e);
            if api_error.status_code() >= 500 {
                error!("Prediction failed for {}: {}", user_id, api_error);
            } else {
                warn!("Prediction rejected for {}: {}", user_id, api_error);
            }
            Err(api_error)
        }
    }
}
