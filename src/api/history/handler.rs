// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    extract::{Path, State},
    Json,
};
use tracing::{debug, error};

use crate::api::errors::ApiError;
use crate::api::http_server::AppState;
use crate::prediction::{PredictionError, PredictionRecord};

fn log_failure(error: PredictionError) -> ApiError {
    let api_error = ApiError::from(error);
    if api_error.status_code() >= 500 {
        error!("History query failed: {}", api_error);
    } else {
        debug!("History query: {}", api_error);
    }
    api_error
}

/// GET /history - Every stored prediction (404 when there are none)
pub async fn history_handler(
    State(state): State<AppState>,
) -> Result<Json<Vec<PredictionRecord>>, ApiError> {
    let records = state
        .prediction_service
        .history()
        .await
        .map_err(log_failure)?;

    debug!("Returning {} history records", records.len());
    Ok(Json(records))
}

/// GET /history/{user_id} - Predictions filed under one user (404 when none)
pub async fn user_history_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<PredictionRecord>>, ApiError> {
    let records = state
        .prediction_service
        .history_for_user(&user_id)
        .await
        .map_err(log_failure)?;

    debug!("Returning {} history records for {}", records.len(), user_id);
    Ok(Json(records))
}
