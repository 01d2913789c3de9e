// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::prediction::PredictionError;

/// Shown when a required form field is missing or empty
pub const MISSING_DATA_MESSAGE: &str = "Data tidak lengkap";
/// Shown when the upload is not a usable eye image
pub const INVALID_IMAGE_MESSAGE: &str = "Gambar tidak valid. Harap unggah gambar dengan jelas.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
    pub error_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, serde_json::Value>>,
}

#[derive(Debug, Clone)]
pub enum ApiError {
    NotFound(String),
    InvalidRequest(String),
    ValidationError { field: String, message: String },
    /// Upload could not be decoded or contains no eye
    InvalidImage { reason: String },
    InternalError(String),
}

impl ApiError {
    pub fn missing_field(field: impl Into<String>) -> Self {
        ApiError::ValidationError {
            field: field.into(),
            message: MISSING_DATA_MESSAGE.to_string(),
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        let (error_type, error, details) = match self {
            ApiError::NotFound(msg) => ("not_found", msg.clone(), None),
            ApiError::InvalidRequest(msg) => ("invalid_request", msg.clone(), None),
            ApiError::ValidationError { field, message } => {
                let mut details = HashMap::new();
                details.insert(
                    "field".to_string(),
                    serde_json::Value::String(field.clone()),
                );
                ("validation_error", message.clone(), Some(details))
            }
            ApiError::InvalidImage { reason } => {
                let mut details = HashMap::new();
                details.insert(
                    "reason".to_string(),
                    serde_json::Value::String(reason.clone()),
                );
                ("invalid_image", INVALID_IMAGE_MESSAGE.to_string(), Some(details))
            }
            ApiError::InternalError(msg) => ("internal_error", msg.clone(), None),
        };

        ErrorResponse {
            error,
            error_type: error_type.to_string(),
            details,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::NotFound(_) => 404,
            ApiError::InvalidRequest(_)
            | ApiError::ValidationError { .. }
            | ApiError::InvalidImage { .. } => 400,
            ApiError::InternalError(_) => 500,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::NotFound(msg) => write!(f, "Not found: {}", msg),
            ApiError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ApiError::ValidationError { field, message } => {
                write!(f, "Validation error for {}: {}", field, message)
            }
            ApiError::InvalidImage { reason } => write!(f, "Invalid image: {}", reason),
            ApiError::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<PredictionError> for ApiError {
    fn from(e: PredictionError) -> Self {
        match e {
            PredictionError::MissingField(field) => ApiError::missing_field(field),
            PredictionError::InvalidImage(inner) => ApiError::InvalidImage {
                reason: inner.to_string(),
            },
            PredictionError::NoEyeDetected => ApiError::InvalidImage {
                reason: PredictionError::NoEyeDetected.to_string(),
            },
            PredictionError::NotFound(msg) => ApiError::NotFound(msg),
            upstream @ (PredictionError::Inference(_)
            | PredictionError::Storage(_)
            | PredictionError::Timestamp(_)) => {
                ApiError::InternalError(upstream.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_response())).into_response()
    }
}
