// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Multipart form extraction for POST /predict

use axum_extra::extract::Multipart;
use tracing::debug;

use crate::api::errors::ApiError;

/// Form field carrying the image file
pub const IMAGE_FIELD: &str = "my_image";
/// Form field carrying the user identifier
pub const USER_ID_FIELD: &str = "user_id";

/// The fields of a prediction upload
///
/// Unknown fields are ignored; for repeated fields the first one wins.
#[derive(Debug, Default)]
pub struct PredictForm {
    pub user_id: Option<String>,
    pub image: Option<Vec<u8>>,
    /// Client-side file name, informational only
    pub file_name: Option<String>,
}

impl PredictForm {
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = PredictForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::InvalidRequest(format!("Malformed multipart body: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();

            match name.as_str() {
                IMAGE_FIELD if form.image.is_none() => {
                    form.file_name = field.file_name().map(str::to_string);
                    let bytes = field.bytes().await.map_err(|e| {
                        ApiError::InvalidRequest(format!("Failed to read {}: {}", IMAGE_FIELD, e))
                    })?;
                    form.image = Some(bytes.to_vec());
                }
                USER_ID_FIELD if form.user_id.is_none() => {
                    let text = field.text().await.map_err(|e| {
                        ApiError::InvalidRequest(format!("Failed to read {}: {}", USER_ID_FIELD, e))
                    })?;
                    form.user_id = Some(text);
                }
                other => debug!("Ignoring form field {:?}", other),
            }
        }

        Ok(form)
    }

    /// Require both fields to be present and non-empty
    pub fn into_parts(self) -> Result<(String, Vec<u8>), ApiError> {
        let image = match self.image {
            Some(image) if !image.is_empty() => image,
            _ => return Err(ApiError::missing_field(IMAGE_FIELD)),
        };

        let user_id = match self.user_id {
            Some(user_id) if !user_id.trim().is_empty() => user_id,
            _ => return Err(ApiError::missing_field(USER_ID_FIELD)),
        };

        Ok((user_id, image))
    }
}
