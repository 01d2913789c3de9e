// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! The persisted prediction document

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use thiserror::Error;

use super::label::{AdvisoryBundle, Label};

/// One classification result as stored in the document store and returned
/// to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    /// Caller-supplied user identifier
    #[serde(rename = "id")]
    pub user_id: String,
    /// Label name
    #[serde(rename = "hasil")]
    pub result: String,
    #[serde(rename = "deskripsi")]
    pub description: String,
    #[serde(rename = "gejala")]
    pub symptoms: String,
    /// Arg-max probability as a percentage string, e.g. "97.31%"
    #[serde(rename = "akurasi")]
    pub confidence: String,
    pub timestamp: String,
    #[serde(rename = "informasi_tambahan")]
    pub advisory: AdvisoryBundle,
    pub image_url: String,
}

impl PredictionRecord {
    pub fn new(
        user_id: impl Into<String>,
        label: Label,
        probability: f32,
        timestamp: String,
        image_url: impl Into<String>,
    ) -> Self {
        let info = label.info();
        Self {
            user_id: user_id.into(),
            result: info.name.to_string(),
            description: info.description.to_string(),
            symptoms: info.symptoms.to_string(),
            confidence: format_confidence(probability),
            timestamp,
            advisory: label.advisory(),
            image_url: image_url.into(),
        }
    }
}

/// Format a probability in [0, 1] as a two-decimal percentage
pub fn format_confidence(probability: f32) -> String {
    let clamped = if probability.is_finite() {
        probability.clamp(0.0, 1.0)
    } else {
        0.0
    };
    format!("{:.2}%", clamped * 100.0)
}

#[derive(Debug, Error, PartialEq)]
pub enum TimestampError {
    #[error("UTC offset must lie within -14..=14 hours, got {0}")]
    OffsetOutOfRange(i32),

    #[error("Invalid timestamp format {0:?}")]
    InvalidPattern(String),
}

/// Renders record timestamps in the service's local zone
#[derive(Debug, Clone)]
pub struct TimestampFormat {
    offset: FixedOffset,
    pattern: String,
}

impl TimestampFormat {
    /// The pattern is checked up front so that rendering cannot hit an
    /// unknown specifier at request time
    pub fn new(utc_offset_hours: i32, pattern: impl Into<String>) -> Result<Self, TimestampError> {
        if !(-14..=14).contains(&utc_offset_hours) {
            return Err(TimestampError::OffsetOutOfRange(utc_offset_hours));
        }
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600)
            .ok_or(TimestampError::OffsetOutOfRange(utc_offset_hours))?;

        let pattern = pattern.into();
        if pattern.trim().is_empty()
            || StrftimeItems::new(&pattern).any(|item| matches!(item, Item::Error))
        {
            return Err(TimestampError::InvalidPattern(pattern));
        }

        Ok(Self { offset, pattern })
    }

    pub fn format(&self, instant: DateTime<Utc>) -> Result<String, std::fmt::Error> {
        let mut out = String::new();
        write!(
            out,
            "{}",
            instant.with_timezone(&self.offset).format(&self.pattern)
        )?;
        Ok(out)
    }

    pub fn now(&self) -> Result<String, std::fmt::Error> {
        self.format(Utc::now())
    }
}

impl Default for TimestampFormat {
    fn default() -> Self {
        Self {
            offset: FixedOffset::east_opt(7 * 3600).unwrap_or_else(|| Utc.fix()),
            pattern: "%Y-%m-%d %H:%M:%S".to_string(),
        }
    }
}
