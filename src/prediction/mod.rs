// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod label;
pub mod record;
pub mod service;

pub use label::{AdvisoryBundle, Label, LabelInfo, LABEL_COUNT};
pub use record::{format_confidence, PredictionRecord, TimestampError, TimestampFormat};
pub use service::{PredictionError, PredictionService, PredictionServiceConfig};
