// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod config;
pub mod prediction;
pub mod storage;
pub mod version;
pub mod vision;

pub use api::{create_app, AppState, HttpOptions};
pub use config::ServiceConfig;
pub use prediction::{PredictionError, PredictionRecord, PredictionService};
