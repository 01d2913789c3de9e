// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod errors;
pub mod history;
pub mod http_server;
pub mod predict;

pub use errors::{ApiError, ErrorResponse, INVALID_IMAGE_MESSAGE, MISSING_DATA_MESSAGE};
pub use history::{history_handler, user_history_handler};
pub use http_server::{create_app, start_server, AppState, HttpOptions};
pub use predict::{predict_handler, PredictForm};
