// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::info;

use super::history::{history_handler, user_history_handler};
use super::predict::predict_handler;
use crate::prediction::PredictionService;
use crate::version;

/// Allowance for multipart boundaries and headers on top of the image itself
pub const MULTIPART_OVERHEAD: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub prediction_service: Arc<PredictionService>,
}

impl AppState {
    pub fn new(prediction_service: PredictionService) -> Self {
        Self {
            prediction_service: Arc::new(prediction_service),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpOptions {
    /// Largest accepted image, in bytes
    pub max_upload_bytes: usize,
    /// Directory served under /static (local object store only)
    pub static_dir: Option<PathBuf>,
}

pub fn create_app(state: AppState, options: &HttpOptions) -> Router {
    let mut app = Router::new()
        // Health check
        .route("/health", get(health_handler))
        // Classification
        .route("/predict", post(predict_handler))
        // History
        .route("/history", get(history_handler))
        .route("/history/:user_id", get(user_history_handler));

    if let Some(dir) = &options.static_dir {
        app = app.nest_service("/static", ServeDir::new(dir));
    }

    app.layer(DefaultBodyLimit::max(
        options.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD),
    ))
    .layer(TraceLayer::new_for_http())
    .layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    )
    .with_state(state)
}

pub async fn start_server<F>(app: Router, addr: SocketAddr, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("API server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server error")?;

    info!("API server stopped");
    Ok(())
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let service = &state.prediction_service;
    Json(json!({
        "status": "ok",
        "version": version::get_version_info(),
        "models": service.models().list_models(),
        "storage": {
            "objects": service.image_store().backend_name(),
            "documents": service.document_store().backend_name(),
        },
    }))
}
