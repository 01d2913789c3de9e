// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anemia_eye_service::{
    api::{create_app, start_server, AppState, HttpOptions},
    config::{DocumentStoreKind, ObjectStoreKind, ServiceConfig},
    prediction::PredictionService,
    storage::{
        AccessTokenSource, DocumentStore, FirestoreConfig, FirestoreDocumentStore, ImageStore,
        MemoryDocumentStore, ServiceAccountKey, ServiceAccountTokenProvider,
    },
    version,
    vision::VisionModelManager,
};
use anyhow::{Context, Result};
use clap::Parser;
use std::{net::SocketAddr, sync::Arc};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Google credentials shared by the cloud backends
struct GoogleAuth {
    project_id: String,
    tokens: Arc<dyn AccessTokenSource>,
}

fn load_google_auth(config: &ServiceConfig) -> Result<GoogleAuth> {
    let key = ServiceAccountKey::from_file(&config.credentials_path).with_context(|| {
        format!(
            "Failed to load credentials from {}",
            config.credentials_path.display()
        )
    })?;

    let project_id = config
        .project_id
        .clone()
        .unwrap_or_else(|| key.project_id.clone());
    info!("Using service account {} (project {})", key.client_email, project_id);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;

    Ok(GoogleAuth {
        project_id,
        tokens: Arc::new(ServiceAccountTokenProvider::new(key, client)),
    })
}

async fn build_image_store(config: &ServiceConfig) -> Result<ImageStore> {
    let store = match config.object_store {
        ObjectStoreKind::Gcs => {
            let bucket = config
                .bucket_name
                .as_deref()
                .context("BUCKET_NAME is required when OBJECT_STORE=gcs")?;
            ImageStore::gcs(bucket, &config.credentials_path)?
        }
        ObjectStoreKind::Local => {
            tokio::fs::create_dir_all(&config.local_storage_dir)
                .await
                .with_context(|| {
                    format!(
                        "Failed to create {}",
                        config.local_storage_dir.display()
                    )
                })?;
            ImageStore::local(&config.local_storage_dir, config.public_base_url())?
        }
        ObjectStoreKind::Memory => {
            warn!("Using in-memory object store; uploads are lost on exit");
            ImageStore::memory(config.public_base_url())
        }
    };

    Ok(store)
}

fn build_document_store(
    config: &ServiceConfig,
    auth: Option<&GoogleAuth>,
) -> Result<Arc<dyn DocumentStore>> {
    let store: Arc<dyn DocumentStore> = match config.document_store {
        DocumentStoreKind::Firestore => {
            let auth = auth.context("Firestore needs credentials")?;
            let mut firestore = FirestoreConfig::new(auth.project_id.clone());
            firestore.database = config.firestore_database.clone();
            Arc::new(FirestoreDocumentStore::new(firestore, auth.tokens.clone())?)
        }
        DocumentStoreKind::Memory => {
            warn!("Using in-memory document store; history is lost on exit");
            Arc::new(MemoryDocumentStore::new())
        }
    };

    Ok(store)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServiceConfig::parse();
    config.validate().context("Invalid configuration")?;

    println!("🚀 Starting {}...\n", version::get_version_string());
    println!("📦 BUILD VERSION: {}", version::VERSION);
    println!("📅 Build Date: {}", version::BUILD_DATE);
    println!();

    let auth = if config.needs_credentials() {
        Some(load_google_auth(&config)?)
    } else {
        None
    };

    println!("🧠 Loading vision models...");
    let models = VisionModelManager::new(config.vision_config()).await?;
    for model in models.list_models() {
        info!("Model ready: {} ({})", model.name, model.model_type);
    }
    println!("✅ Vision models loaded");

    let images = build_image_store(&config).await?;
    let documents = build_document_store(&config, auth.as_ref())?;
    info!(
        "Storage: objects={}, documents={}",
        images.backend_name(),
        documents.backend_name()
    );

    let service = PredictionService::new(models, images, documents, config.prediction_config()?);

    match service.registered_user_ids().await {
        Ok(ids) if !ids.is_empty() => info!("Registered users: {}", ids.join(", ")),
        Ok(_) => info!("Registered users: N/A"),
        Err(e) => warn!("Could not list registered users: {}", e),
    }

    let options = HttpOptions {
        max_upload_bytes: config.max_upload_bytes,
        static_dir: (config.object_store == ObjectStoreKind::Local)
            .then(|| config.local_storage_dir.clone()),
    };
    let app = create_app(AppState::new(service), &options);

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.bind_address()))?;

    println!("✅ API server starting on http://{}", addr);

    start_server(app, addr, async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
        }
        println!("\n⏹️  Shutting down...");
    })
    .await?;

    println!("👋 Goodbye!");
    Ok(())
}
