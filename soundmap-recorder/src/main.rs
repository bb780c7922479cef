//! soundmap-recorder - recording submission service
//!
//! Stores per-user recording slots on disk and keeps the shared
//! `imagedata.csv` ledger consistent with them.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

use soundmap_recorder::cli::Args;
use soundmap_recorder::services::{ElevenLabsGenerator, SoundGenerator};
use soundmap_recorder::store::Store;
use soundmap_recorder::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    // Build identification before anything that can fail
    info!(
        "Starting Soundmap Recorder v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    let args = Args::parse();
    let config = args.load_config();
    info!("Store root: {}", config.root_folder.display());
    info!("Ledger: {}", config.store.ledger_path.display());

    let store = Store::new(config.store.clone());
    store
        .initialize()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to initialize store: {}", e))?;

    let sound_generator = match &config.sound_api_key {
        Some(key) => Some(Arc::new(ElevenLabsGenerator::new(key.clone())) as Arc<dyn SoundGenerator>),
        None => {
            warn!("ELEVENLABS_API_KEY not set; /api/generate-sound will answer 503");
            None
        }
    };

    if let Some(dir) = &config.static_dir {
        info!("Serving front-end pages from {}", dir.display());
    }

    let state = AppState::new(store, sound_generator)
        .with_static_dir(config.static_dir.clone())
        .with_max_upload_bytes(config.max_upload_bytes);
    let app = build_router(state);

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("Listening on http://{}", address);
    info!("Health check: http://{}/health", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
