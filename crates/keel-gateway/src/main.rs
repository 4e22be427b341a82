//! Keel Gateway - HTTP API for the deployment control plane.
//!
//! This is the main entry point for the gateway service. The control plane
//! runs embedded in the gateway process.
//!
//! # Build Queue
//!
//! Set `BUILD_QUEUE_URL` to dispatch build jobs. Without it, build jobs are
//! still recorded but wait for an external dispatcher.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keel_control::{ControlPlaneService, HttpBuildQueue};
use keel_gateway::{create_router, GatewayConfig, GatewayState};
use keel_store::RocksStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,keel=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Keel Gateway");

    let config = GatewayConfig::from_env()?;

    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        build_queue_url = ?config.build_queue_url,
        cors_origins = ?config.cors_origins,
        "Gateway configuration loaded"
    );

    tracing::info!(path = %config.data_dir, "Opening RocksDB store");
    let store = Arc::new(RocksStore::open(&config.data_dir)?);

    let control = match &config.build_queue_url {
        Some(url) => {
            tracing::info!(build_queue_url = %url, "Build queue dispatch enabled");
            ControlPlaneService::new(store, Arc::new(HttpBuildQueue::new(url.clone())))
        }
        None => {
            tracing::warn!("No BUILD_QUEUE_URL set - build jobs will not be dispatched");
            ControlPlaneService::without_queue(store)
        }
    };

    tracing::info!(has_queue = control.has_queue(), "Control plane initialized");

    let listen_addr = config.listen_addr.clone();
    let app = create_router(GatewayState::new(Arc::new(control), config));

    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
