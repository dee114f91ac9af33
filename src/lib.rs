//! threatlens -- event threat detection with running threat analytics.
//!
//! This crate provides the detector set and pipeline, the in-memory findings
//! ledger with its aggregate counters, analytics derived from it, and the
//! HTTP surface that exposes them.

pub mod analysis;
pub mod api;
pub mod config;
pub mod detect;
pub mod sentinel;
pub mod storage;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::config::ThreatLensConfig;
use crate::sentinel::Sentinel;

/// Start the threatlens daemon: rate-window sweeper and API server.
pub async fn serve(config: ThreatLensConfig) -> Result<()> {
    // 1. Build the detection core
    let sentinel = Arc::new(Sentinel::new(
        config.detection.clone(),
        config.analytics.clone(),
    ));

    // 2. Keep the rate window bounded (background task)
    let window = sentinel.rate_window().clone();
    let every = Duration::from_secs(config.detection.window_sweep_interval_secs);
    tokio::spawn(async move {
        detect::run_sweep_loop(window, every).await;
    });

    // 3. Start API Server
    let addr: std::net::SocketAddr = config
        .api
        .listen_address
        .parse()
        .with_context(|| format!("invalid listen address: {}", config.api.listen_address))?;
    let app = api::router(api::state::AppState::new(sentinel));

    tracing::info!(%addr, "threatlens listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
