//! scriptwarden -- execution registry and cancellation coordinator.
//!
//! Tracks script executions dispatched into remote contexts, relays
//! best-effort cancels to whichever executor is configured, and serves both
//! over a small HTTP API. All state is in memory; a restart forgets every
//! record.

pub mod api;
pub mod client;
pub mod config;
pub mod executor;
pub mod registry;
pub mod templates;

use crate::api::state::AppState;
use crate::config::WardenConfig;
use crate::executor::ExecutorSlot;
use crate::registry::ExecutionRegistry;
use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

/// Run the coordinator daemon until the process is stopped.
pub async fn serve(config: WardenConfig) -> Result<()> {
    let slot = executor::build_executor(&config.executor);
    match &slot {
        ExecutorSlot::Ready(executor) => {
            info!(executor = executor.label(), "script executor ready");
        }
        ExecutorSlot::Unavailable(reason) => {
            warn!(reason = %reason, "no script executor; start requests will be rejected");
        }
    }

    let registry = ExecutionRegistry::new(config.limits.clone(), slot);

    // Background sweeper for aged records.
    let sweeper = registry.clone();
    // interval() panics on zero.
    let sweep_interval = Duration::from_secs(config.limits.sweep_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        loop {
            interval.tick().await;
            sweeper.sweep().await;
        }
    });

    let state = AppState::new(registry);
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.listen_address)
        .await
        .with_context(|| format!("failed to bind {}", config.server.listen_address))?;
    info!(address = %config.server.listen_address, "scriptwarden API listening");
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
