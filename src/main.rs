// =============================================================================
// Pulse Signals: Main Entry Point
// =============================================================================
//
// Single-threaded cooperative runtime. Starts the connectivity check, the
// refresh loop, and the read-only presentation API. The cache is written to
// disk after every cycle and again on Ctrl+C or SIGTERM, so the next start can
// serve data offline.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod advisory;
mod alert;
mod api;
mod app_state;
mod cache;
mod error;
mod fetch;
mod fusion;
mod indicators;
mod market_data;
mod notices;
mod pipeline;
mod runtime_config;
mod signal_store;
mod types;

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::advisory::{AdvisoryPort, DisabledAdvisory, HttpAdvisoryClient};
use crate::alert::{FanoutAlertSink, LogAlertSink};
use crate::app_state::AppState;
use crate::fusion::DecisionEngine;
use crate::market_data::HttpPriceSource;
use crate::pipeline::SignalPipeline;
use crate::runtime_config::RuntimeConfig;

const CONFIG_PATH: &str = "signal_config.json";

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Pulse Signals starting up");

    let mut config = RuntimeConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });
    config.apply_env(|key| std::env::var(key).ok());

    info!(
        assets = ?config.assets,
        refresh_secs = config.refresh_interval_secs,
        advisory = config.advisory_endpoint.is_some(),
        "Configuration ready"
    );

    // ── 2. Build shared state & restore cache ────────────────────────────
    let state = Arc::new(AppState::new(config.clone()));

    match state.cache.restore(&config.cache_path) {
        Ok(n) => info!(path = %config.cache_path, entries = n, "Cache restored"),
        Err(e) => warn!(error = %e, "Cache file unreadable, starting empty"),
    }
    if state.cache.is_empty() {
        warn!("Cold start: no offline fallback until the first successful fetch");
    }

    // ── 3. Adapters ──────────────────────────────────────────────────────
    let price_source = Arc::new(HttpPriceSource::new(
        &config.price_api_base,
        &config.vs_currency,
        config.snapshot_limit,
        config.fetch_timeout(),
    )?);

    let advisory: Arc<dyn AdvisoryPort> = match &config.advisory_endpoint {
        Some(endpoint) => {
            let api_key = std::env::var("ADVISORY_API_KEY").ok().filter(|k| !k.is_empty());
            Arc::new(
                HttpAdvisoryClient::new(endpoint, api_key, config.fetch_timeout())
                    .context("failed to build advisory client")?,
            )
        }
        None => {
            info!("No advisory endpoint configured, local rules only");
            Arc::new(DisabledAdvisory)
        }
    };

    let alerts = FanoutAlertSink::new()
        .with(LogAlertSink)
        .with(state.alert_feed.clone());

    let engine = Arc::new(DecisionEngine::new(
        advisory,
        state.signal_store.clone(),
        Arc::new(alerts),
        state.notices.clone(),
        config.fetch_timeout(),
        config.alert_confidence_threshold,
    ));

    let pipeline = Arc::new(SignalPipeline::new(state.clone(), price_source, engine));

    // ── 4. Connectivity check ────────────────────────────────────────────
    tokio::spawn(state.network.clone().run_check_loop(config.check_interval()));

    // ── 5. Refresh loop ──────────────────────────────────────────────────
    tokio::spawn(pipeline.run_refresh_loop());

    // ── 6. Presentation API ──────────────────────────────────────────────
    let app = api::router(state.clone());
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "API server listening");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server error");
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 7. Graceful shutdown ─────────────────────────────────────────────
    shutdown_signal().await?;
    warn!("Shutdown signal received, persisting state");

    if let Err(e) = state.cache.persist(&config.cache_path) {
        error!(error = %e, "Failed to persist cache on shutdown");
    }
    if let Err(e) = state.runtime_config.read().save(CONFIG_PATH) {
        error!(error = %e, "Failed to save runtime config on shutdown");
    }

    info!("Pulse Signals shut down complete.");
    Ok(())
}

/// Resolves on Ctrl+C, or on SIGTERM where the platform has it.
async fn shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate =
            signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("failed to listen for Ctrl+C")?,
            _ = terminate.recv() => info!("SIGTERM received"),
        }
        Ok(())
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.context("failed to listen for Ctrl+C")
    }
}
