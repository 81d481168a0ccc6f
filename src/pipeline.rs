// =============================================================================
// Signal Pipeline: per-asset generation and the refresh loop
// =============================================================================
//
// One cycle:
//   1. Resolve the asset universe from the market snapshot (cache key
//      `snapshot`). A fresh snapshot also refreshes the last-known-good list;
//      when the snapshot is unavailable that list is used instead.
//   2. Spawn one task per asset: history -> indicators -> decision -> store.
//   3. Collect a `CycleReport`. A failing (or panicking) asset is logged,
//      recorded as a notice and listed as failed; it never aborts the others.
//
// After each cycle the loop persists the cache so a restart after any kind
// of exit can still serve the last-known-good data.
//
// The refresh loop ticks every `refresh_interval_secs`, skips while the
// consumer is hidden, and spawns each cycle so a slow cycle never delays the
// next tick.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::task::{self, JoinSet};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::app_state::AppState;
use crate::error::PipelineError;
use crate::fusion::DecisionEngine;
use crate::indicators::compute_indicators;
use crate::market_data::PriceSource;
use crate::notices::NoticeKind;
use crate::types::{AssetSummary, Freshness, PriceSeries, Signal};

/// Cache key of the market snapshot.
pub const SNAPSHOT_KEY: &str = "snapshot";

/// Cache key of the last asset list obtained from a live snapshot.
pub const LAST_KNOWN_GOOD_KEY: &str = "assets:last_known_good";

/// Outcome of one refresh cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    /// ISO 8601.
    pub started_at: String,
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    /// Assets whose signal was built from cached data.
    pub degraded: Vec<String>,
    /// Freshness of the asset list itself. `None` when no list was available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub universe: Option<Freshness>,
}

impl CycleReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// Drives signal generation for every tracked asset.
pub struct SignalPipeline {
    state: Arc<AppState>,
    source: Arc<dyn PriceSource>,
    engine: Arc<DecisionEngine>,
}

impl SignalPipeline {
    pub fn new(state: Arc<AppState>, source: Arc<dyn PriceSource>, engine: Arc<DecisionEngine>) -> Self {
        Self { state, source, engine }
    }

    // -------------------------------------------------------------------------
    // Per asset
    // -------------------------------------------------------------------------

    /// History, indicators, decision, store, alert for one asset.
    #[instrument(skip(self, asset, universe), fields(asset = %asset.id), name = "run_asset")]
    pub async fn run_asset(
        &self,
        asset: AssetSummary,
        universe: Freshness,
    ) -> Result<Signal, PipelineError> {
        let (request, rsi_period, bollinger_period) = {
            let cfg = self.state.runtime_config.read();
            (cfg.history_request(), cfg.rsi_period, cfg.bollinger_period)
        };

        let key = request.cache_key(&asset.id);
        let source = self.source.clone();
        let asset_id = asset.id.clone();
        let fetched = self
            .state
            .fetcher
            .fetch_fresh_first::<PriceSeries, _, _>(&key, move || async move {
                source.price_history(&asset_id, request).await
            })
            .await?;

        if fetched.value.is_empty() {
            return Err(PipelineError::EmptySeries { asset_id: asset.id });
        }

        let mut asset = asset;
        if !(asset.current_price.is_finite() && asset.current_price > 0.0) {
            asset.current_price = fetched
                .value
                .last_price()
                .ok_or_else(|| PipelineError::NoPrice { asset_id: asset.id.clone() })?;
        }

        let closes = fetched.value.closes();
        let indicators = compute_indicators(&closes, rsi_period, bollinger_period);
        let freshness = fetched.freshness.worst(universe);

        if freshness.is_degraded() {
            self.state.notices.push(
                NoticeKind::Degraded,
                Some(&asset.id),
                format!("using {freshness} data for {}", asset.display_name()),
            );
        }

        debug!(
            points = closes.len(),
            rsi = indicators.rsi,
            macd_hist = indicators.macd_histogram,
            freshness = %freshness,
            "indicators computed"
        );

        Ok(self.engine.decide(&asset, &indicators, freshness).await)
    }

    // -------------------------------------------------------------------------
    // Cycle
    // -------------------------------------------------------------------------

    /// Asset universe for this cycle plus how fresh it is.
    async fn resolve_universe(&self) -> Option<(Vec<AssetSummary>, Freshness)> {
        let source = self.source.clone();
        let snapshot = self
            .state
            .fetcher
            .fetch_fresh_first::<Vec<AssetSummary>, _, _>(SNAPSHOT_KEY, move || async move {
                source.market_snapshot().await
            })
            .await;

        let (assets, freshness) = match snapshot {
            Ok(fetched) => {
                if !fetched.is_degraded() {
                    if let Err(e) = self.state.cache.set_as(LAST_KNOWN_GOOD_KEY, &fetched.value) {
                        warn!(error = %e, "failed to store last-known-good asset list");
                    }
                }
                (fetched.value, fetched.freshness)
            }
            Err(e) => {
                warn!(error = %e, "market snapshot unavailable, trying last-known-good list");
                let entry = self.state.cache.get_any_age(LAST_KNOWN_GOOD_KEY)?;
                let assets = match serde_json::from_value::<Vec<AssetSummary>>(entry.value) {
                    Ok(assets) => assets,
                    Err(e) => {
                        warn!(error = %e, "last-known-good asset list is unreadable");
                        return None;
                    }
                };
                let freshness = if e.is_offline() {
                    Freshness::Offline
                } else {
                    Freshness::Cached
                };
                self.state.notices.push(
                    NoticeKind::Degraded,
                    None,
                    format!("market snapshot unavailable; using {} known assets", assets.len()),
                );
                (assets, freshness)
            }
        };

        let wanted = self.state.runtime_config.read().assets.clone();
        let assets = if wanted.is_empty() {
            assets
        } else {
            assets
                .into_iter()
                .filter(|a| wanted.iter().any(|w| w.eq_ignore_ascii_case(&a.id)))
                .collect()
        };

        Some((assets, freshness))
    }

    /// Run one full refresh cycle across all tracked assets.
    pub async fn run_cycle(self: &Arc<Self>) -> CycleReport {
        let mut report = CycleReport {
            started_at: Utc::now().to_rfc3339(),
            ..CycleReport::default()
        };

        let Some((assets, universe)) = self.resolve_universe().await else {
            warn!("no asset list available (no snapshot, nothing cached)");
            self.state.notices.push(
                NoticeKind::Degraded,
                None,
                "no market data available yet",
            );
            self.state.record_cycle(report.clone());
            return report;
        };
        report.universe = Some(universe);
        self.engine.begin_cycle();

        let mut tasks = JoinSet::new();
        let mut task_assets: HashMap<task::Id, String> = HashMap::new();
        for asset in assets {
            let pipeline = Arc::clone(self);
            let asset_id = asset.id.clone();
            let handle = tasks.spawn(async move { pipeline.run_asset(asset, universe).await });
            task_assets.insert(handle.id(), asset_id);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            let (task_id, outcome) = match joined {
                Ok((task_id, outcome)) => (task_id, outcome),
                Err(e) => {
                    let asset_id = task_assets.get(&e.id()).cloned().unwrap_or_default();
                    error!(asset = %asset_id, error = %e, "asset task aborted");
                    let failure = PipelineError::TaskFailed {
                        asset_id,
                        message: e.to_string(),
                    };
                    (e.id(), Err(failure))
                }
            };
            let id = task_assets.remove(&task_id).unwrap_or_default();

            match outcome {
                Ok(signal) => {
                    if signal.data_freshness.is_degraded() {
                        report.degraded.push(id.clone());
                    }
                    report.succeeded.push(id);
                }
                Err(e) => {
                    warn!(asset = %id, error = %e, "asset skipped this cycle");
                    self.state
                        .notices
                        .push(NoticeKind::AssetFailed, Some(&id), e.to_string());
                    report.failed.push(id);
                }
            }
        }

        report.succeeded.sort();
        report.failed.sort();
        report.degraded.sort();

        info!(
            assets = report.total(),
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            degraded = report.degraded.len(),
            universe = %universe,
            "refresh cycle complete"
        );

        self.state.record_cycle(report.clone());
        report
    }

    /// One refresh tick: a cycle when visible, nothing otherwise.
    pub async fn run_if_visible(self: &Arc<Self>) -> Option<CycleReport> {
        if !self.state.is_visible() {
            debug!("consumer hidden, refresh skipped");
            return None;
        }
        Some(self.run_cycle().await)
    }

    /// Write the cache (including the last-known-good list) to disk.
    pub fn persist_cache(&self) {
        let path = self.state.runtime_config.read().cache_path.clone();
        if let Err(e) = self.state.cache.persist(&path) {
            warn!(path = %path, error = %e, "failed to persist cache after cycle");
        }
    }

    // -------------------------------------------------------------------------
    // Refresh loop
    // -------------------------------------------------------------------------

    /// Never returns. Each tick spawns its cycle so overlapping cycles each
    /// run to completion.
    pub async fn run_refresh_loop(self: Arc<Self>) {
        let every = self.state.runtime_config.read().refresh_interval();
        info!(every_secs = every.as_secs(), "refresh loop started");

        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let pipeline = Arc::clone(&self);
            tokio::spawn(async move {
                if pipeline.run_if_visible().await.is_some() {
                    pipeline.persist_cache();
                }
            });
        }
    }
}
