// =============================================================================
// Central Application State: Pulse signal pipeline
// =============================================================================
//
// Owns the explicitly-injected shared components (cache, fetcher, signal
// store, notices, alert feed) and produces the unified snapshot served by the
// presentation API. Nothing in here is global: tests build their own
// `AppState` with isolated instances.
//
// Thread safety:
//   - Atomic flags/counters for visibility and cycle tracking.
//   - parking_lot::RwLock for config and the last cycle report.
//   - Arc wrappers for components that manage their own interior mutability.
// =============================================================================

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;

use crate::alert::BroadcastAlertSink;
use crate::cache::TtlCache;
use crate::fetch::{Connectivity, NetworkMonitor, ResilientFetcher};
use crate::notices::{Notice, NoticeLog};
use crate::pipeline::CycleReport;
use crate::runtime_config::RuntimeConfig;
use crate::signal_store::SignalStore;
use crate::types::Signal;

/// Buffered alert events per WebSocket subscriber.
const ALERT_FEED_CAPACITY: usize = 64;

/// Shared state handed to every task via `Arc<AppState>`.
pub struct AppState {
    // ── Configuration ───────────────────────────────────────────────────
    pub runtime_config: Arc<RwLock<RuntimeConfig>>,

    // ── Data acquisition ────────────────────────────────────────────────
    pub cache: Arc<TtlCache>,
    pub network: Arc<NetworkMonitor>,
    pub fetcher: Arc<ResilientFetcher>,

    // ── Outputs ─────────────────────────────────────────────────────────
    pub signal_store: Arc<SignalStore>,
    pub notices: Arc<NoticeLog>,
    pub alert_feed: BroadcastAlertSink,

    // ── Operational status ──────────────────────────────────────────────
    /// False while the consuming surface is hidden; refresh ticks are skipped.
    pub visible: AtomicBool,
    pub cycles_completed: AtomicU64,
    pub last_cycle: RwLock<Option<CycleReport>>,

    /// Instant when the service was started. Used for uptime calculations.
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Build state with a wall-clock cache and a check-driven network monitor.
    pub fn new(config: RuntimeConfig) -> Self {
        let cache = Arc::new(TtlCache::new(config.cache_ttl()));
        let network = Arc::new(NetworkMonitor::new(config.check_host.clone()));
        Self::with_parts(config, cache, network)
    }

    /// Build state around caller-supplied cache and connectivity.
    pub fn with_parts(config: RuntimeConfig, cache: Arc<TtlCache>, network: Arc<NetworkMonitor>) -> Self {
        let fetcher = Arc::new(ResilientFetcher::new(
            cache.clone(),
            network.clone(),
            config.fetch_timeout(),
        ));

        Self {
            runtime_config: Arc::new(RwLock::new(config)),
            cache,
            network,
            fetcher,
            signal_store: Arc::new(SignalStore::new()),
            notices: Arc::new(NoticeLog::new()),
            alert_feed: BroadcastAlertSink::new(ALERT_FEED_CAPACITY),
            visible: AtomicBool::new(true),
            cycles_completed: AtomicU64::new(0),
            last_cycle: RwLock::new(None),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Relaxed)
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::Relaxed);
    }

    /// Record a finished refresh cycle.
    pub fn record_cycle(&self, report: CycleReport) {
        *self.last_cycle.write() = Some(report);
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);
    }

    // ── Snapshot Builder ────────────────────────────────────────────────

    /// Serialisable view of everything the presentation layer consumes.
    pub fn build_snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            server_time: Utc::now().timestamp_millis(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            online: self.network.is_online(),
            visible: self.is_visible(),
            store_version: self.signal_store.version(),
            cycles_completed: self.cycles_completed.load(Ordering::Relaxed),
            degraded_reads: self.fetcher.degraded_reads(),
            cache_entries: self.cache.len(),
            last_cycle: self.last_cycle.read().clone(),
            signals: self.signal_store.all(),
            notices: self.notices.recent(),
        }
    }
}

/// Payload for `GET /api/v1/state` and the WebSocket feed.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub server_time: i64,
    pub uptime_secs: u64,
    pub online: bool,
    pub visible: bool,
    pub store_version: u64,
    pub cycles_completed: u64,
    pub degraded_reads: u64,
    pub cache_entries: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle: Option<CycleReport>,
    pub signals: Vec<Signal>,
    pub notices: Vec<Notice>,
}
