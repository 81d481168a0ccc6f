// =============================================================================
// Runtime Configuration: pipeline settings with atomic save
// =============================================================================
//
// Every tunable of the signal pipeline lives here. All fields carry
// `#[serde(default)]` so that adding new fields never breaks loading an older
// config file. Persistence uses an atomic tmp + rename pattern.
//
// Environment overrides (applied by `apply_env`):
//   SIGNAL_ASSETS      comma-separated asset ids (e.g. "bitcoin,ethereum")
//   SIGNAL_BIND_ADDR   presentation API bind address
//   ADVISORY_ENDPOINT  advisory URL (empty disables the advisory)
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::alert::DEFAULT_ALERT_THRESHOLD;
use crate::cache::DEFAULT_TTL;
use crate::fetch::DEFAULT_FETCH_TIMEOUT;
use crate::indicators::{DEFAULT_BOLLINGER_PERIOD, DEFAULT_RSI_PERIOD};
use crate::market_data::{Granularity, HistoryRequest, DEFAULT_PRICE_API_BASE};

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_vs_currency() -> String {
    "usd".to_string()
}

fn default_snapshot_limit() -> u32 {
    10
}

fn default_history_window_days() -> u32 {
    1
}

fn default_price_api_base() -> String {
    DEFAULT_PRICE_API_BASE.to_string()
}

fn default_fetch_timeout_ms() -> u64 {
    DEFAULT_FETCH_TIMEOUT.as_millis() as u64
}

fn default_cache_ttl_ms() -> u64 {
    DEFAULT_TTL.as_millis() as u64
}

fn default_refresh_interval_secs() -> u64 {
    5
}

fn default_check_interval_secs() -> u64 {
    10
}

fn default_alert_confidence_threshold() -> u8 {
    DEFAULT_ALERT_THRESHOLD
}

fn default_rsi_period() -> usize {
    DEFAULT_RSI_PERIOD
}

fn default_bollinger_period() -> usize {
    DEFAULT_BOLLINGER_PERIOD
}

fn default_cache_path() -> String {
    "signal_cache.json".to_string()
}

fn default_check_host() -> String {
    "1.1.1.1:443".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level configuration for the signal pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Universe -----------------------------------------------------------

    /// Asset ids to track. Empty means every asset in the market snapshot.
    #[serde(default)]
    pub assets: Vec<String>,

    /// Quote currency for prices.
    #[serde(default = "default_vs_currency")]
    pub vs_currency: String,

    /// Number of assets requested in the market snapshot.
    #[serde(default = "default_snapshot_limit")]
    pub snapshot_limit: u32,

    // --- Price history ------------------------------------------------------

    #[serde(default = "default_history_window_days")]
    pub history_window_days: u32,

    #[serde(default)]
    pub history_granularity: Granularity,

    // --- Endpoints ----------------------------------------------------------

    #[serde(default = "default_price_api_base")]
    pub price_api_base: String,

    /// Advisory endpoint. `None` disables the remote advisory entirely.
    #[serde(default)]
    pub advisory_endpoint: Option<String>,

    // --- Timing -------------------------------------------------------------

    /// Deadline for every network call (price and advisory).
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,

    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    #[serde(default = "default_check_interval_secs")]
    pub check_interval_secs: u64,

    // --- Signal rules -------------------------------------------------------

    /// Confidence strictly above this raises an alert.
    #[serde(default = "default_alert_confidence_threshold")]
    pub alert_confidence_threshold: u8,

    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,

    #[serde(default = "default_bollinger_period")]
    pub bollinger_period: usize,

    // --- Runtime ------------------------------------------------------------

    /// File the TTL cache is persisted to on shutdown.
    #[serde(default = "default_cache_path")]
    pub cache_path: String,

    /// host:port used by the connectivity check.
    #[serde(default = "default_check_host")]
    pub check_host: String,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            assets: Vec::new(),
            vs_currency: default_vs_currency(),
            snapshot_limit: default_snapshot_limit(),
            history_window_days: default_history_window_days(),
            history_granularity: Granularity::default(),
            price_api_base: default_price_api_base(),
            advisory_endpoint: None,
            fetch_timeout_ms: default_fetch_timeout_ms(),
            cache_ttl_ms: default_cache_ttl_ms(),
            refresh_interval_secs: default_refresh_interval_secs(),
            check_interval_secs: default_check_interval_secs(),
            alert_confidence_threshold: default_alert_confidence_threshold(),
            rsi_period: default_rsi_period(),
            bollinger_period: default_bollinger_period(),
            cache_path: default_cache_path(),
            check_host: default_check_host(),
            bind_addr: default_bind_addr(),
        }
    }
}

impl RuntimeConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }

    pub fn history_request(&self) -> HistoryRequest {
        HistoryRequest {
            window_days: self.history_window_days,
            granularity: self.history_granularity,
        }
    }

    /// Apply environment overrides using the given lookup (normally
    /// `std::env::var(..).ok()`).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(assets) = lookup("SIGNAL_ASSETS") {
            self.assets = assets
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Some(addr) = lookup("SIGNAL_BIND_ADDR").filter(|a| !a.trim().is_empty()) {
            self.bind_addr = addr.trim().to_string();
        }
        if let Some(endpoint) = lookup("ADVISORY_ENDPOINT") {
            let endpoint = endpoint.trim().to_string();
            self.advisory_endpoint = if endpoint.is_empty() { None } else { Some(endpoint) };
        }
    }

    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            assets = ?config.assets,
            refresh_secs = config.refresh_interval_secs,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }
}
