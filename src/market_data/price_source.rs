// =============================================================================
// Price Source: the narrow interface the pipeline reads market data through
// =============================================================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{AssetSummary, PriceSeries};

/// Sampling granularity for a price-history request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// Let the provider choose based on the window.
    Auto,
    Minutely,
    Hourly,
    Daily,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Minutely => "minutely",
            Self::Hourly => "hourly",
            Self::Daily => "daily",
        }
    }
}

impl Default for Granularity {
    fn default() -> Self {
        Self::Hourly
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lookback window + granularity for one history request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRequest {
    pub window_days: u32,
    pub granularity: Granularity,
}

impl HistoryRequest {
    /// Cache key for `asset_id` under this window.
    pub fn cache_key(&self, asset_id: &str) -> String {
        format!("history:{asset_id}:{}d:{}", self.window_days, self.granularity)
    }
}

/// Market data provider.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Current price and 1h change for the tracked universe.
    async fn market_snapshot(&self) -> anyhow::Result<Vec<AssetSummary>>;

    /// Ordered price history for one asset.
    async fn price_history(
        &self,
        asset_id: &str,
        request: HistoryRequest,
    ) -> anyhow::Result<PriceSeries>;
}
