// =============================================================================
// Shared types used across the Pulse signal pipeline
// =============================================================================

use serde::{Deserialize, Serialize};

/// A single observed price at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub price: f64,
}

/// Ordered (ascending by timestamp) price history for one asset over a fixed
/// lookback window. Treated as immutable once fetched for a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub asset_id: String,
    pub points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(asset_id: impl Into<String>, points: Vec<PricePoint>) -> Self {
        Self {
            asset_id: asset_id.into(),
            points,
        }
    }

    /// Prices in series order.
    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.price).collect()
    }

    pub fn last_price(&self) -> Option<f64> {
        self.points.last().map(|p| p.price)
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// One row of the market snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSummary {
    pub id: String,
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    pub current_price: f64,
    /// Percentage change over the last hour, when the feed provides it.
    #[serde(default)]
    pub pct_change_1h: Option<f64>,
}

impl AssetSummary {
    /// Name used when talking to the advisory source.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.symbol
        } else {
            &self.name
        }
    }
}

/// Trade direction carried by a [`Signal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Buy,
    Sell,
    Hold,
}

impl Decision {
    /// Case-insensitive parse of "buy" / "SELL" / "Hold".
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "BUY" => Some(Self::Buy),
            "SELL" => Some(Self::Sell),
            "HOLD" => Some(Self::Hold),
            _ => None,
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Hold => write!(f, "HOLD"),
        }
    }
}

/// How fresh the data behind a result is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Freshness {
    /// Straight from the network (or from cache within TTL).
    Fresh,
    /// Network call failed; served from cache regardless of age.
    Cached,
    /// No connectivity; served from cache regardless of age.
    Offline,
}

impl Freshness {
    pub fn is_degraded(self) -> bool {
        !matches!(self, Self::Fresh)
    }

    /// The less fresh of two inputs.
    pub fn worst(self, other: Self) -> Self {
        fn rank(f: Freshness) -> u8 {
            match f {
                Freshness::Fresh => 0,
                Freshness::Cached => 1,
                Freshness::Offline => 2,
            }
        }
        if rank(other) > rank(self) {
            other
        } else {
            self
        }
    }
}

impl Default for Freshness {
    fn default() -> Self {
        Self::Fresh
    }
}

impl std::fmt::Display for Freshness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fresh => write!(f, "Fresh"),
            Self::Cached => write!(f, "Cached"),
            Self::Offline => write!(f, "Offline"),
        }
    }
}

/// Which branch of decision fusion produced a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalSource {
    Advisory,
    LocalRules,
}

impl std::fmt::Display for SignalSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Advisory => write!(f, "Advisory"),
            Self::LocalRules => write!(f, "LocalRules"),
        }
    }
}

/// Latest actionable signal for one asset. Overwritten every cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub asset_id: String,
    pub decision: Decision,
    /// 0..=100.
    pub confidence: u8,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub explanation: String,
    pub source: SignalSource,
    #[serde(default)]
    pub data_freshness: Freshness,
    /// Epoch milliseconds.
    pub generated_at: i64,
}
