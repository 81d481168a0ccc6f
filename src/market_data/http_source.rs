// =============================================================================
// HTTP Price Source: CoinGecko-shaped REST API
// =============================================================================
//
//   GET {base}/coins/markets?vs_currency=..&per_page=..&price_change_percentage=1h
//       => [{ id, symbol, name, current_price, price_change_percentage_1h_in_currency }]
//   GET {base}/coins/{id}/market_chart?vs_currency=..&days=..[&interval=..]
//       => { prices: [[timestamp_ms, price], ...] }
//
// Any non-2xx status or undecodable body is an error; the resilient fetcher
// decides what to do with it. No retries here.
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::types::{AssetSummary, PricePoint, PriceSeries};

use super::price_source::{Granularity, HistoryRequest, PriceSource};

pub const DEFAULT_PRICE_API_BASE: &str = "https://api.coingecko.com/api/v3";

#[derive(Debug, Deserialize)]
struct MarketRow {
    id: String,
    symbol: String,
    #[serde(default)]
    name: String,
    current_price: Option<f64>,
    #[serde(default)]
    price_change_percentage_1h_in_currency: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct MarketChart {
    prices: Vec<(f64, f64)>,
}

/// Price source backed by a CoinGecko-compatible REST API.
#[derive(Clone)]
pub struct HttpPriceSource {
    client: reqwest::Client,
    base_url: String,
    vs_currency: String,
    snapshot_limit: u32,
}

impl HttpPriceSource {
    /// Build a source with its own HTTP client. The client timeout is a
    /// backstop; the fetcher enforces the real per-call deadline.
    pub fn new(
        base_url: impl Into<String>,
        vs_currency: impl Into<String>,
        snapshot_limit: u32,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client for HttpPriceSource")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            vs_currency: vs_currency.into(),
            snapshot_limit,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {what} request failed"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("{what} returned {}: {}", status, body);
        }

        resp.json::<T>()
            .await
            .with_context(|| format!("failed to parse {what} response"))
    }
}

#[async_trait]
impl PriceSource for HttpPriceSource {
    #[instrument(skip(self), name = "price_source::market_snapshot")]
    async fn market_snapshot(&self) -> Result<Vec<AssetSummary>> {
        let url = format!(
            "{}/coins/markets?vs_currency={}&order=market_cap_desc&per_page={}&page=1&price_change_percentage=1h",
            self.base_url, self.vs_currency, self.snapshot_limit
        );
        let rows: Vec<MarketRow> = self.get_json(&url, "market snapshot").await?;

        let assets: Vec<AssetSummary> = rows
            .into_iter()
            .filter_map(|row| {
                let price = row.current_price.filter(|p| p.is_finite() && *p >= 0.0)?;
                Some(AssetSummary {
                    id: row.id,
                    symbol: row.symbol.to_uppercase(),
                    name: row.name,
                    current_price: price,
                    pct_change_1h: row.price_change_percentage_1h_in_currency,
                })
            })
            .collect();

        debug!(count = assets.len(), "market snapshot fetched");
        Ok(assets)
    }

    #[instrument(skip(self), name = "price_source::price_history")]
    async fn price_history(&self, asset_id: &str, request: HistoryRequest) -> Result<PriceSeries> {
        let mut url = format!(
            "{}/coins/{}/market_chart?vs_currency={}&days={}",
            self.base_url, asset_id, self.vs_currency, request.window_days
        );
        if request.granularity != Granularity::Auto {
            url.push_str(&format!("&interval={}", request.granularity));
        }

        let chart: MarketChart = self
            .get_json(&url, &format!("price history for {asset_id}"))
            .await?;

        let mut points: Vec<PricePoint> = chart
            .prices
            .into_iter()
            .filter(|(_, price)| price.is_finite() && *price >= 0.0)
            .map(|(ts, price)| PricePoint {
                timestamp: ts as i64,
                price,
            })
            .collect();
        points.sort_by_key(|p| p.timestamp);

        debug!(asset_id, points = points.len(), "price history fetched");
        Ok(PriceSeries::new(asset_id, points))
    }
}
