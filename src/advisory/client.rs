// =============================================================================
// HTTP Advisory Client
// =============================================================================
//
// POSTs `{ request, prompt, response_schema }` to the configured inference
// endpoint and reads the reply as text. The whole exchange runs under one
// deadline (default 5 s).
//
//   429                          => RateLimited (no retry this cycle)
//   other non-2xx / timeout / IO => NotAvailable
//   2xx without a valid block    => NotAvailable (malformed advisory)
//   2xx with a valid block       => Parsed
//
// SECURITY: the API key is sent as a bearer header and never logged.
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, instrument, warn};

use super::parser::extract_advisory;
use super::{response_schema, AdvisoryOutcome, AdvisoryPort, AdvisoryRequest};

/// Advisory source reached over HTTP.
#[derive(Clone)]
pub struct HttpAdvisoryClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpAdvisoryClient {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client for HttpAdvisoryClient")?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            timeout,
        })
    }

    /// Natural-language instruction accompanying the structured request.
    pub fn build_prompt(request: &AdvisoryRequest) -> String {
        format!(
            "You are a trading assistant. Asset: {}. Current price: {}. RSI(14): {:.1}. \
             MACD histogram: {:.4}. Reply with a JSON object containing decision \
             (BUY, SELL or HOLD), confidence (integer 0-100), entry, stoploss and \
             optionally takeprofit and reason.",
            request.asset_name, request.current_price, request.rsi, request.macd_histogram
        )
    }

    async fn exchange(&self, request: &AdvisoryRequest) -> Result<(StatusCode, String)> {
        let body = serde_json::json!({
            "request": request,
            "prompt": Self::build_prompt(request),
            "response_schema": response_schema(),
        });

        let mut builder = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let resp = builder.send().await.context("advisory request failed")?;
        let status = resp.status();
        let text = resp.text().await.context("failed to read advisory body")?;
        Ok((status, text))
    }
}

#[async_trait]
impl AdvisoryPort for HttpAdvisoryClient {
    #[instrument(skip(self, request), fields(asset = %request.asset_name), name = "advisory::request")]
    async fn request_advisory(&self, request: &AdvisoryRequest) -> AdvisoryOutcome {
        let (status, text) = match tokio::time::timeout(self.timeout, self.exchange(request)).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!(error = %format!("{e:#}"), "advisory unavailable");
                return AdvisoryOutcome::NotAvailable;
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "advisory timed out");
                return AdvisoryOutcome::NotAvailable;
            }
        };

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!("advisory rate limited (429), skipping for this cycle");
            return AdvisoryOutcome::RateLimited;
        }
        if !status.is_success() {
            warn!(%status, "advisory returned non-success status");
            return AdvisoryOutcome::NotAvailable;
        }

        match extract_advisory(&text) {
            Some(advisory) => {
                debug!(decision = %advisory.decision, confidence = advisory.confidence, "advisory parsed");
                AdvisoryOutcome::Parsed(advisory)
            }
            None => {
                debug!("malformed advisory, falling back to local rules");
                AdvisoryOutcome::NotAvailable
            }
        }
    }
}
