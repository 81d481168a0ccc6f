// =============================================================================
// Advisory Module
// =============================================================================
//
// Best-effort remote trade recommendation. Fusion only ever sees the tagged
// `AdvisoryOutcome`; transport, status handling, and text extraction live in
// the adapters below.
//
//   client : HTTP adapter (429 => RateLimited, anything else bad => NotAvailable)
//   parser : first well-formed JSON block in a free-form reply

pub mod client;
pub mod parser;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::Decision;

pub use client::HttpAdvisoryClient;

/// What the core sends to the advisory source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvisoryRequest {
    pub asset_name: String,
    pub current_price: f64,
    pub rsi: f64,
    pub macd_histogram: f64,
}

/// A structurally valid advisory. Adopted verbatim by fusion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryResponse {
    pub decision: Decision,
    /// 0..=100.
    pub confidence: u8,
    pub entry: f64,
    pub stoploss: f64,
    #[serde(default)]
    pub takeprofit: Option<f64>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Tagged result of one advisory attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AdvisoryOutcome {
    Parsed(AdvisoryResponse),
    /// Any failure other than rate limiting, including malformed replies.
    NotAvailable,
    /// HTTP 429. Not retried within the cycle.
    RateLimited,
}

/// JSON schema sent alongside every request: the fields a reply must carry.
pub fn response_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "decision":   { "type": "string", "enum": ["BUY", "SELL", "HOLD"] },
            "confidence": { "type": "integer", "minimum": 0, "maximum": 100 },
            "entry":      { "type": "number" },
            "stoploss":   { "type": "number" },
            "takeprofit": { "type": "number" },
            "reason":     { "type": "string" }
        },
        "required": ["decision", "confidence", "entry", "stoploss"]
    })
}

/// Remote advisory capability.
#[async_trait]
pub trait AdvisoryPort: Send + Sync {
    async fn request_advisory(&self, request: &AdvisoryRequest) -> AdvisoryOutcome;
}

/// Port used when no advisory endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledAdvisory;

#[async_trait]
impl AdvisoryPort for DisabledAdvisory {
    async fn request_advisory(&self, _request: &AdvisoryRequest) -> AdvisoryOutcome {
        AdvisoryOutcome::NotAvailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serialises_camel_case() {
        let req = AdvisoryRequest {
            asset_name: "Bitcoin".into(),
            current_price: 100.0,
            rsi: 25.0,
            macd_histogram: 0.0,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["assetName"], "Bitcoin");
        assert_eq!(v["currentPrice"], 100.0);
        assert_eq!(v["macdHistogram"], 0.0);
    }

    #[test]
    fn schema_lists_required_fields() {
        let schema = response_schema();
        let required: Vec<&str> = schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|v| v.as_str())
            .collect();
        assert_eq!(required, vec!["decision", "confidence", "entry", "stoploss"]);
    }

    #[tokio::test]
    async fn disabled_port_is_never_available() {
        let req = AdvisoryRequest {
            asset_name: "x".into(),
            current_price: 1.0,
            rsi: 50.0,
            macd_histogram: 0.0,
        };
        assert_eq!(
            DisabledAdvisory.request_advisory(&req).await,
            AdvisoryOutcome::NotAvailable
        );
    }
}
