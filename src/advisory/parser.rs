// =============================================================================
// Advisory Parser: pull a structured advisory out of free-form text
// =============================================================================
//
// Replies usually wrap the JSON in prose or a markdown fence, and sometimes
// arrive inside a provider envelope (`{"candidates":[{"content":{"parts":
// [{"text":"..."}]}}]}`). Strategy:
//
//   1. If the whole body is JSON, try it directly, then every value nested
//      inside it, depth-first in document order (`preserve_order` keeps
//      object keys in the order they appear in the text).
//   2. Otherwise scan for each `{`, find its balanced `}` (string- and
//      escape-aware) and try that block.
//
// The first block that carries every required field with a valid value wins.
// Nothing found => `None`; a malformed advisory is never an error.
// =============================================================================

use serde::Deserialize;
use tracing::debug;

use crate::types::Decision;

use super::AdvisoryResponse;

/// Lenient wire shape: accepts common key spellings and numeric confidence.
#[derive(Debug, Deserialize)]
struct RawAdvisory {
    #[serde(alias = "action", alias = "signal")]
    decision: String,
    confidence: f64,
    #[serde(alias = "entry_price", alias = "entryPrice")]
    entry: f64,
    #[serde(alias = "stop_loss", alias = "stopLoss")]
    stoploss: f64,
    #[serde(default, alias = "take_profit", alias = "takeProfit")]
    takeprofit: Option<f64>,
    #[serde(default, alias = "explanation", alias = "rationale")]
    reason: Option<String>,
}

impl RawAdvisory {
    fn validate(self) -> Option<AdvisoryResponse> {
        let decision = Decision::parse(&self.decision)?;
        if !self.confidence.is_finite() || !(0.0..=100.0).contains(&self.confidence) {
            return None;
        }
        if !valid_price(self.entry) || !valid_price(self.stoploss) {
            return None;
        }
        Some(AdvisoryResponse {
            decision,
            confidence: self.confidence.round() as u8,
            entry: self.entry,
            stoploss: self.stoploss,
            takeprofit: self.takeprofit.filter(|p| valid_price(*p)),
            reason: self.reason.filter(|r| !r.trim().is_empty()),
        })
    }
}

fn valid_price(p: f64) -> bool {
    p.is_finite() && p > 0.0
}

fn try_block(block: &str) -> Option<AdvisoryResponse> {
    serde_json::from_str::<RawAdvisory>(block).ok()?.validate()
}

/// Extract the first well-formed advisory from `text`.
pub fn extract_advisory(text: &str) -> Option<AdvisoryResponse> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(found) = from_json_value(&value) {
            return Some(found);
        }
    }

    let found = scan_blocks(trimmed);
    if found.is_none() {
        debug!(len = trimmed.len(), "no well-formed advisory block in reply");
    }
    found
}

/// Try the value itself, then every nested string (envelopes).
fn from_json_value(value: &serde_json::Value) -> Option<AdvisoryResponse> {
    use serde_json::Value;

    if value.is_object() {
        if let Some(found) = serde_json::from_value::<RawAdvisory>(value.clone())
            .ok()
            .and_then(RawAdvisory::validate)
        {
            return Some(found);
        }
    }

    match value {
        Value::String(s) => scan_blocks(s),
        Value::Array(items) => items.iter().find_map(from_json_value),
        Value::Object(map) => map.values().find_map(from_json_value),
        _ => None,
    }
}

/// Try every balanced `{...}` block in order of its opening brace.
fn scan_blocks(text: &str) -> Option<AdvisoryResponse> {
    let bytes = text.as_bytes();
    bytes
        .iter()
        .enumerate()
        .filter(|&(_, &b)| b == b'{')
        .find_map(|(start, _)| {
            let end = matching_brace(bytes, start)?;
            try_block(&text[start..=end])
        })
}

/// Index of the `}` closing the `{` at `start`, ignoring braces in strings.
fn matching_brace(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}
