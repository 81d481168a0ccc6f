// =============================================================================
// Alerts: out-of-band notification for high-confidence signals
// =============================================================================
//
// The core only decides *whether* to alert (confidence above the threshold);
// what happens next (sound, vibration, push) belongs to whoever consumes the
// sink. `notify` is fire-and-forget and must never block the pipeline.
// =============================================================================

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::types::Signal;

/// Confidence strictly above this raises an alert.
pub const DEFAULT_ALERT_THRESHOLD: u8 = 80;

/// One raised alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertEvent {
    /// UUID v4.
    pub id: String,
    pub signal: Signal,
    /// ISO 8601.
    pub raised_at: String,
}

impl AlertEvent {
    pub fn new(signal: Signal) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            signal,
            raised_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Whether `signal` warrants an alert under `threshold`.
pub fn should_alert(signal: &Signal, threshold: u8) -> bool {
    signal.confidence > threshold
}

/// Consumer of alert events.
pub trait AlertSink: Send + Sync {
    fn notify(&self, event: &AlertEvent);
}

/// Writes alerts to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn notify(&self, event: &AlertEvent) {
        let s = &event.signal;
        warn!(
            alert_id = %event.id,
            asset = %s.asset_id,
            decision = %s.decision,
            confidence = s.confidence,
            entry = s.entry_price,
            "HIGH-CONFIDENCE SIGNAL"
        );
    }
}

/// Publishes alerts on a broadcast channel (consumed by the WebSocket feed).
#[derive(Debug, Clone)]
pub struct BroadcastAlertSink {
    tx: broadcast::Sender<AlertEvent>,
}

impl BroadcastAlertSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.tx.subscribe()
    }
}

impl AlertSink for BroadcastAlertSink {
    fn notify(&self, event: &AlertEvent) {
        // No subscribers is fine: nobody is watching right now.
        if self.tx.send(event.clone()).is_err() {
            debug!(alert_id = %event.id, "alert broadcast with no subscribers");
        }
    }
}

/// Forwards every alert to each inner sink in order.
#[derive(Default)]
pub struct FanoutAlertSink {
    sinks: Vec<Box<dyn AlertSink>>,
}

impl FanoutAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl AlertSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl AlertSink for FanoutAlertSink {
    fn notify(&self, event: &AlertEvent) {
        for sink in &self.sinks {
            sink.notify(event);
        }
    }
}
