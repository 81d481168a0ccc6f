// =============================================================================
// Decision Fusion: remote advisory first, deterministic local rules second
// =============================================================================
//
// Pipeline per asset:
//   1. Ask the advisory port (5 s deadline).
//        Parsed       => adopt verbatim
//        RateLimited  => notice, fall through; the advisory is skipped for
//                        every remaining asset until the next cycle
//        NotAvailable => fall through
//   2. Local rules:
//        RSI < 30 => BUY  (75)     RSI > 70 => SELL (75)     else HOLD (50)
//        entry = price, stop = price * 0.99
//        take-profit = price * 1.02 for BUY, price * 0.98 otherwise
//   3. Upsert into the Signal Store (unconditional overwrite).
//   4. Confidence > threshold => alert.
// =============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::advisory::{AdvisoryOutcome, AdvisoryPort, AdvisoryRequest, AdvisoryResponse};
use crate::alert::{should_alert, AlertEvent, AlertSink};
use crate::indicators::Indicators;
use crate::notices::{NoticeKind, NoticeLog};
use crate::signal_store::SignalStore;
use crate::types::{AssetSummary, Decision, Freshness, Signal, SignalSource};

pub const OVERSOLD_RSI: f64 = 30.0;
pub const OVERBOUGHT_RSI: f64 = 70.0;
pub const TRIGGERED_CONFIDENCE: u8 = 75;
pub const NEUTRAL_CONFIDENCE: u8 = 50;
pub const STOP_LOSS_FACTOR: f64 = 0.99;
pub const BUY_TAKE_PROFIT_FACTOR: f64 = 1.02;
pub const OTHER_TAKE_PROFIT_FACTOR: f64 = 0.98;

/// Take-profit rule shared by the local path and advisories without one.
pub fn take_profit_for(decision: Decision, entry: f64) -> f64 {
    if decision == Decision::Buy {
        entry * BUY_TAKE_PROFIT_FACTOR
    } else {
        entry * OTHER_TAKE_PROFIT_FACTOR
    }
}

/// Deterministic fallback signal from RSI alone.
pub fn local_signal(asset_id: &str, price: f64, rsi: f64, freshness: Freshness) -> Signal {
    let (decision, confidence, zone) = if rsi < OVERSOLD_RSI {
        (Decision::Buy, TRIGGERED_CONFIDENCE, "oversold")
    } else if rsi > OVERBOUGHT_RSI {
        (Decision::Sell, TRIGGERED_CONFIDENCE, "overbought")
    } else {
        (Decision::Hold, NEUTRAL_CONFIDENCE, "neutral")
    };

    Signal {
        asset_id: asset_id.to_string(),
        decision,
        confidence,
        entry_price: price,
        stop_loss: price * STOP_LOSS_FACTOR,
        take_profit: take_profit_for(decision, price),
        explanation: format!("RSI {rsi:.1} is {zone}; local rules suggest {decision}."),
        source: SignalSource::LocalRules,
        data_freshness: freshness,
        generated_at: chrono::Utc::now().timestamp_millis(),
    }
}

/// Signal adopted from an advisory.
pub fn advisory_signal(
    asset_id: &str,
    advisory: AdvisoryResponse,
    rsi: f64,
    freshness: Freshness,
) -> Signal {
    let take_profit = advisory
        .takeprofit
        .unwrap_or_else(|| take_profit_for(advisory.decision, advisory.entry));
    let explanation = match advisory.reason {
        Some(reason) => format!("{reason} (RSI {rsi:.1})"),
        None => format!(
            "Advisory {} at {}% confidence (RSI {rsi:.1}).",
            advisory.decision, advisory.confidence
        ),
    };

    Signal {
        asset_id: asset_id.to_string(),
        decision: advisory.decision,
        confidence: advisory.confidence,
        entry_price: advisory.entry,
        stop_loss: advisory.stoploss,
        take_profit,
        explanation,
        source: SignalSource::Advisory,
        data_freshness: freshness,
        generated_at: chrono::Utc::now().timestamp_millis(),
    }
}

/// Fuses advisory and local rules, then publishes the result.
pub struct DecisionEngine {
    advisory: Arc<dyn AdvisoryPort>,
    store: Arc<SignalStore>,
    alerts: Arc<dyn AlertSink>,
    notices: Arc<NoticeLog>,
    advisory_timeout: Duration,
    alert_threshold: u8,
    /// Set by a 429; cleared by `begin_cycle`.
    rate_limited: AtomicBool,
}

impl DecisionEngine {
    pub fn new(
        advisory: Arc<dyn AdvisoryPort>,
        store: Arc<SignalStore>,
        alerts: Arc<dyn AlertSink>,
        notices: Arc<NoticeLog>,
        advisory_timeout: Duration,
        alert_threshold: u8,
    ) -> Self {
        Self {
            advisory,
            store,
            alerts,
            notices,
            advisory_timeout,
            alert_threshold,
            rate_limited: AtomicBool::new(false),
        }
    }

    /// Start of a refresh cycle: the advisory may be asked again.
    pub fn begin_cycle(&self) {
        self.rate_limited.store(false, Ordering::Relaxed);
    }

    /// Steps 1-2: produce a signal without publishing it.
    pub async fn evaluate(
        &self,
        asset: &AssetSummary,
        indicators: &Indicators,
        freshness: Freshness,
    ) -> Signal {
        if self.rate_limited.load(Ordering::Relaxed) {
            debug!(asset = %asset.id, "advisory rate limited this cycle, local rules only");
            return local_signal(&asset.id, asset.current_price, indicators.rsi, freshness);
        }

        let request = AdvisoryRequest {
            asset_name: asset.display_name().to_string(),
            current_price: asset.current_price,
            rsi: indicators.rsi,
            macd_histogram: indicators.macd_histogram,
        };

        let outcome = tokio::time::timeout(
            self.advisory_timeout,
            self.advisory.request_advisory(&request),
        )
        .await
        .unwrap_or(AdvisoryOutcome::NotAvailable);

        match outcome {
            AdvisoryOutcome::Parsed(advisory) => {
                debug!(asset = %asset.id, "adopting advisory");
                return advisory_signal(&asset.id, advisory, indicators.rsi, freshness);
            }
            AdvisoryOutcome::RateLimited => {
                self.rate_limited.store(true, Ordering::Relaxed);
                self.notices.push(
                    NoticeKind::RateLimited,
                    Some(&asset.id),
                    "advisory rate limited; using local rules this cycle",
                );
            }
            AdvisoryOutcome::NotAvailable => {
                debug!(asset = %asset.id, "no advisory available");
            }
        }

        local_signal(&asset.id, asset.current_price, indicators.rsi, freshness)
    }

    /// Full contract: evaluate, store (last write wins), alert.
    pub async fn decide(
        &self,
        asset: &AssetSummary,
        indicators: &Indicators,
        freshness: Freshness,
    ) -> Signal {
        let signal = self.evaluate(asset, indicators, freshness).await;

        self.store.upsert(signal.clone());
        info!(
            asset = %signal.asset_id,
            decision = %signal.decision,
            confidence = signal.confidence,
            source = %signal.source,
            freshness = %signal.data_freshness,
            "signal updated"
        );

        if should_alert(&signal, self.alert_threshold) {
            self.alerts.notify(&AlertEvent::new(signal.clone()));
        }
        signal
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::tests::RecordingSink;
    use crate::indicators::BollingerBands;
    use async_trait::async_trait;

    /// Advisory port returning a fixed outcome.
    struct Fixed(AdvisoryOutcome);

    #[async_trait]
    impl AdvisoryPort for Fixed {
        async fn request_advisory(&self, _request: &AdvisoryRequest) -> AdvisoryOutcome {
            self.0.clone()
        }
    }

    /// Always rate limited; counts how often it is asked.
    #[derive(Default)]
    struct CountingRateLimited {
        calls: Arc<std::sync::atomic::AtomicUsize>,
    }

    #[async_trait]
    impl AdvisoryPort for CountingRateLimited {
        async fn request_advisory(&self, _request: &AdvisoryRequest) -> AdvisoryOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            AdvisoryOutcome::RateLimited
        }
    }

    /// Advisory port that never answers in time.
    struct Hanging;

    #[async_trait]
    impl AdvisoryPort for Hanging {
        async fn request_advisory(&self, _request: &AdvisoryRequest) -> AdvisoryOutcome {
            tokio::time::sleep(Duration::from_secs(60)).await;
            AdvisoryOutcome::Parsed(AdvisoryResponse {
                decision: Decision::Buy,
                confidence: 99,
                entry: 1.0,
                stoploss: 1.0,
                takeprofit: None,
                reason: None,
            })
        }
    }

    struct Fixture {
        engine: DecisionEngine,
        store: Arc<SignalStore>,
        alerts: RecordingSink,
        notices: Arc<NoticeLog>,
    }

    fn fixture(port: impl AdvisoryPort + 'static) -> Fixture {
        let store = Arc::new(SignalStore::new());
        let alerts = RecordingSink::default();
        let notices = Arc::new(NoticeLog::new());
        let engine = DecisionEngine::new(
            Arc::new(port),
            store.clone(),
            Arc::new(alerts.clone()),
            notices.clone(),
            Duration::from_secs(5),
            80,
        );
        Fixture {
            engine,
            store,
            alerts,
            notices,
        }
    }

    fn asset(price: f64) -> AssetSummary {
        AssetSummary {
            id: "bitcoin".into(),
            symbol: "BTC".into(),
            name: "Bitcoin".into(),
            current_price: price,
            pct_change_1h: None,
        }
    }

    fn indicators(rsi: f64) -> Indicators {
        Indicators {
            rsi,
            macd_histogram: 0.0,
            bollinger: BollingerBands {
                upper: 0.0,
                middle: 0.0,
                lower: 0.0,
            },
        }
    }

    #[test]
    fn local_buy_when_oversold() {
        let s = local_signal("bitcoin", 200.0, 25.0, Freshness::Fresh);
        assert_eq!(s.decision, Decision::Buy);
        assert_eq!(s.confidence, 75);
        assert_eq!(s.entry_price, 200.0);
        assert!((s.stop_loss - 198.0).abs() < 1e-9);
        assert!((s.take_profit - 204.0).abs() < 1e-9);
        assert!(s.explanation.contains("RSI 25.0"));
        assert_eq!(s.source, SignalSource::LocalRules);
    }

    #[test]
    fn local_sell_when_overbought() {
        let s = local_signal("bitcoin", 100.0, 70.5, Freshness::Cached);
        assert_eq!(s.decision, Decision::Sell);
        assert_eq!(s.confidence, 75);
        assert!((s.stop_loss - 99.0).abs() < 1e-9);
        assert!((s.take_profit - 98.0).abs() < 1e-9);
        assert_eq!(s.data_freshness, Freshness::Cached);
    }

    #[test]
    fn local_hold_in_neutral_band_including_edges() {
        for rsi in [30.0, 50.0, 70.0] {
            let s = local_signal("x", 10.0, rsi, Freshness::Fresh);
            assert_eq!(s.decision, Decision::Hold, "rsi {rsi}");
            assert_eq!(s.confidence, 50);
            assert!((s.take_profit - 9.8).abs() < 1e-9);
        }
    }

    #[test]
    fn explanation_formats_rsi_to_one_decimal() {
        let s = local_signal("x", 1.0, 76.744_186, Freshness::Fresh);
        assert!(s.explanation.contains("RSI 76.7"), "{}", s.explanation);
    }

    #[tokio::test]
    async fn no_advisory_rsi_25_is_buy_75_with_local_levels() {
        let f = fixture(Fixed(AdvisoryOutcome::NotAvailable));
        let s = f.engine.decide(&asset(100.0), &indicators(25.0), Freshness::Fresh).await;
        assert_eq!(s.decision, Decision::Buy);
        assert_eq!(s.confidence, 75);
        assert!((s.stop_loss - 99.0).abs() < 1e-9);
        assert!((s.take_profit - 102.0).abs() < 1e-9);
        assert_eq!(f.store.get("bitcoin").unwrap(), s);
        assert!(f.alerts.events.lock().is_empty());
    }

    #[tokio::test]
    async fn no_advisory_rsi_50_is_hold_50() {
        let f = fixture(Fixed(AdvisoryOutcome::NotAvailable));
        let s = f.engine.decide(&asset(100.0), &indicators(50.0), Freshness::Fresh).await;
        assert_eq!(s.decision, Decision::Hold);
        assert_eq!(s.confidence, 50);
    }

    #[tokio::test]
    async fn parsed_advisory_is_adopted_verbatim_and_alerts() {
        let f = fixture(Fixed(AdvisoryOutcome::Parsed(AdvisoryResponse {
            decision: Decision::Sell,
            confidence: 88,
            entry: 101.0,
            stoploss: 103.0,
            takeprofit: None,
            reason: Some("momentum fading".into()),
        })));
        let s = f.engine.decide(&asset(100.0), &indicators(25.0), Freshness::Fresh).await;
        assert_eq!(s.decision, Decision::Sell);
        assert_eq!(s.confidence, 88);
        assert_eq!(s.entry_price, 101.0);
        assert_eq!(s.stop_loss, 103.0);
        assert!((s.take_profit - 101.0 * 0.98).abs() < 1e-9);
        assert_eq!(s.source, SignalSource::Advisory);
        assert!(s.explanation.starts_with("momentum fading"));

        let events = f.alerts.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].signal, s);
    }

    #[tokio::test]
    async fn advisory_take_profit_is_kept_when_supplied() {
        let f = fixture(Fixed(AdvisoryOutcome::Parsed(AdvisoryResponse {
            decision: Decision::Buy,
            confidence: 60,
            entry: 100.0,
            stoploss: 97.0,
            takeprofit: Some(110.0),
            reason: None,
        })));
        let s = f.engine.decide(&asset(100.0), &indicators(50.0), Freshness::Fresh).await;
        assert_eq!(s.take_profit, 110.0);
        assert!(f.alerts.events.lock().is_empty());
    }

    #[tokio::test]
    async fn rate_limited_falls_back_and_records_notice() {
        let f = fixture(Fixed(AdvisoryOutcome::RateLimited));
        let s = f.engine.decide(&asset(100.0), &indicators(80.0), Freshness::Fresh).await;
        assert_eq!(s.decision, Decision::Sell);
        assert_eq!(s.source, SignalSource::LocalRules);
        assert_eq!(f.notices.count(NoticeKind::RateLimited), 1);
    }

    #[tokio::test]
    async fn rate_limit_holds_for_rest_of_cycle() {
        let port = CountingRateLimited::default();
        let calls = port.calls.clone();
        let f = fixture(port);

        f.engine.decide(&asset(100.0), &indicators(50.0), Freshness::Fresh).await;
        let s = f.engine.decide(&asset(100.0), &indicators(20.0), Freshness::Fresh).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(s.decision, Decision::Buy);
        assert_eq!(s.source, SignalSource::LocalRules);
        assert_eq!(f.notices.count(NoticeKind::RateLimited), 1);

        f.engine.begin_cycle();
        f.engine.decide(&asset(100.0), &indicators(50.0), Freshness::Fresh).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_advisory_times_out_to_local_rules() {
        let f = fixture(Hanging);
        let s = f.engine.decide(&asset(100.0), &indicators(50.0), Freshness::Fresh).await;
        assert_eq!(s.source, SignalSource::LocalRules);
        assert_eq!(s.decision, Decision::Hold);
    }

    #[tokio::test]
    async fn decide_overwrites_previous_signal() {
        let f = fixture(Fixed(AdvisoryOutcome::NotAvailable));
        f.engine.decide(&asset(100.0), &indicators(20.0), Freshness::Fresh).await;
        f.engine.decide(&asset(100.0), &indicators(90.0), Freshness::Offline).await;
        let stored = f.store.get("bitcoin").unwrap();
        assert_eq!(stored.decision, Decision::Sell);
        assert_eq!(stored.data_freshness, Freshness::Offline);
        assert_eq!(f.store.len(), 1);
    }
}
