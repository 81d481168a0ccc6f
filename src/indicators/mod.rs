// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the indicators feeding decision
// fusion. Every function is total over `&[f64]`: insufficient data returns a
// documented neutral/degenerate value instead of an error, so a short price
// history still yields a signal.

pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;

use serde::{Deserialize, Serialize};

pub use bollinger::{calculate_bollinger, BollingerBands, DEFAULT_BOLLINGER_PERIOD};
pub use macd::macd_histogram;
pub use rsi::{calculate_rsi, DEFAULT_RSI_PERIOD};

/// Indicator snapshot for one asset, recomputed every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Indicators {
    /// 0..=100.
    pub rsi: f64,
    pub macd_histogram: f64,
    pub bollinger: BollingerBands,
}

/// Compute every indicator used by fusion from one ordered close series.
pub fn compute_indicators(closes: &[f64], rsi_period: usize, bollinger_period: usize) -> Indicators {
    Indicators {
        rsi: calculate_rsi(closes, rsi_period),
        macd_histogram: macd_histogram(closes),
        bollinger: calculate_bollinger(closes, bollinger_period, bollinger::DEFAULT_NUM_STD),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_indicators_bundles_all_three() {
        let closes: Vec<f64> = (1..=40).map(|x| x as f64).collect();
        let ind = compute_indicators(&closes, 14, 20);
        assert_eq!(ind.rsi, 100.0);
        assert_eq!(ind.macd_histogram, 0.0);
        assert!(ind.bollinger.upper > ind.bollinger.lower);
    }

    #[test]
    fn compute_indicators_short_history_is_neutral() {
        let ind = compute_indicators(&[5.0, 6.0], 14, 20);
        assert_eq!(ind.rsi, 50.0);
        assert_eq!(ind.bollinger.middle, 5.0);
    }
}
