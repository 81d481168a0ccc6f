// =============================================================================
// Relative Strength Index (RSI): simple average over the last window
// =============================================================================
//
// RSI measures the speed and magnitude of recent price changes to evaluate
// whether an asset is overbought or oversold.
//
// Step 1: Take exactly the last `period` transitions (index len-period .. len-1).
// Step 2: Sum positive deltas (gains) and absolute negative deltas (losses).
// Step 3: avg_gain = gains / period,  avg_loss = losses / period
// Step 4: RS  = avg_gain / avg_loss
//          RSI = 100 - 100 / (1 + RS)
//
// No Wilder smoothing: the value only depends on the final window. Decision
// thresholds downstream (30 / 70) are tuned against this form.
//
// Thresholds:  RSI > 70 => OVERBOUGHT,  RSI < 30 => OVERSOLD.
// =============================================================================

/// Default look-back.
pub const DEFAULT_RSI_PERIOD: usize = 14;

/// Value returned when there is not enough data.
pub const NEUTRAL_RSI: f64 = 50.0;

/// Compute the RSI of the most recent `period` transitions of `closes`.
///
/// # Edge cases
/// - `period == 0` or `closes.len() < period + 1` => 50.0 (neutral)
/// - Average loss of zero (no down moves in the window) => 100.0
/// - Non-finite intermediate results => 50.0
pub fn calculate_rsi(closes: &[f64], period: usize) -> f64 {
    if period == 0 || closes.len() < period + 1 {
        return NEUTRAL_RSI;
    }

    let start = closes.len() - period;
    let (gains, losses) = (start..closes.len()).fold((0.0_f64, 0.0_f64), |(g, l), i| {
        let delta = closes[i] - closes[i - 1];
        if delta > 0.0 {
            (g + delta, l)
        } else {
            (g, l + delta.abs())
        }
    });

    let period_f = period as f64;
    let avg_gain = gains / period_f;
    let avg_loss = losses / period_f;

    if avg_loss == 0.0 {
        return 100.0;
    }

    let rsi = 100.0 - 100.0 / (1.0 + avg_gain / avg_loss);
    if rsi.is_finite() {
        rsi
    } else {
        NEUTRAL_RSI
    }
}
