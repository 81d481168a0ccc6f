// =============================================================================
// MACD Histogram
// =============================================================================
//
//   macd      = EMA(closes, 12) - EMA(closes, 26)
//   signal    = EMA([macd], 9)
//   histogram = macd - signal
//
// The signal line is computed over a one-element series, which hits the EMA
// short-series rule and returns `macd` unchanged. The histogram is therefore
// always zero. This is a known approximation kept for parity with the tuned
// decision thresholds; see DESIGN.md (open questions).
// =============================================================================

use super::ema::calculate_ema;

pub const FAST_PERIOD: usize = 12;
pub const SLOW_PERIOD: usize = 26;
pub const SIGNAL_PERIOD: usize = 9;

/// Fast EMA minus slow EMA.
pub fn macd_line(closes: &[f64]) -> f64 {
    calculate_ema(closes, FAST_PERIOD) - calculate_ema(closes, SLOW_PERIOD)
}

/// MACD histogram of `closes` (see module docs for the degenerate signal line).
pub fn macd_histogram(closes: &[f64]) -> f64 {
    let macd = macd_line(closes);
    let signal = calculate_ema(&[macd], SIGNAL_PERIOD);
    macd - signal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_is_zero_by_construction() {
        let rising: Vec<f64> = (1..=60).map(|x| x as f64 * 1.5).collect();
        assert!(macd_line(&rising) > 0.0);
        assert_eq!(macd_histogram(&rising), 0.0);
    }

    #[test]
    fn macd_line_negative_on_falling_series() {
        let falling: Vec<f64> = (1..=60).rev().map(|x| x as f64).collect();
        assert!(macd_line(&falling) < 0.0);
    }

    #[test]
    fn short_series_collapses_to_zero() {
        // Both EMAs return the last close.
        assert_eq!(macd_line(&[10.0, 11.0, 12.0]), 0.0);
        assert_eq!(macd_histogram(&[]), 0.0);
    }
}
