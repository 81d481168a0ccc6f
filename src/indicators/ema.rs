// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average (SMA).
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = (close_t - EMA_{t-1}) * multiplier + EMA_{t-1}
//
// The seed is the FIRST close, not an SMA of the first `period` closes. The
// recursion then runs over the whole series. Downstream thresholds were tuned
// against this seeding, so it must not be "corrected".
// =============================================================================

/// Most recent EMA value of `closes` for the given look-back `period`.
///
/// # Edge cases
/// - `closes.len() < period` => the last close (no smoothing applied)
/// - empty input => 0.0
/// - `period == 0` => the last close
pub fn calculate_ema(closes: &[f64], period: usize) -> f64 {
    let last = closes.last().copied().unwrap_or(0.0);
    if period == 0 || closes.len() < period {
        return last;
    }

    let multiplier = 2.0 / (period + 1) as f64;
    closes[1..]
        .iter()
        .fold(closes[0], |ema, &close| (close - ema) * multiplier + ema)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_empty_input() {
        assert_eq!(calculate_ema(&[], 5), 0.0);
    }

    #[test]
    fn ema_short_series_returns_last() {
        assert_eq!(calculate_ema(&[1.0, 2.0], 5), 2.0);
        assert_eq!(calculate_ema(&[42.0], 9), 42.0);
    }

    #[test]
    fn ema_period_zero_returns_last() {
        assert_eq!(calculate_ema(&[1.0, 2.0, 3.0], 0), 3.0);
    }

    #[test]
    fn ema_seeds_from_first_close() {
        // period 3 => multiplier 0.5
        // seed 2.0 -> (4-2)*0.5+2 = 3.0 -> (6-3)*0.5+3 = 4.5
        let ema = calculate_ema(&[2.0, 4.0, 6.0], 3);
        assert!((ema - 4.5).abs() < 1e-12, "got {ema}");
    }

    #[test]
    fn ema_known_values() {
        let closes: Vec<f64> = (1..=10).map(|x| x as f64).collect();
        let mult = 2.0 / 6.0;
        let mut expected = closes[0];
        for &c in &closes[1..] {
            expected = (c - expected) * mult + expected;
        }
        assert!((calculate_ema(&closes, 5) - expected).abs() < 1e-12);
    }

    #[test]
    fn ema_flat_series_is_flat() {
        let closes = vec![100.0; 40];
        assert!((calculate_ema(&closes, 12) - 100.0).abs() < 1e-12);
    }
}
