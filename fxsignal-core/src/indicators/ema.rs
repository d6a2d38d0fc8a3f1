//! Exponential Moving Average.
//!
//! EMA[t] = alpha * x[t] + (1 - alpha) * EMA[t-1], alpha = 2 / (period + 1).
//! Seeded with the SMA of the first `period` values at index `period - 1`;
//! earlier slots are NaN.

use crate::domain::Candle;

pub fn ema_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if period == 0 || n < period {
        return result;
    }

    let alpha = 2.0 / (period as f64 + 1.0);

    let seed_window = &values[..period];
    if seed_window.iter().any(|v| v.is_nan()) {
        return result;
    }
    let seed = seed_window.iter().sum::<f64>() / period as f64;
    result[period - 1] = seed;

    let mut prev = seed;
    for i in period..n {
        // NaN taints everything after it.
        if values[i].is_nan() {
            return result;
        }
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = prev;
    }

    result
}

pub fn ema_of_closes(candles: &[Candle], period: usize) -> Vec<f64> {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
    ema_of_series(&closes, period)
}

/// Most recent EMA value, or `None` if the series is too short.
pub fn last_ema(candles: &[Candle], period: usize) -> Option<f64> {
    ema_of_closes(candles, period)
        .last()
        .copied()
        .filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_candles, DEFAULT_EPSILON};

    #[test]
    fn period_1_tracks_input() {
        let out = ema_of_series(&[1.0, 2.0, 3.0], 1);
        assert_eq!(out, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn known_values() {
        // alpha = 0.5, seed SMA(10,11,12) = 11
        let out = ema_of_series(&[10.0, 11.0, 12.0, 13.0, 14.0], 3);
        assert!(out[0].is_nan() && out[1].is_nan());
        assert_approx(out[2], 11.0, DEFAULT_EPSILON);
        assert_approx(out[3], 12.0, DEFAULT_EPSILON);
        assert_approx(out[4], 13.0, DEFAULT_EPSILON);
    }

    #[test]
    fn nan_after_seed_stops_the_series() {
        let out = ema_of_series(&[10.0, 11.0, 12.0, f64::NAN, 14.0], 3);
        assert_approx(out[2], 11.0, DEFAULT_EPSILON);
        assert!(out[3].is_nan() && out[4].is_nan());
    }

    #[test]
    fn too_short_is_none() {
        let candles = make_candles(&[1.0, 1.1]);
        assert!(last_ema(&candles, 3).is_none());
        let candles = make_candles(&[1.0, 1.1, 1.2, 1.3]);
        assert!(last_ema(&candles, 3).is_some());
    }

    #[test]
    fn fast_leads_slow_on_rising_series() {
        let closes: Vec<f64> = (0..300).map(|i| 1.0 + i as f64 * 0.001).collect();
        let candles = make_candles(&closes);
        let fast = last_ema(&candles, 50).unwrap();
        let slow = last_ema(&candles, 200).unwrap();
        assert!(fast > slow);
    }
}
