//! Price-series indicators used by the analyzers.

pub mod ema;
pub mod swing;

pub use ema::{ema_of_closes, ema_of_series, last_ema};
pub use swing::{swing_highs, swing_lows, SwingPoint};

/// Candles from close prices for testing: one hour apart, open = previous
/// close, high/low one pip beyond the body.
#[cfg(test)]
pub fn make_candles(closes: &[f64]) -> Vec<crate::domain::Candle> {
    use crate::domain::Candle;
    use chrono::TimeZone;
    let t0 = chrono::Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle::new(
                t0 + chrono::Duration::hours(i as i64),
                open,
                open.max(close) + 0.0001,
                open.min(close) - 0.0001,
                close,
                1000.0,
            )
        })
        .collect()
}

#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
