//! Swing extrema over a centered window.
//!
//! A bar is a swing high when its high is the maximum of the `window` bars
//! centred on it and no earlier bar in that window has the same high, so a
//! flat top yields one swing point rather than several. Bars within
//! `window / 2` of either end are never swings.

use crate::domain::Candle;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwingPoint {
    pub index: usize,
    pub price: f64,
}

fn swings<F>(candles: &[Candle], window: usize, price: F, is_better: fn(f64, f64) -> bool) -> Vec<SwingPoint>
where
    F: Fn(&Candle) -> f64,
{
    let half = window.max(1) / 2;
    if candles.len() < 2 * half + 1 {
        return Vec::new();
    }
    (half..candles.len() - half)
        .filter_map(|i| {
            let p = price(&candles[i]);
            let lo = i - half;
            let hi = i + half;
            let before_ok = candles[lo..i].iter().all(|c| is_better(p, price(c)));
            let after_ok = candles[i + 1..=hi].iter().all(|c| !is_better(price(c), p));
            (before_ok && after_ok).then_some(SwingPoint { index: i, price: p })
        })
        .collect()
}

pub fn swing_highs(candles: &[Candle], window: usize) -> Vec<SwingPoint> {
    swings(candles, window, |c| c.high, |a, b| a > b)
}

pub fn swing_lows(candles: &[Candle], window: usize) -> Vec<SwingPoint> {
    swings(candles, window, |c| c.low, |a, b| a < b)
}
