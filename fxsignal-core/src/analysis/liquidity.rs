//! Liquidity zones: equal highs/lows, stop-hunt reversals and fair value gaps.
//!
//! All four scans run independently over one candle series and are pooled
//! without cross-type deduplication, strongest first.

use super::AnalysisError;
use crate::config::{DataConfig, LiquidityConfig};
use crate::data::{load_candles, CandleSource, DataError};
use crate::domain::{Candle, CurrencyPair, Timeframe, TradeDirection};
use crate::indicators::{swing_highs, swing_lows, SwingPoint};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneType {
    EqualHighs,
    EqualLows,
    StopHuntBuy,
    StopHuntSell,
    BullishFvg,
    BearishFvg,
}

impl ZoneType {
    /// Support zones back longs; resistance zones back shorts.
    pub fn is_support(self) -> bool {
        matches!(
            self,
            ZoneType::EqualLows | ZoneType::StopHuntBuy | ZoneType::BullishFvg
        )
    }

    pub fn is_resistance(self) -> bool {
        !self.is_support()
    }

    pub fn supports(self, direction: TradeDirection) -> bool {
        match direction {
            TradeDirection::Long => self.is_support(),
            TradeDirection::Short => self.is_resistance(),
        }
    }
}

impl fmt::Display for ZoneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ZoneType::EqualHighs => "equal highs",
            ZoneType::EqualLows => "equal lows",
            ZoneType::StopHuntBuy => "buy stop-hunt",
            ZoneType::StopHuntSell => "sell stop-hunt",
            ZoneType::BullishFvg => "bullish FVG",
            ZoneType::BearishFvg => "bearish FVG",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiquidityZone {
    pub zone_type: ZoneType,
    pub price_level: f64,
    /// `(low, high)`, always `low <= high`.
    pub price_range: (f64, f64),
    /// 1..=5.
    pub strength: u8,
    pub touches: usize,
    pub detected_at: DateTime<Utc>,
    pub candle_index: usize,
}

impl LiquidityZone {
    fn new(
        zone_type: ZoneType,
        price_level: f64,
        a: f64,
        b: f64,
        strength: u8,
        touches: usize,
        candle: (usize, &Candle),
    ) -> Self {
        Self {
            zone_type,
            price_level,
            price_range: (a.min(b), a.max(b)),
            strength,
            touches,
            detected_at: candle.1.timestamp,
            candle_index: candle.0,
        }
    }

    /// Relative distance of the zone level from `price`.
    pub fn distance_from(&self, price: f64) -> f64 {
        (self.price_level - price).abs() / price
    }

    /// Whether `price` lies inside the range widened by `tolerance` (a fraction).
    pub fn contains(&self, price: f64, tolerance: f64) -> bool {
        self.price_range.0 * (1.0 - tolerance) <= price && price <= self.price_range.1 * (1.0 + tolerance)
    }
}

/// Zones whose level is within `pct` percent of `price`, nearest first.
pub fn zones_near_price(zones: &[LiquidityZone], price: f64, pct: f64) -> Vec<LiquidityZone> {
    let mut near: Vec<LiquidityZone> = zones
        .iter()
        .filter(|z| z.distance_from(price) <= pct / 100.0)
        .cloned()
        .collect();
    near.sort_by(|a, b| a.distance_from(price).total_cmp(&b.distance_from(price)));
    near
}

/// Top `n` zones by strength. Ties keep their input order.
pub fn strongest(zones: &[LiquidityZone], n: usize) -> Vec<LiquidityZone> {
    let mut sorted = zones.to_vec();
    sorted.sort_by(|a, b| b.strength.cmp(&a.strength));
    sorted.truncate(n);
    sorted
}

/// Greedy clustering of swing levels: sorted ascending, a point joins the
/// current cluster while it is within `tolerance` of the cluster's lowest
/// member, so no cluster is wider than `tolerance` end to end.
fn cluster(points: &[SwingPoint], tolerance: f64) -> Vec<Vec<SwingPoint>> {
    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| a.price.total_cmp(&b.price));

    let mut clusters: Vec<Vec<SwingPoint>> = Vec::new();
    for p in sorted {
        match clusters.last_mut() {
            Some(current) if (p.price - current[0].price) / current[0].price <= tolerance => current.push(p),
            _ => clusters.push(vec![p]),
        }
    }
    clusters
}

pub struct LiquidityZoneDetector<'a> {
    config: &'a LiquidityConfig,
    data: &'a DataConfig,
    source: &'a dyn CandleSource,
}

impl<'a> LiquidityZoneDetector<'a> {
    pub fn new(config: &'a LiquidityConfig, data: &'a DataConfig, source: &'a dyn CandleSource) -> Self {
        Self { config, data, source }
    }

    /// Fetch candles for the pair and run every scan.
    pub fn detect(&self, pair: &CurrencyPair, timeframe: Timeframe) -> Result<Vec<LiquidityZone>, AnalysisError> {
        let min_bars = self.data.min_bars.get(timeframe);
        let candles =
            load_candles(self.source, pair, timeframe, self.data.lookback_bars, min_bars).map_err(|e| match e {
                DataError::InsufficientData { required, available, .. } => AnalysisError::InsufficientData {
                    pair: pair.to_string(),
                    timeframe,
                    required,
                    available,
                },
                other => AnalysisError::Data(other),
            })?;
        let zones = self.detect_in(&candles);
        tracing::info!(pair = %pair, timeframe = %timeframe, zones = zones.len(), "liquidity zones detected");
        Ok(zones)
    }

    /// All zones in `candles`, sorted by strength descending.
    pub fn detect_in(&self, candles: &[Candle]) -> Vec<LiquidityZone> {
        let mut zones = Vec::new();
        zones.extend(self.equal_levels(candles, ZoneType::EqualHighs));
        zones.extend(self.equal_levels(candles, ZoneType::EqualLows));
        zones.extend(self.stop_hunts(candles));
        zones.extend(self.fair_value_gaps(candles));
        zones.sort_by(|a, b| b.strength.cmp(&a.strength));
        zones
    }

    /// Equal highs (or lows): clusters of swing extrema with enough touches.
    pub fn equal_levels(&self, candles: &[Candle], zone_type: ZoneType) -> Vec<LiquidityZone> {
        let points = match zone_type {
            ZoneType::EqualHighs => swing_highs(candles, self.config.swing_window),
            ZoneType::EqualLows => swing_lows(candles, self.config.swing_window),
            _ => return Vec::new(),
        };
        cluster(&points, self.config.zone_tolerance)
            .into_iter()
            .filter(|c| c.len() >= self.config.min_touches)
            .filter_map(|c| {
                let latest = c.iter().map(|p| p.index).max()?;
                let lo = c.iter().map(|p| p.price).fold(f64::INFINITY, f64::min);
                let hi = c.iter().map(|p| p.price).fold(f64::NEG_INFINITY, f64::max);
                let mean = c.iter().map(|p| p.price).sum::<f64>() / c.len() as f64;
                let strength = c.len().min(5) as u8;
                Some(LiquidityZone::new(
                    zone_type,
                    mean,
                    lo,
                    hi,
                    strength,
                    c.len(),
                    (latest, &candles[latest]),
                ))
            })
            .collect()
    }

    /// A bar that breaks the prior `lookback`-bar extreme, closes back the
    /// other way, and is followed by continuation.
    pub fn stop_hunts(&self, candles: &[Candle]) -> Vec<LiquidityZone> {
        let lookback = self.config.stop_hunt_lookback;
        if candles.len() < lookback + 2 {
            return Vec::new();
        }
        let mut zones = Vec::new();
        for i in lookback..candles.len() - 1 {
            let c = &candles[i];
            let next = &candles[i + 1];
            let prior = &candles[i - lookback..i];
            let prior_low = prior.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
            let prior_high = prior.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);

            if c.low < prior_low && c.is_bullish() && next.close > c.close {
                zones.push(LiquidityZone::new(
                    ZoneType::StopHuntBuy,
                    c.low,
                    c.low,
                    c.low * 1.001,
                    4,
                    1,
                    (i, c),
                ));
            } else if c.high > prior_high && c.is_bearish() && next.close < c.close {
                zones.push(LiquidityZone::new(
                    ZoneType::StopHuntSell,
                    c.high,
                    c.high * 0.999,
                    c.high,
                    4,
                    1,
                    (i, c),
                ));
            }
        }
        zones
    }

    /// Three-bar imbalances at least `fvg_min_gap` wide relative to price.
    pub fn fair_value_gaps(&self, candles: &[Candle]) -> Vec<LiquidityZone> {
        let min_gap = self.config.fvg_min_gap;
        let mut zones = Vec::new();
        for i in 2..candles.len() {
            let c1 = &candles[i - 2];
            let c3 = &candles[i];
            if c1.high < c3.low {
                if (c3.low - c1.high) / c1.high >= min_gap {
                    zones.push(LiquidityZone::new(
                        ZoneType::BullishFvg,
                        (c1.high + c3.low) / 2.0,
                        c1.high,
                        c3.low,
                        3,
                        0,
                        (i, c3),
                    ));
                }
            } else if c1.low > c3.high && (c1.low - c3.high) / c3.high >= min_gap {
                zones.push(LiquidityZone::new(
                    ZoneType::BearishFvg,
                    (c1.low + c3.high) / 2.0,
                    c3.high,
                    c1.low,
                    3,
                    0,
                    (i, c3),
                ));
            }
        }
        zones
    }
}
