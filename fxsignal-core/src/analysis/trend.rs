//! Moving-average and swing-structure trend detection.

use super::AnalysisError;
use crate::config::{DataConfig, TrendConfig};
use crate::data::{load_candles, CandleSource, DataError};
use crate::domain::{Candle, CurrencyPair, SignalStrength, Timeframe, TrendDirection};
use crate::indicators::last_ema;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub pair: CurrencyPair,
    pub timeframe: Timeframe,
    pub direction: TrendDirection,
    pub strength: SignalStrength,
    pub fast_ma: f64,
    pub slow_ma: f64,
    pub latest_close: f64,
    pub higher_highs: bool,
    pub higher_lows: bool,
    pub lower_highs: bool,
    pub lower_lows: bool,
    pub analyzed_at: DateTime<Utc>,
}

impl TrendAnalysis {
    /// MA gap as a percentage of the slow MA.
    pub fn separation_pct(&self) -> f64 {
        (self.fast_ma - self.slow_ma).abs() / self.slow_ma * 100.0
    }
}

/// Higher- and lower-timeframe readings of one pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiTimeframeTrend {
    pub h4: TrendAnalysis,
    pub h1: TrendAnalysis,
}

impl MultiTimeframeTrend {
    /// The shared direction when H4 is trending and H1 agrees.
    pub fn confirmed_direction(&self) -> Option<TrendDirection> {
        (self.h4.direction != TrendDirection::Sideways && self.h1.direction == self.h4.direction)
            .then_some(self.h4.direction)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PatternFlags {
    higher_highs: bool,
    higher_lows: bool,
    lower_highs: bool,
    lower_lows: bool,
}

/// Compare the latest bar against the extremes of the window, excluding the
/// most recent `exclude_recent` bars from the reference.
fn pattern_flags(candles: &[Candle], lookback: usize, exclude_recent: usize) -> PatternFlags {
    let window = &candles[candles.len().saturating_sub(lookback)..];
    let none = PatternFlags {
        higher_highs: false,
        higher_lows: false,
        lower_highs: false,
        lower_lows: false,
    };
    let Some(recent) = window.last() else {
        return none;
    };
    if window.len() <= exclude_recent {
        return none;
    }
    let reference = &window[..window.len() - exclude_recent];
    let prev_high = reference.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let prev_low = reference.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
    PatternFlags {
        higher_highs: recent.high > prev_high,
        higher_lows: recent.low > prev_low,
        lower_highs: recent.high < prev_high,
        lower_lows: recent.low < prev_low,
    }
}

fn direction(fast: f64, slow: f64, p: PatternFlags) -> TrendDirection {
    if fast > slow {
        if (p.higher_highs && p.higher_lows) || !(p.lower_highs && p.lower_lows) {
            TrendDirection::Bullish
        } else {
            TrendDirection::Sideways
        }
    } else if fast < slow {
        if (p.lower_highs && p.lower_lows) || !(p.higher_highs && p.higher_lows) {
            TrendDirection::Bearish
        } else {
            TrendDirection::Sideways
        }
    } else {
        TrendDirection::Sideways
    }
}

pub struct TrendDetector<'a> {
    config: &'a TrendConfig,
    data: &'a DataConfig,
    source: &'a dyn CandleSource,
}

impl<'a> TrendDetector<'a> {
    pub fn new(config: &'a TrendConfig, data: &'a DataConfig, source: &'a dyn CandleSource) -> Self {
        Self { config, data, source }
    }

    fn required_bars(&self, timeframe: Timeframe) -> usize {
        self.data.min_bars.get(timeframe).max(self.config.slow_period)
    }

    fn strength(&self, direction: TrendDirection, separation_pct: f64, p: PatternFlags) -> SignalStrength {
        let (full, partial) = match direction {
            TrendDirection::Sideways => return SignalStrength::NoSignal,
            TrendDirection::Bullish => (p.higher_highs && p.higher_lows, p.higher_highs || p.higher_lows),
            TrendDirection::Bearish => (p.lower_highs && p.lower_lows, p.lower_highs || p.lower_lows),
        };
        let mut score = 0.0;
        if separation_pct > self.config.strong_separation_pct {
            score += 2.0;
        } else if separation_pct > self.config.moderate_separation_pct {
            score += 1.0;
        }
        if full {
            score += 3.0;
        } else if partial {
            score += 1.0;
        }
        SignalStrength::from_bands(score, [5.0, 4.0, 3.0, 2.0])
    }

    /// Trend reading over an already-loaded candle series.
    pub fn analyze_candles(
        &self,
        pair: &CurrencyPair,
        timeframe: Timeframe,
        candles: &[Candle],
        now: DateTime<Utc>,
    ) -> Result<TrendAnalysis, AnalysisError> {
        let required = self.required_bars(timeframe);
        let insufficient = || AnalysisError::InsufficientData {
            pair: pair.to_string(),
            timeframe,
            required,
            available: candles.len(),
        };
        if candles.len() < required {
            return Err(insufficient());
        }
        let fast = last_ema(candles, self.config.fast_period).ok_or_else(insufficient)?;
        let slow = last_ema(candles, self.config.slow_period).ok_or_else(insufficient)?;
        let latest_close = candles.last().map(|c| c.close).ok_or_else(insufficient)?;

        let flags = pattern_flags(candles, self.config.pattern_lookback, self.config.exclude_recent);
        let direction = direction(fast, slow, flags);
        let separation_pct = (fast - slow).abs() / slow * 100.0;
        let strength = self.strength(direction, separation_pct, flags);

        tracing::debug!(
            pair = %pair,
            timeframe = %timeframe,
            direction = %direction,
            strength = %strength,
            fast,
            slow,
            "trend analysed"
        );

        Ok(TrendAnalysis {
            pair: pair.clone(),
            timeframe,
            direction,
            strength,
            fast_ma: fast,
            slow_ma: slow,
            latest_close,
            higher_highs: flags.higher_highs,
            higher_lows: flags.higher_lows,
            lower_highs: flags.lower_highs,
            lower_lows: flags.lower_lows,
            analyzed_at: now,
        })
    }

    pub fn analyze(&self, pair: &CurrencyPair, timeframe: Timeframe) -> Result<TrendAnalysis, AnalysisError> {
        self.analyze_at(pair, timeframe, Utc::now())
    }

    pub fn analyze_at(
        &self,
        pair: &CurrencyPair,
        timeframe: Timeframe,
        now: DateTime<Utc>,
    ) -> Result<TrendAnalysis, AnalysisError> {
        let required = self.required_bars(timeframe);
        let candles = load_candles(self.source, pair, timeframe, self.data.lookback_bars, required)
            .map_err(|e| match e {
                DataError::InsufficientData { required, available, .. } => AnalysisError::InsufficientData {
                    pair: pair.to_string(),
                    timeframe,
                    required,
                    available,
                },
                other => AnalysisError::Data(other),
            })?;
        self.analyze_candles(pair, timeframe, &candles, now)
    }

    pub fn analyze_multi(&self, pair: &CurrencyPair, now: DateTime<Utc>) -> Result<MultiTimeframeTrend, AnalysisError> {
        Ok(MultiTimeframeTrend {
            h4: self.analyze_at(pair, Timeframe::H4, now)?,
            h1: self.analyze_at(pair, Timeframe::H1, now)?,
        })
    }
}
