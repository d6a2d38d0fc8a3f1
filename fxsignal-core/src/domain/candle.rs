//! Candle: one OHLCV bar.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// OHLCV bar for a single pair on a single timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum CandleError {
    #[error("candle at {timestamp} has high {high} below low {low}")]
    HighBelowLow {
        timestamp: DateTime<Utc>,
        high: f64,
        low: f64,
    },

    #[error("candle at {timestamp} has a non-positive or NaN price")]
    BadPrice { timestamp: DateTime<Utc> },
}

impl Candle {
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Returns true if any OHLC field is NaN.
    pub fn is_void(&self) -> bool {
        self.open.is_nan() || self.high.is_nan() || self.low.is_nan() || self.close.is_nan()
    }

    /// Close above open.
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Close below open.
    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    pub fn range(&self) -> f64 {
        self.high - self.low
    }

    /// Basic OHLC sanity check: high >= low, high/low bracket open/close, prices positive.
    pub fn check(&self) -> Result<(), CandleError> {
        if self.is_void() || self.open <= 0.0 || self.close <= 0.0 || self.low <= 0.0 {
            return Err(CandleError::BadPrice {
                timestamp: self.timestamp,
            });
        }
        if self.high < self.low {
            return Err(CandleError::HighBelowLow {
                timestamp: self.timestamp,
                high: self.high,
                low: self.low,
            });
        }
        Ok(())
    }

    pub fn is_sane(&self) -> bool {
        self.check().is_ok()
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
    }
}
