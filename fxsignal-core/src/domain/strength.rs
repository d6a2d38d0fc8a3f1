//! Ordinal strength scale and direction enums shared by every analyzer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Five-level ordinal strength plus "no signal".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SignalStrength {
    NoSignal = 0,
    VeryWeak = 1,
    Weak = 2,
    Moderate = 3,
    Strong = 4,
    VeryStrong = 5,
}

impl SignalStrength {
    pub fn value(self) -> u8 {
        self as u8
    }

    /// Map a score onto the scale given the lower bounds of
    /// VeryStrong, Strong, Moderate and Weak (anything below is VeryWeak).
    pub fn from_bands(score: f64, bands: [f64; 4]) -> Self {
        if score >= bands[0] {
            SignalStrength::VeryStrong
        } else if score >= bands[1] {
            SignalStrength::Strong
        } else if score >= bands[2] {
            SignalStrength::Moderate
        } else if score >= bands[3] {
            SignalStrength::Weak
        } else {
            SignalStrength::VeryWeak
        }
    }
}

impl fmt::Display for SignalStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalStrength::NoSignal => "no signal",
            SignalStrength::VeryWeak => "very weak",
            SignalStrength::Weak => "weak",
            SignalStrength::Moderate => "moderate",
            SignalStrength::Strong => "strong",
            SignalStrength::VeryStrong => "very strong",
        };
        f.write_str(s)
    }
}

/// Trend reading on one timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Bullish,
    Bearish,
    Sideways,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrendDirection::Bullish => "bullish",
            TrendDirection::Bearish => "bearish",
            TrendDirection::Sideways => "sideways",
        };
        f.write_str(s)
    }
}

/// Side of a recommended trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeDirection {
    Long,
    Short,
}

impl TradeDirection {
    /// +1 for long, -1 for short. Multiplies price distances into signed offsets.
    pub fn sign(self) -> f64 {
        match self {
            TradeDirection::Long => 1.0,
            TradeDirection::Short => -1.0,
        }
    }

    /// Signed profit distance of `price` relative to `entry`.
    pub fn favorable_move(self, entry: f64, price: f64) -> f64 {
        (price - entry) * self.sign()
    }
}

impl fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeDirection::Long => f.write_str("long"),
            TradeDirection::Short => f.write_str("short"),
        }
    }
}

impl std::str::FromStr for TradeDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "long" | "buy" => Ok(TradeDirection::Long),
            "short" | "sell" => Ok(TradeDirection::Short),
            other => Err(format!("unknown direction '{other}'")),
        }
    }
}
