//! Currency pair metadata: pip size, pip value, provider ticker.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Standard contract size of one lot, in base-currency units.
pub const LOT_UNITS: f64 = 100_000.0;

/// A forex pair such as GBP/USD. Serialized as `"GBP/USD"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyPair {
    base: String,
    quote: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum PairError {
    #[error("invalid currency pair '{0}' (expected e.g. GBP/USD)")]
    Invalid(String),

    #[error("pair '{0}' uses the same currency twice")]
    SameCurrency(String),
}

impl CurrencyPair {
    pub fn new(base: &str, quote: &str) -> Result<Self, PairError> {
        let base = base.trim().to_ascii_uppercase();
        let quote = quote.trim().to_ascii_uppercase();
        let valid = |c: &str| c.len() == 3 && c.chars().all(|ch| ch.is_ascii_alphabetic());
        if !valid(&base) || !valid(&quote) {
            return Err(PairError::Invalid(format!("{base}/{quote}")));
        }
        if base == quote {
            return Err(PairError::SameCurrency(format!("{base}/{quote}")));
        }
        Ok(Self { base, quote })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn quote(&self) -> &str {
        &self.quote
    }

    pub fn currencies(&self) -> [&str; 2] {
        [&self.base, &self.quote]
    }

    pub fn involves(&self, currency: &str) -> bool {
        self.base == currency || self.quote == currency
    }

    pub fn involves_usd(&self) -> bool {
        self.involves("USD")
    }

    pub fn is_jpy_quoted(&self) -> bool {
        self.quote == "JPY"
    }

    /// Smallest standard price increment: 0.01 for JPY-quoted pairs, else 0.0001.
    pub fn pip_size(&self) -> f64 {
        if self.is_jpy_quoted() {
            0.01
        } else {
            0.0001
        }
    }

    /// Approximate value of one pip for one standard lot, in USD.
    ///
    /// Fixed approximation, not derived from the live exchange rate.
    pub fn pip_value_per_lot(&self) -> f64 {
        if self.is_jpy_quoted() {
            9.16
        } else {
            10.0
        }
    }

    /// Price distance expressed in pips.
    pub fn to_pips(&self, distance: f64) -> f64 {
        distance / self.pip_size()
    }

    pub fn from_pips(&self, pips: f64) -> f64 {
        pips * self.pip_size()
    }

    /// Symbol without separator, e.g. `GBPUSD`.
    pub fn compact(&self) -> String {
        format!("{}{}", self.base, self.quote)
    }

    /// Yahoo Finance style ticker, e.g. `GBPUSD=X`.
    pub fn provider_ticker(&self) -> String {
        format!("{}=X", self.compact())
    }

    /// Approximate notional in USD of `units` base-currency units at `price`.
    pub fn notional_usd(&self, units: f64, price: f64) -> f64 {
        if self.base == "USD" {
            units
        } else {
            units * price
        }
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl FromStr for CurrencyPair {
    type Err = PairError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some((base, quote)) = s.split_once(['/', '_', '-']) {
            return Self::new(base, quote);
        }
        let compact = s.trim_end_matches("=X");
        if compact.len() == 6 && compact.is_ascii() {
            return Self::new(&compact[..3], &compact[3..]);
        }
        Err(PairError::Invalid(s.to_string()))
    }
}

impl TryFrom<String> for CurrencyPair {
    type Error = PairError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CurrencyPair> for String {
    fn from(pair: CurrencyPair) -> Self {
        pair.to_string()
    }
}
