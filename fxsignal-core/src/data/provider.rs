//! Collaborator contracts for news, candles and prices, plus the error
//! taxonomy shared by every data source.
//!
//! The analyzers only see these traits, so live providers, CSV files and
//! in-memory doubles are interchangeable.

use crate::domain::{Candle, CurrencyPair, EconomicEvent, NewsImpact, Timeframe};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised by data sources.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("insufficient data for {context}: need {required}, got {available}")]
    InsufficientData {
        context: String,
        required: usize,
        available: usize,
    },

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("HTTP {status} from {source_name}")]
    HttpStatus { status: u16, source_name: String },

    #[error("provider has blocked requests (circuit breaker tripped, {remaining_secs}s left)")]
    CircuitBreakerTripped { remaining_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(String),
}

impl DataError {
    /// Upstream failures are worth retrying; insufficiency, format and
    /// validation failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            DataError::NetworkUnreachable(_)
            | DataError::Timeout(_)
            | DataError::RateLimited { .. } => true,
            DataError::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn insufficient(context: impl Into<String>, required: usize, available: usize) -> Self {
        DataError::InsufficientData {
            context: context.into(),
            required,
            available,
        }
    }
}

impl From<reqwest::Error> for DataError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DataError::Timeout(e.to_string())
        } else if e.is_decode() {
            DataError::ResponseFormatChanged(e.to_string())
        } else if let Some(status) = e.status() {
            DataError::HttpStatus {
                status: status.as_u16(),
                source_name: e.url().map(|u| u.host_str().unwrap_or("").to_string()).unwrap_or_default(),
            }
        } else {
            DataError::NetworkUnreachable(e.to_string())
        }
    }
}

/// Source of scheduled economic events.
pub trait EventSource: Send + Sync {
    fn name(&self) -> &str;

    /// Events for any of `currencies` dated in `[start, end)` with impact at
    /// least `min_impact`.
    fn fetch_events(
        &self,
        currencies: &[&str],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        min_impact: NewsImpact,
    ) -> Result<Vec<EconomicEvent>, DataError>;
}

/// Source of OHLCV bars. Returned bars are ordered oldest first.
pub trait CandleSource: Send + Sync {
    fn name(&self) -> &str;

    /// Up to `lookback` most recent bars.
    fn fetch_candles(
        &self,
        pair: &CurrencyPair,
        timeframe: Timeframe,
        lookback: usize,
    ) -> Result<Vec<Candle>, DataError>;
}

/// Source of the latest traded price.
pub trait PriceSource: Send + Sync {
    fn current_price(&self, pair: &CurrencyPair) -> Result<f64, DataError>;
}

/// Fetch, normalize and check a candle series against the minimum bar count.
pub fn load_candles(
    source: &dyn CandleSource,
    pair: &CurrencyPair,
    timeframe: Timeframe,
    lookback: usize,
    min_bars: usize,
) -> Result<Vec<Candle>, DataError> {
    let raw = source.fetch_candles(pair, timeframe, lookback.max(min_bars))?;
    let (candles, _report) = super::ingest::normalize(raw, timeframe, &format!("{pair} {timeframe}"));
    if candles.len() < min_bars {
        return Err(DataError::insufficient(
            format!("{pair} {timeframe} candles"),
            min_bars,
            candles.len(),
        ));
    }
    Ok(candles)
}
