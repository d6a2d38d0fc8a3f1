//! Yahoo Finance chart API provider for intraday forex candles and quotes.
//!
//! The API is unofficial and changes without notice, so every shape
//! mismatch surfaces as `ResponseFormatChanged` rather than a panic.

use super::circuit_breaker::CircuitBreaker;
use super::ingest;
use super::provider::{CandleSource, DataError, PriceSource};
use super::retry::RetryPolicy;
use crate::config::DataConfig;
use crate::domain::{Candle, CurrencyPair, Timeframe};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;

const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com";

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

pub struct YahooProvider {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    base_url: String,
}

impl YahooProvider {
    pub fn new(cfg: &DataConfig, circuit_breaker: Arc<CircuitBreaker>) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.request_timeout_secs))
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36")
            .build()?;
        Ok(Self {
            client,
            circuit_breaker,
            retry: RetryPolicy::from_config(cfg),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Native interval for a timeframe. H4 has none and is built from 60m bars.
    fn interval(timeframe: Timeframe) -> (&'static str, Timeframe) {
        match timeframe {
            Timeframe::M15 => ("15m", Timeframe::M15),
            Timeframe::M30 => ("30m", Timeframe::M30),
            Timeframe::H1 | Timeframe::H4 => ("60m", Timeframe::H1),
            Timeframe::D1 => ("1d", Timeframe::D1),
        }
    }

    fn chart_url(&self, ticker: &str, interval: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
        format!(
            "{}/v8/finance/chart/{ticker}?period1={}&period2={}&interval={interval}",
            self.base_url,
            start.timestamp(),
            end.timestamp()
        )
    }

    fn parse_response(ticker: &str, resp: ChartResponse) -> Result<(Vec<Candle>, Option<f64>), DataError> {
        let result = resp.chart.result.ok_or_else(|| match resp.chart.error {
            Some(err) if err.code == "Not Found" => DataError::SymbolNotFound {
                symbol: ticker.to_string(),
            },
            Some(err) => DataError::ResponseFormatChanged(format!("{}: {}", err.code, err.description)),
            None => DataError::ResponseFormatChanged("empty result with no error".into()),
        })?;

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("result array is empty".into()))?;
        let last_price = data.meta.and_then(|m| m.regular_market_price);
        let timestamps = data
            .timestamp
            .ok_or_else(|| DataError::ResponseFormatChanged("no timestamps".into()))?;
        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("no quote data".into()))?;

        let mut candles = Vec::with_capacity(timestamps.len());
        for (i, &ts) in timestamps.iter().enumerate() {
            let timestamp = DateTime::from_timestamp(ts, 0)
                .ok_or_else(|| DataError::ResponseFormatChanged(format!("invalid timestamp: {ts}")))?;
            let field = |v: &Vec<Option<f64>>| v.get(i).copied().flatten();
            // Rows with a missing price are market closures.
            let (Some(open), Some(high), Some(low), Some(close)) =
                (field(&quote.open), field(&quote.high), field(&quote.low), field(&quote.close))
            else {
                continue;
            };
            let volume = field(&quote.volume).unwrap_or(0.0);
            candles.push(Candle::new(timestamp, open, high, low, close, volume));
        }

        if candles.is_empty() && last_price.is_none() {
            return Err(DataError::SymbolNotFound {
                symbol: ticker.to_string(),
            });
        }
        Ok((candles, last_price))
    }

    fn request(&self, url: &str, ticker: &str) -> Result<(Vec<Candle>, Option<f64>), DataError> {
        self.retry.run(ticker, |_attempt| {
            if !self.circuit_breaker.is_allowed() {
                return Err(DataError::CircuitBreakerTripped {
                    remaining_secs: self.circuit_breaker.remaining_cooldown().as_secs(),
                });
            }

            let resp = self.client.get(url).send().map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    self.circuit_breaker.record_failure();
                }
                DataError::from(e)
            })?;
            let status = resp.status();

            if status == reqwest::StatusCode::FORBIDDEN {
                self.circuit_breaker.trip();
                return Err(DataError::CircuitBreakerTripped {
                    remaining_secs: self.circuit_breaker.remaining_cooldown().as_secs(),
                });
            }
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                self.circuit_breaker.record_failure();
                let retry_after_secs = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                return Err(DataError::RateLimited { retry_after_secs });
            }
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(DataError::SymbolNotFound {
                    symbol: ticker.to_string(),
                });
            }
            if !status.is_success() {
                if status.is_server_error() {
                    self.circuit_breaker.record_failure();
                }
                return Err(DataError::HttpStatus {
                    status: status.as_u16(),
                    source_name: "yahoo".into(),
                });
            }

            let chart: ChartResponse = resp.json().map_err(|e| {
                DataError::ResponseFormatChanged(format!("failed to parse response for {ticker}: {e}"))
            })?;
            let parsed = Self::parse_response(ticker, chart)?;
            self.circuit_breaker.record_success();
            Ok(parsed)
        })
    }
}

impl CandleSource for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch_candles(
        &self,
        pair: &CurrencyPair,
        timeframe: Timeframe,
        lookback: usize,
    ) -> Result<Vec<Candle>, DataError> {
        let (interval, native) = Self::interval(timeframe);
        let ratio = (timeframe.duration().num_minutes() / native.duration().num_minutes()).max(1) as usize;
        let native_bars = lookback * ratio;
        // Forex closes at weekends; over-request so the bar count survives them.
        let span = native.duration() * native_bars as i32 * 3 / 2 + Duration::days(3);
        let end = Utc::now();
        let ticker = pair.provider_ticker();
        let url = self.chart_url(&ticker, interval, end - span, end);

        tracing::debug!(pair = %pair, timeframe = %timeframe, interval, native_bars, "fetching candles");
        let (raw, _) = self.request(&url, &ticker)?;
        let (mut candles, _) = ingest::normalize(raw, native, &format!("{pair} {interval}"));
        if native != timeframe {
            candles = ingest::resample(&candles, timeframe);
        }
        let skip = candles.len().saturating_sub(lookback);
        Ok(candles.split_off(skip))
    }
}

impl PriceSource for YahooProvider {
    fn current_price(&self, pair: &CurrencyPair) -> Result<f64, DataError> {
        let end = Utc::now();
        let ticker = pair.provider_ticker();
        let url = self.chart_url(&ticker, "1m", end - Duration::days(1), end);
        let (candles, last_price) = self.request(&url, &ticker)?;
        last_price
            .or_else(|| candles.last().map(|c| c.close))
            .filter(|p| p.is_finite() && *p > 0.0)
            .ok_or_else(|| DataError::ResponseFormatChanged(format!("no price for {ticker}")))
    }
}
