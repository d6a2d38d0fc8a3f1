//! In-memory sources. Used as test doubles and for offline runs.

use super::provider::{CandleSource, DataError, EventSource, PriceSource};
use crate::domain::{Candle, CurrencyPair, EconomicEvent, NewsImpact, Timeframe};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Default, Clone)]
pub struct MemoryCandles {
    series: HashMap<(CurrencyPair, Timeframe), Vec<Candle>>,
}

impl MemoryCandles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, pair: &CurrencyPair, timeframe: Timeframe, candles: Vec<Candle>) {
        self.series.insert((pair.clone(), timeframe), candles);
    }

    pub fn with(mut self, pair: &CurrencyPair, timeframe: Timeframe, candles: Vec<Candle>) -> Self {
        self.insert(pair, timeframe, candles);
        self
    }
}

impl CandleSource for MemoryCandles {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch_candles(
        &self,
        pair: &CurrencyPair,
        timeframe: Timeframe,
        lookback: usize,
    ) -> Result<Vec<Candle>, DataError> {
        let all = self
            .series
            .get(&(pair.clone(), timeframe))
            .ok_or_else(|| DataError::SymbolNotFound {
                symbol: format!("{pair} {timeframe}"),
            })?;
        let skip = all.len().saturating_sub(lookback);
        Ok(all[skip..].to_vec())
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryEvents {
    events: Vec<EconomicEvent>,
}

impl MemoryEvents {
    pub fn new(events: Vec<EconomicEvent>) -> Self {
        Self { events }
    }

    /// Load a JSON array of events.
    pub fn from_json_file(path: &Path) -> Result<Self, DataError> {
        let content = std::fs::read_to_string(path)?;
        let events: Vec<EconomicEvent> = serde_json::from_str(&content)
            .map_err(|e| DataError::Parse(format!("{}: {e}", path.display())))?;
        Ok(Self::new(events))
    }

    pub fn events(&self) -> &[EconomicEvent] {
        &self.events
    }
}

impl EventSource for MemoryEvents {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch_events(
        &self,
        currencies: &[&str],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        min_impact: NewsImpact,
    ) -> Result<Vec<EconomicEvent>, DataError> {
        Ok(self
            .events
            .iter()
            .filter(|e| currencies.contains(&e.currency.as_str()))
            .filter(|e| e.date >= start && e.date < end)
            .filter(|e| e.impact >= min_impact)
            .cloned()
            .collect())
    }
}

/// Fixed quotes per pair.
#[derive(Debug, Default, Clone)]
pub struct FixedPrices {
    prices: HashMap<CurrencyPair, f64>,
}

impl FixedPrices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, pair: &CurrencyPair, price: f64) -> Self {
        self.prices.insert(pair.clone(), price);
        self
    }

    pub fn set(&mut self, pair: &CurrencyPair, price: f64) {
        self.prices.insert(pair.clone(), price);
    }
}

impl PriceSource for FixedPrices {
    fn current_price(&self, pair: &CurrencyPair) -> Result<f64, DataError> {
        self.prices
            .get(pair)
            .copied()
            .ok_or_else(|| DataError::SymbolNotFound {
                symbol: pair.to_string(),
            })
    }
}

/// Last close of the finest series held for a pair stands in for a live quote.
impl PriceSource for MemoryCandles {
    fn current_price(&self, pair: &CurrencyPair) -> Result<f64, DataError> {
        Timeframe::ALL
            .iter()
            .find_map(|tf| self.series.get(&(pair.clone(), *tf)))
            .and_then(|s| s.last())
            .map(|c| c.close)
            .ok_or_else(|| DataError::SymbolNotFound {
                symbol: pair.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn events_filter_by_currency_window_and_impact() {
        let day = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let src = MemoryEvents::new(vec![
            EconomicEvent::new(day + chrono::Duration::hours(8), "USD", NewsImpact::High, "NFP"),
            EconomicEvent::new(day + chrono::Duration::hours(9), "USD", NewsImpact::Low, "Minor"),
            EconomicEvent::new(day + chrono::Duration::hours(10), "JPY", NewsImpact::High, "BoJ"),
            EconomicEvent::new(day + chrono::Duration::days(2), "GBP", NewsImpact::High, "CPI"),
        ]);
        let got = src
            .fetch_events(&["GBP", "USD"], day, day + chrono::Duration::days(1), NewsImpact::High)
            .unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].event_name, "NFP");
    }

    #[test]
    fn candles_respect_lookback() {
        let pair: CurrencyPair = "EUR/USD".parse().unwrap();
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let candles: Vec<Candle> = (0..10)
            .map(|i| Candle::new(t0 + chrono::Duration::hours(i), 1.0, 1.1, 0.9, 1.0 + i as f64 * 0.01, 0.0))
            .collect();
        let src = MemoryCandles::new().with(&pair, Timeframe::H1, candles);
        let got = src.fetch_candles(&pair, Timeframe::H1, 3).unwrap();
        assert_eq!(got.len(), 3);
        assert!((src.current_price(&pair).unwrap() - 1.09).abs() < 1e-12);
        assert!(src.fetch_candles(&pair, Timeframe::H4, 3).is_err());
    }
}
