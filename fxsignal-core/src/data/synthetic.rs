//! Seeded random-walk candles for offline demos.
//!
//! Bars are clearly fake. The seed is derived from the pair and timeframe,
//! so the same request always produces the same series.

use super::provider::{CandleSource, DataError, PriceSource};
use crate::domain::{Candle, CurrencyPair, Timeframe};
use chrono::{DateTime, DurationRound, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone)]
pub struct SyntheticCandles {
    /// Series end; defaults to "now" truncated to the bar duration.
    end: Option<DateTime<Utc>>,
    seed: u64,
}

impl SyntheticCandles {
    pub fn new(seed: u64) -> Self {
        Self { end: None, seed }
    }

    pub fn ending_at(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    fn rng_for(&self, pair: &CurrencyPair, timeframe: Timeframe) -> StdRng {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.seed.to_le_bytes());
        hasher.update(pair.compact().as_bytes());
        hasher.update(timeframe.as_str().as_bytes());
        StdRng::from_seed(*hasher.finalize().as_bytes())
    }

    fn start_price(pair: &CurrencyPair) -> f64 {
        match (pair.base(), pair.quote()) {
            ("GBP", "USD") => 1.27,
            ("EUR", "USD") => 1.08,
            ("USD", "JPY") => 150.0,
            ("AUD", "USD") => 0.66,
            ("USD", "CHF") => 0.88,
            ("USD", "CAD") => 1.36,
            _ if pair.is_jpy_quoted() => 100.0,
            _ => 1.0,
        }
    }

    /// Hourly-scale volatility, scaled by sqrt of bar length.
    fn bar_volatility(timeframe: Timeframe) -> f64 {
        let hours = timeframe.duration().num_minutes() as f64 / 60.0;
        0.0012 * hours.sqrt()
    }
}

impl CandleSource for SyntheticCandles {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch_candles(
        &self,
        pair: &CurrencyPair,
        timeframe: Timeframe,
        lookback: usize,
    ) -> Result<Vec<Candle>, DataError> {
        let step = timeframe.duration();
        let end = self.end.unwrap_or_else(Utc::now);
        let end = end.duration_trunc(step).unwrap_or(end);
        let start = end - step * lookback as i32;

        let mut rng = self.rng_for(pair, timeframe);
        let vol = Self::bar_volatility(timeframe);
        let mut price = Self::start_price(pair);
        let mut bars = Vec::with_capacity(lookback);

        for i in 0..lookback {
            let ret: f64 = rng.gen_range(-vol..vol);
            let open = price;
            let close = price * (1.0 + ret);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..vol / 2.0));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..vol / 2.0));
            let volume = rng.gen_range(100.0..5_000.0);
            bars.push(Candle::new(start + step * i as i32, open, high, low, close, volume));
            price = close;
        }
        Ok(bars)
    }
}

impl PriceSource for SyntheticCandles {
    fn current_price(&self, pair: &CurrencyPair) -> Result<f64, DataError> {
        let bars = self.fetch_candles(pair, Timeframe::M15, 100)?;
        bars.last()
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
    fn deterministic_and_sane() {
        let end = Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap();
        let src = SyntheticCandles::new(7).ending_at(end);
        let pair: CurrencyPair = "GBP/USD".parse().unwrap();
        let a = src.fetch_candles(&pair, Timeframe::H1, 250).unwrap();
        let b = src.fetch_candles(&pair, Timeframe::H1, 250).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 250);
        assert!(a.iter().all(|c| c.is_sane()));
        assert!(a.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn timeframes_differ() {
        let end = Utc.with_ymd_and_hms(2024, 6, 3, 12, 0, 0).unwrap();
        let src = SyntheticCandles::new(7).ending_at(end);
        let pair: CurrencyPair = "EUR/USD".parse().unwrap();
        let h1 = src.fetch_candles(&pair, Timeframe::H1, 20).unwrap();
        let h4 = src.fetch_candles(&pair, Timeframe::H4, 20).unwrap();
        assert_ne!(h1[5].close, h4[5].close);
    }
}
