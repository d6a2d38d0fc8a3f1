//! Offline candles from CSV files laid out as `<dir>/<BASEQUOTE>_<TF>.csv`,
//! e.g. `data/GBPUSD_H1.csv`, with header
//! `timestamp,open,high,low,close,volume` and RFC 3339 timestamps.

use super::provider::{CandleSource, DataError, PriceSource};
use crate::domain::{Candle, CurrencyPair, Timeframe};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize, Deserialize)]
struct CsvRow {
    timestamp: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

#[derive(Debug, Clone)]
pub struct CsvCandleSource {
    dir: PathBuf,
}

impl CsvCandleSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, pair: &CurrencyPair, timeframe: Timeframe) -> PathBuf {
        self.dir.join(format!("{}_{}.csv", pair.compact(), timeframe))
    }

    fn read(path: &Path) -> Result<Vec<Candle>, DataError> {
        let mut reader = csv::Reader::from_path(path).map_err(|e| csv_error(path, e))?;
        reader
            .deserialize::<CsvRow>()
            .map(|row| {
                row.map(|r| Candle::new(r.timestamp, r.open, r.high, r.low, r.close, r.volume))
                    .map_err(|e| csv_error(path, e))
            })
            .collect()
    }
}

fn csv_error(path: &Path, e: csv::Error) -> DataError {
    if e.is_io_error() {
        match e.into_kind() {
            csv::ErrorKind::Io(io) => DataError::Io(io),
            other => DataError::Parse(format!("{}: {other:?}", path.display())),
        }
    } else {
        DataError::Parse(format!("{}: {e}", path.display()))
    }
}

/// Write candles in the format `CsvCandleSource` reads.
pub fn write_candles(path: &Path, candles: &[Candle]) -> Result<(), DataError> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    for c in candles {
        writer
            .serialize(CsvRow {
                timestamp: c.timestamp,
                open: c.open,
                high: c.high,
                low: c.low,
                close: c.close,
                volume: c.volume,
            })
            .map_err(|e| csv_error(path, e))?;
    }
    writer.flush()?;
    Ok(())
}

impl CandleSource for CsvCandleSource {
    fn name(&self) -> &str {
        "csv"
    }

    fn fetch_candles(
        &self,
        pair: &CurrencyPair,
        timeframe: Timeframe,
        lookback: usize,
    ) -> Result<Vec<Candle>, DataError> {
        let path = self.path_for(pair, timeframe);
        if !path.exists() {
            return Err(DataError::SymbolNotFound {
                symbol: format!("{pair} {timeframe} ({})", path.display()),
            });
        }
        let mut candles = Self::read(&path)?;
        candles.sort_by_key(|c| c.timestamp);
        let skip = candles.len().saturating_sub(lookback);
        Ok(candles.split_off(skip))
    }
}

/// Last close of the finest timeframe file present for the pair.
impl PriceSource for CsvCandleSource {
    fn current_price(&self, pair: &CurrencyPair) -> Result<f64, DataError> {
        let path = Timeframe::ALL
            .iter()
            .map(|tf| self.path_for(pair, *tf))
            .find(|p| p.exists())
            .ok_or_else(|| DataError::SymbolNotFound {
                symbol: pair.to_string(),
            })?;
        Self::read(&path)?
            .into_iter()
            .max_by_key(|c| c.timestamp)
            .map(|c| c.close)
            .ok_or_else(|| DataError::Parse(format!("{}: no rows", path.display())))
    }
}
