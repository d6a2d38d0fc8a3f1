//! Candle normalization and resampling.

use crate::domain::{Candle, Timeframe};
use chrono::{DateTime, Datelike, Duration, DurationRound, Utc, Weekday};

/// What `normalize` had to fix.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub kept: usize,
    pub duplicates: usize,
    pub invalid: usize,
    /// Number of gaps wider than twice the bar duration, not counting the
    /// weekend closure.
    pub gaps: usize,
}

fn spans_weekend(from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
    let first = from.date_naive();
    let days = (to.date_naive() - first).num_days().clamp(0, 7);
    (0..=days).any(|i| (first + Duration::days(i)).weekday() == Weekday::Sat)
}

/// Sort by timestamp, drop duplicate timestamps (first wins) and insane bars.
/// Gaps are tolerated but counted and logged.
pub fn normalize(
    mut candles: Vec<Candle>,
    timeframe: Timeframe,
    context: &str,
) -> (Vec<Candle>, IngestReport) {
    let mut report = IngestReport::default();
    candles.sort_by_key(|c| c.timestamp);

    let mut out: Vec<Candle> = Vec::with_capacity(candles.len());
    for candle in candles {
        if let Err(e) = candle.check() {
            tracing::warn!(context, error = %e, "dropping invalid candle");
            report.invalid += 1;
            continue;
        }
        if out.last().is_some_and(|prev| prev.timestamp == candle.timestamp) {
            report.duplicates += 1;
            continue;
        }
        out.push(candle);
    }

    let max_step = timeframe.duration() * 2;
    for w in out.windows(2) {
        let step = w[1].timestamp - w[0].timestamp;
        let allowance = if spans_weekend(w[0].timestamp, w[1].timestamp) {
            // Forex is shut from Friday evening to Sunday evening.
            Duration::days(2)
        } else {
            Duration::zero()
        };
        if step > max_step + allowance {
            report.gaps += 1;
            tracing::debug!(context, from = %w[0].timestamp, to = %w[1].timestamp, "gap in candle series");
        }
    }
    if report.duplicates > 0 || report.gaps > 0 {
        tracing::warn!(
            context,
            duplicates = report.duplicates,
            gaps = report.gaps,
            "candle series had duplicates or gaps"
        );
    }

    report.kept = out.len();
    (out, report)
}

fn bucket_start(ts: DateTime<Utc>, timeframe: Timeframe) -> DateTime<Utc> {
    ts.duration_trunc(timeframe.duration()).unwrap_or(ts)
}

/// Aggregate an ordered series into a coarser timeframe. Buckets are aligned
/// to UTC multiples of the target duration; a trailing partial bucket is kept.
pub fn resample(candles: &[Candle], target: Timeframe) -> Vec<Candle> {
    let mut out: Vec<Candle> = Vec::new();
    let mut current_bucket: Option<DateTime<Utc>> = None;

    for c in candles {
        let bucket = bucket_start(c.timestamp, target);
        match (current_bucket, out.last_mut()) {
            (Some(b), Some(agg)) if b == bucket => {
                agg.high = agg.high.max(c.high);
                agg.low = agg.low.min(c.low);
                agg.close = c.close;
                agg.volume += c.volume;
            }
            _ => {
                out.push(Candle::new(bucket, c.open, c.high, c.low, c.close, c.volume));
                current_bucket = Some(bucket);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, h, m, 0).unwrap()
    }

    #[test]
    fn normalize_sorts_and_dedupes() {
        let raw = vec![
            Candle::new(at(2, 0), 1.0, 1.1, 0.9, 1.0, 1.0),
            Candle::new(at(1, 0), 1.0, 1.1, 0.9, 1.0, 1.0),
            Candle::new(at(1, 0), 2.0, 2.1, 1.9, 2.0, 1.0),
            Candle::new(at(3, 0), 1.0, 0.8, 0.9, 1.0, 1.0),
        ];
        let (out, report) = normalize(raw, Timeframe::H1, "test");
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].timestamp, at(1, 0));
        assert_eq!(out[0].open, 1.0);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.invalid, 1);
    }

    #[test]
    fn normalize_counts_gaps() {
        let raw = vec![
            Candle::new(at(1, 0), 1.0, 1.1, 0.9, 1.0, 1.0),
            Candle::new(at(2, 0), 1.0, 1.1, 0.9, 1.0, 1.0),
            Candle::new(at(8, 0), 1.0, 1.1, 0.9, 1.0, 1.0),
        ];
        let (_, report) = normalize(raw, Timeframe::H1, "test");
        assert_eq!(report.gaps, 1);
    }

    #[test]
    fn daily_gaps_are_counted_but_weekends_are_not() {
        let day = |d: u32| Utc.with_ymd_and_hms(2024, 5, d, 0, 0, 0).unwrap();
        // Fri 3rd, Mon 6th, Tue 7th, then Wed and Thu missing.
        let raw: Vec<Candle> = [3, 6, 7, 10]
            .into_iter()
            .map(|d| Candle::new(day(d), 1.0, 1.1, 0.9, 1.0, 1.0))
            .collect();
        let (_, report) = normalize(raw, Timeframe::D1, "test");
        assert_eq!(report.gaps, 1);

        // Friday close to Sunday open on hourly bars.
        let fri = Utc.with_ymd_and_hms(2024, 5, 3, 21, 0, 0).unwrap();
        let sun = Utc.with_ymd_and_hms(2024, 5, 5, 22, 0, 0).unwrap();
        let raw = vec![
            Candle::new(fri, 1.0, 1.1, 0.9, 1.0, 1.0),
            Candle::new(sun, 1.0, 1.1, 0.9, 1.0, 1.0),
        ];
        let (_, report) = normalize(raw, Timeframe::H1, "test");
        assert_eq!(report.gaps, 0);
    }

    #[test]
    fn resample_hourly_into_h4() {
        let hourly: Vec<Candle> = (0..8)
            .map(|h| {
                let base = 1.0 + h as f64 * 0.01;
                Candle::new(at(h, 0), base, base + 0.005, base - 0.005, base + 0.002, 10.0)
            })
            .collect();
        let h4 = resample(&hourly, Timeframe::H4);
        assert_eq!(h4.len(), 2);
        assert_eq!(h4[0].timestamp, at(0, 0));
        assert_eq!(h4[1].timestamp, at(4, 0));
        assert!((h4[0].open - 1.0).abs() < 1e-12);
        assert!((h4[0].close - 1.032).abs() < 1e-12);
        assert!((h4[0].high - 1.035).abs() < 1e-12);
        assert!((h4[0].low - 0.995).abs() < 1e-12);
        assert_eq!(h4[0].volume, 40.0);
    }
}
