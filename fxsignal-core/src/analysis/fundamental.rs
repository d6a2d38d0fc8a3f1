//! News-surprise scoring.
//!
//! Each currency of a pair accumulates `surprise * event_weight` over its
//! scheduled releases, where surprise is `actual - forecast` with the sign
//! flipped for releases where a lower print is good for the currency. The
//! pair's reading is the difference of the two clamped scores.

use crate::config::FundamentalConfig;
use crate::data::{DataError, EventSource};
use crate::domain::{CurrencyPair, EconomicEvent, SignalStrength};
use chrono::{DateTime, Duration, DurationRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Reading of a pair's news flow.
///
/// The USD variants apply to pairs quoted in USD. The counterparty variants
/// apply to every other pair and describe the base currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundamentalDirection {
    UsdStronger,
    UsdWeaker,
    CounterpartyStronger,
    CounterpartyWeaker,
}

impl FundamentalDirection {
    /// Whether the reading points to the pair price rising.
    pub fn expects_rise(self) -> bool {
        matches!(
            self,
            FundamentalDirection::UsdWeaker | FundamentalDirection::CounterpartyStronger
        )
    }
}

impl fmt::Display for FundamentalDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FundamentalDirection::UsdStronger => "USD stronger",
            FundamentalDirection::UsdWeaker => "USD weaker",
            FundamentalDirection::CounterpartyStronger => "counterparty stronger",
            FundamentalDirection::CounterpartyWeaker => "counterparty weaker",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundamentalSignal {
    pub pair: CurrencyPair,
    pub direction: FundamentalDirection,
    pub strength: SignalStrength,
    /// Events that produced a surprise score.
    pub events: Vec<EconomicEvent>,
    pub base_score: f64,
    pub quote_score: f64,
    pub generated_at: DateTime<Utc>,
    pub rationale: String,
}

impl FundamentalSignal {
    pub fn score_diff(&self) -> f64 {
        self.base_score - self.quote_score
    }
}

/// Parse calendar text such as `"2.5%"`, `"-1.2K"`, `"1,234"` or `"<0.1%"`.
pub fn parse_value(text: &str) -> Option<f64> {
    let cleaned: String = text
        .trim()
        .trim_start_matches(['<', '>', '~'])
        .chars()
        .filter(|c| *c != ',' && *c != '%' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    let (number, multiplier) = match cleaned.chars().last()?.to_ascii_uppercase() {
        'K' => (&cleaned[..cleaned.len() - 1], 1e3),
        'M' => (&cleaned[..cleaned.len() - 1], 1e6),
        'B' => (&cleaned[..cleaned.len() - 1], 1e9),
        'T' => (&cleaned[..cleaned.len() - 1], 1e12),
        _ => (cleaned.as_str(), 1.0),
    };
    number
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v * multiplier)
}

const LOWER_IS_BETTER: &[&str] = &[
    "UNEMPLOYMENT",
    "JOBLESS",
    "CLAIMS",
    "DEFICIT",
    "CPI",
    "PPI",
    "INFLATION",
];

/// Releases where a print below forecast is good for the currency.
///
/// Checked before anything else: "UNEMPLOYMENT" contains "EMPLOYMENT".
pub fn lower_is_better(event_name: &str) -> bool {
    let upper = event_name.to_ascii_uppercase();
    LOWER_IS_BETTER.iter().any(|k| upper.contains(k))
}

pub struct FundamentalAnalyzer<'a> {
    config: &'a FundamentalConfig,
}

impl<'a> FundamentalAnalyzer<'a> {
    pub fn new(config: &'a FundamentalConfig) -> Self {
        Self { config }
    }

    /// Weighted surprise of one event, or `None` when it cannot be scored.
    pub fn event_score(&self, event: &EconomicEvent) -> Option<f64> {
        if !event.has_outcome() {
            return None;
        }
        let actual_text = event.actual.as_deref()?;
        let forecast_text = event.forecast.as_deref()?;
        let (Some(actual), Some(forecast)) = (parse_value(actual_text), parse_value(forecast_text))
        else {
            tracing::warn!(
                event = %event.event_name,
                actual = actual_text,
                forecast = forecast_text,
                "unparseable event values, skipping"
            );
            return None;
        };
        let surprise = actual - forecast;
        let signed = if lower_is_better(&event.event_name) {
            -surprise
        } else {
            surprise
        };
        Some(signed * self.config.event_weight)
    }

    /// Clamped score of `currency` and the events that contributed to it.
    pub fn currency_score<'e>(
        &self,
        currency: &str,
        events: &'e [EconomicEvent],
    ) -> (f64, Vec<&'e EconomicEvent>) {
        let mut score = 0.0;
        let mut used = Vec::new();
        for event in events.iter().filter(|e| e.currency == currency) {
            if let Some(s) = self.event_score(event) {
                tracing::debug!(event = %event.event_name, currency, contribution = s, "scored event");
                score += s;
                used.push(event);
            }
        }
        let clamp = self.config.score_clamp;
        (score.clamp(-clamp, clamp), used)
    }

    /// Strength from the score gap, scaled by how many events back it.
    pub fn strength(score_diff: f64, event_count: usize) -> SignalStrength {
        let multiplier = (event_count as f64 / 3.0).min(1.5);
        SignalStrength::from_bands(score_diff.abs() * multiplier, [8.0, 5.0, 3.0, 1.5])
    }

    pub fn analyze(&self, pair: &CurrencyPair, events: &[EconomicEvent]) -> Option<FundamentalSignal> {
        self.analyze_at(pair, events, Utc::now())
    }

    pub fn analyze_at(
        &self,
        pair: &CurrencyPair,
        events: &[EconomicEvent],
        now: DateTime<Utc>,
    ) -> Option<FundamentalSignal> {
        let (base_score, base_events) = self.currency_score(pair.base(), events);
        let (quote_score, quote_events) = self.currency_score(pair.quote(), events);
        let diff = base_score - quote_score;
        tracing::debug!(pair = %pair, base_score, quote_score, diff, "fundamental scores");

        if diff.abs() < self.config.conviction_threshold {
            return None;
        }

        let quoted_in_usd = pair.quote() == "USD";
        let direction = match (diff > 0.0, quoted_in_usd) {
            (true, true) => FundamentalDirection::UsdWeaker,
            (true, false) => FundamentalDirection::CounterpartyStronger,
            (false, true) => FundamentalDirection::UsdStronger,
            (false, false) => FundamentalDirection::CounterpartyWeaker,
        };

        let mut contributing: Vec<EconomicEvent> =
            base_events.into_iter().chain(quote_events).cloned().collect();
        contributing.sort_by_key(|e| e.date);
        let strength = Self::strength(diff, contributing.len());
        let rationale = rationale(pair, direction, &contributing);

        Some(FundamentalSignal {
            pair: pair.clone(),
            direction,
            strength,
            events: contributing,
            base_score,
            quote_score,
            generated_at: now,
            rationale,
        })
    }

    /// The UTC day containing `now`, as `[start, end)`.
    pub fn today_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = now.duration_trunc(Duration::days(1)).unwrap_or(now);
        (start, start + Duration::days(1))
    }

    /// Today's events for every pair's currencies, fetched in one request.
    pub fn fetch_today(
        &self,
        pairs: &[CurrencyPair],
        source: &dyn EventSource,
        now: DateTime<Utc>,
    ) -> Result<Vec<EconomicEvent>, DataError> {
        let (start, end) = Self::today_window(now);
        let mut currencies: Vec<&str> = pairs.iter().flat_map(|p| p.currencies()).collect();
        currencies.sort_unstable();
        currencies.dedup();
        source.fetch_events(&currencies, start, end, self.config.min_impact)
    }

    /// Fetch today's events (UTC day containing `now`) for every pair's
    /// currencies in one request and score each pair.
    pub fn analyze_today(
        &self,
        pairs: &[CurrencyPair],
        source: &dyn EventSource,
        now: DateTime<Utc>,
    ) -> Result<BTreeMap<CurrencyPair, FundamentalSignal>, DataError> {
        let events = self.fetch_today(pairs, source, now)?;
        tracing::info!(source = source.name(), events = events.len(), "running fundamental analysis for today");

        let mut out = BTreeMap::new();
        for pair in pairs {
            let relevant: Vec<EconomicEvent> = events
                .iter()
                .filter(|e| pair.involves(&e.currency))
                .cloned()
                .collect();
            if relevant.is_empty() {
                tracing::info!(pair = %pair, "no relevant news today");
                continue;
            }
            if let Some(signal) = self.analyze_at(pair, &relevant, now) {
                tracing::info!(pair = %pair, direction = %signal.direction, strength = %signal.strength, "fundamental signal");
                out.insert(pair.clone(), signal);
            }
        }
        Ok(out)
    }
}

fn rationale(pair: &CurrencyPair, direction: FundamentalDirection, events: &[EconomicEvent]) -> String {
    let names: Vec<&str> = events.iter().take(3).map(|e| e.event_name.as_str()).collect();
    let names = names.join(", ");
    match direction {
        FundamentalDirection::UsdStronger => {
            format!("USD strengthening due to {names}. Expect {pair} to move down.")
        }
        FundamentalDirection::UsdWeaker => {
            format!("USD weakening due to {names}. Expect {pair} to move up.")
        }
        FundamentalDirection::CounterpartyStronger => format!(
            "{} strengthening due to {names}. Expect {pair} to move up.",
            pair.base()
        ),
        FundamentalDirection::CounterpartyWeaker => format!(
            "{} weakening due to {names}. Expect {pair} to move down.",
            pair.base()
        ),
    }
}
