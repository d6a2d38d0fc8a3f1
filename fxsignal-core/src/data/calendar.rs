//! Economic calendar over a weekly JSON feed.
//!
//! Entries look like
//! `{"title":"CPI m/m","country":"USD","date":"2024-03-12T08:30:00-04:00",
//!   "impact":"High","forecast":"0.4%","previous":"0.3%","actual":"0.4%"}`.
//! Empty strings are treated as absent values.

use super::circuit_breaker::CircuitBreaker;
use super::provider::{DataError, EventSource};
use super::retry::RetryPolicy;
use crate::config::DataConfig;
use crate::domain::{EconomicEvent, NewsImpact};
use chrono::{DateTime, FixedOffset, Utc};
use serde::Deserialize;
use std::sync::Arc;

pub const DEFAULT_CALENDAR_URL: &str = "https://nfs.faireconomy.media/ff_calendar_thisweek.json";

#[derive(Debug, Deserialize)]
struct FeedEntry {
    title: String,
    country: String,
    date: DateTime<FixedOffset>,
    #[serde(default)]
    impact: String,
    #[serde(default)]
    forecast: Option<String>,
    #[serde(default)]
    previous: Option<String>,
    #[serde(default)]
    actual: Option<String>,
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

/// Parse a feed body into events. Entries with an unknown impact label are
/// kept as `NewsImpact::None`.
pub fn parse_feed(body: &str) -> Result<Vec<EconomicEvent>, DataError> {
    let entries: Vec<FeedEntry> = serde_json::from_str(body)
        .map_err(|e| DataError::ResponseFormatChanged(format!("calendar feed: {e}")))?;
    Ok(entries
        .into_iter()
        .map(|e| {
            let impact = e.impact.parse().unwrap_or_else(|_| {
                tracing::debug!(impact = %e.impact, title = %e.title, "unknown impact label");
                NewsImpact::None
            });
            EconomicEvent {
                date: e.date.with_timezone(&Utc),
                currency: e.country.trim().to_ascii_uppercase(),
                impact,
                event_name: e.title,
                actual: non_blank(e.actual),
                forecast: non_blank(e.forecast),
                previous: non_blank(e.previous),
            }
        })
        .collect())
}

pub struct CalendarFeed {
    client: reqwest::blocking::Client,
    url: String,
    retry: RetryPolicy,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl CalendarFeed {
    pub fn new(cfg: &DataConfig, circuit_breaker: Arc<CircuitBreaker>) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: cfg
                .calendar_url
                .clone()
                .unwrap_or_else(|| DEFAULT_CALENDAR_URL.to_string()),
            retry: RetryPolicy::from_config(cfg),
            circuit_breaker,
        })
    }

    fn fetch_body(&self) -> Result<String, DataError> {
        self.retry.run("calendar", |_| {
            if !self.circuit_breaker.is_allowed() {
                return Err(DataError::CircuitBreakerTripped {
                    remaining_secs: self.circuit_breaker.remaining_cooldown().as_secs(),
                });
            }
            let resp = self.client.get(&self.url).send()?;
            let status = resp.status();
            if status == reqwest::StatusCode::FORBIDDEN {
                self.circuit_breaker.trip();
            }
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                self.circuit_breaker.record_failure();
                return Err(DataError::RateLimited { retry_after_secs: 60 });
            }
            if !status.is_success() {
                return Err(DataError::HttpStatus {
                    status: status.as_u16(),
                    source_name: "calendar".into(),
                });
            }
            let body = resp.text()?;
            self.circuit_breaker.record_success();
            Ok(body)
        })
    }
}

impl EventSource for CalendarFeed {
    fn name(&self) -> &str {
        "calendar_feed"
    }

    fn fetch_events(
        &self,
        currencies: &[&str],
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        min_impact: NewsImpact,
    ) -> Result<Vec<EconomicEvent>, DataError> {
        let all = parse_feed(&self.fetch_body()?)?;
        let events: Vec<EconomicEvent> = all
            .into_iter()
            .filter(|e| currencies.contains(&e.currency.as_str()))
            .filter(|e| e.date >= start && e.date < end && e.impact >= min_impact)
            .collect();
        tracing::info!(count = events.len(), min_impact = %min_impact, "fetched calendar events");
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_feed_entries() {
        let body = r#"[
            {"title":"CPI m/m","country":"USD","date":"2024-03-12T08:30:00-04:00","impact":"High","forecast":"0.4%","previous":"0.3%","actual":"0.4%"},
            {"title":"Bank Holiday","country":"GBP","date":"2024-03-29T03:00:00-04:00","impact":"Holiday","forecast":"","previous":""},
            {"title":"Odd","country":"eur","date":"2024-03-12T10:00:00+00:00","impact":"Weird"}
        ]"#;
        let events = parse_feed(body).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].impact, NewsImpact::High);
        assert_eq!(events[0].date.to_rfc3339(), "2024-03-12T12:30:00+00:00");
        assert!(events[0].has_outcome());
        assert_eq!(events[1].impact, NewsImpact::None);
        assert_eq!(events[1].forecast, None);
        assert_eq!(events[2].currency, "EUR");
        assert_eq!(events[2].impact, NewsImpact::None);
    }

    #[test]
    fn rejects_non_array_payload() {
        assert!(matches!(
            parse_feed(r#"{"error":"x"}"#),
            Err(DataError::ResponseFormatChanged(_))
        ));
    }
}
