//! Scheduled economic news items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ordinal impact rating attached to a calendar entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NewsImpact {
    None,
    Low,
    Medium,
    High,
}

impl fmt::Display for NewsImpact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NewsImpact::None => "none",
            NewsImpact::Low => "low",
            NewsImpact::Medium => "medium",
            NewsImpact::High => "high",
        };
        f.write_str(s)
    }
}

impl FromStr for NewsImpact {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "holiday" | "" => Ok(NewsImpact::None),
            "low" => Ok(NewsImpact::Low),
            "medium" | "med" => Ok(NewsImpact::Medium),
            "high" => Ok(NewsImpact::High),
            other => Err(format!("unknown impact '{other}'")),
        }
    }
}

/// One dated economic release. Values are kept as the raw text the feed
/// publishes (`"2.5%"`, `"-1.2K"`, `"1,234"`) and parsed at scoring time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomicEvent {
    pub date: DateTime<Utc>,
    pub currency: String,
    pub impact: NewsImpact,
    pub event_name: String,
    #[serde(default)]
    pub actual: Option<String>,
    #[serde(default)]
    pub forecast: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
}

impl EconomicEvent {
    pub fn new(
        date: DateTime<Utc>,
        currency: &str,
        impact: NewsImpact,
        event_name: &str,
    ) -> Self {
        Self {
            date,
            currency: currency.trim().to_ascii_uppercase(),
            impact,
            event_name: event_name.to_string(),
            actual: None,
            forecast: None,
            previous: None,
        }
    }

    pub fn with_values(mut self, actual: Option<&str>, forecast: Option<&str>) -> Self {
        self.actual = actual.map(str::to_string);
        self.forecast = forecast.map(str::to_string);
        self
    }

    pub fn with_previous(mut self, previous: &str) -> Self {
        self.previous = Some(previous.to_string());
        self
    }

    /// Both actual and forecast are present and non-blank.
    pub fn has_outcome(&self) -> bool {
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        filled(&self.actual) && filled(&self.forecast)
    }
}
