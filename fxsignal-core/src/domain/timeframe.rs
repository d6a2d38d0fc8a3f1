use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Chart timeframe used by the analyzers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    M15,
    M30,
    H1,
    H4,
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 5] = [
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    /// Length of one bar.
    pub fn duration(self) -> Duration {
        match self {
            Timeframe::M15 => Duration::minutes(15),
            Timeframe::M30 => Duration::minutes(30),
            Timeframe::H1 => Duration::hours(1),
            Timeframe::H4 => Duration::hours(4),
            Timeframe::D1 => Duration::days(1),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::M15 => "M15",
            Timeframe::M30 => "M30",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "M15" | "15M" => Ok(Timeframe::M15),
            "M30" | "30M" => Ok(Timeframe::M30),
            "H1" | "1H" => Ok(Timeframe::H1),
            "H4" | "4H" => Ok(Timeframe::H4),
            "D1" | "1D" => Ok(Timeframe::D1),
            other => Err(format!("unknown timeframe '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_spellings() {
        assert_eq!("h4".parse::<Timeframe>().unwrap(), Timeframe::H4);
        assert_eq!("15m".parse::<Timeframe>().unwrap(), Timeframe::M15);
        assert!("W1".parse::<Timeframe>().is_err());
    }

    #[test]
    fn durations_are_ordered() {
        for w in Timeframe::ALL.windows(2) {
            assert!(w[0].duration() < w[1].duration());
        }
    }
}
