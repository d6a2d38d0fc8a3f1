//! Bot configuration.
//!
//! One immutable [`BotConfig`] value is built at startup (from TOML or
//! defaults), validated once, and passed by reference into every component.

use crate::domain::{CurrencyPair, NewsImpact, SignalStrength, Timeframe};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub pairs: Vec<CurrencyPair>,
    pub trend: TrendConfig,
    pub liquidity: LiquidityConfig,
    pub fundamental: FundamentalConfig,
    pub signal: SignalConfig,
    pub risk: RiskConfig,
    pub trailing: TrailingConfig,
    pub data: DataConfig,
    pub monitor: MonitorConfig,
    pub telegram: TelegramConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        let pairs = [("GBP", "USD"), ("EUR", "USD"), ("USD", "JPY")]
            .iter()
            .filter_map(|(b, q)| CurrencyPair::new(b, q).ok())
            .collect();
        Self {
            pairs,
            trend: TrendConfig::default(),
            liquidity: LiquidityConfig::default(),
            fundamental: FundamentalConfig::default(),
            signal: SignalConfig::default(),
            risk: RiskConfig::default(),
            trailing: TrailingConfig::default(),
            data: DataConfig::default(),
            monitor: MonitorConfig::default(),
            telegram: TelegramConfig::default(),
        }
    }
}

/// Moving-average trend detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub fast_period: usize,
    pub slow_period: usize,
    /// Bars inspected for higher-high / lower-low flags.
    pub pattern_lookback: usize,
    /// Most recent bars excluded from the reference extreme.
    pub exclude_recent: usize,
    /// MA separation (percent of slow MA) worth +2 strength.
    pub strong_separation_pct: f64,
    /// MA separation (percent of slow MA) worth +1 strength.
    pub moderate_separation_pct: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            fast_period: 50,
            slow_period: 200,
            pattern_lookback: 10,
            exclude_recent: 3,
            strong_separation_pct: 0.5,
            moderate_separation_pct: 0.3,
        }
    }
}

/// Liquidity-zone scanning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiquidityConfig {
    /// Centered window used to find swing extrema (odd number of bars).
    pub swing_window: usize,
    /// Relative clustering tolerance for equal highs/lows (0.0015 = 0.15%).
    pub zone_tolerance: f64,
    pub min_touches: usize,
    pub stop_hunt_lookback: usize,
    /// Minimum fair-value-gap size relative to price (0.0005 = 0.05%).
    pub fvg_min_gap: f64,
    /// Distance from current price, in percent, for a zone to count as nearby.
    pub near_price_pct: f64,
    pub scan_timeframe: Timeframe,
}

impl Default for LiquidityConfig {
    fn default() -> Self {
        Self {
            swing_window: 5,
            zone_tolerance: 0.0015,
            min_touches: 2,
            stop_hunt_lookback: 20,
            fvg_min_gap: 0.0005,
            near_price_pct: 0.5,
            scan_timeframe: Timeframe::M15,
        }
    }
}

/// News-surprise scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FundamentalConfig {
    pub event_weight: f64,
    /// Minimum |score difference| for a pair to produce a signal.
    pub conviction_threshold: f64,
    /// Per-currency score is clamped to `[-score_clamp, score_clamp]`.
    pub score_clamp: f64,
    pub min_impact: NewsImpact,
}

impl Default for FundamentalConfig {
    fn default() -> Self {
        Self {
            event_weight: 3.0,
            conviction_threshold: 1.0,
            score_clamp: 10.0,
            min_impact: NewsImpact::High,
        }
    }
}

/// Gating and signal lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    pub min_fundamental_strength: SignalStrength,
    pub validity_minutes: i64,
    /// Adverse move, in percent of entry, tolerated before a pending signal is cancelled.
    pub reaction_tolerance_pct: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            min_fundamental_strength: SignalStrength::Weak,
            validity_minutes: 240,
            reaction_tolerance_pct: 0.1,
        }
    }
}

/// Position sizing and exit ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub account_balance: f64,
    pub risk_percentage: f64,
    pub leverage: f64,
    pub min_risk_reward: f64,
    /// Percent of the position closed at TP1, TP2, TP3.
    pub position_splits: [f64; 3],
    pub fallback_stop_pct: f64,
    pub stop_buffer_pips: f64,
    pub tight_stop_warn_pct: f64,
    pub wide_stop_warn_pct: f64,
    pub min_lot: f64,
    pub max_lot: f64,
    pub max_risk_pct_of_balance: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            account_balance: 10_000.0,
            risk_percentage: 1.0,
            leverage: 30.0,
            min_risk_reward: 3.0,
            position_splits: [33.0, 33.0, 34.0],
            fallback_stop_pct: 1.5,
            stop_buffer_pips: 5.0,
            tight_stop_warn_pct: 0.2,
            wide_stop_warn_pct: 5.0,
            min_lot: 0.01,
            max_lot: 100.0,
            max_risk_pct_of_balance: 5.0,
        }
    }
}

/// Trailing-stop phases, in R-multiples of the initial stop distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrailingConfig {
    pub breakeven_r: f64,
    pub lock_r: f64,
    pub trail_r: f64,
    /// Fixed trail distance in percent of price, used when no MA is available.
    pub trail_pct: f64,
    pub ma_period: usize,
    pub ma_offset_pips: f64,
}

impl Default for TrailingConfig {
    fn default() -> Self {
        Self {
            breakeven_r: 0.9,
            lock_r: 1.5,
            trail_r: 2.5,
            trail_pct: 0.5,
            ma_period: 20,
            ma_offset_pips: 10.0,
        }
    }
}

/// Minimum bar count required per timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinBars {
    pub m15: usize,
    pub m30: usize,
    pub h1: usize,
    pub h4: usize,
    pub d1: usize,
}

impl Default for MinBars {
    fn default() -> Self {
        Self {
            m15: 100,
            m30: 100,
            h1: 200,
            h4: 200,
            d1: 100,
        }
    }
}

impl MinBars {
    pub fn get(&self, timeframe: Timeframe) -> usize {
        match timeframe {
            Timeframe::M15 => self.m15,
            Timeframe::M30 => self.m30,
            Timeframe::H1 => self.h1,
            Timeframe::H4 => self.h4,
            Timeframe::D1 => self.d1,
        }
    }
}

/// Upstream data access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub min_bars: MinBars,
    /// Bars requested per fetch.
    pub lookback_bars: usize,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub breaker_cooldown_secs: u64,
    /// JSON economic-calendar feed.
    pub calendar_url: Option<String>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            min_bars: MinBars::default(),
            lookback_bars: 300,
            request_timeout_secs: 30,
            max_retries: 3,
            base_backoff_ms: 500,
            max_backoff_ms: 8_000,
            breaker_cooldown_secs: 30 * 60,
            calendar_url: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub enabled: bool,
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: None,
            chat_id: None,
            api_base: "https://api.telegram.org".to_string(),
        }
    }
}

impl BotConfig {
    /// Load from a TOML file. Does not validate.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load and validate in one step.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every cross-field constraint. All problems are reported together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.pairs.is_empty() {
            problems.push("at least one pair must be configured".to_string());
        }

        let t = &self.trend;
        if t.fast_period == 0 || t.slow_period == 0 {
            problems.push("moving-average periods must be positive".to_string());
        } else if t.fast_period >= t.slow_period {
            problems.push(format!(
                "fast period ({}) must be below slow period ({})",
                t.fast_period, t.slow_period
            ));
        }
        if t.pattern_lookback <= t.exclude_recent {
            problems.push(format!(
                "pattern lookback ({}) must exceed excluded recent bars ({})",
                t.pattern_lookback, t.exclude_recent
            ));
        }

        let l = &self.liquidity;
        if l.swing_window < 3 {
            problems.push("swing window must be at least 3 bars".to_string());
        }
        if !(l.zone_tolerance > 0.0 && l.zone_tolerance < 0.05) {
            problems.push(format!("zone tolerance {} out of range (0, 0.05)", l.zone_tolerance));
        }
        if l.min_touches < 2 {
            problems.push("min touches must be at least 2".to_string());
        }
        if l.stop_hunt_lookback == 0 {
            problems.push("stop-hunt lookback must be positive".to_string());
        }
        if l.fvg_min_gap < 0.0 {
            problems.push("FVG minimum gap must not be negative".to_string());
        }
        if l.near_price_pct <= 0.0 {
            problems.push("near-price percentage must be positive".to_string());
        }

        let f = &self.fundamental;
        if f.event_weight <= 0.0 || f.score_clamp <= 0.0 {
            problems.push("event weight and score clamp must be positive".to_string());
        }

        if self.signal.validity_minutes <= 0 {
            problems.push("signal validity must be positive".to_string());
        }

        let r = &self.risk;
        if r.account_balance <= 0.0 {
            problems.push("account balance must be positive".to_string());
        }
        if !(r.risk_percentage > 0.0 && r.risk_percentage <= 5.0) {
            problems.push(format!("risk percentage {} must be in (0, 5]", r.risk_percentage));
        }
        if r.leverage < 1.0 {
            problems.push(format!("leverage {} must be at least 1", r.leverage));
        }
        if r.min_risk_reward < 1.0 {
            problems.push(format!("minimum reward/risk {} must be at least 1", r.min_risk_reward));
        }
        let split_sum: f64 = r.position_splits.iter().sum();
        if (split_sum - 100.0).abs() > 1e-6 || r.position_splits.iter().any(|s| *s < 0.0) {
            problems.push(format!("position splits must sum to 100 (got {split_sum})"));
        }
        if r.fallback_stop_pct <= 0.0 {
            problems.push("fallback stop percentage must be positive".to_string());
        }
        if r.min_lot <= 0.0 || r.max_lot < r.min_lot {
            problems.push("lot bounds must satisfy 0 < min_lot <= max_lot".to_string());
        }

        let tr = &self.trailing;
        if !(tr.breakeven_r > 0.0 && tr.breakeven_r < tr.lock_r && tr.lock_r < tr.trail_r) {
            problems.push("trailing thresholds must satisfy 0 < breakeven < lock < trail".to_string());
        }
        if tr.trail_pct <= 0.0 || tr.ma_period == 0 {
            problems.push("trail percentage and MA period must be positive".to_string());
        }

        for tf in [Timeframe::H1, Timeframe::H4] {
            if self.data.min_bars.get(tf) < t.slow_period {
                problems.push(format!(
                    "min bars for {tf} ({}) is below the slow MA period ({})",
                    self.data.min_bars.get(tf),
                    t.slow_period
                ));
            }
        }
        let max_min_bars = Timeframe::ALL
            .iter()
            .map(|tf| self.data.min_bars.get(*tf))
            .max()
            .unwrap_or(0);
        if self.data.lookback_bars < max_min_bars {
            problems.push(format!(
                "lookback bars ({}) is below the largest min-bar requirement ({max_min_bars})",
                self.data.lookback_bars
            ));
        }
        if self.data.request_timeout_secs == 0 {
            problems.push("request timeout must be positive".to_string());
        }
        if self.monitor.interval_secs == 0 {
            problems.push("monitor interval must be positive".to_string());
        }

        let tg = &self.telegram;
        if tg.enabled {
            let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
            if blank(&tg.bot_token) || blank(&tg.chat_id) {
                problems.push("telegram enabled but bot_token or chat_id missing".to_string());
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems.join("; ")))
        }
    }
}
