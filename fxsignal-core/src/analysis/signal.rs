//! Signal composition: five sequential gates over the three analyzers.
//!
//! A failed gate is the common, expected outcome and is reported as
//! [`SignalDecision::NoSignal`] with the reason. Errors are reserved for
//! data and upstream failures.

use super::fundamental::{FundamentalAnalyzer, FundamentalDirection, FundamentalSignal};
use super::liquidity::{zones_near_price, LiquidityZone, LiquidityZoneDetector};
use super::trend::{TrendAnalysis, TrendDetector};
use super::AnalysisError;
use crate::config::BotConfig;
use crate::data::{CandleSource, EventSource, PriceSource};
use crate::domain::{CurrencyPair, SignalStrength, TradeDirection, TrendDirection};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    Pending,
    Confirmed,
    Active,
    Completed,
    Cancelled,
    Expired,
}

impl SignalStatus {
    pub fn can_transition_to(self, next: SignalStatus) -> bool {
        use SignalStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed | Cancelled | Expired)
                | (Confirmed, Active | Cancelled | Expired)
                | (Active, Completed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SignalStatus::Completed | SignalStatus::Cancelled | SignalStatus::Expired
        )
    }
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalStatus::Pending => "pending",
            SignalStatus::Confirmed => "confirmed",
            SignalStatus::Active => "active",
            SignalStatus::Completed => "completed",
            SignalStatus::Cancelled => "cancelled",
            SignalStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// A gated trade recommendation. Exit levels stay `None` until enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingSignal {
    pub id: String,
    pub pair: CurrencyPair,
    pub direction: TradeDirection,
    pub status: SignalStatus,
    pub strength: SignalStrength,
    pub fundamental: FundamentalSignal,
    pub trend_h4: TrendAnalysis,
    pub trend_h1: TrendAnalysis,
    /// Zones near price at generation time, nearest first.
    pub liquidity_zones: Vec<LiquidityZone>,
    pub entry_price: f64,
    pub entry_zone: Option<LiquidityZone>,
    pub stop_loss: Option<f64>,
    pub take_profit_1: Option<f64>,
    pub take_profit_2: Option<f64>,
    pub take_profit_3: Option<f64>,
    pub risk_reward: Option<f64>,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TradingSignal {
    /// Content hash of the fields that identify a setup.
    pub fn compute_id(
        pair: &CurrencyPair,
        direction: TradeDirection,
        entry_price: f64,
        generated_at: DateTime<Utc>,
    ) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(pair.compact().as_bytes());
        hasher.update(direction.to_string().as_bytes());
        hasher.update(&entry_price.to_le_bytes());
        hasher.update(&generated_at.timestamp_millis().to_le_bytes());
        hasher.finalize().to_hex()[..16].to_string()
    }

    pub fn transition(&mut self, next: SignalStatus) -> Result<(), AnalysisError> {
        if !self.status.can_transition_to(next) {
            return Err(AnalysisError::InvalidSignalTransition {
                from: self.status,
                to: next,
            });
        }
        tracing::info!(signal = %self.id, pair = %self.pair, from = %self.status, to = %next, "signal status changed");
        self.status = next;
        Ok(())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_enriched(&self) -> bool {
        self.stop_loss.is_some() && self.take_profit_3.is_some()
    }
}

/// Why a pair produced no signal this cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "gate", rename_all = "snake_case")]
pub enum GateRejection {
    NoFundamentalSignal,
    FundamentalTooWeak {
        strength: SignalStrength,
        required: SignalStrength,
    },
    H4Sideways,
    TimeframesDisagree {
        h4: TrendDirection,
        h1: TrendDirection,
    },
    NotAligned {
        fundamental: FundamentalDirection,
        trend: TrendDirection,
    },
    NoZones,
    NoZonesNearPrice {
        price: f64,
        zones: usize,
    },
}

impl fmt::Display for GateRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateRejection::NoFundamentalSignal => write!(f, "no fundamental signal"),
            GateRejection::FundamentalTooWeak { strength, required } => {
                write!(f, "fundamental signal too weak ({strength} < {required})")
            }
            GateRejection::H4Sideways => write!(f, "H4 trend is sideways"),
            GateRejection::TimeframesDisagree { h4, h1 } => {
                write!(f, "H1 ({h1}) does not confirm H4 ({h4})")
            }
            GateRejection::NotAligned { fundamental, trend } => {
                write!(f, "fundamental ({fundamental}) not aligned with {trend} trend")
            }
            GateRejection::NoZones => write!(f, "no liquidity zones found"),
            GateRejection::NoZonesNearPrice { price, zones } => {
                write!(f, "none of {zones} liquidity zones near price {price}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignalDecision {
    Signal(Box<TradingSignal>),
    NoSignal(GateRejection),
}

impl SignalDecision {
    pub fn into_signal(self) -> Option<TradingSignal> {
        match self {
            SignalDecision::Signal(s) => Some(*s),
            SignalDecision::NoSignal(_) => None,
        }
    }
}

/// Bullish trends pair with readings that expect the pair to rise, bearish with the opposite.
pub fn is_aligned(fundamental: FundamentalDirection, trend: TrendDirection) -> bool {
    match trend {
        TrendDirection::Bullish => fundamental.expects_rise(),
        TrendDirection::Bearish => !fundamental.expects_rise(),
        TrendDirection::Sideways => false,
    }
}

/// Nearest zone matching the trade side, else the nearest zone.
pub fn select_entry_zone(nearby: &[LiquidityZone], direction: TradeDirection) -> Option<LiquidityZone> {
    nearby
        .iter()
        .find(|z| z.zone_type.supports(direction))
        .or_else(|| nearby.first())
        .cloned()
}

/// Blend of the three readings plus a bonus for zone confluence.
pub fn composite_strength(
    fundamental: SignalStrength,
    h4: SignalStrength,
    h1: SignalStrength,
    nearby_zones: usize,
) -> SignalStrength {
    let bonus = match nearby_zones {
        n if n >= 3 => 2.0,
        2 => 1.0,
        _ => 0.0,
    };
    let score = (fundamental.value() as f64 + h4.value() as f64 + 0.5 * h1.value() as f64 + bonus) / 3.0;
    SignalStrength::from_bands(score, [4.5, 3.5, 2.5, 1.5])
}

pub struct SignalGenerator<'a> {
    config: &'a BotConfig,
    events: &'a dyn EventSource,
    candles: &'a dyn CandleSource,
    prices: &'a dyn PriceSource,
}

impl<'a> SignalGenerator<'a> {
    pub fn new(
        config: &'a BotConfig,
        events: &'a dyn EventSource,
        candles: &'a dyn CandleSource,
        prices: &'a dyn PriceSource,
    ) -> Self {
        Self {
            config,
            events,
            candles,
            prices,
        }
    }

    pub fn generate(&self, pair: &CurrencyPair) -> Result<Option<TradingSignal>, AnalysisError> {
        Ok(self.evaluate_at(pair, Utc::now())?.into_signal())
    }

    pub fn evaluate(&self, pair: &CurrencyPair) -> Result<SignalDecision, AnalysisError> {
        self.evaluate_at(pair, Utc::now())
    }

    pub fn evaluate_at(&self, pair: &CurrencyPair, now: DateTime<Utc>) -> Result<SignalDecision, AnalysisError> {
        let reject = |reason: GateRejection| {
            tracing::debug!(pair = %pair, reason = %reason, "no signal");
            Ok(SignalDecision::NoSignal(reason))
        };

        // Gate 1: fundamental
        let analyzer = FundamentalAnalyzer::new(&self.config.fundamental);
        let Some(fundamental) = analyzer
            .analyze_today(std::slice::from_ref(pair), self.events, now)?
            .remove(pair)
        else {
            return reject(GateRejection::NoFundamentalSignal);
        };
        let required = self.config.signal.min_fundamental_strength;
        if fundamental.strength < required {
            return reject(GateRejection::FundamentalTooWeak {
                strength: fundamental.strength,
                required,
            });
        }

        // Gate 2: multi-timeframe trend
        let detector = TrendDetector::new(&self.config.trend, &self.config.data, self.candles);
        let trends = detector.analyze_multi(pair, now)?;
        if trends.h4.direction == TrendDirection::Sideways {
            return reject(GateRejection::H4Sideways);
        }
        if trends.h1.direction != trends.h4.direction {
            return reject(GateRejection::TimeframesDisagree {
                h4: trends.h4.direction,
                h1: trends.h1.direction,
            });
        }

        // Gate 3: fundamental/trend alignment
        if !is_aligned(fundamental.direction, trends.h4.direction) {
            return reject(GateRejection::NotAligned {
                fundamental: fundamental.direction,
                trend: trends.h4.direction,
            });
        }

        // Gate 4: liquidity near price
        let liquidity = LiquidityZoneDetector::new(&self.config.liquidity, &self.config.data, self.candles);
        let zones = liquidity.detect(pair, self.config.liquidity.scan_timeframe)?;
        if zones.is_empty() {
            return reject(GateRejection::NoZones);
        }
        let price = self.prices.current_price(pair)?;
        let nearby = zones_near_price(&zones, price, self.config.liquidity.near_price_pct);
        if nearby.is_empty() {
            return reject(GateRejection::NoZonesNearPrice {
                price,
                zones: zones.len(),
            });
        }

        // Gate 5: entry zone and composition
        let direction = match trends.h4.direction {
            TrendDirection::Bullish => TradeDirection::Long,
            _ => TradeDirection::Short,
        };
        let entry_zone = select_entry_zone(&nearby, direction);
        let strength = composite_strength(
            fundamental.strength,
            trends.h4.strength,
            trends.h1.strength,
            nearby.len(),
        );

        let signal = TradingSignal {
            id: TradingSignal::compute_id(pair, direction, price, now),
            pair: pair.clone(),
            direction,
            status: SignalStatus::Pending,
            strength,
            fundamental,
            trend_h4: trends.h4,
            trend_h1: trends.h1,
            liquidity_zones: nearby,
            entry_price: price,
            entry_zone,
            stop_loss: None,
            take_profit_1: None,
            take_profit_2: None,
            take_profit_3: None,
            risk_reward: None,
            generated_at: now,
            expires_at: now + Duration::minutes(self.config.signal.validity_minutes),
        };
        tracing::info!(
            pair = %pair,
            direction = %direction,
            strength = %strength,
            entry = price,
            "signal generated"
        );
        Ok(SignalDecision::Signal(Box::new(signal)))
    }
}
