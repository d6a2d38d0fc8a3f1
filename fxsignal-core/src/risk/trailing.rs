//! Trailing-stop state machine for an assumed-open position.
//!
//! Phases follow the R-multiple reached (profit as a multiple of the
//! initial stop distance):
//!
//! | R reached        | phase        | stop candidate                 |
//! |------------------|--------------|--------------------------------|
//! | < breakeven_r    | InitialRisk  | none                           |
//! | >= breakeven_r   | Breakeven    | entry                          |
//! | >= lock_r        | LockedOneR   | entry + 1R                     |
//! | >= trail_r       | Trailing     | MA offset or fixed % of price  |
//!
//! Every candidate goes through a [`RatchetState`], so the stop only ever
//! moves in the trade's favour.

use super::ratchet::RatchetState;
use super::EnrichedSignal;
use crate::config::TrailingConfig;
use crate::domain::{CurrencyPair, TradeDirection};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrailingPhase {
    InitialRisk,
    Breakeven,
    LockedOneR,
    Trailing,
}

impl fmt::Display for TrailingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrailingPhase::InitialRisk => "initial risk",
            TrailingPhase::Breakeven => "breakeven",
            TrailingPhase::LockedOneR => "locked 1R",
            TrailingPhase::Trailing => "trailing",
        };
        f.write_str(s)
    }
}

/// Emitted whenever the stop advances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailingStopUpdate {
    pub position_id: String,
    pub pair: CurrencyPair,
    pub direction: TradeDirection,
    pub current_price: f64,
    pub old_stop: f64,
    pub new_stop: f64,
    pub reason: String,
    pub phase: TrailingPhase,
    pub r_multiple: f64,
    /// Profit guaranteed by the new stop; negative while still below entry.
    pub profit_locked_pips: f64,
    pub timestamp: DateTime<Utc>,
}

/// Simulated open trade. Fills are assumed from price polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPosition {
    pub id: String,
    pub pair: CurrencyPair,
    pub direction: TradeDirection,
    pub entry_price: f64,
    pub initial_stop: f64,
    pub take_profits: [f64; 3],
    pub tp_hit: [bool; 3],
    pub lots: f64,
    pub phase: TrailingPhase,
    pub opened_at: DateTime<Utc>,
    ratchet: RatchetState,
}

impl OpenPosition {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        pair: CurrencyPair,
        direction: TradeDirection,
        entry_price: f64,
        initial_stop: f64,
        take_profits: [f64; 3],
        lots: f64,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            pair,
            direction,
            entry_price,
            initial_stop,
            take_profits,
            tp_hit: [false; 3],
            lots,
            phase: TrailingPhase::InitialRisk,
            opened_at,
            ratchet: RatchetState::with_initial_level(direction, initial_stop),
        }
    }

    pub fn from_enriched(enriched: &EnrichedSignal, opened_at: DateTime<Utc>) -> Self {
        Self::new(
            enriched.signal.id.clone(),
            enriched.signal.pair.clone(),
            enriched.signal.direction,
            enriched.levels.entry_price,
            enriched.levels.stop_loss,
            enriched.levels.take_profits(),
            enriched.position.position_size_lots,
            opened_at,
        )
    }

    pub fn current_stop(&self) -> f64 {
        self.ratchet.current_level()
    }

    pub fn initial_risk(&self) -> f64 {
        (self.entry_price - self.initial_stop).abs()
    }

    pub fn r_multiple(&self, price: f64) -> f64 {
        let risk = self.initial_risk();
        if risk > 0.0 {
            self.direction.favorable_move(self.entry_price, price) / risk
        } else {
            0.0
        }
    }

    pub fn stop_hit(&self, price: f64) -> bool {
        match self.direction {
            TradeDirection::Long => price <= self.current_stop(),
            TradeDirection::Short => price >= self.current_stop(),
        }
    }

    /// Mark and return the take-profit levels (1-based) first reached at `price`.
    pub fn mark_take_profits(&mut self, price: f64) -> Vec<u8> {
        let mut newly_hit = Vec::new();
        for (i, tp) in self.take_profits.iter().enumerate() {
            if !self.tp_hit[i] && self.direction.favorable_move(*tp, price) >= 0.0 {
                self.tp_hit[i] = true;
                newly_hit.push(i as u8 + 1);
            }
        }
        newly_hit
    }

    pub fn fully_closed(&self) -> bool {
        self.tp_hit[2]
    }
}

pub struct TrailingStopManager<'a> {
    config: &'a TrailingConfig,
}

impl<'a> TrailingStopManager<'a> {
    pub fn new(config: &'a TrailingConfig) -> Self {
        Self { config }
    }

    pub fn phase_for(&self, r_multiple: f64) -> TrailingPhase {
        if r_multiple >= self.config.trail_r {
            TrailingPhase::Trailing
        } else if r_multiple >= self.config.lock_r {
            TrailingPhase::LockedOneR
        } else if r_multiple >= self.config.breakeven_r {
            TrailingPhase::Breakeven
        } else {
            TrailingPhase::InitialRisk
        }
    }

    /// Candidate stop and reason for `phase`, before ratcheting.
    fn candidate(
        &self,
        position: &OpenPosition,
        phase: TrailingPhase,
        price: f64,
        moving_average: Option<f64>,
    ) -> Option<(f64, String)> {
        let sign = position.direction.sign();
        let one_r = position.entry_price + sign * position.initial_risk();
        match phase {
            TrailingPhase::InitialRisk => None,
            TrailingPhase::Breakeven => Some((position.entry_price, "moved to breakeven".to_string())),
            TrailingPhase::LockedOneR => Some((one_r, "locked in 1R profit".to_string())),
            TrailingPhase::Trailing => {
                let (trail, reason) = match moving_average {
                    Some(ma) => (
                        ma - sign * position.pair.from_pips(self.config.ma_offset_pips),
                        format!(
                            "trailing EMA({}) with {} pip offset",
                            self.config.ma_period, self.config.ma_offset_pips
                        ),
                    ),
                    None => (
                        price * (1.0 - sign * self.config.trail_pct / 100.0),
                        format!("trailing {}% behind price", self.config.trail_pct),
                    ),
                };
                // Never trail below the 1R lock.
                let level = match position.direction {
                    TradeDirection::Long => trail.max(one_r),
                    TradeDirection::Short => trail.min(one_r),
                };
                Some((level, reason))
            }
        }
    }

    /// Advance the stop if the current price earns it. `None` means no change.
    pub fn check(
        &self,
        position: &mut OpenPosition,
        price: f64,
        moving_average: Option<f64>,
        now: DateTime<Utc>,
    ) -> Option<TrailingStopUpdate> {
        if !price.is_finite() || price <= 0.0 {
            tracing::warn!(position = %position.id, price, "ignoring invalid price");
            return None;
        }
        let r_multiple = position.r_multiple(price);
        let phase = self.phase_for(r_multiple);
        if phase > position.phase {
            position.phase = phase;
        }

        let (candidate, reason) = self.candidate(position, phase, price, moving_average)?;
        let protective = match position.direction {
            TradeDirection::Long => candidate < price,
            TradeDirection::Short => candidate > price,
        };
        if !protective || !position.ratchet.would_tighten(candidate) {
            return None;
        }

        let old_stop = position.current_stop();
        let new_stop = position.ratchet.apply(candidate);
        let profit_locked_pips = position
            .pair
            .to_pips(position.direction.favorable_move(position.entry_price, new_stop));
        tracing::info!(
            position = %position.id,
            pair = %position.pair,
            old_stop,
            new_stop,
            r_multiple,
            phase = %phase,
            "stop moved"
        );

        Some(TrailingStopUpdate {
            position_id: position.id.clone(),
            pair: position.pair.clone(),
            direction: position.direction,
            current_price: price,
            old_stop,
            new_stop,
            reason,
            phase,
            r_multiple,
            profit_locked_pips,
            timestamp: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_position() -> OpenPosition {
        OpenPosition::new(
            "p1",
            "GBP/USD".parse().unwrap(),
            TradeDirection::Long,
            1.2700,
            1.2690,
            [1.2710, 1.2720, 1.2730],
            1.0,
            Utc::now(),
        )
    }

    fn short_position() -> OpenPosition {
        OpenPosition::new(
            "p2",
            "USD/JPY".parse().unwrap(),
            TradeDirection::Short,
            150.00,
            150.50,
            [149.50, 149.00, 148.50],
            0.5,
            Utc::now(),
        )
    }

    fn approx(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn phases_follow_r_multiple() {
        let config = TrailingConfig::default();
        let manager = TrailingStopManager::new(&config);
        assert_eq!(manager.phase_for(0.5), TrailingPhase::InitialRisk);
        assert_eq!(manager.phase_for(0.9), TrailingPhase::Breakeven);
        assert_eq!(manager.phase_for(1.5), TrailingPhase::LockedOneR);
        assert_eq!(manager.phase_for(3.0), TrailingPhase::Trailing);
    }

    #[test]
    fn no_update_below_breakeven() {
        let config = TrailingConfig::default();
        let manager = TrailingStopManager::new(&config);
        let mut pos = long_position();
        assert!(manager.check(&mut pos, 1.2705, None, Utc::now()).is_none());
        approx(pos.current_stop(), 1.2690);
    }

    #[test]
    fn long_walks_through_phases() {
        let config = TrailingConfig::default();
        let manager = TrailingStopManager::new(&config);
        let mut pos = long_position();

        let update = manager.check(&mut pos, 1.27095, None, Utc::now()).unwrap();
        assert_eq!(update.phase, TrailingPhase::Breakeven);
        approx(update.new_stop, 1.2700);
        approx(update.old_stop, 1.2690);

        let update = manager.check(&mut pos, 1.2716, None, Utc::now()).unwrap();
        assert_eq!(update.phase, TrailingPhase::LockedOneR);
        approx(update.new_stop, 1.2710);
        assert!((update.profit_locked_pips - 10.0).abs() < 1e-6);

        // EMA at 1.2740 less 10 pips.
        let update = manager.check(&mut pos, 1.2750, Some(1.2740), Utc::now()).unwrap();
        assert_eq!(update.phase, TrailingPhase::Trailing);
        approx(update.new_stop, 1.2730);
    }

    #[test]
    fn pullback_never_loosens() {
        let config = TrailingConfig::default();
        let manager = TrailingStopManager::new(&config);
        let mut pos = long_position();
        manager.check(&mut pos, 1.2716, None, Utc::now()).unwrap();
        approx(pos.current_stop(), 1.2710);
        assert!(manager.check(&mut pos, 1.27095, None, Utc::now()).is_none());
        assert!(manager.check(&mut pos, 1.2702, None, Utc::now()).is_none());
        approx(pos.current_stop(), 1.2710);
        assert_eq!(pos.phase, TrailingPhase::LockedOneR);
    }

    #[test]
    fn trailing_without_ma_uses_percent() {
        let config = TrailingConfig::default();
        let manager = TrailingStopManager::new(&config);
        let mut pos = short_position();
        // 3R on a 50 pip stop.
        let update = manager.check(&mut pos, 148.50, None, Utc::now()).unwrap();
        assert_eq!(update.phase, TrailingPhase::Trailing);
        // 148.50 * 1.005 = 149.2425, tighter than the 1R lock at 149.50.
        approx(update.new_stop, 148.50 * 1.005);
        assert!(update.profit_locked_pips > 50.0);
    }

    #[test]
    fn take_profits_and_stop_hits() {
        let mut pos = long_position();
        assert_eq!(pos.mark_take_profits(1.2715), vec![1]);
        assert_eq!(pos.mark_take_profits(1.2735), vec![2, 3]);
        assert!(pos.mark_take_profits(1.2740).is_empty());
        assert!(pos.fully_closed());

        let pos = short_position();
        assert!(!pos.stop_hit(150.20));
        assert!(pos.stop_hit(150.50));
    }
}
