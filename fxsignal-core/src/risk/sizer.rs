//! Fixed-fractional position sizing in standard lots.

use super::{check_price, RiskError};
use crate::config::RiskConfig;
use crate::domain::{CurrencyPair, LOT_UNITS};
use serde::{Deserialize, Serialize};

/// Lots are quoted to two decimals (micro lots).
const LOT_STEP: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSize {
    pub pair: CurrencyPair,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub stop_distance_pips: f64,
    pub pip_value_per_lot: f64,
    pub position_size_lots: f64,
    pub position_size_units: f64,
    /// Risk carried by the rounded position.
    pub risk_amount: f64,
    /// Risk budget before rounding and leverage capping.
    pub target_risk_amount: f64,
    pub capped_by_leverage: bool,
}

impl PositionSize {
    pub fn risk_pct_of(&self, balance: f64) -> f64 {
        self.risk_amount / balance * 100.0
    }
}

/// # Formula
/// ```text
/// risk_amount   = balance * risk_percentage / 100
/// stop_pips     = |entry - stop| / pip_size
/// lots          = risk_amount / (stop_pips * pip_value_per_lot)
/// ```
/// capped so the USD notional stays within `balance * leverage`.
pub struct PositionSizer<'a> {
    config: &'a RiskConfig,
}

impl<'a> PositionSizer<'a> {
    pub fn new(config: &'a RiskConfig) -> Self {
        Self { config }
    }

    pub fn size(&self, pair: &CurrencyPair, entry: f64, stop: f64) -> Result<PositionSize, RiskError> {
        let entry = check_price("entry price", entry)?;
        let stop = check_price("stop loss", stop)?;
        if entry == stop {
            return Err(RiskError::StopEqualsEntry { entry });
        }

        let target_risk_amount = self.config.account_balance * self.config.risk_percentage / 100.0;
        let stop_distance_pips = pair.to_pips((entry - stop).abs());
        let pip_value_per_lot = pair.pip_value_per_lot();

        let mut lots = target_risk_amount / (stop_distance_pips * pip_value_per_lot);

        let max_notional = self.config.account_balance * self.config.leverage;
        let notional = pair.notional_usd(lots * LOT_UNITS, entry);
        let capped_by_leverage = notional > max_notional;
        if capped_by_leverage {
            lots *= max_notional / notional;
            // Round down so the cap still holds after rounding.
            lots = (lots / LOT_STEP).floor() * LOT_STEP;
            tracing::warn!(pair = %pair, notional, max_notional, lots, "position capped by leverage");
        } else {
            lots = (lots / LOT_STEP).round() * LOT_STEP;
        }

        let risk_amount = lots * stop_distance_pips * pip_value_per_lot;
        tracing::debug!(
            pair = %pair,
            entry,
            stop,
            stop_distance_pips,
            lots,
            risk_amount,
            "position sized"
        );

        Ok(PositionSize {
            pair: pair.clone(),
            entry_price: entry,
            stop_loss: stop,
            stop_distance_pips,
            pip_value_per_lot,
            position_size_lots: lots,
            position_size_units: lots * LOT_UNITS,
            risk_amount,
            target_risk_amount,
            capped_by_leverage,
        })
    }

    /// Size and check against the lot and risk limits in one step.
    pub fn size_validated(&self, pair: &CurrencyPair, entry: f64, stop: f64) -> Result<PositionSize, RiskError> {
        let size = self.size(pair, entry, stop)?;
        self.validate(&size)?;
        Ok(size)
    }

    pub fn validate(&self, size: &PositionSize) -> Result<(), RiskError> {
        // Half a step of slack absorbs float noise from rounding to the lot step.
        let slack = LOT_STEP / 2.0;
        if size.position_size_lots + slack < self.config.min_lot || size.position_size_lots <= 0.0 {
            return Err(RiskError::SizeBelowMinimum {
                lots: size.position_size_lots,
                min: self.config.min_lot,
            });
        }
        if size.position_size_lots > self.config.max_lot + slack {
            return Err(RiskError::SizeAboveMaximum {
                lots: size.position_size_lots,
                max: self.config.max_lot,
            });
        }
        let limit = self.config.account_balance * self.config.max_risk_pct_of_balance / 100.0;
        if size.risk_amount > limit {
            return Err(RiskError::RiskTooHigh {
                risk_amount: size.risk_amount,
                limit,
            });
        }
        Ok(())
    }
}
