//! Market-reaction check for pending signals at session open.

use chrono::{DateTime, Utc};
use fxsignal_core::analysis::{SignalStatus, TradingSignal};
use fxsignal_core::data::PriceSource;
use fxsignal_core::domain::CurrencyPair;
use fxsignal_core::AnalysisError;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "reaction", rename_all = "snake_case")]
pub enum ReactionOutcome {
    Confirmed { price: f64 },
    Cancelled { price: f64, adverse_pct: f64 },
    Expired,
}

/// What the reaction step did with one signal.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reaction {
    pub signal_id: String,
    pub pair: CurrencyPair,
    pub outcome: ReactionOutcome,
    /// Set once the monitor tracks the confirmed entry.
    pub position_id: Option<String>,
}

pub struct ReactionChecker<'a> {
    prices: &'a dyn PriceSource,
    tolerance_pct: f64,
}

impl<'a> ReactionChecker<'a> {
    pub fn new(prices: &'a dyn PriceSource, tolerance_pct: f64) -> Self {
        Self { prices, tolerance_pct }
    }

    /// Confirm a pending signal unless price has already moved against it
    /// by more than the tolerance; expire it once past `expires_at`.
    pub fn check(&self, signal: &mut TradingSignal, now: DateTime<Utc>) -> Result<ReactionOutcome, AnalysisError> {
        if signal.is_expired(now) {
            signal.transition(SignalStatus::Expired)?;
            return Ok(ReactionOutcome::Expired);
        }
        let price = self.prices.current_price(&signal.pair)?;
        let outcome = evaluate(signal, price, self.tolerance_pct);
        match outcome {
            ReactionOutcome::Confirmed { .. } => signal.transition(SignalStatus::Confirmed)?,
            ReactionOutcome::Cancelled { adverse_pct, .. } => {
                tracing::info!(signal = %signal.id, pair = %signal.pair, adverse_pct, "market moved against signal");
                signal.transition(SignalStatus::Cancelled)?
            }
            ReactionOutcome::Expired => {}
        }
        Ok(outcome)
    }
}

/// Pure decision, no status change.
pub fn evaluate(signal: &TradingSignal, price: f64, tolerance_pct: f64) -> ReactionOutcome {
    let adverse_pct = -signal.direction.favorable_move(signal.entry_price, price) / signal.entry_price * 100.0;
    if adverse_pct <= tolerance_pct {
        ReactionOutcome::Confirmed { price }
    } else {
        ReactionOutcome::Cancelled { price, adverse_pct }
    }
}
