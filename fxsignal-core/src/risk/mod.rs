//! Risk management: sizing, exit ladder, trailing stops and signal enrichment.
//!
//! Every financial value produced here is validated before it leaves the
//! module; an invalid value is an error, never a silently substituted default.

pub mod enrich;
pub mod ratchet;
pub mod sizer;
pub mod sltp;
pub mod trailing;

pub use enrich::{enrich_signal, EnrichedSignal};
pub use ratchet::RatchetState;
pub use sizer::{PositionSize, PositionSizer};
pub use sltp::{SLTPCalculator, SLTPLevels, StopSource};
pub use trailing::{OpenPosition, TrailingPhase, TrailingStopManager, TrailingStopUpdate};

use crate::domain::TradeDirection;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RiskError {
    #[error("invalid {field}: {value}")]
    InvalidPrice { field: &'static str, value: f64 },

    #[error("stop loss equals entry price {entry}")]
    StopEqualsEntry { entry: f64 },

    #[error("stop {stop} is on the wrong side of entry {entry} for a {direction} trade")]
    StopWrongSide {
        direction: TradeDirection,
        entry: f64,
        stop: f64,
    },

    #[error("position size {lots:.2} lots is below the minimum {min}")]
    SizeBelowMinimum { lots: f64, min: f64 },

    #[error("position size {lots:.2} lots exceeds the maximum {max}")]
    SizeAboveMaximum { lots: f64, max: f64 },

    #[error("risk amount {risk_amount:.2} exceeds the limit {limit:.2}")]
    RiskTooHigh { risk_amount: f64, limit: f64 },

    #[error("invalid levels: {0}")]
    InvalidLevels(String),
}

pub(crate) fn check_price(field: &'static str, value: f64) -> Result<f64, RiskError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(RiskError::InvalidPrice { field, value })
    }
}

/// A long stop must sit strictly below entry, a short stop strictly above.
pub(crate) fn check_stop_side(direction: TradeDirection, entry: f64, stop: f64) -> Result<(), RiskError> {
    if stop == entry {
        return Err(RiskError::StopEqualsEntry { entry });
    }
    let correct = match direction {
        TradeDirection::Long => stop < entry,
        TradeDirection::Short => stop > entry,
    };
    if correct {
        Ok(())
    } else {
        Err(RiskError::StopWrongSide {
            direction,
            entry,
            stop,
        })
    }
}
