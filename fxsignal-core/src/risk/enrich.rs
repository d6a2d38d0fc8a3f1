//! Attach validated exit levels and a position size to a gated signal.

use super::sizer::{PositionSize, PositionSizer};
use super::sltp::{SLTPCalculator, SLTPLevels};
use super::RiskError;
use crate::analysis::TradingSignal;
use crate::config::RiskConfig;
use serde::{Deserialize, Serialize};

/// A signal that is ready to trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedSignal {
    pub signal: TradingSignal,
    pub levels: SLTPLevels,
    pub position: PositionSize,
}

/// Place stop and targets from the signal's nearby zones, size against that
/// stop and write the levels back into the signal.
///
/// The signal is consumed; on error nothing partially enriched escapes.
pub fn enrich_signal(mut signal: TradingSignal, config: &RiskConfig) -> Result<EnrichedSignal, RiskError> {
    let levels = SLTPCalculator::new(config).calculate(
        &signal.pair,
        signal.direction,
        signal.entry_price,
        &signal.liquidity_zones,
        None,
    )?;
    let position = PositionSizer::new(config).size_validated(&signal.pair, levels.entry_price, levels.stop_loss)?;

    signal.stop_loss = Some(levels.stop_loss);
    signal.take_profit_1 = Some(levels.take_profit_1);
    signal.take_profit_2 = Some(levels.take_profit_2);
    signal.take_profit_3 = Some(levels.take_profit_3);
    signal.risk_reward = Some(levels.risk_reward());

    tracing::info!(
        signal = %signal.id,
        pair = %signal.pair,
        stop = levels.stop_loss,
        lots = position.position_size_lots,
        risk = position.risk_amount,
        "signal enriched"
    );
    Ok(EnrichedSignal {
        signal,
        levels,
        position,
    })
}
