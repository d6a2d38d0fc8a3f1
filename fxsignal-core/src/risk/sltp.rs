//! Stop-loss placement and the three-step take-profit ladder.

use super::{check_price, check_stop_side, RiskError};
use crate::analysis::{LiquidityZone, ZoneType};
use crate::config::RiskConfig;
use crate::domain::{CurrencyPair, TradeDirection};
use serde::{Deserialize, Serialize};

/// Where the stop came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopSource {
    Custom,
    Zone { zone_type: ZoneType, level: f64 },
    FixedPercent { pct: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SLTPLevels {
    pub pair: CurrencyPair,
    pub direction: TradeDirection,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub stop_source: StopSource,
    pub stop_distance: f64,
    pub stop_distance_pips: f64,
    pub take_profit_1: f64,
    pub take_profit_2: f64,
    pub take_profit_3: f64,
    /// R-multiples of TP1..TP3.
    pub tp_multiples: [f64; 3],
    /// Percent of the position closed at each take profit.
    pub position_splits: [f64; 3],
}

impl SLTPLevels {
    pub fn take_profits(&self) -> [f64; 3] {
        [self.take_profit_1, self.take_profit_2, self.take_profit_3]
    }

    /// Reward/risk of the final target.
    pub fn risk_reward(&self) -> f64 {
        self.tp_multiples[2]
    }

    /// Lots closed at each take profit for a position of `lots`.
    ///
    /// The last tranche takes the remainder so the three always sum to `lots`.
    pub fn tranche_lots(&self, lots: f64) -> [f64; 3] {
        let first = lots * self.position_splits[0] / 100.0;
        let second = lots * self.position_splits[1] / 100.0;
        [first, second, lots - first - second]
    }

    /// Re-check ordering and direction of every level.
    pub fn validate(&self) -> Result<(), RiskError> {
        check_stop_side(self.direction, self.entry_price, self.stop_loss)?;
        let mut previous = 0.0;
        for (i, tp) in self.take_profits().into_iter().enumerate() {
            check_price("take profit", tp)?;
            let reward = self.direction.favorable_move(self.entry_price, tp);
            if reward <= previous {
                return Err(RiskError::InvalidLevels(format!(
                    "TP{} at {tp} does not extend beyond the previous level",
                    i + 1
                )));
            }
            previous = reward;
        }
        Ok(())
    }
}

pub struct SLTPCalculator<'a> {
    config: &'a RiskConfig,
}

impl<'a> SLTPCalculator<'a> {
    pub fn new(config: &'a RiskConfig) -> Self {
        Self { config }
    }

    pub fn calculate(
        &self,
        pair: &CurrencyPair,
        direction: TradeDirection,
        entry: f64,
        zones: &[LiquidityZone],
        custom_stop: Option<f64>,
    ) -> Result<SLTPLevels, RiskError> {
        let entry = check_price("entry price", entry)?;
        let (stop_loss, stop_source) = match custom_stop {
            Some(stop) => (check_price("stop loss", stop)?, StopSource::Custom),
            None => self.stop_from_zones(pair, direction, entry, zones).unwrap_or_else(|| {
                let pct = self.config.fallback_stop_pct;
                let stop = entry * (1.0 - direction.sign() * pct / 100.0);
                (stop, StopSource::FixedPercent { pct })
            }),
        };
        check_stop_side(direction, entry, stop_loss)?;

        let stop_distance = (entry - stop_loss).abs();
        let stop_pct = stop_distance / entry * 100.0;
        if stop_pct < self.config.tight_stop_warn_pct {
            tracing::warn!(pair = %pair, stop_pct, "stop loss is unusually tight");
        } else if stop_pct > self.config.wide_stop_warn_pct {
            tracing::warn!(pair = %pair, stop_pct, "stop loss is unusually wide");
        }

        let tp_multiples = [1.0, 2.0, self.config.min_risk_reward.max(3.0)];
        let target = |r: f64| entry + direction.sign() * r * stop_distance;

        let levels = SLTPLevels {
            pair: pair.clone(),
            direction,
            entry_price: entry,
            stop_loss,
            stop_source,
            stop_distance,
            stop_distance_pips: pair.to_pips(stop_distance),
            take_profit_1: target(tp_multiples[0]),
            take_profit_2: target(tp_multiples[1]),
            take_profit_3: target(tp_multiples[2]),
            tp_multiples,
            position_splits: self.config.position_splits,
        };
        levels.validate()?;
        tracing::debug!(
            pair = %pair,
            direction = %direction,
            entry,
            stop = levels.stop_loss,
            tp1 = levels.take_profit_1,
            tp2 = levels.take_profit_2,
            tp3 = levels.take_profit_3,
            "levels calculated"
        );
        Ok(levels)
    }

    /// Stop just beyond the nearest opposing zone: under support for longs,
    /// over resistance for shorts.
    fn stop_from_zones(
        &self,
        pair: &CurrencyPair,
        direction: TradeDirection,
        entry: f64,
        zones: &[LiquidityZone],
    ) -> Option<(f64, StopSource)> {
        let buffer = pair.from_pips(self.config.stop_buffer_pips);
        let zone = match direction {
            TradeDirection::Long => zones
                .iter()
                .filter(|z| z.zone_type.is_support() && z.price_range.0 < entry)
                .max_by(|a, b| a.price_range.0.total_cmp(&b.price_range.0)),
            TradeDirection::Short => zones
                .iter()
                .filter(|z| z.zone_type.is_resistance() && z.price_range.1 > entry)
                .min_by(|a, b| a.price_range.1.total_cmp(&b.price_range.1)),
        }?;
        let stop = match direction {
            TradeDirection::Long => zone.price_range.0 - buffer,
            TradeDirection::Short => zone.price_range.1 + buffer,
        };
        Some((
            stop,
            StopSource::Zone {
                zone_type: zone.zone_type,
                level: zone.price_level,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn zone(zone_type: ZoneType, low: f64, high: f64) -> LiquidityZone {
        LiquidityZone {
            zone_type,
            price_level: (low + high) / 2.0,
            price_range: (low, high),
            strength: 2,
            touches: 2,
            detected_at: Utc::now(),
            candle_index: 0,
        }
    }

    fn gbpusd() -> CurrencyPair {
        "GBP/USD".parse().unwrap()
    }

    fn approx(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn long_stop_below_nearest_support() {
        let config = RiskConfig::default();
        let zones = vec![
            zone(ZoneType::EqualLows, 1.2650, 1.2652),
            zone(ZoneType::EqualLows, 1.2695, 1.2695),
            zone(ZoneType::EqualHighs, 1.2690, 1.2691),
            zone(ZoneType::BullishFvg, 1.2710, 1.2715),
        ];
        let levels = SLTPCalculator::new(&config)
            .calculate(&gbpusd(), TradeDirection::Long, 1.2700, &zones, None)
            .unwrap();
        approx(levels.stop_loss, 1.2690);
        approx(levels.take_profit_1, 1.2710);
        approx(levels.take_profit_2, 1.2720);
        approx(levels.take_profit_3, 1.2730);
        assert!(matches!(
            levels.stop_source,
            StopSource::Zone {
                zone_type: ZoneType::EqualLows,
                ..
            }
        ));
        assert_eq!(levels.risk_reward(), 3.0);
    }

    #[test]
    fn short_stop_above_nearest_resistance() {
        let config = RiskConfig::default();
        let zones = vec![
            zone(ZoneType::EqualHighs, 1.2720, 1.2722),
            zone(ZoneType::StopHuntSell, 1.2740, 1.2745),
        ];
        let levels = SLTPCalculator::new(&config)
            .calculate(&gbpusd(), TradeDirection::Short, 1.2700, &zones, None)
            .unwrap();
        approx(levels.stop_loss, 1.2727);
        assert!(levels.take_profit_3 < levels.take_profit_2);
        assert!(levels.take_profit_2 < levels.take_profit_1);
        assert!(levels.take_profit_1 < 1.2700);
    }

    #[test]
    fn falls_back_to_fixed_percent() {
        let config = RiskConfig::default();
        let zones = vec![zone(ZoneType::EqualHighs, 1.2750, 1.2755)];
        let levels = SLTPCalculator::new(&config)
            .calculate(&gbpusd(), TradeDirection::Long, 1.2700, &zones, None)
            .unwrap();
        approx(levels.stop_loss, 1.2700 * 0.985);
        assert_eq!(levels.stop_source, StopSource::FixedPercent { pct: 1.5 });
    }

    #[test]
    fn custom_stop_is_validated() {
        let config = RiskConfig::default();
        let calc = SLTPCalculator::new(&config);
        assert!(matches!(
            calc.calculate(&gbpusd(), TradeDirection::Long, 1.2700, &[], Some(1.2750)),
            Err(RiskError::StopWrongSide { .. })
        ));
        assert!(matches!(
            calc.calculate(&gbpusd(), TradeDirection::Short, 1.2700, &[], Some(1.2700)),
            Err(RiskError::StopEqualsEntry { .. })
        ));
        let levels = calc
            .calculate(&gbpusd(), TradeDirection::Short, 1.2700, &[], Some(1.2750))
            .unwrap();
        assert_eq!(levels.stop_source, StopSource::Custom);
    }

    #[test]
    fn tp3_respects_min_risk_reward() {
        let mut config = RiskConfig::default();
        config.min_risk_reward = 4.0;
        let levels = SLTPCalculator::new(&config)
            .calculate(&gbpusd(), TradeDirection::Long, 1.2700, &[], Some(1.2690))
            .unwrap();
        approx(levels.take_profit_3, 1.2740);
        assert_eq!(levels.risk_reward(), 4.0);
    }

    #[test]
    fn tranches_sum_to_position() {
        let config = RiskConfig::default();
        let levels = SLTPCalculator::new(&config)
            .calculate(&gbpusd(), TradeDirection::Long, 1.2700, &[], Some(1.2690))
            .unwrap();
        let [a, b, c] = levels.tranche_lots(1.0);
        approx(a, 0.33);
        approx(b, 0.33);
        approx(a + b + c, 1.0);
    }
}
