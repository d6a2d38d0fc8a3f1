//! Property tests for risk and analysis invariants.
//!
//! 1. Exit ladder ordering: TP1 < TP2 < TP3 in reward, stop on the losing side
//! 2. Sizing identity: lots * stop pips * pip value == risk amount
//! 3. Trailing monotonicity: the stop never loosens along any price path
//! 4. Zone ranges are always ordered
//! 5. In-line releases contribute nothing to a currency score

use chrono::{Duration, TimeZone, Utc};
use fxsignal_core::analysis::{FundamentalAnalyzer, LiquidityZoneDetector};
use fxsignal_core::config::BotConfig;
use fxsignal_core::data::MemoryCandles;
use fxsignal_core::domain::{Candle, CurrencyPair, EconomicEvent, NewsImpact, TradeDirection};
use fxsignal_core::risk::{OpenPosition, PositionSizer, SLTPCalculator, TrailingPhase, TrailingStopManager};
use proptest::prelude::*;

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_pair() -> impl Strategy<Value = CurrencyPair> {
    prop_oneof![
        Just("GBP/USD"),
        Just("EUR/USD"),
        Just("USD/JPY"),
        Just("AUD/USD"),
        Just("USD/CAD"),
    ]
    .prop_map(|s| s.parse().unwrap())
}

fn arb_direction() -> impl Strategy<Value = TradeDirection> {
    prop_oneof![Just(TradeDirection::Long), Just(TradeDirection::Short)]
}

/// Entry scaled to the pair's price level.
fn entry_for(pair: &CurrencyPair, unit: f64) -> f64 {
    if pair.is_jpy_quoted() {
        unit * 100.0
    } else {
        unit
    }
}

fn arb_unit_price() -> impl Strategy<Value = f64> {
    (0.6..1.8_f64).prop_map(|p| (p * 10_000.0).round() / 10_000.0)
}

fn arb_stop_pips() -> impl Strategy<Value = f64> {
    5.0..300.0_f64
}

// ── 1. Exit ladder ordering ──────────────────────────────────────────

proptest! {
    #[test]
    fn take_profits_are_ordered(
        pair in arb_pair(),
        direction in arb_direction(),
        unit in arb_unit_price(),
        pips in arb_stop_pips(),
    ) {
        let config = BotConfig::default();
        let entry = entry_for(&pair, unit);
        let stop = entry - direction.sign() * pair.from_pips(pips);
        let levels = SLTPCalculator::new(&config.risk)
            .calculate(&pair, direction, entry, &[], Some(stop))
            .unwrap();

        let reward = |tp: f64| direction.favorable_move(entry, tp);
        prop_assert!(direction.favorable_move(entry, levels.stop_loss) < 0.0);
        prop_assert!(reward(levels.take_profit_1) > 0.0);
        prop_assert!(reward(levels.take_profit_1) < reward(levels.take_profit_2));
        prop_assert!(reward(levels.take_profit_2) < reward(levels.take_profit_3));
        prop_assert!(levels.risk_reward() >= config.risk.min_risk_reward);
        prop_assert!(levels.validate().is_ok());
    }
}

// ── 2. Sizing identity ───────────────────────────────────────────────

proptest! {
    #[test]
    fn size_times_distance_is_risk(
        pair in arb_pair(),
        direction in arb_direction(),
        unit in arb_unit_price(),
        pips in arb_stop_pips(),
        balance in 1_000.0..250_000.0_f64,
        risk_pct in 0.25..3.0_f64,
    ) {
        let mut config = BotConfig::default();
        config.risk.account_balance = balance;
        config.risk.risk_percentage = risk_pct;
        let entry = entry_for(&pair, unit);
        let stop = entry - direction.sign() * pair.from_pips(pips);

        let size = PositionSizer::new(&config.risk).size(&pair, entry, stop).unwrap();
        let implied = size.position_size_lots * size.stop_distance_pips * size.pip_value_per_lot;
        prop_assert!((implied - size.risk_amount).abs() < 1e-6);
        prop_assert!(size.risk_amount <= size.target_risk_amount + 0.005 * size.stop_distance_pips * size.pip_value_per_lot + 1e-6);
        if !size.capped_by_leverage {
            let step_risk = 0.005 * size.stop_distance_pips * size.pip_value_per_lot;
            prop_assert!((size.risk_amount - size.target_risk_amount).abs() <= step_risk + 1e-6);
        }
    }
}

// ── 3. Trailing monotonicity ─────────────────────────────────────────

proptest! {
    #[test]
    fn stop_never_loosens(
        direction in arb_direction(),
        moves in prop::collection::vec(-60.0..80.0_f64, 1..60),
        ma_offsets in prop::collection::vec(prop::option::of(5.0..60.0_f64), 60),
    ) {
        let config = BotConfig::default();
        let pair: CurrencyPair = "GBP/USD".parse().unwrap();
        let entry = 1.2700;
        let stop = entry - direction.sign() * pair.from_pips(20.0);
        let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let mut position = OpenPosition::new("p", pair.clone(), direction, entry, stop, [0.0; 3], 1.0, t0);
        let manager = TrailingStopManager::new(&config.trailing);

        let mut price = entry;
        let mut previous_stop = position.current_stop();
        let mut reached_breakeven = false;
        for (i, pips) in moves.iter().enumerate() {
            price = (price + direction.sign() * pair.from_pips(*pips)).max(0.5);
            // MA lags behind price on the protective side.
            let ma = ma_offsets[i].map(|off| price - direction.sign() * pair.from_pips(off));
            manager.check(&mut position, price, ma, t0 + Duration::hours(i as i64));

            let current = position.current_stop();
            prop_assert!(direction.favorable_move(previous_stop, current) >= 0.0,
                "stop loosened from {} to {}", previous_stop, current);
            if position.phase >= TrailingPhase::Breakeven {
                reached_breakeven = true;
            }
            if reached_breakeven {
                prop_assert!(direction.favorable_move(entry, current) >= -1e-12);
            }
            previous_stop = current;
        }
    }
}

// ── 4. Zone ranges ───────────────────────────────────────────────────

fn arb_candles() -> impl Strategy<Value = Vec<Candle>> {
    prop::collection::vec((-0.002..0.002_f64, 0.0..0.002_f64, 0.0..0.002_f64), 30..120).prop_map(|steps| {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let mut close = 1.2700;
        steps
            .into_iter()
            .enumerate()
            .map(|(i, (delta, up, down))| {
                let open = close;
                close = (close + delta).max(0.5);
                let high = open.max(close) + up;
                let low = open.min(close) - down;
                Candle::new(t0 + Duration::minutes(15 * i as i64), open, high, low, close, 0.0)
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn zone_ranges_are_ordered(candles in arb_candles()) {
        let config = BotConfig::default();
        let source = MemoryCandles::new();
        let detector = LiquidityZoneDetector::new(&config.liquidity, &config.data, &source);
        let zones = detector.detect_in(&candles);
        for zone in &zones {
            prop_assert!(zone.price_range.0 <= zone.price_range.1);
            prop_assert!((1..=5).contains(&zone.strength));
        }
        prop_assert!(zones.windows(2).all(|w| w[0].strength >= w[1].strength));
    }
}

// ── 5. In-line releases ──────────────────────────────────────────────

proptest! {
    #[test]
    fn in_line_release_scores_zero(value in -500.0..500.0_f64) {
        let config = BotConfig::default();
        let analyzer = FundamentalAnalyzer::new(&config.fundamental);
        let text = format!("{value:.2}");
        let event = EconomicEvent::new(Utc::now(), "EUR", NewsImpact::High, "Industrial Production")
            .with_values(Some(&text), Some(&text));
        prop_assert_eq!(analyzer.event_score(&event), Some(0.0));

        let unscored = EconomicEvent::new(Utc::now(), "EUR", NewsImpact::High, "Industrial Production")
            .with_values(None, Some(&text));
        prop_assert_eq!(analyzer.event_score(&unscored), None);
    }
}
