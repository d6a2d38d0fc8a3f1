//! Property tests for the market-reaction decision.

use chrono::{TimeZone, Utc};
use fxsignal_core::analysis::{LiquidityZone, SignalStatus, TradingSignal, ZoneType};
use fxsignal_core::analysis::{FundamentalDirection, FundamentalSignal, TrendAnalysis};
use fxsignal_core::domain::{CurrencyPair, SignalStrength, Timeframe, TradeDirection, TrendDirection};
use fxsignal_runner::reaction::evaluate;
use fxsignal_runner::ReactionOutcome;
use proptest::prelude::*;

fn trend(pair: &CurrencyPair, timeframe: Timeframe) -> TrendAnalysis {
    TrendAnalysis {
        pair: pair.clone(),
        timeframe,
        direction: TrendDirection::Bullish,
        strength: SignalStrength::Strong,
        fast_ma: 1.28,
        slow_ma: 1.26,
        latest_close: 1.27,
        higher_highs: true,
        higher_lows: true,
        lower_highs: false,
        lower_lows: false,
        analyzed_at: Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap(),
    }
}

fn signal(direction: TradeDirection, entry: f64) -> TradingSignal {
    let pair: CurrencyPair = "EUR/USD".parse().unwrap();
    let at = Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap();
    let zone = LiquidityZone {
        zone_type: ZoneType::EqualLows,
        price_level: entry,
        price_range: (entry, entry),
        strength: 2,
        touches: 2,
        detected_at: at,
        candle_index: 0,
    };
    TradingSignal {
        id: TradingSignal::compute_id(&pair, direction, entry, at),
        pair: pair.clone(),
        direction,
        status: SignalStatus::Pending,
        strength: SignalStrength::Moderate,
        fundamental: FundamentalSignal {
            pair: pair.clone(),
            direction: FundamentalDirection::UsdWeaker,
            strength: SignalStrength::Moderate,
            events: Vec::new(),
            base_score: 3.0,
            quote_score: -1.5,
            generated_at: at,
            rationale: String::new(),
        },
        trend_h4: trend(&pair, Timeframe::H4),
        trend_h1: trend(&pair, Timeframe::H1),
        liquidity_zones: vec![zone.clone()],
        entry_price: entry,
        entry_zone: Some(zone),
        stop_loss: None,
        take_profit_1: None,
        take_profit_2: None,
        take_profit_3: None,
        risk_reward: None,
        generated_at: at,
        expires_at: at + chrono::Duration::hours(4),
    }
}

proptest! {
    /// Favourable moves always confirm; adverse moves confirm only within tolerance.
    #[test]
    fn confirmation_tracks_adverse_move(
        entry in 0.8..1.6_f64,
        move_pct in -1.0..1.0_f64,
        tolerance in 0.01..0.5_f64,
        long in any::<bool>(),
    ) {
        let direction = if long { TradeDirection::Long } else { TradeDirection::Short };
        let s = signal(direction, entry);
        let price = entry * (1.0 + direction.sign() * move_pct / 100.0);
        let adverse_pct = -move_pct;
        let outcome = evaluate(&s, price, tolerance);
        if move_pct >= 0.0 {
            prop_assert!(matches!(outcome, ReactionOutcome::Confirmed { .. }), "{outcome:?}");
        } else if adverse_pct > tolerance + 1e-9 {
            prop_assert!(matches!(outcome, ReactionOutcome::Cancelled { .. }), "{outcome:?}");
        } else if adverse_pct < tolerance - 1e-9 {
            prop_assert!(matches!(outcome, ReactionOutcome::Confirmed { .. }), "{outcome:?}");
        }
    }
}
