//! End-to-end gating and enrichment over in-memory sources.

use chrono::{DateTime, Duration, TimeZone, Utc};
use fxsignal_core::analysis::{GateRejection, LiquidityZoneDetector, SignalDecision, SignalStatus, ZoneType};
use fxsignal_core::config::{BotConfig, LiquidityConfig};
use fxsignal_core::data::{FixedPrices, MemoryCandles, MemoryEvents};
use fxsignal_core::domain::{
    Candle, CurrencyPair, EconomicEvent, NewsImpact, SignalStrength, Timeframe, TradeDirection, TrendDirection,
};
use fxsignal_core::{enrich_signal, SignalGenerator};

// ── Helpers ──────────────────────────────────────────────────────────

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap()
}

fn gbpusd() -> CurrencyPair {
    "GBP/USD".parse().unwrap()
}

/// Bars ending one period before `now`, each opening at the previous close.
fn bars(timeframe: Timeframe, closes: &[f64]) -> Vec<Candle> {
    let step = timeframe.duration();
    let start = now() - step * closes.len() as i32;
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Candle::new(
                start + step * i as i32,
                open,
                open.max(close) + 0.0001,
                open.min(close) - 0.0001,
                close,
                1000.0,
            )
        })
        .collect()
}

fn rising(timeframe: Timeframe, n: usize) -> Vec<Candle> {
    bars(timeframe, &(0..n).map(|i| 1.20 + i as f64 * 0.0005).collect::<Vec<_>>())
}

fn falling(timeframe: Timeframe, n: usize) -> Vec<Candle> {
    bars(timeframe, &(0..n).map(|i| 1.40 - i as f64 * 0.0005).collect::<Vec<_>>())
}

/// Uptrend whose final bar collapses under the recent range: MAs stay
/// bullish but the structure prints a lower high and lower low.
fn breakdown(timeframe: Timeframe) -> Vec<Candle> {
    let mut candles = rising(timeframe, 240);
    let last = candles[candles.len() - 1].clone();
    let top = last.close;
    candles.push(Candle::new(
        last.timestamp + timeframe.duration(),
        top - 0.016,
        top - 0.015,
        top - 0.0201,
        top - 0.020,
        1000.0,
    ));
    candles
}

/// Flat M15 dojis with two matching swing lows at 1.2695.
fn equal_lows_m15() -> Vec<Candle> {
    let step = Timeframe::M15.duration();
    let start = now() - step * 120;
    (0..120)
        .map(|i| {
            let low = if i == 40 || i == 80 { 1.2695 } else { 1.2698 };
            Candle::new(start + step * i, 1.2700, 1.2705, low, 1.2700, 500.0)
        })
        .collect()
}

/// GBP beats on two releases, US unemployment rises: score gap +4.5.
fn gbp_stronger_events() -> MemoryEvents {
    let at = Utc.with_ymd_and_hms(2024, 6, 3, 8, 30, 0).unwrap();
    MemoryEvents::new(vec![
        EconomicEvent::new(at, "GBP", NewsImpact::High, "Retail Sales m/m").with_values(Some("1.0%"), Some("0.5%")),
        EconomicEvent::new(at, "GBP", NewsImpact::High, "Services PMI").with_values(Some("52.0"), Some("51.5")),
        EconomicEvent::new(at, "USD", NewsImpact::High, "Unemployment Rate").with_values(Some("4.5%"), Some("4.0%")),
    ])
}

fn bullish_market() -> MemoryCandles {
    MemoryCandles::new()
        .with(&gbpusd(), Timeframe::H4, rising(Timeframe::H4, 250))
        .with(&gbpusd(), Timeframe::H1, rising(Timeframe::H1, 250))
        .with(&gbpusd(), Timeframe::M15, equal_lows_m15())
}

fn prices(price: f64) -> FixedPrices {
    FixedPrices::new().with(&gbpusd(), price)
}

fn approx(a: f64, b: f64) {
    assert!((a - b).abs() < 1e-9, "{a} != {b}");
}

// ── Full pipeline ────────────────────────────────────────────────────

#[test]
fn gbpusd_long_setup_is_generated_and_enriched() {
    let config = BotConfig::default();
    let events = gbp_stronger_events();
    let candles = bullish_market();
    let quotes = prices(1.2700);
    let generator = SignalGenerator::new(&config, &events, &candles, &quotes);

    let decision = generator.evaluate_at(&gbpusd(), now()).unwrap();
    let SignalDecision::Signal(signal) = decision else {
        panic!("expected a signal, got {decision:?}");
    };
    let signal = *signal;

    assert_eq!(signal.direction, TradeDirection::Long);
    assert_eq!(signal.status, SignalStatus::Pending);
    assert_eq!(signal.fundamental.strength, SignalStrength::Moderate);
    assert!((signal.fundamental.score_diff() - 4.5).abs() < 1e-9);
    assert_eq!(signal.trend_h4.direction, TrendDirection::Bullish);
    assert_eq!(signal.trend_h1.direction, TrendDirection::Bullish);
    // (3 + 5 + 0.5 * 5) / 3 = 3.5
    assert_eq!(signal.strength, SignalStrength::Strong);
    assert_eq!(signal.liquidity_zones.len(), 1);
    let zone = signal.entry_zone.clone().unwrap();
    assert_eq!(zone.zone_type, ZoneType::EqualLows);
    approx(zone.price_level, 1.2695);
    assert_eq!(signal.expires_at, now() + Duration::minutes(240));
    assert!(signal.stop_loss.is_none());

    let enriched = enrich_signal(signal, &config.risk).unwrap();
    approx(enriched.levels.stop_loss, 1.2690);
    approx(enriched.levels.take_profit_1, 1.2710);
    approx(enriched.levels.take_profit_2, 1.2720);
    approx(enriched.levels.take_profit_3, 1.2730);
    assert!((enriched.position.position_size_lots - 1.0).abs() < 1e-9);
    assert!(enriched.signal.is_enriched());
    assert_eq!(enriched.signal.risk_reward, Some(3.0));
    assert_eq!(enriched.signal.stop_loss, Some(enriched.levels.stop_loss));
}

#[test]
fn generate_returns_the_same_signal() {
    let config = BotConfig::default();
    let events = gbp_stronger_events();
    let candles = bullish_market();
    let quotes = prices(1.2700);
    let generator = SignalGenerator::new(&config, &events, &candles, &quotes);
    let a = generator.evaluate_at(&gbpusd(), now()).unwrap().into_signal().unwrap();
    let b = generator.evaluate_at(&gbpusd(), now()).unwrap().into_signal().unwrap();
    assert_eq!(a.id, b.id);
}

#[test]
fn generate_on_the_wall_clock_ignores_past_news() {
    let config = BotConfig::default();
    let events = gbp_stronger_events();
    let candles = bullish_market();
    let quotes = prices(1.2700);
    let generator = SignalGenerator::new(&config, &events, &candles, &quotes);
    assert!(generator.generate(&gbpusd()).unwrap().is_none());
}

// ── Gate rejections ──────────────────────────────────────────────────

fn decide(events: &MemoryEvents, candles: &MemoryCandles, price: f64) -> SignalDecision {
    let config = BotConfig::default();
    let quotes = prices(price);
    SignalGenerator::new(&config, events, candles, &quotes)
        .evaluate_at(&gbpusd(), now())
        .unwrap()
}

#[test]
fn no_news_means_no_signal() {
    let decision = decide(&MemoryEvents::default(), &bullish_market(), 1.2700);
    assert_eq!(decision, SignalDecision::NoSignal(GateRejection::NoFundamentalSignal));
}

#[test]
fn weak_news_is_rejected() {
    let at = Utc.with_ymd_and_hms(2024, 6, 3, 8, 30, 0).unwrap();
    // One event, gap 1.5 scaled by 1/3 = 0.5.
    let events = MemoryEvents::new(vec![
        EconomicEvent::new(at, "GBP", NewsImpact::High, "GDP q/q").with_values(Some("0.8%"), Some("0.3%")),
    ]);
    let decision = decide(&events, &bullish_market(), 1.2700);
    assert!(matches!(
        decision,
        SignalDecision::NoSignal(GateRejection::FundamentalTooWeak { .. })
    ));
}

#[test]
fn sideways_h4_blocks_everything_else() {
    let candles = MemoryCandles::new()
        .with(&gbpusd(), Timeframe::H4, breakdown(Timeframe::H4))
        .with(&gbpusd(), Timeframe::H1, rising(Timeframe::H1, 250))
        .with(&gbpusd(), Timeframe::M15, equal_lows_m15());
    let config = BotConfig::default();
    let events = gbp_stronger_events();
    let quotes = prices(1.2700);
    let generator = SignalGenerator::new(&config, &events, &candles, &quotes);
    assert_eq!(
        generator.evaluate_at(&gbpusd(), now()).unwrap(),
        SignalDecision::NoSignal(GateRejection::H4Sideways)
    );
    assert!(generator
        .evaluate_at(&gbpusd(), now())
        .unwrap()
        .into_signal()
        .is_none());
}

#[test]
fn h1_must_confirm_h4() {
    let candles = MemoryCandles::new()
        .with(&gbpusd(), Timeframe::H4, rising(Timeframe::H4, 250))
        .with(&gbpusd(), Timeframe::H1, falling(Timeframe::H1, 250))
        .with(&gbpusd(), Timeframe::M15, equal_lows_m15());
    let decision = decide(&gbp_stronger_events(), &candles, 1.2700);
    assert_eq!(
        decision,
        SignalDecision::NoSignal(GateRejection::TimeframesDisagree {
            h4: TrendDirection::Bullish,
            h1: TrendDirection::Bearish,
        })
    );
}

#[test]
fn bearish_trend_against_bullish_news_is_not_aligned() {
    let candles = MemoryCandles::new()
        .with(&gbpusd(), Timeframe::H4, falling(Timeframe::H4, 250))
        .with(&gbpusd(), Timeframe::H1, falling(Timeframe::H1, 250))
        .with(&gbpusd(), Timeframe::M15, equal_lows_m15());
    let decision = decide(&gbp_stronger_events(), &candles, 1.2700);
    assert!(matches!(
        decision,
        SignalDecision::NoSignal(GateRejection::NotAligned { .. })
    ));
}

#[test]
fn zones_far_from_price_are_rejected() {
    let decision = decide(&gbp_stronger_events(), &bullish_market(), 1.3500);
    assert_eq!(
        decision,
        SignalDecision::NoSignal(GateRejection::NoZonesNearPrice { price: 1.3500, zones: 1 })
    );
}

#[test]
fn missing_candles_are_an_error_not_a_rejection() {
    let candles = MemoryCandles::new().with(&gbpusd(), Timeframe::H4, rising(Timeframe::H4, 250));
    let config = BotConfig::default();
    let events = gbp_stronger_events();
    let quotes = prices(1.2700);
    let generator = SignalGenerator::new(&config, &events, &candles, &quotes);
    assert!(generator.evaluate_at(&gbpusd(), now()).is_err());
}

// ── Liquidity clustering ─────────────────────────────────────────────

#[test]
fn three_close_swing_highs_form_one_zone() {
    let step = Timeframe::M15.duration();
    let t0 = now() - step * 100;
    let candles: Vec<Candle> = (0..100)
        .map(|i| {
            let high = match i {
                20 => 1.2700,
                50 => 1.2702,
                80 => 1.2699,
                _ => 1.2690,
            };
            Candle::new(t0 + step * i, 1.2685, high, 1.2680, 1.2685, 100.0)
        })
        .collect();
    let config = LiquidityConfig::default();
    let data = BotConfig::default().data;
    let source = MemoryCandles::new();
    let zones = LiquidityZoneDetector::new(&config, &data, &source).detect_in(&candles);
    assert_eq!(zones.len(), 1);
    assert_eq!(zones[0].zone_type, ZoneType::EqualHighs);
    assert_eq!(zones[0].price_range, (1.2699, 1.2702));
    assert_eq!(zones[0].touches, 3);
    assert_eq!(zones[0].strength, 3);
}
