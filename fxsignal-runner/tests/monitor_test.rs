//! Position monitor driven by scripted quotes.

use chrono::{Duration, TimeZone, Utc};
use fxsignal_core::config::BotConfig;
use fxsignal_core::data::{DataError, MemoryCandles, PriceSource};
use fxsignal_core::domain::{Candle, CurrencyPair, Timeframe, TradeDirection};
use fxsignal_core::risk::{OpenPosition, TrailingPhase};
use fxsignal_runner::{CloseReason, CollectingNotifier, MonitorEvent, PollingVenue, PositionMonitor};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::AtomicBool;
use std::sync::Mutex;

// ── Helpers ──────────────────────────────────────────────────────────

/// Hands out queued quotes per pair, repeating the last one.
#[derive(Default)]
struct ScriptedPrices {
    quotes: Mutex<HashMap<CurrencyPair, VecDeque<f64>>>,
}

impl ScriptedPrices {
    fn with(self, pair: &CurrencyPair, quotes: &[f64]) -> Self {
        self.quotes
            .lock()
            .unwrap()
            .insert(pair.clone(), quotes.iter().copied().collect());
        self
    }
}

impl PriceSource for ScriptedPrices {
    fn current_price(&self, pair: &CurrencyPair) -> Result<f64, DataError> {
        let mut quotes = self.quotes.lock().unwrap();
        let queue = quotes.get_mut(pair).ok_or_else(|| DataError::SymbolNotFound {
            symbol: pair.to_string(),
        })?;
        let price = *queue.front().ok_or_else(|| DataError::Parse("no quotes".into()))?;
        if queue.len() > 1 {
            queue.pop_front();
        }
        Ok(price)
    }
}

fn gbpusd() -> CurrencyPair {
    "GBP/USD".parse().unwrap()
}

fn long_position(take_profits: [f64; 3]) -> OpenPosition {
    OpenPosition::new(
        "gbpusd-long",
        gbpusd(),
        TradeDirection::Long,
        1.2700,
        1.2690,
        take_profits,
        1.0,
        Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap(),
    )
}

// ── Lifecycle ────────────────────────────────────────────────────────

#[test]
fn long_position_runs_to_final_target() {
    let config = BotConfig::default();
    let prices = ScriptedPrices::default().with(&gbpusd(), &[1.27095, 1.2716, 1.2735]);
    let venue = PollingVenue::new(&prices);
    let notifier = CollectingNotifier::new();
    let monitor = PositionMonitor::new(&config, &venue, &notifier);
    monitor.open(long_position([1.2710, 1.2720, 1.2730]));

    let first = monitor.check_all();
    assert_eq!(first.len(), 1);
    assert!(matches!(&first[0], MonitorEvent::StopMoved(u) if u.phase == TrailingPhase::Breakeven));

    let second = monitor.check_all();
    assert!(matches!(second[0], MonitorEvent::TakeProfitHit { level: 1, .. }));
    assert!(matches!(&second[1], MonitorEvent::StopMoved(u) if u.phase == TrailingPhase::LockedOneR));
    assert!((monitor.positions()[0].current_stop() - 1.2710).abs() < 1e-9);

    let third = monitor.check_all();
    assert_eq!(third.len(), 3);
    assert!(matches!(third[0], MonitorEvent::TakeProfitHit { level: 2, .. }));
    assert!(matches!(third[1], MonitorEvent::TakeProfitHit { level: 3, .. }));
    assert!(matches!(
        third[2],
        MonitorEvent::Closed {
            reason: CloseReason::FinalTarget,
            ..
        }
    ));
    assert!(monitor.is_empty());
    assert_eq!(notifier.messages().len(), 6);
}

#[test]
fn stop_hit_closes_short() {
    let config = BotConfig::default();
    let usdjpy: CurrencyPair = "USD/JPY".parse().unwrap();
    let prices = ScriptedPrices::default().with(&usdjpy, &[150.20, 150.60]);
    let venue = PollingVenue::new(&prices);
    let notifier = CollectingNotifier::new();
    let monitor = PositionMonitor::new(&config, &venue, &notifier);
    monitor.open(OpenPosition::new(
        "usdjpy-short",
        usdjpy,
        TradeDirection::Short,
        150.00,
        150.50,
        [149.50, 149.00, 148.50],
        0.5,
        Utc::now(),
    ));

    assert!(monitor.check_all().is_empty());
    let events = monitor.check_all();
    assert!(matches!(events[0], MonitorEvent::StopHit { .. }));
    assert!(matches!(
        events[1],
        MonitorEvent::Closed {
            reason: CloseReason::StopLoss,
            ..
        }
    ));
    assert!(monitor.is_empty());
    assert!(notifier.messages()[0].contains("Stop hit"));
}

#[test]
fn trailing_uses_h1_ema_when_candles_exist() {
    let config = BotConfig::default();
    let t0 = Utc.with_ymd_and_hms(2024, 6, 3, 0, 0, 0).unwrap();
    let h1: Vec<Candle> = (0..60)
        .map(|i| Candle::new(t0 + Duration::hours(i), 1.2750, 1.2752, 1.2748, 1.2750, 100.0))
        .collect();
    let candles = MemoryCandles::new().with(&gbpusd(), Timeframe::H1, h1);
    let prices = ScriptedPrices::default().with(&gbpusd(), &[1.2760]);
    let venue = PollingVenue::new(&prices);
    let notifier = CollectingNotifier::new();
    let monitor = PositionMonitor::new(&config, &venue, &notifier).with_candles(&candles);
    monitor.open(long_position([1.2800, 1.2900, 1.3000]));

    let events = monitor.check_all();
    let MonitorEvent::StopMoved(update) = &events[0] else {
        panic!("expected a stop move, got {events:?}");
    };
    assert_eq!(update.phase, TrailingPhase::Trailing);
    // EMA 1.2750 less a 10 pip offset.
    assert!((update.new_stop - 1.2740).abs() < 1e-6);
    assert!(update.reason.contains("EMA(20)"));
}

#[test]
fn price_outage_skips_position() {
    let config = BotConfig::default();
    let prices = ScriptedPrices::default();
    let venue = PollingVenue::new(&prices);
    let notifier = CollectingNotifier::new();
    let monitor = PositionMonitor::new(&config, &venue, &notifier);
    monitor.open(long_position([1.2710, 1.2720, 1.2730]));
    assert!(monitor.check_all().is_empty());
    assert_eq!(monitor.len(), 1);
}

// ── Run loop ─────────────────────────────────────────────────────────

#[test]
fn run_honours_shutdown_and_iteration_limit() {
    let config = BotConfig::default();
    let prices = ScriptedPrices::default().with(&gbpusd(), &[1.2702]);
    let venue = PollingVenue::new(&prices);
    let notifier = CollectingNotifier::new();
    let monitor = PositionMonitor::new(&config, &venue, &notifier);
    monitor.open(long_position([1.2710, 1.2720, 1.2730]));

    let stop = AtomicBool::new(true);
    assert_eq!(monitor.run(&stop, std::time::Duration::ZERO, None), 0);

    let running = AtomicBool::new(false);
    assert_eq!(monitor.run(&running, std::time::Duration::ZERO, Some(3)), 3);
    assert_eq!(monitor.len(), 1);
}
