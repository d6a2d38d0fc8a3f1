//! Polling monitor for assumed-open positions.
//!
//! Each position lives behind its own `Mutex` so one check pass can touch
//! different positions in parallel while a single position is only ever
//! updated by one writer.

use crate::messages;
use crate::notify::Notifier;
use chrono::{DateTime, Utc};
use fxsignal_core::config::BotConfig;
use fxsignal_core::data::{CandleSource, DataError, PriceSource};
use fxsignal_core::domain::{CurrencyPair, Timeframe, TradeDirection};
use fxsignal_core::indicators::last_ema;
use fxsignal_core::risk::{OpenPosition, TrailingStopManager, TrailingStopUpdate};
use fxsignal_core::EnrichedSignal;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// Source of fill and price confirmation.
///
/// The monitor trusts whatever this reports; [`PollingVenue`] simulates fills
/// from quotes, a broker adapter would report real ones.
pub trait ExecutionVenue: Send + Sync {
    fn name(&self) -> &str;

    fn current_price(&self, pair: &CurrencyPair) -> Result<f64, DataError>;

    /// Whether the entry for `position` has been filled.
    fn entry_filled(&self, position: &OpenPosition) -> Result<bool, DataError>;
}

/// Assumes a fill at the signal's entry as soon as a quote is available.
pub struct PollingVenue<'a> {
    prices: &'a dyn PriceSource,
}

impl<'a> PollingVenue<'a> {
    pub fn new(prices: &'a dyn PriceSource) -> Self {
        Self { prices }
    }
}

impl ExecutionVenue for PollingVenue<'_> {
    fn name(&self) -> &str {
        "polling"
    }

    fn current_price(&self, pair: &CurrencyPair) -> Result<f64, DataError> {
        self.prices.current_price(pair)
    }

    fn entry_filled(&self, position: &OpenPosition) -> Result<bool, DataError> {
        self.prices.current_price(&position.pair).map(|_| true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    StopLoss,
    FinalTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    TakeProfitHit {
        position_id: String,
        pair: CurrencyPair,
        direction: TradeDirection,
        level: u8,
        target: f64,
        price: f64,
    },
    StopMoved(TrailingStopUpdate),
    StopHit {
        position_id: String,
        pair: CurrencyPair,
        direction: TradeDirection,
        stop: f64,
        price: f64,
        r_multiple: f64,
    },
    Closed {
        position_id: String,
        pair: CurrencyPair,
        reason: CloseReason,
    },
}

pub struct PositionMonitor<'a> {
    config: &'a BotConfig,
    venue: &'a dyn ExecutionVenue,
    candles: Option<&'a dyn CandleSource>,
    notifier: &'a dyn Notifier,
    positions: RwLock<HashMap<String, Arc<Mutex<OpenPosition>>>>,
}

impl<'a> PositionMonitor<'a> {
    pub fn new(config: &'a BotConfig, venue: &'a dyn ExecutionVenue, notifier: &'a dyn Notifier) -> Self {
        Self {
            config,
            venue,
            candles: None,
            notifier,
            positions: RwLock::new(HashMap::new()),
        }
    }

    /// Use an H1 EMA from `candles` as the trailing reference.
    pub fn with_candles(mut self, candles: &'a dyn CandleSource) -> Self {
        self.candles = Some(candles);
        self
    }

    pub fn open(&self, position: OpenPosition) -> String {
        let id = position.id.clone();
        tracing::info!(
            position = %id,
            pair = %position.pair,
            direction = %position.direction,
            entry = position.entry_price,
            stop = position.initial_stop,
            "tracking position"
        );
        self.positions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id.clone(), Arc::new(Mutex::new(position)));
        id
    }

    /// Start tracking an enriched signal once the venue reports its fill.
    pub fn open_from_signal(&self, enriched: &EnrichedSignal, now: DateTime<Utc>) -> Result<Option<String>, DataError> {
        let position = OpenPosition::from_enriched(enriched, now);
        if !self.venue.entry_filled(&position)? {
            tracing::info!(position = %position.id, venue = self.venue.name(), "entry not filled yet");
            return Ok(None);
        }
        Ok(Some(self.open(position)))
    }

    pub fn len(&self) -> usize {
        self.positions.read().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies of every tracked position.
    pub fn positions(&self) -> Vec<OpenPosition> {
        let guard = self.positions.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut out: Vec<OpenPosition> = guard
            .values()
            .map(|p| p.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone())
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub fn check_all(&self) -> Vec<MonitorEvent> {
        self.check_all_at(Utc::now())
    }

    /// One pass over every position. Closed positions are dropped and every
    /// event is rendered and sent.
    pub fn check_all_at(&self, now: DateTime<Utc>) -> Vec<MonitorEvent> {
        let snapshot: Vec<Arc<Mutex<OpenPosition>>> = self
            .positions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .cloned()
            .collect();

        let mut events: Vec<MonitorEvent> = snapshot
            .par_iter()
            .flat_map_iter(|p| self.check_position(p, now))
            .collect();
        events.sort_by_key(|e| event_position_id(e).to_string());

        let closed: Vec<&str> = events
            .iter()
            .filter_map(|e| match e {
                MonitorEvent::Closed { position_id, .. } => Some(position_id.as_str()),
                _ => None,
            })
            .collect();
        if !closed.is_empty() {
            let mut guard = self.positions.write().unwrap_or_else(|poisoned| poisoned.into_inner());
            for id in closed {
                guard.remove(id);
            }
        }

        for event in &events {
            if let Err(e) = self.notifier.send(&messages::monitor_event(event)) {
                tracing::error!(notifier = self.notifier.name(), error = %e, "notification failed");
            }
        }
        events
    }

    fn check_position(&self, position: &Mutex<OpenPosition>, now: DateTime<Utc>) -> Vec<MonitorEvent> {
        let mut pos = position.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let price = match self.venue.current_price(&pos.pair) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(position = %pos.id, pair = %pos.pair, error = %e, "price unavailable, skipping check");
                return Vec::new();
            }
        };

        let mut events = Vec::new();
        if pos.stop_hit(price) {
            events.push(MonitorEvent::StopHit {
                position_id: pos.id.clone(),
                pair: pos.pair.clone(),
                direction: pos.direction,
                stop: pos.current_stop(),
                price,
                r_multiple: pos.r_multiple(price),
            });
            events.push(MonitorEvent::Closed {
                position_id: pos.id.clone(),
                pair: pos.pair.clone(),
                reason: CloseReason::StopLoss,
            });
            return events;
        }

        for level in pos.mark_take_profits(price) {
            events.push(MonitorEvent::TakeProfitHit {
                position_id: pos.id.clone(),
                pair: pos.pair.clone(),
                direction: pos.direction,
                level,
                target: pos.take_profits[usize::from(level) - 1],
                price,
            });
        }
        if pos.fully_closed() {
            events.push(MonitorEvent::Closed {
                position_id: pos.id.clone(),
                pair: pos.pair.clone(),
                reason: CloseReason::FinalTarget,
            });
            return events;
        }

        let moving_average = self.trailing_reference(&pos.pair);
        let manager = TrailingStopManager::new(&self.config.trailing);
        if let Some(update) = manager.check(&mut pos, price, moving_average, now) {
            events.push(MonitorEvent::StopMoved(update));
        }
        events
    }

    fn trailing_reference(&self, pair: &CurrencyPair) -> Option<f64> {
        let candles = self.candles?;
        let period = self.config.trailing.ma_period;
        match candles.fetch_candles(pair, Timeframe::H1, period * 3) {
            Ok(series) => last_ema(&series, period),
            Err(e) => {
                tracing::debug!(pair = %pair, error = %e, "no candles for trailing EMA, using fixed percentage");
                None
            }
        }
    }

    /// Poll every `interval` until `shutdown` is set or `max_iterations`
    /// passes have run. Returns the number of passes.
    pub fn run(&self, shutdown: &AtomicBool, interval: Duration, max_iterations: Option<usize>) -> usize {
        let mut iteration = 0;
        loop {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            if max_iterations.is_some_and(|max| iteration >= max) {
                break;
            }
            let events = self.check_all();
            iteration += 1;
            tracing::debug!(iteration, events = events.len(), open = self.len(), "monitor pass");
            if self.is_empty() {
                tracing::info!("no open positions left, monitor stopping");
                break;
            }
            if max_iterations.is_some_and(|max| iteration >= max) {
                break;
            }
            sleep_unless_shutdown(shutdown, interval);
        }
        iteration
    }
}

fn event_position_id(event: &MonitorEvent) -> &str {
    match event {
        MonitorEvent::TakeProfitHit { position_id, .. }
        | MonitorEvent::StopHit { position_id, .. }
        | MonitorEvent::Closed { position_id, .. } => position_id,
        MonitorEvent::StopMoved(update) => &update.position_id,
    }
}

/// Sleep in short slices so a shutdown request is honoured promptly.
fn sleep_unless_shutdown(shutdown: &AtomicBool, interval: Duration) {
    let slice = Duration::from_millis(100);
    let mut waited = Duration::ZERO;
    while waited < interval && !shutdown.load(Ordering::Relaxed) {
        let step = slice.min(interval - waited);
        std::thread::sleep(step);
        waited += step;
    }
}
