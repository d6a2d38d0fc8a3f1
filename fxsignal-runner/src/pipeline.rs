//! One analysis cycle across pairs.
//!
//! The day's calendar is fetched once per cycle, then pairs run
//! gate → enrichment on their own rayon tasks against that snapshot. A
//! failing pair becomes a [`PairOutcome::Failed`] entry and never affects
//! the others.

use crate::messages;
use crate::monitor::PositionMonitor;
use crate::notify::Notifier;
use crate::reaction::{Reaction, ReactionChecker, ReactionOutcome};
use chrono::{DateTime, Utc};
use fxsignal_core::analysis::{FundamentalAnalyzer, GateRejection, SignalDecision, SignalGenerator, SignalStatus};
use fxsignal_core::config::BotConfig;
use fxsignal_core::data::circuit_breaker::BreakerState;
use fxsignal_core::data::{CandleSource, CircuitBreaker, DataError, EventSource, MemoryEvents, PriceSource};
use fxsignal_core::domain::CurrencyPair;
use fxsignal_core::{enrich_signal, AnalysisError, EnrichedSignal, RiskError};
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("analysis failed for {pair}: {source}")]
    Analysis {
        pair: CurrencyPair,
        #[source]
        source: AnalysisError,
    },

    #[error("enrichment failed for {pair}: {source}")]
    Risk {
        pair: CurrencyPair,
        #[source]
        source: RiskError,
    },

    #[error("economic calendar unavailable: {0}")]
    Events(#[source] DataError),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl CycleError {
    pub fn is_retryable(&self) -> bool {
        match self {
            CycleError::Analysis { source, .. } => source.is_retryable(),
            CycleError::Events(source) => source.is_retryable(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PairOutcome {
    Signal(Box<EnrichedSignal>),
    NoSignal {
        pair: CurrencyPair,
        reason: GateRejection,
    },
    Failed {
        pair: CurrencyPair,
        error: String,
        retryable: bool,
    },
}

impl PairOutcome {
    pub fn pair(&self) -> &CurrencyPair {
        match self {
            PairOutcome::Signal(s) => &s.signal.pair,
            PairOutcome::NoSignal { pair, .. } | PairOutcome::Failed { pair, .. } => pair,
        }
    }

    fn failed(pair: &CurrencyPair, error: &CycleError) -> Self {
        PairOutcome::Failed {
            pair: pair.clone(),
            error: error.to_string(),
            retryable: error.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<PairOutcome>,
    pub notify_failures: usize,
}

impl CycleReport {
    pub fn signals(&self) -> impl Iterator<Item = &EnrichedSignal> {
        self.outcomes.iter().filter_map(|o| match o {
            PairOutcome::Signal(s) => Some(s.as_ref()),
            _ => None,
        })
    }

    pub fn signal_count(&self) -> usize {
        self.signals().count()
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, PairOutcome::Failed { .. }))
            .count()
    }
}

/// Collaborators one cycle reads from.
#[derive(Clone, Copy)]
pub struct Sources<'a> {
    pub events: &'a dyn EventSource,
    pub candles: &'a dyn CandleSource,
    pub prices: &'a dyn PriceSource,
}

pub struct Runner<'a> {
    config: &'a BotConfig,
    sources: Sources<'a>,
    notifier: &'a dyn Notifier,
    threads: Option<usize>,
    send_summary: bool,
    breaker: Option<Arc<CircuitBreaker>>,
}

impl<'a> Runner<'a> {
    pub fn new(config: &'a BotConfig, sources: Sources<'a>, notifier: &'a dyn Notifier) -> Self {
        Self {
            config,
            sources,
            notifier,
            threads: None,
            send_summary: false,
            breaker: None,
        }
    }

    /// Run pairs on a private pool of `threads` workers instead of the global one.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = (threads > 0).then_some(threads);
        self
    }

    pub fn with_summary(mut self, send_summary: bool) -> Self {
        self.send_summary = send_summary;
        self
    }

    /// Alert through the notifier when `breaker` trips during a cycle.
    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn run_cycle(&self, pairs: &[CurrencyPair]) -> Result<CycleReport, CycleError> {
        self.run_cycle_at(pairs, Utc::now())
    }

    pub fn run_cycle_at(&self, pairs: &[CurrencyPair], now: DateTime<Utc>) -> Result<CycleReport, CycleError> {
        let started_at = Utc::now();
        tracing::info!(pairs = pairs.len(), threads = ?self.threads, "analysis cycle started");
        let breaker_was_open = self.breaker_open();

        let analyzer = FundamentalAnalyzer::new(&self.config.fundamental);
        let outcomes: Vec<PairOutcome> = match analyzer.fetch_today(pairs, self.sources.events, now) {
            Ok(events) => {
                tracing::debug!(source = self.sources.events.name(), events = events.len(), "calendar fetched for cycle");
                let snapshot = MemoryEvents::new(events);
                let evaluate = |p: &CurrencyPair| self.evaluate_with(p, &snapshot, now);
                match self.threads {
                    Some(n) => {
                        let pool = rayon::ThreadPoolBuilder::new().num_threads(n).build()?;
                        pool.install(|| pairs.par_iter().map(evaluate).collect())
                    }
                    None => pairs.par_iter().map(evaluate).collect(),
                }
            }
            Err(source) => {
                let error = CycleError::Events(source);
                tracing::warn!(error = %error, retryable = error.is_retryable(), "calendar fetch failed, no pair can pass the news gate");
                pairs.iter().map(|p| PairOutcome::failed(p, &error)).collect()
            }
        };

        let mut report = CycleReport {
            started_at,
            finished_at: Utc::now(),
            outcomes,
            notify_failures: 0,
        };

        let mut rendered: Vec<String> = report.signals().map(messages::signal_ready).collect();
        rendered.extend(failure_alerts(&report.outcomes));
        if !breaker_was_open && self.breaker_open() {
            let remaining = self.breaker.as_ref().map_or(0, |b| b.remaining_cooldown().as_secs());
            rendered.push(messages::error_alert(
                "data provider circuit breaker tripped",
                &format!("requests blocked for {remaining}s"),
            ));
        }
        if self.send_summary {
            rendered.push(messages::cycle_summary(&report));
        }
        report.notify_failures = self.send_all(&rendered);

        tracing::info!(
            signals = report.signal_count(),
            failures = report.failure_count(),
            notify_failures = report.notify_failures,
            "analysis cycle finished"
        );
        Ok(report)
    }

    /// Check every pending signal in `report` against the market. Confirmed
    /// signals are handed to `monitor` and marked active once it tracks them;
    /// each outcome is announced through the notifier.
    pub fn confirm_signals(
        &self,
        report: &mut CycleReport,
        monitor: &PositionMonitor<'_>,
        now: DateTime<Utc>,
    ) -> Vec<Reaction> {
        let checker = ReactionChecker::new(self.sources.prices, self.config.signal.reaction_tolerance_pct);
        let mut reactions = Vec::new();
        let mut rendered = Vec::new();
        for outcome in &mut report.outcomes {
            let PairOutcome::Signal(enriched) = outcome else {
                continue;
            };
            if enriched.signal.status != SignalStatus::Pending {
                continue;
            }
            let reaction = match checker.check(&mut enriched.signal, now) {
                Ok(reaction) => reaction,
                Err(e) => {
                    tracing::warn!(signal = %enriched.signal.id, pair = %enriched.signal.pair, error = %e, "reaction check failed");
                    rendered.push(messages::error_alert(&format!("reaction check for {}", enriched.signal.pair), &e));
                    continue;
                }
            };
            rendered.push(messages::reaction(enriched, &reaction));

            let mut position_id = None;
            if matches!(reaction, ReactionOutcome::Confirmed { .. }) {
                match monitor.open_from_signal(enriched, now) {
                    Ok(Some(id)) => {
                        if let Err(e) = enriched.signal.transition(SignalStatus::Active) {
                            tracing::warn!(signal = %enriched.signal.id, error = %e, "could not mark signal active");
                        }
                        position_id = Some(id);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(signal = %enriched.signal.id, error = %e, "could not open position");
                        rendered.push(messages::error_alert(&format!("opening {}", enriched.signal.pair), &e));
                    }
                }
            }
            reactions.push(Reaction {
                signal_id: enriched.signal.id.clone(),
                pair: enriched.signal.pair.clone(),
                outcome: reaction,
                position_id,
            });
        }
        report.notify_failures += self.send_all(&rendered);
        tracing::info!(
            checked = reactions.len(),
            opened = reactions.iter().filter(|r| r.position_id.is_some()).count(),
            "reaction check finished"
        );
        reactions
    }

    /// Gate, then enrich, fetching events for this pair alone. Never panics
    /// on a bad pair; every failure is data.
    pub fn evaluate_pair(&self, pair: &CurrencyPair, now: DateTime<Utc>) -> PairOutcome {
        self.evaluate_with(pair, self.sources.events, now)
    }

    fn evaluate_with(&self, pair: &CurrencyPair, events: &dyn EventSource, now: DateTime<Utc>) -> PairOutcome {
        match self.try_evaluate(pair, events, now) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(pair = %pair, error = %e, retryable = e.is_retryable(), "pair analysis failed");
                PairOutcome::failed(pair, &e)
            }
        }
    }

    fn try_evaluate(
        &self,
        pair: &CurrencyPair,
        events: &dyn EventSource,
        now: DateTime<Utc>,
    ) -> Result<PairOutcome, CycleError> {
        let generator = SignalGenerator::new(self.config, events, self.sources.candles, self.sources.prices);
        let decision = generator
            .evaluate_at(pair, now)
            .map_err(|source| CycleError::Analysis {
                pair: pair.clone(),
                source,
            })?;
        match decision {
            SignalDecision::NoSignal(reason) => Ok(PairOutcome::NoSignal {
                pair: pair.clone(),
                reason,
            }),
            SignalDecision::Signal(signal) => {
                let enriched = enrich_signal(*signal, &self.config.risk).map_err(|source| CycleError::Risk {
                    pair: pair.clone(),
                    source,
                })?;
                Ok(PairOutcome::Signal(Box::new(enriched)))
            }
        }
    }

    fn breaker_open(&self) -> bool {
        self.breaker
            .as_ref()
            .is_some_and(|b| matches!(b.state(), BreakerState::Open { .. }))
    }

    /// Send in order, returning how many could not be delivered.
    fn send_all(&self, messages: &[String]) -> usize {
        let mut failures = 0;
        for message in messages {
            if let Err(e) = self.notifier.send(message) {
                tracing::error!(notifier = self.notifier.name(), error = %e, "notification failed");
                failures += 1;
            }
        }
        failures
    }
}

/// One alert per distinct failure, naming every pair it hit.
fn failure_alerts(outcomes: &[PairOutcome]) -> Vec<String> {
    let mut grouped: Vec<(&str, Vec<String>)> = Vec::new();
    for outcome in outcomes {
        let PairOutcome::Failed { pair, error, .. } = outcome else {
            continue;
        };
        match grouped.iter_mut().find(|(e, _)| *e == error.as_str()) {
            Some((_, pairs)) => pairs.push(pair.to_string()),
            None => grouped.push((error.as_str(), vec![pair.to_string()])),
        }
    }
    grouped
        .into_iter()
        .map(|(error, pairs)| messages::error_alert(&format!("analysis failed: {}", pairs.join(", ")), &error))
        .collect()
}
