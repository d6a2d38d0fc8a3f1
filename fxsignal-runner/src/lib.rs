//! fxsignal runner: analysis cycles, market-reaction checks, the position
//! monitor and notification sinks.
//!
//! Builds on `fxsignal-core`:
//! - Parallel per-pair cycles with isolated failures
//! - Pending-signal confirmation against the market
//! - Polling position monitor with ratcheting trailing stops
//! - Telegram, log and in-memory notifiers

pub mod messages;
pub mod monitor;
pub mod notify;
pub mod pipeline;
pub mod reaction;

pub use monitor::{CloseReason, ExecutionVenue, MonitorEvent, PollingVenue, PositionMonitor};
pub use notify::{CollectingNotifier, LogNotifier, Notifier, NotifyError, TelegramNotifier};
pub use pipeline::{CycleError, CycleReport, PairOutcome, Runner, Sources};
pub use reaction::{Reaction, ReactionChecker, ReactionOutcome};
