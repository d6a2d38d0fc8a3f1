//! fxsignal core: domain types, analyzers, signal gating, risk management
//! and the data-source contracts they consume.
//!
//! - Fundamental, trend and liquidity analyzers
//! - Five-gate signal composition with first-class "no signal" outcomes
//! - Position sizing, stop/target ladder, ratcheting trailing stops
//! - Candle/event/price source traits plus HTTP, CSV and in-memory providers
//!
//! Configuration is one immutable [`config::BotConfig`] passed by reference.

pub mod analysis;
pub mod config;
pub mod data;
pub mod domain;
pub mod indicators;
pub mod risk;

pub use analysis::{AnalysisError, SignalDecision, SignalGenerator, TradingSignal};
pub use config::{BotConfig, ConfigError};
pub use data::DataError;
pub use risk::{enrich_signal, EnrichedSignal, RiskError};
