//! Analyzers and the signal gate that composes them.

pub mod fundamental;
pub mod liquidity;
pub mod signal;
pub mod trend;

pub use fundamental::{FundamentalAnalyzer, FundamentalDirection, FundamentalSignal};
pub use liquidity::{LiquidityZone, LiquidityZoneDetector, ZoneType};
pub use signal::{
    GateRejection, SignalDecision, SignalGenerator, SignalStatus, TradingSignal,
};
pub use trend::{MultiTimeframeTrend, TrendAnalysis, TrendDetector};

use crate::data::DataError;
use crate::domain::Timeframe;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("insufficient data for {pair} {timeframe}: need {required} bars, got {available}")]
    InsufficientData {
        pair: String,
        timeframe: Timeframe,
        required: usize,
        available: usize,
    },

    #[error("invalid signal transition from {from:?} to {to:?}")]
    InvalidSignalTransition {
        from: SignalStatus,
        to: SignalStatus,
    },
}

impl AnalysisError {
    /// Upstream failures that a later cycle may not hit again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AnalysisError::Data(e) if e.is_retryable())
    }
}
