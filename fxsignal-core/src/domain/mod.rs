//! Domain types for fxsignal

pub mod candle;
pub mod event;
pub mod pair;
pub mod strength;
pub mod timeframe;

pub use candle::{Candle, CandleError};
pub use event::{EconomicEvent, NewsImpact};
pub use pair::{CurrencyPair, PairError, LOT_UNITS};
pub use strength::{SignalStrength, TradeDirection, TrendDirection};
pub use timeframe::Timeframe;
