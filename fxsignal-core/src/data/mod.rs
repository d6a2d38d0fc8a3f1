//! Data sources: collaborator contracts, resilience helpers, and providers.

pub mod calendar;
pub mod circuit_breaker;
pub mod csv_file;
pub mod ingest;
pub mod memory;
pub mod provider;
pub mod retry;
pub mod synthetic;
pub mod yahoo;

pub use calendar::CalendarFeed;
pub use circuit_breaker::CircuitBreaker;
pub use csv_file::CsvCandleSource;
pub use memory::{FixedPrices, MemoryCandles, MemoryEvents};
pub use provider::{load_candles, CandleSource, DataError, EventSource, PriceSource};
pub use retry::RetryPolicy;
pub use synthetic::SyntheticCandles;
pub use yahoo::YahooProvider;
