//! Futures Ladder - order execution and position risk engine
//!
//! Features:
//! - Signed REST gateway with mirror-host failover
//! - Maker/taker entry pricing from top-of-book depth
//! - Accumulation-counter position sizing
//! - Staged take-profit / stop-loss ladders
//! - One-shot break-even stop migration

pub mod api;
pub mod config;
pub mod trading;
pub mod utils;

// Re-export commonly used types
pub use api::{
    ApiError, Credentials, ExchangeGateway, FuturesExchange, FuturesRestClient, GatewayConfig, Side,
};
pub use config::Config;
pub use trading::{
    JsonFileSignalSource, PlanStore, PositionSizer, PriceDecisionEngine, Signal, SignalRecord,
    SignalSource, TickContext, TradingEngine, TradingError,
};
pub use utils::{BackoffPolicy, Clock, SystemClock};

/// Bot version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
