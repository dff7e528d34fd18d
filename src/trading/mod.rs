//! Trading module
//! Price decisions, sizing, order lifecycle, and exit management

pub mod break_even;
pub mod context;
pub mod engine;
pub mod errors;
pub mod exit_plan;
pub mod lifecycle;
pub mod orderbook;
pub mod plan_store;
pub mod position;
pub mod price_engine;
pub mod rules;
pub mod signal;
pub mod sizing;

pub use break_even::{BreakEvenMonitor, BreakEvenOutcome};
pub use context::TickContext;
pub use engine::{EngineSettings, TickAction, TickReport, TradingEngine};
pub use errors::TradingError;
pub use exit_plan::{ExitLadderConfig, ExitLeg, ExitPlan};
pub use lifecycle::{LifecycleConfig, LifecycleState, OrderLifecycleManager};
pub use orderbook::{BookTicker, OrderBookSnapshot};
pub use plan_store::PlanStore;
pub use position::{Position, PositionSide};
pub use price_engine::{PriceDecision, PriceDecisionEngine, Regime, Role};
pub use rules::{adjust_to_tick, floor_to_step, ExchangeRules, ExchangeRulesCache};
pub use signal::{JsonFileSignalSource, Signal, SignalRecord, SignalSource};
pub use sizing::{PositionSizer, SizingDecision, SizingState};
