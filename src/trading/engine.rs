//! Per-tick orchestration for one symbol
//! Sizing, entry, exit maintenance and break-even, with every failure contained
//! to the symbol and tick it happened in.

use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

use crate::api::FuturesExchange;
use crate::trading::break_even::{BreakEvenMonitor, BreakEvenOutcome};
use crate::trading::context::TickContext;
use crate::trading::errors::TradingError;
use crate::trading::lifecycle::{log_transition, LifecycleConfig, LifecycleState, OrderLifecycleManager};
use crate::trading::plan_store::PlanStore;
use crate::trading::position::PositionSide;
use crate::trading::price_engine::PriceDecisionEngine;
use crate::trading::rules::{ExchangeRules, ExchangeRulesCache};
use crate::trading::signal::{Signal, SignalRecord, SignalSource};
use crate::trading::sizing::PositionSizer;
use crate::utils::Clock;

/// Engine tuning that is not per-symbol
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub extra_amount: f64,
    pub wall_ratio: f64,
    pub lifecycle: LifecycleConfig,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            extra_amount: 0.0,
            wall_ratio: crate::trading::price_engine::DEFAULT_WALL_RATIO,
            lifecycle: LifecycleConfig::default(),
        }
    }
}

/// What the signal step of a tick did
#[derive(Debug, Clone, PartialEq)]
pub enum TickAction {
    NoSignal,
    /// Signal already acted on
    Duplicate,
    Hold,
    Entered { side: PositionSide, price: f64, quantity: f64 },
    /// Sizing or exchange minimums produced no order
    Skipped { reason: String },
    Exited,
    Failed { category: &'static str, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub symbol: String,
    pub break_even: Option<BreakEvenOutcome>,
    /// Leftovers of a closed position were cleaned up
    pub cleaned_up: bool,
    pub action: TickAction,
}

pub struct TradingEngine {
    exchange: Arc<dyn FuturesExchange>,
    rules: ExchangeRulesCache,
    sizer: PositionSizer,
    lifecycle: OrderLifecycleManager,
    monitor: BreakEvenMonitor,
    signals: Arc<dyn SignalSource>,
    plans: PlanStore,
}

impl TradingEngine {
    pub fn new(
        exchange: Arc<dyn FuturesExchange>,
        signals: Arc<dyn SignalSource>,
        clock: Arc<dyn Clock>,
        settings: EngineSettings,
        plans: PlanStore,
    ) -> Self {
        let monitor = BreakEvenMonitor::new(exchange.clone(), settings.lifecycle.ladder.clone());
        let lifecycle = OrderLifecycleManager::new(
            exchange.clone(),
            PriceDecisionEngine::new(settings.wall_ratio),
            clock,
            settings.lifecycle,
        );
        Self {
            rules: ExchangeRulesCache::new(exchange.clone()),
            exchange,
            sizer: PositionSizer::new(settings.extra_amount),
            lifecycle,
            monitor,
            signals,
            plans,
        }
    }

    pub fn plans(&self) -> &PlanStore {
        &self.plans
    }

    /// One tick for one symbol. Never fails; errors are logged and reported.
    pub async fn run_tick(&mut self, ctx: &TickContext) -> TickReport {
        let span = info_span!("tick", symbol = %ctx.symbol);
        async {
            let rules = self.rules.rules(&ctx.symbol).await;
            let mut report = TickReport {
                symbol: ctx.symbol.clone(),
                break_even: None,
                cleaned_up: false,
                action: TickAction::NoSignal,
            };

            match self.maintain_exits(ctx, &rules).await {
                Ok((cleaned_up, outcome)) => {
                    report.cleaned_up = cleaned_up;
                    report.break_even = outcome;
                }
                Err(e) => log_failure(&ctx.symbol, "exit maintenance", &e),
            }

            report.action = match self.signals.latest(&ctx.symbol).await {
                Ok(Some(record)) => self.process_signal(ctx, record, &rules).await,
                Ok(None) => TickAction::NoSignal,
                Err(e) => {
                    log_failure(&ctx.symbol, "signal read", &e);
                    failed(&e)
                }
            };
            report
        }
        .instrument(span)
        .await
    }

    /// Clean up after a closed position, otherwise run the break-even check
    async fn maintain_exits(
        &mut self,
        ctx: &TickContext,
        rules: &ExchangeRules,
    ) -> Result<(bool, Option<BreakEvenOutcome>), TradingError> {
        let symbol = ctx.symbol.as_str();
        let flat = self
            .exchange
            .position(symbol)
            .await?
            .map(|p| p.is_flat())
            .unwrap_or(true);

        if flat {
            if self.plans.get(symbol).is_some() {
                info!("🧹 {} position closed, cancelling leftover exits", symbol);
                self.lifecycle.cancel_everything(symbol).await?;
                self.plans.remove(symbol);
                self.plans.persist();
                log_transition(symbol, LifecycleState::ExitsPlaced, LifecycleState::Closed);
                return Ok((true, None));
            }
            return Ok((false, None));
        }

        let outcome = self.monitor.check(symbol, self.plans.get_mut(symbol), rules).await?;
        if matches!(outcome, BreakEvenOutcome::Moved { .. }) {
            self.plans.persist();
        }
        Ok((false, Some(outcome)))
    }

    /// Act on one signal record. The signal is marked processed once the
    /// action reaches a final result; retryable failures leave it unmarked so
    /// the next tick tries again.
    pub async fn process_signal(
        &mut self,
        ctx: &TickContext,
        record: SignalRecord,
        rules: &ExchangeRules,
    ) -> TickAction {
        let symbol = ctx.symbol.as_str();
        if record.symbol != symbol {
            warn!("⚠️ Signal for {} delivered to {} tick, ignoring", record.symbol, symbol);
            return TickAction::NoSignal;
        }

        if let Some(at) = record.generated_at {
            if self.plans.last_signal(symbol) == Some(at) {
                return TickAction::Duplicate;
            }
        }

        info!("📡 {} signal {:?} K={}", symbol, record.signal, record.reference_price);

        let (action, settled) = match self.act_on_signal(ctx, &record, rules).await {
            Ok(action) => (action, true),
            Err(e) => {
                log_failure(symbol, "signal", &e);
                if e.is_retryable() {
                    warn!("🔁 {} signal left pending, retrying next tick", symbol);
                }
                (failed(&e), !e.is_retryable())
            }
        };

        if let (true, Some(at)) = (settled, record.generated_at) {
            self.plans.mark_signal(symbol, at);
            self.plans.persist();
        }
        action
    }

    async fn act_on_signal(
        &mut self,
        ctx: &TickContext,
        record: &SignalRecord,
        rules: &ExchangeRules,
    ) -> Result<TickAction, TradingError> {
        let symbol = ctx.symbol.as_str();
        let side = match record.signal {
            Signal::None => return Ok(TickAction::Hold),
            Signal::Exit => {
                self.lifecycle.close_position(symbol, rules).await?;
                self.plans.remove(symbol);
                self.plans.persist();
                log_transition(symbol, LifecycleState::ExitsPlaced, LifecycleState::Closed);
                return Ok(TickAction::Exited);
            }
            Signal::EnterLong => PositionSide::Long,
            Signal::EnterShort => PositionSide::Short,
        };

        let sizing = match self.sizer.evaluate(ctx.unit_amount, &record.sizing, rules.min_notional) {
            Ok(sizing) => sizing,
            Err(e) => {
                info!("⏭️ {} no entry: {}", symbol, e);
                return Ok(TickAction::Skipped { reason: e.to_string() });
            }
        };

        match self
            .lifecycle
            .open_position(ctx, side, record.reference_price, sizing.final_notional, rules)
            .await
        {
            Ok(opened) => {
                let action = TickAction::Entered {
                    side,
                    price: opened.entry.price,
                    quantity: opened.entry.quantity,
                };
                self.plans.insert(opened.plan);
                self.plans.persist();
                Ok(action)
            }
            Err(e @ TradingError::InsufficientNotional { .. }) => {
                info!("⏭️ {} no entry: {}", symbol, e);
                Ok(TickAction::Skipped { reason: e.to_string() })
            }
            Err(e) => Err(e),
        }
    }
}

fn log_failure(symbol: &str, stage: &str, e: &TradingError) {
    error!("❌ [{}] {} {} failed: {}", e.category(), symbol, stage, e);
}

fn failed(e: &TradingError) -> TickAction {
    TickAction::Failed {
        category: e.category(),
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockExchange;
    use crate::trading::orderbook::BookTicker;
    use crate::trading::sizing::SizingState;
    use crate::utils::ManualClock;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    #[derive(Default)]
    struct StaticSignals {
        record: Mutex<Option<SignalRecord>>,
    }

    impl StaticSignals {
        fn set(&self, record: SignalRecord) {
            *self.record.lock().unwrap() = Some(record);
        }
    }

    #[async_trait]
    impl SignalSource for StaticSignals {
        async fn latest(&self, _symbol: &str) -> Result<Option<SignalRecord>, TradingError> {
            Ok(self.record.lock().unwrap().clone())
        }
    }

    fn setup() -> (Arc<MockExchange>, Arc<StaticSignals>, TradingEngine) {
        let book = BookTicker { bid: 100.0, bid_qty: 10.0, ask: 100.02, ask_qty: 1.0 };
        let exchange = Arc::new(MockExchange::with_market(ExchangeRules::default(), book));
        let signals = Arc::new(StaticSignals::default());
        let engine = TradingEngine::new(
            exchange.clone(),
            signals.clone(),
            Arc::new(ManualClock::new(0)),
            EngineSettings::default(),
            PlanStore::new(),
        );
        (exchange, signals, engine)
    }

    fn enter_long(counter: u64, second: u32) -> SignalRecord {
        let sizing = SizingState { counter, stack_count: 0, bomb_active: false, period: 3 };
        SignalRecord::new("BTCUSDT", Signal::EnterLong, 100.01, sizing)
            .with_generated_at(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, second).unwrap())
    }

    fn ctx() -> TickContext {
        TickContext::new("BTCUSDT", 10.0, 1)
    }

    #[tokio::test]
    async fn test_entry_sized_priced_and_protected() {
        let (exchange, signals, mut engine) = setup();
        signals.set(enter_long(6, 0));

        let report = engine.run_tick(&ctx()).await;

        assert_eq!(
            report.action,
            TickAction::Entered { side: PositionSide::Long, price: 100.02, quantity: 0.299 }
        );
        assert!(engine.plans().get("BTCUSDT").is_some());
        assert_eq!(exchange.position_amt(), 0.299);
        exchange.snapshot(|s| {
            assert_eq!(s.open_orders.len(), 3);
            assert_eq!(s.stop_orders.len(), 3);
            assert_eq!(s.leverage_calls, vec![1]);
        });
    }

    #[tokio::test]
    async fn test_signal_acted_on_once() {
        let (exchange, signals, mut engine) = setup();
        signals.set(enter_long(6, 0));
        engine.run_tick(&ctx()).await;
        let orders = exchange.snapshot(|s| s.placed_orders.len());

        let report = engine.run_tick(&ctx()).await;

        assert_eq!(report.action, TickAction::Duplicate);
        assert_eq!(report.break_even, Some(BreakEvenOutcome::NoFillYet));
        assert_eq!(exchange.snapshot(|s| s.placed_orders.len()), orders);
    }

    #[tokio::test]
    async fn test_zero_multiple_skips_entry() {
        let (exchange, signals, mut engine) = setup();
        signals.set(enter_long(4, 0));

        let report = engine.run_tick(&ctx()).await;

        assert!(matches!(report.action, TickAction::Skipped { .. }));
        exchange.snapshot(|s| {
            assert!(s.placed_orders.is_empty());
            assert_eq!(s.cancel_all_calls, 0);
        });
    }

    #[tokio::test]
    async fn test_exit_signal_flattens_and_discards_plan() {
        let (exchange, signals, mut engine) = setup();
        signals.set(enter_long(6, 0));
        engine.run_tick(&ctx()).await;

        let mut exit = enter_long(6, 1);
        exit.signal = Signal::Exit;
        signals.set(exit);
        let report = engine.run_tick(&ctx()).await;

        assert_eq!(report.action, TickAction::Exited);
        assert_eq!(exchange.position_amt(), 0.0);
        assert!(engine.plans().get("BTCUSDT").is_none());
        exchange.snapshot(|s| {
            assert!(s.open_orders.is_empty());
            assert!(s.stop_orders.is_empty());
        });
    }

    #[tokio::test]
    async fn test_flat_position_cleans_up_leftovers() {
        let (exchange, signals, mut engine) = setup();
        signals.set(enter_long(6, 0));
        engine.run_tick(&ctx()).await;

        // stopped out on the exchange
        exchange.set_position("BTCUSDT", 0.0, 0.0);
        let report = engine.run_tick(&ctx()).await;

        assert!(report.cleaned_up);
        assert!(engine.plans().get("BTCUSDT").is_none());
        exchange.snapshot(|s| {
            assert!(s.open_orders.is_empty());
            assert!(s.stop_orders.is_empty());
        });
    }

    #[tokio::test]
    async fn test_exchange_failure_contained() {
        let (exchange, signals, mut engine) = setup();
        exchange.state.lock().unwrap().book = None;
        signals.set(enter_long(6, 0));

        let report = engine.run_tick(&ctx()).await;

        assert!(matches!(report.action, TickAction::Failed { category: "NETWORK", .. }));
        assert!(engine.plans().is_empty());
    }

    #[tokio::test]
    async fn test_retryable_failure_retried_next_tick() {
        let (exchange, signals, mut engine) = setup();
        exchange.state.lock().unwrap().book = None;
        signals.set(enter_long(6, 0));

        let first = engine.run_tick(&ctx()).await;
        assert!(matches!(first.action, TickAction::Failed { category: "NETWORK", .. }));
        assert_eq!(engine.plans().last_signal("BTCUSDT"), None);

        exchange.state.lock().unwrap().book =
            Some(BookTicker { bid: 100.0, bid_qty: 10.0, ask: 100.02, ask_qty: 1.0 });
        let second = engine.run_tick(&ctx()).await;

        assert_eq!(
            second.action,
            TickAction::Entered { side: PositionSide::Long, price: 100.02, quantity: 0.299 }
        );
        assert_eq!(exchange.position_amt(), 0.299);
        assert!(engine.plans().last_signal("BTCUSDT").is_some());
    }

    #[tokio::test]
    async fn test_fill_timeout_not_retried() {
        let (exchange, signals, mut engine) = setup();
        exchange.state.lock().unwrap().fill_entries = false;
        signals.set(enter_long(6, 0));

        let first = engine.run_tick(&ctx()).await;
        assert!(matches!(first.action, TickAction::Failed { category: "FILL_TIMEOUT", .. }));
        let orders = exchange.snapshot(|s| s.placed_orders.len());

        let second = engine.run_tick(&ctx()).await;
        assert_eq!(second.action, TickAction::Duplicate);
        assert_eq!(exchange.snapshot(|s| s.placed_orders.len()), orders);
    }
}
