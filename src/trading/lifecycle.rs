//! Order lifecycle management
//! Entry submission, fill confirmation, and exit ladder placement

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::api::{FuturesExchange, OrderRequest, Side, StopOrderRequest};
use crate::trading::context::TickContext;
use crate::trading::errors::TradingError;
use crate::trading::exit_plan::{ExitLadderConfig, ExitLeg, ExitPlan};
use crate::trading::orderbook::OrderBookSnapshot;
use crate::trading::position::{Position, PositionSide};
use crate::trading::price_engine::{PriceDecision, PriceDecisionEngine};
use crate::trading::rules::ExchangeRules;
use crate::utils::Clock;

/// Stage of one position's lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    EntrySubmitted,
    EntryFilled,
    ExitsPlaced,
    BreakEvenMoved,
    Closed,
}

pub fn log_transition(symbol: &str, from: LifecycleState, to: LifecycleState) {
    info!("🔄 {} lifecycle: {:?} -> {:?}", symbol, from, to);
}

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub fill_poll_interval: Duration,
    pub fill_timeout: Duration,
    pub ladder: ExitLadderConfig,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            fill_poll_interval: Duration::from_secs(2),
            fill_timeout: Duration::from_secs(60),
            ladder: ExitLadderConfig::default(),
        }
    }
}

/// Submitted entry order
#[derive(Debug, Clone)]
pub struct EntryOrder {
    pub order_id: String,
    pub side: PositionSide,
    pub price: f64,
    pub quantity: f64,
    pub decision: PriceDecision,
    /// Signed exposure just before submission
    pub baseline: f64,
}

/// Entry filled and exits placed
#[derive(Debug, Clone)]
pub struct OpenedPosition {
    pub entry: EntryOrder,
    pub position: Position,
    pub plan: ExitPlan,
    pub state: LifecycleState,
}

/// Drives one symbol from idle to a protected position
pub struct OrderLifecycleManager {
    exchange: Arc<dyn FuturesExchange>,
    price_engine: PriceDecisionEngine,
    clock: Arc<dyn Clock>,
    config: LifecycleConfig,
}

impl OrderLifecycleManager {
    pub fn new(
        exchange: Arc<dyn FuturesExchange>,
        price_engine: PriceDecisionEngine,
        clock: Arc<dyn Clock>,
        config: LifecycleConfig,
    ) -> Self {
        Self { exchange, price_engine, clock, config }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Enter, wait for the fill, lay down the exits
    pub async fn open_position(
        &self,
        ctx: &TickContext,
        side: PositionSide,
        reference_price: f64,
        notional: f64,
        rules: &ExchangeRules,
    ) -> Result<OpenedPosition, TradingError> {
        let entry = self.submit_entry(ctx, side, reference_price, notional, rules).await?;

        let position = match self.wait_for_fill(&ctx.symbol, &entry, rules).await {
            Ok(position) => position,
            Err(e @ TradingError::FillTimeout { .. }) => {
                error!(
                    "⏰ {} entry {} not confirmed, needs manual review: {}",
                    ctx.symbol, entry.order_id, e
                );
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        log_transition(&ctx.symbol, LifecycleState::EntrySubmitted, LifecycleState::EntryFilled);

        let plan = self.place_exits(&position, rules).await;
        log_transition(&ctx.symbol, LifecycleState::EntryFilled, LifecycleState::ExitsPlaced);

        Ok(OpenedPosition { entry, position, plan, state: LifecycleState::ExitsPlaced })
    }

    /// Idle -> EntrySubmitted
    pub async fn submit_entry(
        &self,
        ctx: &TickContext,
        side: PositionSide,
        reference_price: f64,
        notional: f64,
        rules: &ExchangeRules,
    ) -> Result<EntryOrder, TradingError> {
        let symbol = ctx.symbol.as_str();

        self.cancel_everything(symbol).await?;
        let baseline = self.flatten_opposite(symbol, side, rules).await?;
        self.exchange.set_leverage(symbol, ctx.leverage).await?;

        let ticker = self.exchange.book_ticker(symbol).await?;
        let book = OrderBookSnapshot::new(&ticker, rules.tick_size);
        let is_buy = side == PositionSide::Long;
        let decision = self.price_engine.decide_logged(symbol, is_buy, reference_price, &book)?;

        let quantity = rules.floor_qty(notional / decision.price);
        if !rules.clears_floor(decision.price, quantity) {
            return Err(TradingError::InsufficientNotional {
                notional: quantity * decision.price,
                min_notional: rules.min_notional,
            });
        }

        let order = OrderRequest::limit(symbol, side.entry_side(), quantity, decision.price)
            .with_precision(rules.price_precision, rules.qty_precision);
        let ack = self.exchange.place_order(&order).await?;

        info!(
            "📝 {} {} entry {} @ {} qty {} ({:?}, notional {:.4})",
            symbol, side, ack.order_id, decision.price, quantity, decision.role, notional
        );
        log_transition(symbol, LifecycleState::Idle, LifecycleState::EntrySubmitted);

        Ok(EntryOrder {
            order_id: ack.order_id,
            side,
            price: decision.price,
            quantity,
            decision,
            baseline,
        })
    }

    /// EntrySubmitted -> EntryFilled: poll the position until exposure in the
    /// entry direction has grown by the entry quantity
    pub async fn wait_for_fill(
        &self,
        symbol: &str,
        entry: &EntryOrder,
        rules: &ExchangeRules,
    ) -> Result<Position, TradingError> {
        let poll = self.config.fill_poll_interval.max(Duration::from_millis(1));
        let max_polls = (self.config.fill_timeout.as_millis() / poll.as_millis()).max(1) as u64;
        let tolerance = rules.step_size / 2.0;

        for i in 0..max_polls {
            self.clock.sleep(poll).await;

            let risk = match self.exchange.position(symbol).await {
                Ok(risk) => risk,
                Err(e) => {
                    warn!("⚠️ {} position poll failed: {}", symbol, e);
                    continue;
                }
            };
            let amount = risk.as_ref().map(|r| r.position_amt).unwrap_or(0.0);
            let grown = (amount - entry.baseline) * entry.side.sign();

            if grown + tolerance >= entry.quantity {
                if let Some(position) = risk.as_ref().and_then(Position::from_risk) {
                    info!(
                        "✅ {} entry {} filled: {} {} @ {}",
                        symbol, entry.order_id, position.side, position.quantity, position.entry_price
                    );
                    return Ok(position);
                }
            }
            debug!(
                "⏳ {} entry {} pending ({}/{}), exposure {}",
                symbol, entry.order_id, i + 1, max_polls, amount
            );
        }

        Err(TradingError::FillTimeout {
            order_id: entry.order_id.clone(),
            waited_secs: self.config.fill_timeout.as_secs(),
        })
    }

    /// EntryFilled -> ExitsPlaced. Failed legs are logged and skipped; the
    /// returned plan only holds the legs the exchange accepted
    pub async fn place_exits(&self, position: &Position, rules: &ExchangeRules) -> ExitPlan {
        let symbol = position.symbol.as_str();
        let mut plan = ExitPlan::build(
            symbol,
            position.side,
            position.entry_price,
            position.quantity,
            &self.config.ladder,
            rules,
        );
        let exit_side = position.side.exit_side();

        if plan.tp_legs.is_empty() {
            warn!("⚠️ {} position {} too small for any take-profit leg", symbol, position.quantity);
        }

        let tp_planned = plan.tp_legs.len();
        let mut tp_accepted = Vec::with_capacity(tp_planned);
        for (i, leg) in plan.tp_legs.iter().enumerate() {
            let order = OrderRequest::limit(symbol, exit_side, leg.quantity, leg.price)
                .reduce_only()
                .with_precision(rules.price_precision, rules.qty_precision);
            match self.exchange.place_order(&order).await {
                Ok(ack) => {
                    info!("🎯 {} TP{} {} @ {} (id {})", symbol, i + 1, leg.quantity, leg.price, ack.order_id);
                    tp_accepted.push(leg.clone());
                }
                Err(e) => error!("❌ {} TP{} @ {} failed: {}", symbol, i + 1, leg.price, e),
            }
        }

        let sl_planned = plan.sl_legs.len();
        let sl_accepted = self.place_stops(symbol, exit_side, &plan.sl_legs, rules).await;

        info!(
            "🛡️ {} exits placed: {}/{} TP, {}/{} SL",
            symbol,
            tp_accepted.len(),
            tp_planned,
            sl_accepted.len(),
            sl_planned
        );
        plan.tp_legs = tp_accepted;
        plan.sl_legs = sl_accepted;
        plan
    }

    /// Submit stop legs, returning the ones that were accepted
    pub async fn place_stops(
        &self,
        symbol: &str,
        side: Side,
        legs: &[ExitLeg],
        rules: &ExchangeRules,
    ) -> Vec<ExitLeg> {
        let mut accepted = Vec::with_capacity(legs.len());
        for (i, leg) in legs.iter().enumerate() {
            let order = StopOrderRequest::new(symbol, side, leg.quantity, leg.price)
                .with_precision(rules.price_precision, rules.qty_precision);
            match self.exchange.place_stop_order(&order).await {
                Ok(ack) => {
                    info!("🛑 {} SL{} {} @ {} (id {})", symbol, i + 1, leg.quantity, leg.price, ack.order_id);
                    accepted.push(leg.clone());
                }
                Err(e) => error!("❌ {} SL{} @ {} failed: {}", symbol, i + 1, leg.price, e),
            }
        }
        accepted
    }

    /// Cancel every regular and stop order for the symbol
    pub async fn cancel_everything(&self, symbol: &str) -> Result<(), TradingError> {
        self.exchange.cancel_all_orders(symbol).await?;
        let stops = self.exchange.open_stop_orders(symbol).await?;
        for stop in &stops {
            self.exchange.cancel_stop_order(symbol, &stop.algo_id).await?;
        }
        debug!("🗑️ {} cancelled all orders and {} stops", symbol, stops.len());
        Ok(())
    }

    /// Close any exposure against `side`; returns the signed exposure left
    async fn flatten_opposite(
        &self,
        symbol: &str,
        side: PositionSide,
        rules: &ExchangeRules,
    ) -> Result<f64, TradingError> {
        let amount = self
            .exchange
            .position(symbol)
            .await?
            .map(|r| r.position_amt)
            .unwrap_or(0.0);

        if amount * side.sign() < 0.0 {
            self.market_close(symbol, amount, rules).await?;
            return Ok(0.0);
        }
        Ok(amount)
    }

    async fn market_close(
        &self,
        symbol: &str,
        amount: f64,
        rules: &ExchangeRules,
    ) -> Result<(), TradingError> {
        let Some(side) = PositionSide::from_amount(amount) else {
            return Ok(());
        };
        let order = OrderRequest::market(symbol, side.exit_side(), amount.abs())
            .reduce_only()
            .with_precision(rules.price_precision, rules.qty_precision);
        let ack = self.exchange.place_order(&order).await?;
        info!("🔻 {} flattened {} {} (id {})", symbol, side, amount.abs(), ack.order_id);
        Ok(())
    }

    /// Cancel everything and flatten the position -> Closed
    pub async fn close_position(
        &self,
        symbol: &str,
        rules: &ExchangeRules,
    ) -> Result<(), TradingError> {
        self.cancel_everything(symbol).await?;
        let amount = self
            .exchange
            .position(symbol)
            .await?
            .map(|r| r.position_amt)
            .unwrap_or(0.0);
        self.market_close(symbol, amount, rules).await?;
        info!("🏁 {} position closed", symbol);
        Ok(())
    }
}
