//! Break-even stop migration
//! Once a take-profit leg has filled, the stop ladder moves to just past the
//! entry. Safe to run on every tick.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::api::{FuturesExchange, StopOrderRequest};
use crate::trading::errors::TradingError;
use crate::trading::exit_plan::{stop_legs_at, within_tolerance, ExitLadderConfig, ExitPlan};
use crate::trading::lifecycle::{log_transition, LifecycleState};
use crate::trading::position::Position;
use crate::trading::rules::ExchangeRules;

/// Result of one break-even check
#[derive(Debug, Clone, PartialEq)]
pub enum BreakEvenOutcome {
    NoPosition,
    NoStops,
    NoPlan,
    /// Every planned TP leg still rests
    NoFillYet,
    AlreadyMoved,
    Moved { stop_price: f64, legs: usize },
    /// The stop sits neither at the original level nor at break-even
    ManualAdjustment { trigger_price: f64 },
}

pub struct BreakEvenMonitor {
    exchange: Arc<dyn FuturesExchange>,
    ladder: ExitLadderConfig,
}

impl BreakEvenMonitor {
    pub fn new(exchange: Arc<dyn FuturesExchange>, ladder: ExitLadderConfig) -> Self {
        Self { exchange, ladder }
    }

    pub async fn check(
        &self,
        symbol: &str,
        plan: Option<&mut ExitPlan>,
        rules: &ExchangeRules,
    ) -> Result<BreakEvenOutcome, TradingError> {
        let position = match self.exchange.position(symbol).await? {
            Some(risk) => match Position::from_risk(&risk) {
                Some(position) => position,
                None => return Ok(BreakEvenOutcome::NoPosition),
            },
            None => return Ok(BreakEvenOutcome::NoPosition),
        };

        let stops = self.exchange.open_stop_orders(symbol).await?;
        let Some(first_stop) = stops.first() else {
            debug!("{} has no stop orders", symbol);
            return Ok(BreakEvenOutcome::NoStops);
        };

        let Some(plan) = plan else {
            warn!("⚠️ {} position has stops but no known exit plan, skipping break-even", symbol);
            return Ok(BreakEvenOutcome::NoPlan);
        };

        let exit_side = plan.side.exit_side();
        let open_tp = self
            .exchange
            .open_orders(symbol)
            .await?
            .iter()
            .filter(|o| o.is_limit() && o.reduce_only && o.side == exit_side)
            .count();
        if open_tp >= plan.planned_tp_count() {
            return Ok(BreakEvenOutcome::NoFillYet);
        }

        let tolerance = self.ladder.break_even_tolerance;
        let break_even = plan.break_even_price(&self.ladder, rules.tick_size);
        let trigger = first_stop.trigger_price;

        if within_tolerance(trigger, break_even, tolerance) {
            plan.break_even_moved = true;
            return Ok(BreakEvenOutcome::AlreadyMoved);
        }
        if !within_tolerance(trigger, plan.original_stop_price, tolerance) {
            warn!(
                "✋ {} stop at {} is neither original {} nor break-even {}, leaving it",
                symbol, trigger, plan.original_stop_price, break_even
            );
            return Ok(BreakEvenOutcome::ManualAdjustment { trigger_price: trigger });
        }

        info!(
            "⚖️ {} TP filled ({}/{} open), moving stop {} -> {}",
            symbol,
            open_tp,
            plan.planned_tp_count(),
            trigger,
            break_even
        );
        for stop in &stops {
            self.exchange.cancel_stop_order(symbol, &stop.algo_id).await?;
        }

        let legs = stop_legs_at(break_even, position.quantity, self.ladder.stop_loss_legs, rules);
        let mut placed = 0;
        for leg in &legs {
            let order = StopOrderRequest::new(symbol, exit_side, leg.quantity, leg.price)
                .with_precision(rules.price_precision, rules.qty_precision);
            match self.exchange.place_stop_order(&order).await {
                Ok(_) => placed += 1,
                Err(e) => error!("❌ {} break-even stop @ {} failed: {}", symbol, leg.price, e),
            }
        }

        plan.sl_legs = legs;
        plan.break_even_moved = true;
        log_transition(symbol, LifecycleState::ExitsPlaced, LifecycleState::BreakEvenMoved);

        Ok(BreakEvenOutcome::Moved { stop_price: break_even, legs: placed })
    }
}
