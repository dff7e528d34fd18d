//! Take-profit / stop-loss ladder for an open position
//! Built once the entry fill is confirmed, then mutated by the break-even monitor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::trading::position::PositionSide;
use crate::trading::rules::{adjust_to_tick, floor_to_step, ExchangeRules};

/// Ladder geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExitLadderConfig {
    /// Favourable moves for the TP legs, as fractions of the entry price
    pub take_profit_levels: Vec<f64>,
    /// Adverse move for the stop, as a fraction of the entry price
    pub stop_loss_pct: f64,
    pub stop_loss_legs: usize,
    /// Break-even stop sits this far past the entry in the profitable direction
    pub break_even_offset: f64,
    /// Relative tolerance when comparing a stop trigger to a reference price
    pub break_even_tolerance: f64,
}

impl Default for ExitLadderConfig {
    fn default() -> Self {
        Self {
            take_profit_levels: vec![0.005, 0.010, 0.015],
            stop_loss_pct: 0.012,
            stop_loss_legs: 3,
            break_even_offset: 0.0006,
            break_even_tolerance: 0.0005,
        }
    }
}

/// One exit order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitLeg {
    pub price: f64,
    pub quantity: f64,
}

/// Split `total` into `legs` step-aligned parts, remainder on the last one
pub fn split_quantity(total: f64, legs: usize, step: f64) -> Option<Vec<f64>> {
    if legs == 0 || total <= 0.0 {
        return None;
    }
    let base = floor_to_step(total / legs as f64, step);
    if base <= 0.0 {
        return None;
    }
    let mut parts = vec![base; legs - 1];
    parts.push(adjust_to_tick(total - base * (legs - 1) as f64, step));
    Some(parts)
}

fn price_at(side: PositionSide, entry_price: f64, fraction: f64, tick: f64) -> f64 {
    adjust_to_tick(entry_price * (1.0 + side.sign() * fraction), tick)
}

/// TP legs: the largest of 3, 2, 1 equal legs where every leg clears the
/// exchange minimums, using the first `n` levels
pub fn build_tp_legs(
    side: PositionSide,
    entry_price: f64,
    quantity: f64,
    levels: &[f64],
    rules: &ExchangeRules,
) -> Vec<ExitLeg> {
    let max_legs = levels.len().min(3);
    for legs in (1..=max_legs).rev() {
        let Some(parts) = split_quantity(quantity, legs, rules.step_size) else {
            continue;
        };
        let ladder: Vec<ExitLeg> = parts
            .into_iter()
            .zip(levels)
            .map(|(qty, level)| ExitLeg {
                price: price_at(side, entry_price, *level, rules.tick_size),
                quantity: qty,
            })
            .collect();

        if ladder.iter().all(|leg| rules.clears_floor(leg.price, leg.quantity)) {
            return ladder;
        }
        debug!("TP ladder with {} legs below exchange minimums, trying fewer", legs);
    }
    Vec::new()
}

/// Stop legs at one trigger price: `legs` equal parts when every part clears
/// the minimums, otherwise a single leg for the whole quantity
pub fn stop_legs_at(
    stop_price: f64,
    quantity: f64,
    legs: usize,
    rules: &ExchangeRules,
) -> Vec<ExitLeg> {
    if quantity <= 0.0 {
        return Vec::new();
    }
    if legs > 1 {
        if let Some(parts) = split_quantity(quantity, legs, rules.step_size) {
            if parts.iter().all(|qty| rules.clears_floor(stop_price, *qty)) {
                return parts
                    .into_iter()
                    .map(|qty| ExitLeg { price: stop_price, quantity: qty })
                    .collect();
            }
        }
    }
    vec![ExitLeg { price: stop_price, quantity }]
}

pub fn build_sl_legs(
    side: PositionSide,
    entry_price: f64,
    quantity: f64,
    config: &ExitLadderConfig,
    rules: &ExchangeRules,
) -> Vec<ExitLeg> {
    let stop = price_at(side, entry_price, -config.stop_loss_pct, rules.tick_size);
    stop_legs_at(stop, quantity, config.stop_loss_legs, rules)
}

/// Entry nudged into profit by `offset`, tick-aligned
pub fn break_even_price(side: PositionSide, entry_price: f64, offset: f64, tick: f64) -> f64 {
    price_at(side, entry_price, offset, tick)
}

/// `value` is within `tolerance` (relative) of `reference`
pub fn within_tolerance(value: f64, reference: f64, tolerance: f64) -> bool {
    (value - reference).abs() <= reference.abs() * tolerance
}

/// Exit ladder of one position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitPlan {
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: f64,
    pub quantity: f64,
    pub tp_legs: Vec<ExitLeg>,
    pub sl_legs: Vec<ExitLeg>,
    pub original_stop_price: f64,
    pub break_even_moved: bool,
    pub created_at: DateTime<Utc>,
}

impl ExitPlan {
    pub fn build(
        symbol: &str,
        side: PositionSide,
        entry_price: f64,
        quantity: f64,
        config: &ExitLadderConfig,
        rules: &ExchangeRules,
    ) -> Self {
        let tp_legs = build_tp_legs(side, entry_price, quantity, &config.take_profit_levels, rules);
        let sl_legs = build_sl_legs(side, entry_price, quantity, config, rules);
        let original_stop_price = sl_legs
            .first()
            .map(|leg| leg.price)
            .unwrap_or_else(|| price_at(side, entry_price, -config.stop_loss_pct, rules.tick_size));

        Self {
            symbol: symbol.to_string(),
            side,
            entry_price,
            quantity,
            tp_legs,
            sl_legs,
            original_stop_price,
            break_even_moved: false,
            created_at: Utc::now(),
        }
    }

    pub fn planned_tp_count(&self) -> usize {
        self.tp_legs.len()
    }

    pub fn tp_quantity(&self) -> f64 {
        self.tp_legs.iter().map(|leg| leg.quantity).sum()
    }

    pub fn break_even_price(&self, config: &ExitLadderConfig, tick: f64) -> f64 {
        break_even_price(self.side, self.entry_price, config.break_even_offset, tick)
    }
}
