//! Accumulation-counter position sizing

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::trading::errors::TradingError;

/// Sizing inputs owned by the signal producer; read-only here
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizingState {
    /// Consecutive same-direction signals while the regime filter holds
    pub counter: u64,
    #[serde(default)]
    pub stack_count: u32,
    /// Counter-regime inflection ("bomb") in effect
    #[serde(default)]
    pub bomb_active: bool,
    /// Rotating period p
    pub period: u64,
}

/// `p` when the counter is a positive multiple of `p`, else 0
pub fn multiplier(counter: u64, period: u64) -> u64 {
    if period > 0 && counter > 0 && counter % period == 0 {
        period
    } else {
        0
    }
}

/// Fixed contribution of a bomb event: 1 only when the multiplier is zero
pub fn bomb_value(multiplier: u64) -> u64 {
    if multiplier == 0 {
        1
    } else {
        0
    }
}

/// Breakdown of the size multiple Z
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeFactor {
    pub multiplier: u64,
    pub bomb: u64,
    pub z: u64,
    /// Z was forced to 1 on the first accumulation step
    pub forced: bool,
}

pub fn size_factor(state: &SizingState) -> SizeFactor {
    let m = multiplier(state.counter, state.period);
    let bomb = if state.bomb_active { bomb_value(m) } else { 0 };
    let z = m + bomb;

    if state.counter == 1 && z == 0 {
        return SizeFactor { multiplier: m, bomb, z: 1, forced: true };
    }
    SizeFactor { multiplier: m, bomb, z, forced: false }
}

/// Sizing result for one signal
#[derive(Debug, Clone, PartialEq)]
pub struct SizingDecision {
    pub factor: SizeFactor,
    pub final_notional: f64,
}

/// Converts sizing state into an order notional
#[derive(Debug, Clone)]
pub struct PositionSizer {
    extra_amount: f64,
}

impl PositionSizer {
    pub fn new(extra_amount: f64) -> Self {
        Self { extra_amount }
    }

    /// `(unit + extra) * Z`, rejected when Z is zero or the notional is
    /// below the exchange minimum
    pub fn evaluate(
        &self,
        unit_amount: f64,
        state: &SizingState,
        min_notional: f64,
    ) -> Result<SizingDecision, TradingError> {
        let factor = size_factor(state);
        let final_notional = (unit_amount + self.extra_amount) * factor.z as f64;

        info!(
            "📏 Sizing: counter={} period={} stack={} bomb={} -> multiplier={} bombValue={} Z={}{} notional={:.4}",
            state.counter,
            state.period,
            state.stack_count,
            state.bomb_active,
            factor.multiplier,
            factor.bomb,
            factor.z,
            if factor.forced { " (forced)" } else { "" },
            final_notional
        );

        if factor.z == 0 {
            return Err(TradingError::SizingRejected {
                reason: format!(
                    "Z=0 (counter {} not a multiple of period {})",
                    state.counter, state.period
                ),
            });
        }

        if final_notional < min_notional {
            return Err(TradingError::InsufficientNotional {
                notional: final_notional,
                min_notional,
            });
        }

        Ok(SizingDecision { factor, final_notional })
    }
}
