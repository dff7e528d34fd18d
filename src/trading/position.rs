//! Position tracking

use serde::{Deserialize, Serialize};

use crate::api::{PositionRisk, Side};

/// Direction of an open position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Side of the order that opens or grows the position
    pub fn entry_side(&self) -> Side {
        match self {
            PositionSide::Long => Side::Buy,
            PositionSide::Short => Side::Sell,
        }
    }

    /// Side of the reduce-only orders that close it
    pub fn exit_side(&self) -> Side {
        self.entry_side().opposite()
    }

    /// +1 for long, -1 for short
    pub fn sign(&self) -> f64 {
        match self {
            PositionSide::Long => 1.0,
            PositionSide::Short => -1.0,
        }
    }

    pub fn from_amount(amount: f64) -> Option<Self> {
        if amount > 0.0 {
            Some(PositionSide::Long)
        } else if amount < 0.0 {
            Some(PositionSide::Short)
        } else {
            None
        }
    }
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionSide::Long => f.write_str("LONG"),
            PositionSide::Short => f.write_str("SHORT"),
        }
    }
}

/// Open position as reported by the exchange
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    pub entry_price: f64,
    /// Absolute size
    pub quantity: f64,
    pub leverage: u32,
}

impl Position {
    /// `None` for a flat position
    pub fn from_risk(risk: &PositionRisk) -> Option<Self> {
        let side = PositionSide::from_amount(risk.position_amt)?;
        Some(Self {
            symbol: risk.symbol.clone(),
            side,
            entry_price: risk.entry_price,
            quantity: risk.position_amt.abs(),
            leverage: risk.leverage,
        })
    }
}
