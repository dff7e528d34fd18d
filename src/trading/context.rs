//! Per-invocation context
//! Carries the symbol-specific parameters of one tick

/// Parameters of one tick for one symbol
#[derive(Debug, Clone, PartialEq)]
pub struct TickContext {
    pub symbol: String,
    /// Base order notional before the Z multiple
    pub unit_amount: f64,
    pub leverage: u32,
}

impl TickContext {
    pub fn new(symbol: impl Into<String>, unit_amount: f64, leverage: u32) -> Self {
        Self {
            symbol: symbol.into(),
            unit_amount,
            leverage: leverage.max(1),
        }
    }
}
