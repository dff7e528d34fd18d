//! Top-of-book snapshot
//! Fetched fresh for every price decision, never cached

use serde_json::Value;

use crate::api::types::number_field;
use crate::api::ApiError;

/// Best bid/ask as reported by the book ticker endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct BookTicker {
    pub bid: f64,
    pub bid_qty: f64,
    pub ask: f64,
    pub ask_qty: f64,
}

impl BookTicker {
    pub fn from_value(value: &Value) -> Result<Self, ApiError> {
        Ok(Self {
            bid: number_field(value, "bidPrice")?,
            bid_qty: number_field(value, "bidQty")?,
            ask: number_field(value, "askPrice")?,
            ask_qty: number_field(value, "askQty")?,
        })
    }
}

/// Book snapshot used by the price decision engine
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBookSnapshot {
    pub ask: f64,
    pub bid: f64,
    pub ask_qty: f64,
    pub bid_qty: f64,
    pub tick_size: f64,
}

impl OrderBookSnapshot {
    pub fn new(ticker: &BookTicker, tick_size: f64) -> Self {
        Self {
            ask: ticker.ask,
            bid: ticker.bid,
            ask_qty: ticker.ask_qty,
            bid_qty: ticker.bid_qty,
            tick_size,
        }
    }

    /// Calculate spread
    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }

    /// A crossed or empty book can't be priced against
    pub fn is_usable(&self) -> bool {
        self.bid > 0.0 && self.ask > 0.0 && self.ask >= self.bid && self.tick_size > 0.0
    }
}
