//! Stateful in-memory exchange for tests

use async_trait::async_trait;
use std::sync::Mutex;

use crate::api::exchange::FuturesExchange;
use crate::api::types::{
    OrderAck, OrderRequest, OrderType, PositionRisk, RestingOrder, Side, StopOrder,
    StopOrderRequest,
};
use crate::api::ApiError;
use crate::trading::orderbook::BookTicker;
use crate::trading::rules::ExchangeRules;

#[derive(Debug, Default)]
pub struct MockState {
    pub rules: Option<ExchangeRules>,
    pub book: Option<BookTicker>,
    pub position: Option<PositionRisk>,
    pub open_orders: Vec<RestingOrder>,
    pub stop_orders: Vec<StopOrder>,
    /// Fill non-reduce-only limit orders immediately at their price
    pub fill_entries: bool,
    /// Reject the n-th stop order submission (0-based) with a validation error
    pub reject_stop_index: Option<usize>,
    /// Reject the n-th reduce-only limit order submission (0-based)
    pub reject_limit_index: Option<usize>,
    pub placed_orders: Vec<OrderRequest>,
    pub placed_stops: Vec<StopOrderRequest>,
    pub cancelled_stops: Vec<String>,
    pub cancel_all_calls: u32,
    pub leverage_calls: Vec<u32>,
    pub position_calls: u32,
    next_id: u64,
    stop_submissions: usize,
    limit_exit_submissions: usize,
}

/// Mock futures exchange
#[derive(Debug, Default)]
pub struct MockExchange {
    pub state: Mutex<MockState>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_market(rules: ExchangeRules, book: BookTicker) -> Self {
        let mock = Self::new();
        {
            let mut state = mock.state.lock().unwrap();
            state.rules = Some(rules);
            state.book = Some(book);
            state.fill_entries = true;
        }
        mock
    }

    pub fn set_position(&self, symbol: &str, amount: f64, entry_price: f64) {
        let mut state = self.state.lock().unwrap();
        state.position = Some(PositionRisk {
            symbol: symbol.to_string(),
            position_amt: amount,
            entry_price,
            leverage: 1,
        });
    }

    pub fn position_amt(&self) -> f64 {
        self.state
            .lock()
            .unwrap()
            .position
            .as_ref()
            .map(|p| p.position_amt)
            .unwrap_or(0.0)
    }

    /// Simulate the fill of the open reduce-only limit order at `index`
    pub fn fill_open_order(&self, index: usize) {
        let mut state = self.state.lock().unwrap();
        let order = state.open_orders.remove(index);
        let delta = signed(order.side, order.quantity);
        if let Some(position) = state.position.as_mut() {
            position.position_amt = round8(position.position_amt + delta);
        }
    }

    pub fn snapshot<T>(&self, f: impl FnOnce(&MockState) -> T) -> T {
        f(&self.state.lock().unwrap())
    }
}

fn signed(side: Side, quantity: f64) -> f64 {
    match side {
        Side::Buy => quantity,
        Side::Sell => -quantity,
    }
}

fn round8(value: f64) -> f64 {
    (value * 1e8).round() / 1e8
}

impl MockState {
    fn next_id(&mut self) -> String {
        self.next_id += 1;
        self.next_id.to_string()
    }
}

#[async_trait]
impl FuturesExchange for MockExchange {
    async fn exchange_rules(&self, _symbol: &str) -> Result<ExchangeRules, ApiError> {
        self.state
            .lock()
            .unwrap()
            .rules
            .clone()
            .ok_or_else(|| ApiError::Network("exchangeInfo unavailable".to_string()))
    }

    async fn book_ticker(&self, _symbol: &str) -> Result<BookTicker, ApiError> {
        self.state
            .lock()
            .unwrap()
            .book
            .clone()
            .ok_or_else(|| ApiError::Network("book unavailable".to_string()))
    }

    async fn position(&self, _symbol: &str) -> Result<Option<PositionRisk>, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.position_calls += 1;
        Ok(state.position.clone())
    }

    async fn set_leverage(&self, _symbol: &str, leverage: u32) -> Result<(), ApiError> {
        self.state.lock().unwrap().leverage_calls.push(leverage);
        Ok(())
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, ApiError> {
        let mut state = self.state.lock().unwrap();
        if order.reduce_only && order.order_type == OrderType::Limit {
            let index = state.limit_exit_submissions;
            state.limit_exit_submissions += 1;
            if state.reject_limit_index == Some(index) {
                return Err(ApiError::Validation {
                    code: -2022,
                    message: "ReduceOnly Order is rejected.".to_string(),
                });
            }
        }
        state.placed_orders.push(order.clone());
        let order_id = state.next_id();

        let fills_now = order.order_type == OrderType::Market
            || (state.fill_entries && !order.reduce_only);

        if fills_now {
            let price = order
                .price
                .or_else(|| state.book.as_ref().map(|b| b.ask))
                .unwrap_or(0.0);
            let delta = signed(order.side, order.quantity);
            let symbol = order.symbol.clone();
            let position = state.position.get_or_insert(PositionRisk {
                symbol,
                position_amt: 0.0,
                entry_price: 0.0,
                leverage: 1,
            });
            let before = position.position_amt;
            let after = round8(before + delta);
            if before == 0.0 || before.signum() == delta.signum() {
                let cost = before.abs() * position.entry_price + delta.abs() * price;
                position.entry_price = if after != 0.0 { cost / after.abs() } else { 0.0 };
            } else if after == 0.0 {
                position.entry_price = 0.0;
            }
            position.position_amt = after;
            return Ok(OrderAck { order_id, status: "FILLED".to_string() });
        }

        let resting = RestingOrder {
            order_id: order_id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            order_type: order.order_type.as_str().to_string(),
            price: order.price.unwrap_or(0.0),
            quantity: order.quantity,
            reduce_only: order.reduce_only,
        };
        state.open_orders.push(resting);
        Ok(OrderAck { order_id, status: "NEW".to_string() })
    }

    async fn cancel_all_orders(&self, _symbol: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.cancel_all_calls += 1;
        state.open_orders.clear();
        Ok(())
    }

    async fn open_orders(&self, _symbol: &str) -> Result<Vec<RestingOrder>, ApiError> {
        Ok(self.state.lock().unwrap().open_orders.clone())
    }

    async fn place_stop_order(&self, order: &StopOrderRequest) -> Result<OrderAck, ApiError> {
        let mut state = self.state.lock().unwrap();
        let index = state.stop_submissions;
        state.stop_submissions += 1;
        if state.reject_stop_index == Some(index) {
            return Err(ApiError::Validation {
                code: -2021,
                message: "Order would immediately trigger.".to_string(),
            });
        }

        state.placed_stops.push(order.clone());
        let algo_id = state.next_id();
        state.stop_orders.push(StopOrder {
            algo_id: algo_id.clone(),
            symbol: order.symbol.clone(),
            side: order.side,
            trigger_price: order.trigger_price,
            quantity: order.quantity,
        });
        Ok(OrderAck { order_id: algo_id, status: "NEW".to_string() })
    }

    async fn open_stop_orders(&self, _symbol: &str) -> Result<Vec<StopOrder>, ApiError> {
        Ok(self.state.lock().unwrap().stop_orders.clone())
    }

    async fn cancel_stop_order(&self, _symbol: &str, algo_id: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.stop_orders.retain(|s| s.algo_id != algo_id);
        state.cancelled_stops.push(algo_id.to_string());
        Ok(())
    }
}
