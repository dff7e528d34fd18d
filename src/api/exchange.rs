//! Futures REST endpoints
//! Handles order placement, cancellation, stop orders, and position queries

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use crate::api::gateway::{ExchangeGateway, Method};
use crate::api::types::{OrderAck, OrderRequest, PositionRisk, RestingOrder, StopOrder, StopOrderRequest};
use crate::api::ApiError;
use crate::trading::orderbook::BookTicker;
use crate::trading::rules::ExchangeRules;

/// Futures exchange operations used by the engine
#[async_trait]
pub trait FuturesExchange: Send + Sync {
    /// Trading filters for a symbol
    async fn exchange_rules(&self, symbol: &str) -> Result<ExchangeRules, ApiError>;

    /// Best bid/ask with resting quantities
    async fn book_ticker(&self, symbol: &str) -> Result<BookTicker, ApiError>;

    /// Current position, `None` if the exchange reports none
    async fn position(&self, symbol: &str) -> Result<Option<PositionRisk>, ApiError>;

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ApiError>;

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, ApiError>;

    /// Cancel every open regular order for a symbol
    async fn cancel_all_orders(&self, symbol: &str) -> Result<(), ApiError>;

    async fn open_orders(&self, symbol: &str) -> Result<Vec<RestingOrder>, ApiError>;

    async fn place_stop_order(&self, order: &StopOrderRequest) -> Result<OrderAck, ApiError>;

    async fn open_stop_orders(&self, symbol: &str) -> Result<Vec<StopOrder>, ApiError>;

    async fn cancel_stop_order(&self, symbol: &str, algo_id: &str) -> Result<(), ApiError>;
}

/// REST implementation over the signed gateway
pub struct FuturesRestClient {
    gateway: Arc<ExchangeGateway>,
}

impl FuturesRestClient {
    pub fn new(gateway: Arc<ExchangeGateway>) -> Self {
        Self { gateway }
    }
}

fn symbol_param(symbol: &str) -> Vec<(String, String)> {
    vec![("symbol".to_string(), symbol.to_string())]
}

/// Lists come back either bare or wrapped in an object
fn as_list<'a>(value: &'a Value, wrapper: &str) -> &'a [Value] {
    if let Some(items) = value.as_array() {
        return items;
    }
    value
        .get(wrapper)
        .and_then(|v| v.as_array())
        .map(|v| v.as_slice())
        .unwrap_or(&[])
}

#[async_trait]
impl FuturesExchange for FuturesRestClient {
    async fn exchange_rules(&self, symbol: &str) -> Result<ExchangeRules, ApiError> {
        let info = self
            .gateway
            .call_public(Method::Get, "/fapi/v1/exchangeInfo", &[])
            .await?;

        let entry = as_list(&info, "symbols")
            .iter()
            .find(|s| s.get("symbol").and_then(|v| v.as_str()) == Some(symbol))
            .ok_or_else(|| ApiError::Decode(format!("symbol {} not in exchangeInfo", symbol)))?;

        ExchangeRules::from_symbol_info(entry)
    }

    async fn book_ticker(&self, symbol: &str) -> Result<BookTicker, ApiError> {
        let value = self
            .gateway
            .call_public(Method::Get, "/fapi/v1/ticker/bookTicker", &symbol_param(symbol))
            .await?;
        BookTicker::from_value(&value)
    }

    async fn position(&self, symbol: &str) -> Result<Option<PositionRisk>, ApiError> {
        let value = self
            .gateway
            .call(Method::Get, "/fapi/v2/positionRisk", &symbol_param(symbol))
            .await?;

        let entries = as_list(&value, "positions");
        // One-way mode reports a single BOTH entry; prefer it when present
        let entry = entries
            .iter()
            .find(|p| p.get("positionSide").and_then(|s| s.as_str()) == Some("BOTH"))
            .or_else(|| entries.first());

        entry.map(PositionRisk::from_value).transpose()
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ApiError> {
        let mut params = symbol_param(symbol);
        params.push(("leverage".to_string(), leverage.to_string()));
        self.gateway.call(Method::Post, "/fapi/v1/leverage", &params).await?;
        Ok(())
    }

    async fn place_order(&self, order: &OrderRequest) -> Result<OrderAck, ApiError> {
        let value = self
            .gateway
            .call(Method::Post, "/fapi/v1/order", &order.to_params())
            .await?;
        OrderAck::from_value(&value, "orderId")
    }

    async fn cancel_all_orders(&self, symbol: &str) -> Result<(), ApiError> {
        self.gateway
            .call(Method::Delete, "/fapi/v1/allOpenOrders", &symbol_param(symbol))
            .await?;
        Ok(())
    }

    async fn open_orders(&self, symbol: &str) -> Result<Vec<RestingOrder>, ApiError> {
        let value = self
            .gateway
            .call(Method::Get, "/fapi/v1/openOrders", &symbol_param(symbol))
            .await?;
        as_list(&value, "orders")
            .iter()
            .map(RestingOrder::from_value)
            .collect()
    }

    async fn place_stop_order(&self, order: &StopOrderRequest) -> Result<OrderAck, ApiError> {
        let value = self
            .gateway
            .call(Method::Post, "/fapi/v1/algoOrder", &order.to_params())
            .await?;
        OrderAck::from_value(&value, "algoId")
    }

    async fn open_stop_orders(&self, symbol: &str) -> Result<Vec<StopOrder>, ApiError> {
        let value = self
            .gateway
            .call(Method::Get, "/fapi/v1/openAlgoOrders", &symbol_param(symbol))
            .await?;
        as_list(&value, "orders")
            .iter()
            .map(StopOrder::from_value)
            .collect()
    }

    async fn cancel_stop_order(&self, symbol: &str, algo_id: &str) -> Result<(), ApiError> {
        let mut params = symbol_param(symbol);
        params.push(("algoId".to_string(), algo_id.to_string()));
        self.gateway.call(Method::Delete, "/fapi/v1/algoOrder", &params).await?;
        Ok(())
    }
}
