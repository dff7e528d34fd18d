//! Request and response types for the futures REST surface

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::ApiError;

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    fn parse(raw: &str) -> Result<Side, ApiError> {
        match raw {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            other => Err(ApiError::Decode(format!("unknown side {}", other))),
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Limit,
    Market,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Limit => "LIMIT",
            OrderType::Market => "MARKET",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    Gtc,
}

impl TimeInForce {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeInForce::Gtc => "GTC",
        }
    }
}

/// Format a price or quantity at the exchange precision
pub fn format_decimal(value: f64, precision: u32) -> String {
    Decimal::from_f64_retain(value)
        .unwrap_or(Decimal::ZERO)
        .round_dp_with_strategy(precision, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
        .to_string()
}

fn new_client_id() -> String {
    format!("fl-{}", uuid::Uuid::new_v4().simple())
}

/// Regular (limit or market) order
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: f64,
    pub price: Option<f64>,
    pub reduce_only: bool,
    pub qty_precision: u32,
    pub price_precision: u32,
    pub client_order_id: String,
}

impl OrderRequest {
    /// GTC limit order
    pub fn limit(symbol: &str, side: Side, quantity: f64, price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Limit,
            quantity,
            price: Some(price),
            reduce_only: false,
            qty_precision: 8,
            price_precision: 8,
            client_order_id: new_client_id(),
        }
    }

    /// Market order
    pub fn market(symbol: &str, side: Side, quantity: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            reduce_only: false,
            qty_precision: 8,
            price_precision: 8,
            client_order_id: new_client_id(),
        }
    }

    pub fn reduce_only(mut self) -> Self {
        self.reduce_only = true;
        self
    }

    pub fn with_precision(mut self, price_precision: u32, qty_precision: u32) -> Self {
        self.price_precision = price_precision;
        self.qty_precision = qty_precision;
        self
    }

    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("symbol".to_string(), self.symbol.clone()),
            ("side".to_string(), self.side.as_str().to_string()),
            ("type".to_string(), self.order_type.as_str().to_string()),
            ("quantity".to_string(), format_decimal(self.quantity, self.qty_precision)),
            ("newClientOrderId".to_string(), self.client_order_id.clone()),
        ];
        if let Some(price) = self.price {
            params.push(("price".to_string(), format_decimal(price, self.price_precision)));
            params.push(("timeInForce".to_string(), TimeInForce::Gtc.as_str().to_string()));
        }
        if self.reduce_only {
            params.push(("reduceOnly".to_string(), "true".to_string()));
        }
        params
    }
}

/// Conditional stop-market order, always reduce-only
#[derive(Debug, Clone)]
pub struct StopOrderRequest {
    pub symbol: String,
    pub side: Side,
    pub quantity: f64,
    pub trigger_price: f64,
    pub qty_precision: u32,
    pub price_precision: u32,
    pub client_order_id: String,
}

impl StopOrderRequest {
    pub fn new(symbol: &str, side: Side, quantity: f64, trigger_price: f64) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            quantity,
            trigger_price,
            qty_precision: 8,
            price_precision: 8,
            client_order_id: new_client_id(),
        }
    }

    pub fn with_precision(mut self, price_precision: u32, qty_precision: u32) -> Self {
        self.price_precision = price_precision;
        self.qty_precision = qty_precision;
        self
    }

    pub fn to_params(&self) -> Vec<(String, String)> {
        vec![
            ("algoType".to_string(), "CONDITIONAL".to_string()),
            ("symbol".to_string(), self.symbol.clone()),
            ("side".to_string(), self.side.as_str().to_string()),
            ("type".to_string(), "STOP_MARKET".to_string()),
            ("quantity".to_string(), format_decimal(self.quantity, self.qty_precision)),
            ("triggerPrice".to_string(), format_decimal(self.trigger_price, self.price_precision)),
            ("reduceOnly".to_string(), "true".to_string()),
            ("clientAlgoId".to_string(), self.client_order_id.clone()),
        ]
    }
}

/// Exchange acknowledgement of a submitted order
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub order_id: String,
    pub status: String,
}

impl OrderAck {
    pub fn from_value(value: &Value, id_field: &str) -> Result<Self, ApiError> {
        let order_id = id_string(value, id_field)?;
        let status = value
            .get("status")
            .or_else(|| value.get("algoStatus"))
            .and_then(|s| s.as_str())
            .unwrap_or("NEW")
            .to_string();
        Ok(Self { order_id, status })
    }
}

/// Signed position exposure for a symbol
#[derive(Debug, Clone, PartialEq)]
pub struct PositionRisk {
    pub symbol: String,
    /// Positive for long, negative for short
    pub position_amt: f64,
    pub entry_price: f64,
    pub leverage: u32,
}

impl PositionRisk {
    pub fn from_value(value: &Value) -> Result<Self, ApiError> {
        Ok(Self {
            symbol: string_field(value, "symbol")?,
            position_amt: number_field(value, "positionAmt")?,
            entry_price: number_field(value, "entryPrice")?,
            leverage: number_field(value, "leverage").map(|l| l as u32).unwrap_or(1),
        })
    }

    pub fn is_flat(&self) -> bool {
        self.position_amt == 0.0
    }
}

/// Open limit order
#[derive(Debug, Clone, PartialEq)]
pub struct RestingOrder {
    pub order_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: String,
    pub price: f64,
    pub quantity: f64,
    pub reduce_only: bool,
}

impl RestingOrder {
    pub fn from_value(value: &Value) -> Result<Self, ApiError> {
        Ok(Self {
            order_id: id_string(value, "orderId")?,
            symbol: string_field(value, "symbol")?,
            side: Side::parse(&string_field(value, "side")?)?,
            order_type: string_field(value, "type")?,
            price: number_field(value, "price")?,
            quantity: number_field(value, "origQty")?,
            reduce_only: value.get("reduceOnly").and_then(|r| r.as_bool()).unwrap_or(false),
        })
    }

    pub fn is_limit(&self) -> bool {
        self.order_type == "LIMIT"
    }
}

/// Open conditional (stop) order
#[derive(Debug, Clone, PartialEq)]
pub struct StopOrder {
    pub algo_id: String,
    pub symbol: String,
    pub side: Side,
    pub trigger_price: f64,
    pub quantity: f64,
}

impl StopOrder {
    pub fn from_value(value: &Value) -> Result<Self, ApiError> {
        Ok(Self {
            algo_id: id_string(value, "algoId")?,
            symbol: string_field(value, "symbol")?,
            side: Side::parse(&string_field(value, "side")?)?,
            trigger_price: number_field(value, "triggerPrice")?,
            quantity: number_field(value, "quantity")?,
        })
    }
}

fn string_field(value: &Value, key: &str) -> Result<String, ApiError> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| ApiError::Decode(format!("missing field {}", key)))
}

/// Numbers arrive either as JSON numbers or as decimal strings
pub(crate) fn number_field(value: &Value, key: &str) -> Result<f64, ApiError> {
    match value.get(key) {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| ApiError::Decode(format!("{} is not a float", key))),
        Some(Value::String(s)) => s
            .parse::<f64>()
            .map_err(|e| ApiError::Decode(format!("{}: {}", key, e))),
        _ => Err(ApiError::Decode(format!("missing field {}", key))),
    }
}

fn id_string(value: &Value, key: &str) -> Result<String, ApiError> {
    match value.get(key) {
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::String(s)) => Ok(s.clone()),
        _ => Err(ApiError::Decode(format!("missing field {}", key))),
    }
}
