//! Per-symbol trading rules
//! Tick/step alignment and the rules lookup (refetched every tick)

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::api::types::number_field;
use crate::api::{ApiError, FuturesExchange};

/// Exchange filters for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRules {
    pub tick_size: f64,
    pub step_size: f64,
    pub min_qty: f64,
    pub min_notional: f64,
    pub price_precision: u32,
    pub qty_precision: u32,
}

impl Default for ExchangeRules {
    /// Conservative fallback used when the exchange cannot be queried
    fn default() -> Self {
        Self {
            tick_size: 0.01,
            step_size: 0.001,
            min_qty: 0.001,
            min_notional: 5.0,
            price_precision: 2,
            qty_precision: 3,
        }
    }
}

impl ExchangeRules {
    /// Parse one entry of the exchangeInfo `symbols` array
    pub fn from_symbol_info(info: &Value) -> Result<Self, ApiError> {
        let defaults = Self::default();
        let filters = info
            .get("filters")
            .and_then(|f| f.as_array())
            .ok_or_else(|| ApiError::Decode("missing filters".to_string()))?;

        let filter = |kind: &str| {
            filters
                .iter()
                .find(|f| f.get("filterType").and_then(|t| t.as_str()) == Some(kind))
        };

        let tick_size = filter("PRICE_FILTER")
            .map(|f| number_field(f, "tickSize"))
            .transpose()?
            .unwrap_or(defaults.tick_size);
        let (step_size, min_qty) = match filter("LOT_SIZE") {
            Some(f) => (number_field(f, "stepSize")?, number_field(f, "minQty")?),
            None => (defaults.step_size, defaults.min_qty),
        };
        let min_notional = filter("MIN_NOTIONAL")
            .map(|f| number_field(f, "notional").or_else(|_| number_field(f, "minNotional")))
            .transpose()?
            .unwrap_or(defaults.min_notional);

        let price_precision = info
            .get("pricePrecision")
            .and_then(|p| p.as_u64())
            .map(|p| p as u32)
            .unwrap_or_else(|| decimals_for(tick_size));
        let qty_precision = info
            .get("quantityPrecision")
            .and_then(|p| p.as_u64())
            .map(|p| p as u32)
            .unwrap_or_else(|| decimals_for(step_size));

        Ok(Self {
            tick_size,
            step_size,
            min_qty,
            min_notional,
            price_precision,
            qty_precision,
        })
    }

    pub fn adjust_price(&self, price: f64) -> f64 {
        adjust_to_tick(price, self.tick_size)
    }

    pub fn floor_qty(&self, quantity: f64) -> f64 {
        floor_to_step(quantity, self.step_size)
    }

    /// Quantity clears both the minimum size and the minimum notional
    pub fn clears_floor(&self, price: f64, quantity: f64) -> bool {
        let epsilon = self.step_size * 1e-6;
        quantity + epsilon >= self.min_qty && price * quantity + 1e-9 >= self.min_notional
    }
}

/// Number of decimals needed to express multiples of `increment`
pub fn decimals_for(increment: f64) -> u32 {
    if increment <= 0.0 || increment >= 1.0 {
        return 0;
    }
    let mut decimals = 0;
    let mut scaled = increment;
    while decimals < 12 && (scaled - scaled.round()).abs() > 1e-9 {
        scaled *= 10.0;
        decimals += 1;
    }
    decimals
}

fn clean(value: f64, increment: f64) -> f64 {
    let factor = 10f64.powi(decimals_for(increment) as i32);
    (value * factor).round() / factor
}

/// Round to the nearest multiple of `tick`
pub fn adjust_to_tick(price: f64, tick: f64) -> f64 {
    if tick <= 0.0 {
        return price;
    }
    clean((price / tick).round() * tick, tick)
}

/// Round down to a multiple of `step`
pub fn floor_to_step(quantity: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return quantity;
    }
    // guard against 0.3 / 0.1 = 2.9999999999999996
    let steps = (quantity / step + 1e-9).floor().max(0.0);
    clean(steps * step, step)
}

/// Rules lookup with no caching, so filter changes apply on the next tick
pub struct ExchangeRulesCache {
    exchange: Arc<dyn FuturesExchange>,
}

impl ExchangeRulesCache {
    pub fn new(exchange: Arc<dyn FuturesExchange>) -> Self {
        Self { exchange }
    }

    /// Always queries the exchange; falls back to conservative defaults
    pub async fn rules(&self, symbol: &str) -> ExchangeRules {
        match self.exchange.exchange_rules(symbol).await {
            Ok(rules) => {
                debug!(
                    "📐 Rules {}: tick={} step={} minQty={} minNotional={}",
                    symbol, rules.tick_size, rules.step_size, rules.min_qty, rules.min_notional
                );
                rules
            }
            Err(e) => {
                warn!("⚠️ Failed to fetch rules for {}, using defaults: {}", symbol, e);
                ExchangeRules::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockExchange;
    use serde_json::json;

    #[test]
    fn test_adjust_to_tick_is_multiple_and_close() {
        let cases = [
            (100.004, 0.01),
            (100.006, 0.01),
            (27_123.37, 0.1),
            (0.123_456, 0.0001),
            (1.05, 0.5),
            (99.999_999, 0.01),
        ];
        for (price, tick) in cases {
            let adjusted = adjust_to_tick(price, tick);
            let steps = adjusted / tick;
            assert!((steps - steps.round()).abs() < 1e-6, "{} not a multiple of {}", adjusted, tick);
            assert!((adjusted - price).abs() <= tick / 2.0 + 1e-9, "{} too far from {}", adjusted, price);
        }
    }

    #[test]
    fn test_adjust_to_tick_clean_values() {
        assert_eq!(adjust_to_tick(100.06000000001, 0.01), 100.06);
        assert_eq!(adjust_to_tick(100.5 * 1.0, 0.01), 100.5);
        assert_eq!(adjust_to_tick(98.8, 0.1), 98.8);
    }

    #[test]
    fn test_floor_to_step() {
        assert_eq!(floor_to_step(0.3, 0.1), 0.3);
        assert_eq!(floor_to_step(2.999, 1.0), 2.0);
        assert_eq!(floor_to_step(0.0019, 0.001), 0.001);
        assert_eq!(floor_to_step(-1.0, 0.001), 0.0);
    }

    #[test]
    fn test_decimals_for() {
        assert_eq!(decimals_for(0.01), 2);
        assert_eq!(decimals_for(0.001), 3);
        assert_eq!(decimals_for(0.5), 1);
        assert_eq!(decimals_for(1.0), 0);
        assert_eq!(decimals_for(10.0), 0);
    }

    #[test]
    fn test_from_symbol_info() {
        let info = json!({
            "symbol": "BTCUSDT",
            "pricePrecision": 2,
            "quantityPrecision": 3,
            "filters": [
                {"filterType": "PRICE_FILTER", "tickSize": "0.10", "minPrice": "556.80"},
                {"filterType": "LOT_SIZE", "stepSize": "0.001", "minQty": "0.001"},
                {"filterType": "MIN_NOTIONAL", "notional": "100"}
            ]
        });
        let rules = ExchangeRules::from_symbol_info(&info).unwrap();
        assert_eq!(rules.tick_size, 0.1);
        assert_eq!(rules.step_size, 0.001);
        assert_eq!(rules.min_notional, 100.0);
        assert_eq!(rules.price_precision, 2);
    }

    #[test]
    fn test_clears_floor() {
        let rules = ExchangeRules::default();
        assert!(rules.clears_floor(100.0, 0.05));
        assert!(!rules.clears_floor(100.0, 0.04));
        assert!(!rules.clears_floor(10_000.0, 0.0005));
    }

    #[tokio::test]
    async fn test_rules_fall_back_to_defaults() {
        let exchange = Arc::new(MockExchange::new());
        let cache = ExchangeRulesCache::new(exchange);
        assert_eq!(cache.rules("BTCUSDT").await, ExchangeRules::default());
    }

    #[tokio::test]
    async fn test_rules_fetched_every_call() {
        let exchange = Arc::new(MockExchange::new());
        let cache = ExchangeRulesCache::new(exchange.clone());

        let mut first = ExchangeRules::default();
        first.tick_size = 0.1;
        exchange.state.lock().unwrap().rules = Some(first.clone());
        assert_eq!(cache.rules("X").await, first);

        let mut second = first.clone();
        second.min_notional = 20.0;
        exchange.state.lock().unwrap().rules = Some(second.clone());
        assert_eq!(cache.rules("X").await, second);
    }
}
