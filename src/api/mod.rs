//! Futures exchange API
//! Signed REST gateway with mirror-host failover, and the typed endpoint surface

pub mod exchange;
pub mod gateway;
pub mod signing;
pub mod types;

#[cfg(test)]
pub mod mock;

pub use exchange::{FuturesExchange, FuturesRestClient};
pub use gateway::{ExchangeGateway, GatewayConfig, Method};
pub use signing::{Credentials, RequestSigner};
pub use types::{
    OrderAck, OrderRequest, OrderType, PositionRisk, RestingOrder, Side, StopOrder,
    StopOrderRequest, TimeInForce,
};

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Request timed out: {0}")]
    Timeout(String),
    #[error("Rate limited (HTTP {status})")]
    RateLimited { status: u16 },
    #[error("Server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },
    #[error("Exchange rejected request: code {code} - {message}")]
    Validation { code: i64, message: String },
    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Credentials error: {0}")]
    Credentials(String),
}

impl ApiError {
    /// Transient failures are retried across mirror hosts; everything else
    /// is surfaced to the caller as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Network(_)
                | ApiError::Timeout(_)
                | ApiError::RateLimited { .. }
                | ApiError::Server { .. }
        )
    }

    /// Exchange error code, if the exchange supplied one
    pub fn code(&self) -> Option<i64> {
        match self {
            ApiError::Validation { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(err.to_string())
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}

/// Human label for well-known exchange error codes, used in log lines only
pub fn describe_code(code: i64) -> &'static str {
    match code {
        -1021 => "timestamp outside recvWindow (clock skew)",
        -1022 => "invalid signature",
        -1111 => "precision over maximum",
        -2010 | -2019 => "insufficient margin",
        -2011 => "unknown order",
        -2022 => "reduce-only order rejected",
        -4003 => "quantity less than or equal to zero",
        -4164 => "notional below minimum",
        _ => "unclassified",
    }
}

/// Classify a non-success HTTP response
///
/// A well-formed `{code, msg}` body on a 4xx is a validation error. Long
/// bodies are truncated so they don't flood the log.
pub fn classify_response(status: u16, body: &str) -> ApiError {
    if status == 429 || status == 418 {
        return ApiError::RateLimited { status };
    }

    let message = if body.chars().count() > 500 {
        format!("{}... (truncated)", body.chars().take(500).collect::<String>())
    } else {
        body.to_string()
    };

    if status >= 500 {
        return ApiError::Server { status, message };
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(code) = value.get("code").and_then(|c| c.as_i64()) {
            let msg = value
                .get("msg")
                .and_then(|m| m.as_str())
                .unwrap_or_default()
                .to_string();
            return ApiError::Validation { code, message: msg };
        }
    }

    ApiError::Http { status, message }
}
