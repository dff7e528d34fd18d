//! Detailed error types for trading

use thiserror::Error;

use crate::api::ApiError;

/// Trading errors with detailed classification
#[derive(Error, Debug, Clone)]
pub enum TradingError {
    /// Exchange call failed
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Sizing produced no order
    #[error("Sizing rejected: {reason}")]
    SizingRejected { reason: String },

    /// Order notional below the exchange minimum
    #[error("Notional {notional:.4} below minimum {min_notional}")]
    InsufficientNotional { notional: f64, min_notional: f64 },

    /// Book snapshot can't be priced against
    #[error("Invalid order book: {reason}")]
    InvalidBook { reason: String },

    /// Entry not confirmed before the deadline
    #[error("Entry {order_id} not filled after {waited_secs}s")]
    FillTimeout { order_id: String, waited_secs: u64 },

    /// Required exchange state missing
    #[error("Missing data: {what}")]
    MissingData { what: String },
}

impl TradingError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            TradingError::Api(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            TradingError::Api(ApiError::Network(_)) => "NETWORK",
            TradingError::Api(ApiError::Timeout(_)) => "TIMEOUT",
            TradingError::Api(ApiError::RateLimited { .. }) => "RATE_LIMIT",
            TradingError::Api(ApiError::Server { .. }) => "SERVER",
            TradingError::Api(ApiError::Validation { .. }) => "VALIDATION",
            TradingError::Api(ApiError::Http { .. }) => "HTTP",
            TradingError::Api(ApiError::Decode(_)) => "DECODE",
            TradingError::Api(ApiError::Credentials(_)) => "AUTH",
            TradingError::SizingRejected { .. } => "SIZING",
            TradingError::InsufficientNotional { .. } => "NOTIONAL",
            TradingError::InvalidBook { .. } => "BOOK",
            TradingError::FillTimeout { .. } => "FILL_TIMEOUT",
            TradingError::MissingData { .. } => "MISSING_DATA",
        }
    }
}
