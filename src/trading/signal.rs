//! Inbound trading signals
//! The indicator pipeline that produces them lives outside this crate

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

use crate::trading::errors::TradingError;
use crate::trading::sizing::SizingState;

/// Directional instruction for one symbol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    EnterLong,
    EnterShort,
    Exit,
    #[default]
    None,
}

/// One signal as handed over by the producer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub symbol: String,
    #[serde(default)]
    pub signal: Signal,
    /// Reference price K
    #[serde(default)]
    pub reference_price: f64,
    #[serde(default)]
    pub sizing: SizingState,
    /// Used to act on each produced signal at most once
    #[serde(default)]
    pub generated_at: Option<DateTime<Utc>>,
}

impl SignalRecord {
    pub fn new(symbol: &str, signal: Signal, reference_price: f64, sizing: SizingState) -> Self {
        Self {
            symbol: symbol.to_string(),
            signal,
            reference_price,
            sizing,
            generated_at: None,
        }
    }

    pub fn with_generated_at(mut self, at: DateTime<Utc>) -> Self {
        self.generated_at = Some(at);
        self
    }
}

/// Where the engine reads signals from
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Latest signal for `symbol`, `None` when nothing is available
    async fn latest(&self, symbol: &str) -> Result<Option<SignalRecord>, TradingError>;
}

/// Reads `<dir>/<SYMBOL>.json`, rewritten by the producer on every update
#[derive(Debug, Clone)]
pub struct JsonFileSignalSource {
    dir: PathBuf,
}

impl JsonFileSignalSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}.json", symbol))
    }
}

#[async_trait]
impl SignalSource for JsonFileSignalSource {
    async fn latest(&self, symbol: &str) -> Result<Option<SignalRecord>, TradingError> {
        let path = self.path_for(symbol);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No signal file at {}", path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(TradingError::MissingData {
                    what: format!("signal file {}: {}", path.display(), e),
                })
            }
        };

        let mut record: SignalRecord =
            serde_json::from_str(&content).map_err(|e| TradingError::MissingData {
                what: format!("malformed signal file {}: {}", path.display(), e),
            })?;

        if record.symbol.is_empty() {
            record.symbol = symbol.to_string();
        }
        if record.symbol != symbol {
            return Err(TradingError::MissingData {
                what: format!("signal file {} is for {}", path.display(), record.symbol),
            });
        }
        Ok(Some(record))
    }
}
