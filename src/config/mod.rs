//! Configuration management
//! Supports TOML, YAML, JSON config files with environment overrides

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::api::GatewayConfig;
use crate::trading::context::TickContext;
use crate::trading::engine::EngineSettings;
use crate::trading::exit_plan::ExitLadderConfig;
use crate::trading::lifecycle::LifecycleConfig;
use crate::trading::plan_store::PlanStore;
use crate::trading::price_engine::DEFAULT_WALL_RATIO;
use crate::utils::BackoffPolicy;

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "FUTURES_LADDER_CONFIG";

/// Bot configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Exchange connectivity
    pub exchange: ExchangeConfig,
    /// Trading parameters
    pub trading: TradingConfig,
    /// Inbound signal location
    pub signals: SignalsConfig,
    /// Exit plan state file, defaults under the user data directory
    pub state_path: Option<PathBuf>,
    /// Logging level
    pub log_level: Option<String>,
}

/// Exchange configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Mirror hosts; attempt n goes to host n % len
    pub hosts: Vec<String>,
    pub recv_window_ms: u64,
    pub request_timeout_secs: u64,
    /// File holding the API key
    pub api_key_file: PathBuf,
    /// File holding the API secret
    pub api_secret_file: PathBuf,
    pub retry: BackoffPolicy,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            hosts: vec![
                "https://fapi.binance.com".to_string(),
                "https://fapi1.binance.com".to_string(),
                "https://fapi2.binance.com".to_string(),
            ],
            recv_window_ms: 5000,
            request_timeout_secs: 10,
            api_key_file: PathBuf::from("secrets/api_key"),
            api_secret_file: PathBuf::from("secrets/api_secret"),
            retry: BackoffPolicy::default(),
        }
    }
}

/// Trading configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    /// Symbols processed in this order every tick
    pub symbols: Vec<String>,
    /// Base order notional before the Z multiple (default: 10.0)
    pub base_unit: f64,
    /// Added to the base unit before scaling (default: 0.0)
    pub extra_amount: f64,
    /// Leverage set before every entry (default: 1)
    pub leverage: u32,
    /// Seconds between ticks (default: 60)
    pub tick_interval_secs: u64,
    /// Position poll interval while waiting for a fill (default: 2)
    pub fill_poll_secs: u64,
    /// Give up on a fill after this long (default: 60)
    pub fill_timeout_secs: u64,
    /// Queue imbalance treated as a wall (default: 3.0)
    pub wall_ratio: f64,
    /// TP/SL ladder and break-even parameters
    pub exits: ExitLadderConfig,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            symbols: vec!["BTCUSDT".to_string()],
            base_unit: 10.0,
            extra_amount: 0.0,
            leverage: 1,
            tick_interval_secs: 60,
            fill_poll_secs: 2,
            fill_timeout_secs: 60,
            wall_ratio: DEFAULT_WALL_RATIO,
            exits: ExitLadderConfig::default(),
        }
    }
}

/// Signal source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalsConfig {
    /// Directory with one `<SYMBOL>.json` per symbol
    pub dir: PathBuf,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self { dir: PathBuf::from("signals") }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)?;
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config = match extension {
            "toml" => toml::from_str(&content)?,
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            // Try to auto-detect format
            _ if content.trim().starts_with('{') => serde_json::from_str(&content)?,
            _ if content.contains("---") => serde_yaml::from_str(&content)?,
            _ => toml::from_str(&content)?,
        };

        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Load from `FUTURES_LADDER_CONFIG` or the default locations
    pub fn load() -> anyhow::Result<Self> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Self::from_file(path);
        }

        let locations = [
            "futures-ladder.toml",
            "futures-ladder.yaml",
            "futures-ladder.yml",
            "futures-ladder.json",
            "config.toml",
            "config.yaml",
        ];

        for location in &locations {
            if Path::new(location).exists() {
                return Self::from_file(location);
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let config_file = config_dir.join("futures-ladder/config.toml");
            if config_file.exists() {
                return Self::from_file(config_file);
            }
        }

        anyhow::bail!("No configuration file found. Expected one of: {:?}", locations)
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`; environment values win over the file
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(key: &str, raw: String) -> anyhow::Result<T> {
            raw.trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid value for {}: {:?}", key, raw))
        }

        if let Some(path) = lookup("FUTURES_API_KEY_FILE") {
            self.exchange.api_key_file = PathBuf::from(path);
        }
        if let Some(path) = lookup("FUTURES_API_SECRET_FILE") {
            self.exchange.api_secret_file = PathBuf::from(path);
        }
        if let Some(hosts) = lookup("FUTURES_HOSTS") {
            self.exchange.hosts = split_list(&hosts);
        }
        if let Some(symbols) = lookup("SYMBOLS") {
            self.trading.symbols = split_list(&symbols)
                .into_iter()
                .map(|s| s.to_uppercase())
                .collect();
        }
        if let Some(raw) = lookup("BASE_UNIT") {
            self.trading.base_unit = parsed("BASE_UNIT", raw)?;
        }
        if let Some(raw) = lookup("EXTRA_AMOUNT") {
            self.trading.extra_amount = parsed("EXTRA_AMOUNT", raw)?;
        }
        if let Some(raw) = lookup("LEVERAGE") {
            self.trading.leverage = parsed("LEVERAGE", raw)?;
        }
        if let Some(raw) = lookup("TICK_INTERVAL_SECS") {
            self.trading.tick_interval_secs = parsed("TICK_INTERVAL_SECS", raw)?;
        }
        if let Some(dir) = lookup("SIGNALS_DIR") {
            self.signals.dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("STATE_PATH") {
            self.state_path = Some(PathBuf::from(path));
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.log_level = Some(level);
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.exchange.hosts.is_empty() {
            anyhow::bail!("At least one exchange host is required");
        }
        if let Some(host) = self.exchange.hosts.iter().find(|h| !h.starts_with("http")) {
            anyhow::bail!("Exchange host must be an http(s) URL: {}", host);
        }
        if self.exchange.request_timeout_secs == 0 {
            anyhow::bail!("Request timeout must be positive");
        }
        if self.trading.symbols.is_empty() {
            anyhow::bail!("At least one symbol is required");
        }
        if self.trading.base_unit <= 0.0 {
            anyhow::bail!("Base unit must be positive");
        }
        if self.trading.extra_amount < 0.0 {
            anyhow::bail!("Extra amount must not be negative");
        }
        if self.trading.leverage == 0 {
            anyhow::bail!("Leverage must be at least 1");
        }
        if self.trading.tick_interval_secs == 0 {
            anyhow::bail!("Tick interval must be positive");
        }
        if self.trading.fill_poll_secs == 0 || self.trading.fill_timeout_secs < self.trading.fill_poll_secs {
            anyhow::bail!("Fill timeout must be at least one poll interval");
        }
        if self.trading.wall_ratio < 1.0 {
            anyhow::bail!("Wall ratio must be at least 1");
        }

        let exits = &self.trading.exits;
        if exits.take_profit_levels.is_empty() || exits.take_profit_levels.iter().any(|l| *l <= 0.0) {
            anyhow::bail!("Take-profit levels must be positive and non-empty");
        }
        if exits.stop_loss_pct <= 0.0 || exits.stop_loss_pct >= 1.0 {
            anyhow::bail!("Stop-loss percent must be between 0 and 1");
        }
        if exits.stop_loss_legs == 0 {
            anyhow::bail!("Stop-loss legs must be at least 1");
        }
        if exits.break_even_offset < 0.0 || exits.break_even_tolerance <= 0.0 {
            anyhow::bail!("Break-even offset and tolerance must be non-negative and positive");
        }
        Ok(())
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            hosts: self.exchange.hosts.clone(),
            recv_window_ms: self.exchange.recv_window_ms,
            request_timeout: Duration::from_secs(self.exchange.request_timeout_secs),
            backoff: self.exchange.retry.clone(),
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            extra_amount: self.trading.extra_amount,
            wall_ratio: self.trading.wall_ratio,
            lifecycle: LifecycleConfig {
                fill_poll_interval: Duration::from_secs(self.trading.fill_poll_secs),
                fill_timeout: Duration::from_secs(self.trading.fill_timeout_secs),
                ladder: self.trading.exits.clone(),
            },
        }
    }

    /// Per-tick context for one configured symbol
    pub fn tick_context(&self, symbol: &str) -> TickContext {
        TickContext::new(symbol, self.trading.base_unit, self.trading.leverage)
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_path.clone().unwrap_or_else(PlanStore::default_path)
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}
