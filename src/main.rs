//! Futures Ladder - Main entry point
//!
//! Config files: futures-ladder.toml, futures-ladder.yaml, config.toml
//! (or the path in FUTURES_LADDER_CONFIG)

use anyhow::Result;
use futures::FutureExt;
use futures_ladder::trading::TickAction;
use futures_ladder::*;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Re-sync the signing clock with the exchange this often
const TIME_SYNC_INTERVAL_SECS: u64 = 3600;

#[tokio::main]
async fn main() -> Result<()> {
    // Log panics with their location before the per-symbol handler swallows them
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown".to_string());
        eprintln!("🛑 PANIC at {}: {}", location, info);
        default_panic(info);
    }));

    let config = load_config()?;
    init_tracing(config.log_level.as_deref().unwrap_or("info"));

    info!("Starting Futures Ladder v{}", VERSION);
    info!("  Symbols: {}", config.trading.symbols.join(", "));
    info!("  Base unit: {} (+{})", config.trading.base_unit, config.trading.extra_amount);
    info!("  Leverage: {}x", config.trading.leverage);
    info!("  Tick interval: {}s", config.trading.tick_interval_secs);
    info!("  Hosts: {}", config.exchange.hosts.join(", "));

    let credentials = Credentials::from_files(
        &config.exchange.api_key_file,
        &config.exchange.api_secret_file,
    )
    .map_err(|e| anyhow::anyhow!("Failed to load API credentials: {}", e))?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let gateway = Arc::new(
        ExchangeGateway::new(config.gateway_config(), &credentials, clock.clone())
            .map_err(|e| anyhow::anyhow!("Failed to create exchange gateway: {}", e))?,
    );

    match gateway.sync_server_time().await {
        Ok(offset) => info!("Server time offset: {}ms", offset),
        Err(e) => warn!("Failed to get server time: {}", e),
    }

    let exchange: Arc<dyn FuturesExchange> = Arc::new(FuturesRestClient::new(gateway.clone()));
    let signals: Arc<dyn SignalSource> = Arc::new(JsonFileSignalSource::new(&config.signals.dir));
    let plans = PlanStore::load_or_new(config.state_path());
    info!("Signals from {}, {} exit plans restored", config.signals.dir.display(), plans.len());

    let mut engine = TradingEngine::new(exchange, signals, clock, config.engine_settings(), plans);

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel(1);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        let _ = shutdown_tx.send(()).await;
    });

    let mut trading_tick = interval(Duration::from_secs(config.trading.tick_interval_secs));
    trading_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut time_sync_tick = interval(Duration::from_secs(TIME_SYNC_INTERVAL_SECS));
    time_sync_tick.tick().await;

    info!("Bot initialized successfully, starting event loop...");

    loop {
        tokio::select! {
            _ = trading_tick.tick() => {
                for symbol in &config.trading.symbols {
                    let ctx = config.tick_context(symbol);

                    // A panic in one symbol must not stop the others
                    let result = AssertUnwindSafe(engine.run_tick(&ctx)).catch_unwind().await;
                    match result {
                        Ok(report) => match &report.action {
                            TickAction::Failed { category, message } => {
                                warn!("⚠️ {} tick failed [{}]: {}", symbol, category, message);
                            }
                            _ => debug!("{} tick: {:?}", symbol, report),
                        },
                        Err(_) => error!("🛑 {} tick panicked, continuing with next symbol", symbol),
                    }
                }
            }
            _ = time_sync_tick.tick() => {
                if let Err(e) = gateway.sync_server_time().await {
                    warn!("Failed to re-sync server time: {}", e);
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, saving state...");
                engine.plans().persist();
                info!("State saved, shutting down...");
                break;
            }
        }
    }

    Ok(())
}

/// Config file, then environment overrides, then validation
fn load_config() -> Result<Config> {
    let mut config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("No config file found ({}), using defaults", e);
            Config::default()
        }
    };

    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

/// `RUST_LOG` wins over the configured level
fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
