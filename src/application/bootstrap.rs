//! Wires `Config` into a runnable `Supervisor`: opens the database, builds
//! the sqlx repositories, picks the market-data/broker/AI adapters, and
//! assembles the port bundle. Kept separate from `main`/`server` so both
//! binaries share one startup path.

use std::sync::Arc;

use anyhow::{Context, Result};
use rust_decimal_macros::dec;
use tracing::info;

use crate::application::risk_gate::RiskGateConfig;
use crate::application::supervisor::{Ports, Supervisor, SupervisorConfig};
use crate::config::Config;
use crate::domain::types::Symbol;
use crate::infrastructure::ai_client::HttpAiClient;
use crate::infrastructure::database::Database;
use crate::infrastructure::http_client_factory::HttpClientFactory;
use crate::infrastructure::metrics::Metrics;
use crate::infrastructure::mock_market_data::MockMarketDataSource;
use crate::infrastructure::paper_broker::PaperBroker;
use crate::infrastructure::repositories::{
    SqliteBotStateRepository, SqliteDailyMetricsRepository, SqliteMarketAnalysisRepository,
    SqliteSystemEventRepository, SqliteTradeRepository,
};

/// Paper-trading starting balance; live trading reads its own balance from
/// the broker and this constant is unused in that mode.
const PAPER_STARTING_BALANCE: rust_decimal::Decimal = dec!(100_000);

pub async fn bootstrap(config: &Config) -> Result<Supervisor> {
    let database = Database::connect(&config.database_path)
        .await
        .with_context(|| format!("opening database at {}", config.database_path))?;
    let pool = database.pool.clone();

    let market_data = Arc::new(MockMarketDataSource::new(dec!(2650.00)));

    let broker: Arc<dyn crate::domain::ports::BrokerPort> = match config.broker.trading_mode {
        crate::domain::types::TradingMode::Paper => {
            info!("trading_mode=Paper: using the in-process paper broker");
            Arc::new(PaperBroker::new(PAPER_STARTING_BALANCE, market_data.clone()))
        }
        crate::domain::types::TradingMode::Live => {
            anyhow::bail!(
                "TRADING_MODE=live has no broker adapter wired up yet; run in paper mode"
            );
        }
    };

    let ai: Arc<dyn crate::domain::ports::AiPort> = match &config.ai.endpoint_url {
        Some(endpoint) => {
            let client = HttpClientFactory::create_client(config.ai.timeout);
            Arc::new(HttpAiClient::new(
                client,
                endpoint.clone(),
                config.ai.api_key.clone(),
                config.ai.timeout,
                config.ai.cache_ttl,
                config.ai.requests_per_minute,
            ))
        }
        None => {
            anyhow::bail!("AI_ENDPOINT_URL must be set; the daemon never trades without a second opinion");
        }
    };

    let metrics = Arc::new(Metrics::new().context("registering prometheus metrics")?);

    let ports = Ports {
        market_data,
        broker,
        ai,
        trades: Arc::new(SqliteTradeRepository::new(pool.clone())),
        daily_metrics: Arc::new(SqliteDailyMetricsRepository::new(pool.clone())),
        market_analysis: Arc::new(SqliteMarketAnalysisRepository::new(pool.clone())),
        system_events: Arc::new(SqliteSystemEventRepository::new(pool.clone())),
        bot_state: Arc::new(SqliteBotStateRepository::new(pool.clone())),
        metrics,
    };

    let supervisor_config = SupervisorConfig {
        symbol: Symbol::XAUUSD,
        timeframe: config.strategy.timeframe,
        analysis_interval: std::time::Duration::from_secs(config.strategy.analysis_interval_seconds),
        heartbeat_interval: std::time::Duration::from_secs(config.strategy.heartbeat_interval_seconds),
        trading_mode: config.broker.trading_mode,
        risk_percentage: config.risk.risk_percentage,
        max_risk_amount: config.risk.max_risk_amount,
        risk: RiskGateConfig {
            max_daily_loss: config.risk.max_daily_loss,
            max_trades_per_day: config.risk.max_trades_per_day,
            max_risk_per_trade: config.risk.max_risk_per_trade,
            risk_percentage: config.risk.risk_percentage,
        },
        max_positions: config.risk.max_positions,
        min_confidence: config.strategy.min_confidence,
        auto_restart: config.auto_restart,
    };

    Ok(Supervisor::new(supervisor_config, ports))
}
