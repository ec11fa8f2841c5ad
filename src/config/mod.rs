//! Environment-variable configuration: one struct per concern, one
//! `Config` that owns all of them and knows how to build from the
//! process environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use rust_decimal::Decimal;

use crate::domain::types::{ShutdownPolicy, Timeframe, TradingMode};

#[derive(Debug, Clone)]
pub struct StrategyEnvConfig {
    pub timeframe: Timeframe,
    pub analysis_interval_seconds: u64,
    pub heartbeat_interval_seconds: u64,
    pub min_confidence: Decimal,
}

impl StrategyEnvConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            timeframe: env_or("TIMEFRAME", "M5").parse().context("TIMEFRAME")?,
            analysis_interval_seconds: parse_u64("ANALYSIS_INTERVAL_SECONDS", 60)?,
            heartbeat_interval_seconds: parse_u64("HEARTBEAT_INTERVAL_SECONDS", 30)?,
            min_confidence: parse_decimal("MIN_CONFIDENCE", "0.60")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RiskEnvConfig {
    pub risk_percentage: Decimal,
    pub max_risk_amount: Decimal,
    pub max_risk_per_trade: Decimal,
    pub max_daily_loss: Decimal,
    pub max_positions: usize,
    pub max_trades_per_day: u32,
}

impl RiskEnvConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            risk_percentage: parse_decimal("RISK_PERCENTAGE", "0.01")?,
            max_risk_amount: parse_decimal("MAX_RISK_AMOUNT", "1000")?,
            max_risk_per_trade: parse_decimal("MAX_RISK_PER_TRADE", "0.02")?,
            max_daily_loss: parse_decimal("MAX_DAILY_LOSS", "500")?,
            max_positions: parse_usize("MAX_POSITIONS", 3)?,
            max_trades_per_day: parse_u32("MAX_TRADES_PER_DAY", 4)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct BrokerEnvConfig {
    pub trading_mode: TradingMode,
    pub shutdown_policy: ShutdownPolicy,
}

impl BrokerEnvConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            trading_mode: env_or("TRADING_MODE", "paper")
                .parse()
                .context("TRADING_MODE")?,
            shutdown_policy: env_or("SHUTDOWN_POLICY", "hold")
                .parse()
                .context("SHUTDOWN_POLICY")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct AiEnvConfig {
    pub endpoint_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub cache_ttl: Duration,
    pub requests_per_minute: u32,
}

impl AiEnvConfig {
    fn from_env() -> Result<Self> {
        Ok(Self {
            endpoint_url: env::var("AI_ENDPOINT_URL").ok(),
            api_key: env::var("AI_API_KEY").ok(),
            timeout: Duration::from_secs(parse_u64("AI_TIMEOUT_SECONDS", 20)?),
            cache_ttl: Duration::from_secs(parse_u64("AI_CACHE_TTL_SECONDS", 300)?),
            requests_per_minute: parse_u32("AI_REQUESTS_PER_MINUTE", 60)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ObservabilityEnvConfig {
    pub enabled: bool,
    pub interval: Duration,
}

impl ObservabilityEnvConfig {
    fn from_env() -> Self {
        Self {
            enabled: parse_bool("OBSERVABILITY_ENABLED", true),
            interval: Duration::from_secs(parse_u64("OBSERVABILITY_INTERVAL_SECONDS", 60).unwrap_or(60)),
        }
    }
}

/// Top-level configuration aggregating every env sub-config. Built once at
/// startup; never mutated afterward.
#[derive(Debug, Clone)]
pub struct Config {
    pub broker: BrokerEnvConfig,
    pub strategy: StrategyEnvConfig,
    pub risk: RiskEnvConfig,
    pub ai: AiEnvConfig,
    pub observability: ObservabilityEnvConfig,
    pub database_path: String,
    pub auto_restart: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            broker: BrokerEnvConfig::from_env()?,
            strategy: StrategyEnvConfig::from_env()?,
            risk: RiskEnvConfig::from_env()?,
            ai: AiEnvConfig::from_env()?,
            observability: ObservabilityEnvConfig::from_env(),
            database_path: env_or("DATABASE_PATH", "data/xautrade.db"),
            auto_restart: parse_bool("AUTO_RESTART", true),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_u64(key: &str, default: u64) -> Result<u64> {
    env_or(key, &default.to_string())
        .parse::<u64>()
        .context(format!("failed to parse {key}"))
}

fn parse_u32(key: &str, default: u32) -> Result<u32> {
    env_or(key, &default.to_string())
        .parse::<u32>()
        .context(format!("failed to parse {key}"))
}

fn parse_usize(key: &str, default: usize) -> Result<usize> {
    env_or(key, &default.to_string())
        .parse::<usize>()
        .context(format!("failed to parse {key}"))
}

fn parse_bool(key: &str, default: bool) -> bool {
    env_or(key, &default.to_string())
        .parse::<bool>()
        .unwrap_or(default)
}

fn parse_decimal(key: &str, default: &str) -> Result<Decimal> {
    let raw = env_or(key, default);
    Decimal::from_str(&raw).context(format!("failed to parse {key} as a decimal: {raw}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_cleanly() {
        let cfg = Config::from_env().expect("defaults must parse");
        assert_eq!(cfg.risk.max_positions, 3);
        assert_eq!(cfg.strategy.heartbeat_interval_seconds, 30);
        assert_eq!(cfg.database_path, "data/xautrade.db");
    }
}
