//! Port traits the application layer depends on. Infrastructure supplies
//! the concrete adapters (paper broker, mock market data, HTTP AI client,
//! sqlx repositories); the application never names a concrete type.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::errors::{AiError, BrokerError, MarketDataError, PersistenceError};
use super::types::{
    AccountInfo, Bar, BotState, DailyMetrics, MarketAnalysis, Position, Quote, Side, Symbol,
    SystemEvent, Timeframe, TradeRecord,
};

#[async_trait]
pub trait MarketDataPort: Send + Sync {
    async fn bars(
        &self,
        symbol: Symbol,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Bar>, MarketDataError>;

    async fn current_price(&self, symbol: Symbol) -> Result<Quote, MarketDataError>;
}

/// A structured request for the AI's opinion on a tentative signal.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AiPromptContext {
    pub symbol: String,
    pub current_price: Decimal,
    pub timeframe: String,
    pub session: String,
    pub smc_findings: serde_json::Value,
    pub indicators: serde_json::Value,
    pub account_balance: Decimal,
    pub risk_percentage: Decimal,
    pub technical_signal: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiDecisionKind {
    Buy,
    Sell,
    Hold,
}

#[derive(Debug, Clone)]
pub struct AiDecision {
    pub decision: AiDecisionKind,
    pub confidence: Decimal,
    pub entry: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub reasoning: String,
}

#[async_trait]
pub trait AiPort: Send + Sync {
    async fn validate(&self, context: &AiPromptContext) -> Result<AiDecision, AiError>;
}

#[async_trait]
pub trait BrokerPort: Send + Sync {
    async fn open(
        &self,
        symbol: Symbol,
        side: Side,
        volume: Decimal,
        sl: Decimal,
        tp: Decimal,
        comment: &str,
    ) -> Result<(u64, Decimal), BrokerError>;

    async fn close(&self, ticket: u64, exit_price: Decimal) -> Result<Decimal, BrokerError>;

    async fn modify(&self, ticket: u64, sl: Decimal, tp: Decimal) -> Result<(), BrokerError>;

    async fn current_price(&self, symbol: Symbol) -> Result<Quote, BrokerError>;

    async fn positions(&self) -> Result<Vec<Position>, BrokerError>;

    async fn account_info(&self) -> Result<AccountInfo, BrokerError>;

    async fn market_open(&self, symbol: Symbol, now: DateTime<Utc>) -> bool;
}

#[async_trait]
pub trait TradeRepository: Send + Sync {
    async fn insert_open(&self, position: &Position) -> Result<(), PersistenceError>;
    async fn update_close(&self, record: &TradeRecord) -> Result<(), PersistenceError>;
    async fn open_positions(&self) -> Result<Vec<Position>, PersistenceError>;
}

#[async_trait]
pub trait DailyMetricsRepository: Send + Sync {
    async fn get(&self, date: chrono::NaiveDate) -> Result<Option<DailyMetrics>, PersistenceError>;
    async fn upsert(
        &self,
        date: chrono::NaiveDate,
        metrics: &DailyMetrics,
    ) -> Result<(), PersistenceError>;
}

#[async_trait]
pub trait MarketAnalysisRepository: Send + Sync {
    async fn insert(&self, analysis: &MarketAnalysis) -> Result<(), PersistenceError>;
}

#[async_trait]
pub trait SystemEventRepository: Send + Sync {
    async fn insert(&self, event: &SystemEvent) -> Result<(), PersistenceError>;
}

#[async_trait]
pub trait BotStateRepository: Send + Sync {
    async fn load(&self) -> Result<Option<BotState>, PersistenceError>;
    async fn save(&self, state: &BotState) -> Result<(), PersistenceError>;
}
