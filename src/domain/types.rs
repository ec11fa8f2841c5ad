//! Core value types shared across the pipeline: bars, symbols, timeframes,
//! SMC findings, signals, positions and the durable bot/account state.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Gold is the only tradable instrument; kept as a newtype so call sites
/// read `Symbol::XAUUSD` instead of a bare string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol(&'static str);

impl Symbol {
    pub const XAUUSD: Symbol = Symbol("XAUUSD");
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    M1,
    M5,
    M15,
    H1,
    H4,
    D1,
}

impl Timeframe {
    /// Minute count for this timeframe.
    pub fn minutes(self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::M1 => "M1",
            Timeframe::M5 => "M5",
            Timeframe::M15 => "M15",
            Timeframe::H1 => "H1",
            Timeframe::H4 => "H4",
            Timeframe::D1 => "D1",
        }
    }
}

impl std::str::FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "M1" => Ok(Timeframe::M1),
            "M5" => Ok(Timeframe::M5),
            "M15" => Ok(Timeframe::M15),
            "H1" => Ok(Timeframe::H1),
            "H4" => Ok(Timeframe::H4),
            "D1" => Ok(Timeframe::D1),
            _ => anyhow::bail!("Invalid TIMEFRAME: {}", s),
        }
    }
}

/// One OHLCV candle. Volume is an integer tick/contract count, not notional.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for Buy, -1 for Sell; used directly in the pnl formula.
    pub fn sign(self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObStatus {
    Fresh,
    Mitigated,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderBlock {
    pub kind: Direction,
    pub top: Decimal,
    pub bottom: Decimal,
    pub formed_at: DateTime<Utc>,
    pub strength: Decimal,
    pub status: ObStatus,
    pub timeframe: Timeframe,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BosFinding {
    pub detected: bool,
    pub direction: Direction,
    pub break_price: Decimal,
    pub at: DateTime<Utc>,
    pub strength: Decimal,
}

impl BosFinding {
    pub fn none(at: DateTime<Utc>) -> Self {
        Self {
            detected: false,
            direction: Direction::Neutral,
            break_price: Decimal::ZERO,
            at,
            strength: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrabKind {
    Upward,
    Downward,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LiquidityGrab {
    pub kind: GrabKind,
    pub price: Decimal,
    pub at: DateTime<Utc>,
    pub strength: Decimal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SessionLevels {
    pub session_high: Decimal,
    pub session_low: Decimal,
    pub prev_day_high: Decimal,
    pub prev_day_low: Decimal,
    pub weekly_high: Decimal,
    pub weekly_low: Decimal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Indicators {
    pub vwap: Decimal,
    pub ema21: Decimal,
    pub ema50: Decimal,
    pub ema200: Decimal,
    pub rsi: Decimal,
    pub atr: Decimal,
}

/// Immutable analysis of the bar series as of its last bar. Produced fresh
/// every tick and never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketAnalysis {
    pub at: DateTime<Utc>,
    pub timeframe: Timeframe,
    pub current_price: Decimal,
    pub trend: Direction,
    pub session_levels: SessionLevels,
    pub order_blocks: Vec<OrderBlock>,
    pub bos: BosFinding,
    pub liquidity_grabs: Vec<LiquidityGrab>,
    pub indicators: Indicators,
    pub setup_quality: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalDirection {
    Buy,
    Sell,
    Hold,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub direction: SignalDirection,
    pub confidence: Decimal,
    pub entry: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub risk_reward_ratio: Decimal,
    pub lot_size: Decimal,
    pub setup_quality: u8,
    pub reasons: Vec<String>,
    pub analysis: MarketAnalysis,
    pub ai_validated: Option<bool>,
    pub ai_confidence: Option<Decimal>,
    pub ts: DateTime<Utc>,
}

impl Signal {
    pub fn hold(analysis: MarketAnalysis, reason: impl Into<String>) -> Self {
        Self {
            direction: SignalDirection::Hold,
            confidence: Decimal::ZERO,
            entry: Decimal::ZERO,
            stop_loss: Decimal::ZERO,
            take_profit: Decimal::ZERO,
            risk_reward_ratio: Decimal::ZERO,
            lot_size: Decimal::ZERO,
            setup_quality: analysis.setup_quality,
            reasons: vec![reason.into()],
            ts: analysis.at,
            analysis,
            ai_validated: None,
            ai_confidence: None,
        }
    }

    pub fn is_hold(&self) -> bool {
        self.direction == SignalDirection::Hold
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PositionSize {
    pub lot_size: Decimal,
    pub ounces: Decimal,
    pub risk_amount: Decimal,
    pub pip_value: Decimal,
    pub stop_loss_distance_pips: Decimal,
    pub position_value: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    ClosedSl,
    ClosedTp,
    ClosedManual,
    ClosedForced,
}

impl PositionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PositionStatus::Open => "OPEN",
            PositionStatus::ClosedSl => "CLOSED_SL",
            PositionStatus::ClosedTp => "CLOSED_TP",
            PositionStatus::ClosedManual => "CLOSED_MANUAL",
            PositionStatus::ClosedForced => "CLOSED_FORCED",
        }
    }
}

/// A live or closed position. Owned exclusively by the BrokerExecutor while
/// open; migrated into a TradeRecord at close.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub ticket: u64,
    pub symbol: Symbol,
    pub timeframe: Timeframe,
    pub direction: Side,
    pub volume: Decimal,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub opened_at: DateTime<Utc>,
    pub current_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub status: PositionStatus,
    pub closed_at: Option<DateTime<Utc>>,
    pub exit_price: Option<Decimal>,
    pub realized_pnl: Option<Decimal>,
    pub confidence_at_entry: Decimal,
    pub setup_quality_at_entry: u8,
    pub smc_steps_at_entry: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradingMode {
    Paper,
    Live,
}

impl TradingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TradingMode::Paper => "Paper",
            TradingMode::Live => "Live",
        }
    }
}

impl std::str::FromStr for TradingMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "paper" => Ok(TradingMode::Paper),
            "live" => Ok(TradingMode::Live),
            _ => anyhow::bail!("Invalid TRADING_MODE: {}", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownPolicy {
    Hold,
    Liquidate,
}

impl std::str::FromStr for ShutdownPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hold" => Ok(ShutdownPolicy::Hold),
            "liquidate" => Ok(ShutdownPolicy::Liquidate),
            _ => anyhow::bail!("Invalid SHUTDOWN_POLICY: {}", s),
        }
    }
}

/// Durable singleton row; the source of truth for "should the daemon be
/// trading right now" across restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotState {
    pub is_running: bool,
    pub trading_mode: TradingMode,
    pub risk_percentage: Decimal,
    pub max_risk_amount: Decimal,
    pub last_updated: DateTime<Utc>,
    pub session_id: String,
    pub configuration: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DailyMetrics {
    pub daily_pnl: Decimal,
    pub cumulative_pnl: Decimal,
    pub trades_count: u32,
    pub wins: u32,
    pub losses: u32,
    pub win_rate: Decimal,
    pub max_drawdown: Decimal,
    pub account_balance: Decimal,
    pub risk_utilization: Decimal,
}

impl DailyMetrics {
    pub fn empty(balance: Decimal) -> Self {
        Self {
            daily_pnl: Decimal::ZERO,
            cumulative_pnl: Decimal::ZERO,
            trades_count: 0,
            wins: 0,
            losses: 0,
            win_rate: Decimal::ZERO,
            max_drawdown: Decimal::ZERO,
            account_balance: balance,
            risk_utilization: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub position: Position,
    pub reasoning: String,
    pub session: String,
    pub timeframe: Timeframe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Trade,
    Signal,
    Error,
    Warning,
    Info,
    Lifecycle,
    RiskBreach,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Trade => "TRADE",
            EventKind::Signal => "SIGNAL",
            EventKind::Error => "ERROR",
            EventKind::Warning => "WARNING",
            EventKind::Info => "INFO",
            EventKind::Lifecycle => "LIFECYCLE",
            EventKind::RiskBreach => "RISK_BREACH",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemEvent {
    pub at: DateTime<Utc>,
    pub kind: EventKind,
    pub severity: Severity,
    pub message: String,
    pub details: serde_json::Value,
}

impl SystemEvent {
    pub fn new(
        kind: EventKind,
        severity: Severity,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            at: Utc::now(),
            kind,
            severity,
            message: message.into(),
            details,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AccountInfo {
    pub balance: Decimal,
    pub equity: Decimal,
    pub currency: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct Quote {
    pub bid: Decimal,
    pub ask: Decimal,
    pub time: DateTime<Utc>,
}
