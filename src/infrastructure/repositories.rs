//! sqlx-backed implementations of the domain repository ports. Decimal
//! and JSON values are stored as TEXT, the same convention the database
//! layer uses for every other monetary column.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use crate::domain::errors::PersistenceError;
use crate::domain::ports::{
    BotStateRepository, DailyMetricsRepository, MarketAnalysisRepository, SystemEventRepository,
    TradeRepository,
};
use crate::domain::types::{
    BotState, DailyMetrics, MarketAnalysis, Position, PositionStatus, Side, SystemEvent, Symbol,
    TradeRecord, Timeframe,
};

fn io_err(e: sqlx::Error) -> PersistenceError {
    PersistenceError::TransientIo {
        reason: e.to_string(),
    }
}

fn corrupt(reason: impl Into<String>) -> PersistenceError {
    PersistenceError::StateCorrupt {
        reason: reason.into(),
    }
}

fn parse_decimal(raw: &str, field: &str) -> Result<Decimal, PersistenceError> {
    Decimal::from_str(raw).map_err(|_| corrupt(format!("column {field} is not a valid decimal: {raw}")))
}

pub struct SqliteTradeRepository {
    pool: SqlitePool,
}

impl SqliteTradeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TradeRepository for SqliteTradeRepository {
    async fn insert_open(&self, position: &Position) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO trades (ticket, open_time, symbol, direction, entry, sl, tp, lot,
                                 status, confidence, setup_quality, smc_steps, reasoning, session, timeframe)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(position.ticket as i64)
        .bind(position.opened_at.to_rfc3339())
        .bind(position.symbol.as_ref())
        .bind(format!("{:?}", position.direction))
        .bind(position.entry_price.to_string())
        .bind(position.stop_loss.to_string())
        .bind(position.take_profit.to_string())
        .bind(position.volume.to_string())
        .bind(position.status.as_str())
        .bind(position.confidence_at_entry.to_string())
        .bind(position.setup_quality_at_entry as i64)
        .bind(serde_json::to_string(&position.smc_steps_at_entry).unwrap_or_default())
        .bind("opened")
        .bind("unspecified")
        .bind(position.timeframe.as_str())
        .execute(&self.pool)
        .await
        .map_err(io_err)?;
        Ok(())
    }

    async fn update_close(&self, record: &TradeRecord) -> Result<(), PersistenceError> {
        let position = &record.position;
        sqlx::query(
            r#"
            UPDATE trades
            SET close_time = ?, exit = ?, pnl = ?, status = ?, reasoning = ?, session = ?, timeframe = ?
            WHERE ticket = ?
            "#,
        )
        .bind(position.closed_at.map(|t| t.to_rfc3339()))
        .bind(position.exit_price.map(|p| p.to_string()))
        .bind(position.realized_pnl.map(|p| p.to_string()))
        .bind(position.status.as_str())
        .bind(&record.reasoning)
        .bind(&record.session)
        .bind(record.timeframe.as_str())
        .bind(position.ticket as i64)
        .execute(&self.pool)
        .await
        .map_err(io_err)?;
        Ok(())
    }

    async fn open_positions(&self) -> Result<Vec<Position>, PersistenceError> {
        let rows = sqlx::query("SELECT * FROM trades WHERE status = 'OPEN'")
            .fetch_all(&self.pool)
            .await
            .map_err(io_err)?;
        rows.iter().map(row_to_position).collect()
    }
}

fn row_to_position(row: &SqliteRow) -> Result<Position, PersistenceError> {
    let direction_str: String = row.try_get("direction").map_err(io_err)?;
    let direction = match direction_str.as_str() {
        "Buy" => Side::Buy,
        "Sell" => Side::Sell,
        other => return Err(corrupt(format!("unknown direction {other}"))),
    };
    let status_str: String = row.try_get("status").map_err(io_err)?;
    let status = match status_str.as_str() {
        "OPEN" => PositionStatus::Open,
        "CLOSED_SL" => PositionStatus::ClosedSl,
        "CLOSED_TP" => PositionStatus::ClosedTp,
        "CLOSED_MANUAL" => PositionStatus::ClosedManual,
        "CLOSED_FORCED" => PositionStatus::ClosedForced,
        other => return Err(corrupt(format!("unknown status {other}"))),
    };
    let opened_at_str: String = row.try_get("open_time").map_err(io_err)?;
    let opened_at: DateTime<Utc> = opened_at_str
        .parse()
        .map_err(|_| corrupt("unparseable open_time"))?;
    let entry: String = row.try_get("entry").map_err(io_err)?;
    let sl: String = row.try_get("sl").map_err(io_err)?;
    let tp: String = row.try_get("tp").map_err(io_err)?;
    let lot: String = row.try_get("lot").map_err(io_err)?;
    let confidence: String = row.try_get("confidence").map_err(io_err)?;
    let smc_steps: String = row.try_get("smc_steps").map_err(io_err)?;
    let ticket: i64 = row.try_get("ticket").map_err(io_err)?;
    let setup_quality: i64 = row.try_get("setup_quality").map_err(io_err)?;
    let timeframe_str: String = row.try_get("timeframe").map_err(io_err)?;
    let timeframe = Timeframe::from_str(&timeframe_str)
        .map_err(|_| corrupt(format!("unknown timeframe {timeframe_str}")))?;

    let entry_price = parse_decimal(&entry, "entry")?;

    Ok(Position {
        ticket: ticket as u64,
        symbol: Symbol::XAUUSD,
        timeframe,
        direction,
        volume: parse_decimal(&lot, "lot")?,
        entry_price,
        stop_loss: parse_decimal(&sl, "sl")?,
        take_profit: parse_decimal(&tp, "tp")?,
        opened_at,
        current_price: entry_price,
        unrealized_pnl: Decimal::ZERO,
        status,
        closed_at: None,
        exit_price: None,
        realized_pnl: None,
        confidence_at_entry: parse_decimal(&confidence, "confidence")?,
        setup_quality_at_entry: setup_quality as u8,
        smc_steps_at_entry: serde_json::from_str(&smc_steps).unwrap_or_default(),
    })
}

pub struct SqliteDailyMetricsRepository {
    pool: SqlitePool,
}

impl SqliteDailyMetricsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DailyMetricsRepository for SqliteDailyMetricsRepository {
    async fn get(&self, date: NaiveDate) -> Result<Option<DailyMetrics>, PersistenceError> {
        let row = sqlx::query("SELECT * FROM daily_metrics WHERE date = ?")
            .bind(date.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(io_err)?;

        let Some(row) = row else { return Ok(None) };

        Ok(Some(DailyMetrics {
            daily_pnl: parse_decimal(&row.try_get::<String, _>("daily_pnl").map_err(io_err)?, "daily_pnl")?,
            cumulative_pnl: parse_decimal(
                &row.try_get::<String, _>("cumulative_pnl").map_err(io_err)?,
                "cumulative_pnl",
            )?,
            trades_count: row.try_get::<i64, _>("trades").map_err(io_err)? as u32,
            wins: row.try_get::<i64, _>("wins").map_err(io_err)? as u32,
            losses: row.try_get::<i64, _>("losses").map_err(io_err)? as u32,
            win_rate: parse_decimal(&row.try_get::<String, _>("win_rate").map_err(io_err)?, "win_rate")?,
            max_drawdown: parse_decimal(
                &row.try_get::<String, _>("max_drawdown").map_err(io_err)?,
                "max_drawdown",
            )?,
            account_balance: parse_decimal(&row.try_get::<String, _>("balance").map_err(io_err)?, "balance")?,
            risk_utilization: parse_decimal(
                &row.try_get::<String, _>("risk_utilization").map_err(io_err)?,
                "risk_utilization",
            )?,
        }))
    }

    async fn upsert(&self, date: NaiveDate, metrics: &DailyMetrics) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO daily_metrics (date, daily_pnl, cumulative_pnl, trades, wins, losses,
                                        win_rate, max_drawdown, balance, risk_utilization)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(date) DO UPDATE SET
                daily_pnl = excluded.daily_pnl,
                cumulative_pnl = excluded.cumulative_pnl,
                trades = excluded.trades,
                wins = excluded.wins,
                losses = excluded.losses,
                win_rate = excluded.win_rate,
                max_drawdown = excluded.max_drawdown,
                balance = excluded.balance,
                risk_utilization = excluded.risk_utilization
            "#,
        )
        .bind(date.to_string())
        .bind(metrics.daily_pnl.to_string())
        .bind(metrics.cumulative_pnl.to_string())
        .bind(metrics.trades_count as i64)
        .bind(metrics.wins as i64)
        .bind(metrics.losses as i64)
        .bind(metrics.win_rate.to_string())
        .bind(metrics.max_drawdown.to_string())
        .bind(metrics.account_balance.to_string())
        .bind(metrics.risk_utilization.to_string())
        .execute(&self.pool)
        .await
        .map_err(io_err)?;
        Ok(())
    }
}

pub struct SqliteMarketAnalysisRepository {
    pool: SqlitePool,
}

impl SqliteMarketAnalysisRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MarketAnalysisRepository for SqliteMarketAnalysisRepository {
    async fn insert(&self, analysis: &MarketAnalysis) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO market_analysis (at, timeframe, price, trend, session, ob_count,
                                          bos_detected, grabs_count, vwap, rsi, atr, setup_quality,
                                          ai_confidence, analysis)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(analysis.at.to_rfc3339())
        .bind(analysis.timeframe.as_str())
        .bind(analysis.current_price.to_string())
        .bind(format!("{:?}", analysis.trend))
        .bind("unspecified")
        .bind(analysis.order_blocks.len() as i64)
        .bind(analysis.bos.detected)
        .bind(analysis.liquidity_grabs.len() as i64)
        .bind(analysis.indicators.vwap.to_string())
        .bind(analysis.indicators.rsi.to_string())
        .bind(analysis.indicators.atr.to_string())
        .bind(analysis.setup_quality as i64)
        .bind(None::<String>)
        .bind(serde_json::to_string(analysis).unwrap_or_default())
        .execute(&self.pool)
        .await
        .map_err(io_err)?;
        Ok(())
    }
}

pub struct SqliteSystemEventRepository {
    pool: SqlitePool,
}

impl SqliteSystemEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SystemEventRepository for SqliteSystemEventRepository {
    async fn insert(&self, event: &SystemEvent) -> Result<(), PersistenceError> {
        sqlx::query(
            "INSERT INTO system_events (at, kind, severity, message, details) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(event.at.to_rfc3339())
        .bind(event.kind.as_str())
        .bind(event.severity.as_str())
        .bind(&event.message)
        .bind(event.details.to_string())
        .execute(&self.pool)
        .await
        .map_err(io_err)?;
        Ok(())
    }
}

pub struct SqliteBotStateRepository {
    pool: SqlitePool,
}

impl SqliteBotStateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BotStateRepository for SqliteBotStateRepository {
    async fn load(&self) -> Result<Option<BotState>, PersistenceError> {
        let row = sqlx::query("SELECT * FROM bot_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(io_err)?;

        let Some(row) = row else { return Ok(None) };

        let trading_mode_str: String = row.try_get("trading_mode").map_err(io_err)?;
        let trading_mode = trading_mode_str
            .parse()
            .map_err(|_| corrupt(format!("unknown trading_mode {trading_mode_str}")))?;
        let last_updated_str: String = row.try_get("last_updated").map_err(io_err)?;
        let last_updated = last_updated_str
            .parse()
            .map_err(|_| corrupt("unparseable last_updated"))?;
        let configuration_str: String = row.try_get("configuration").map_err(io_err)?;

        Ok(Some(BotState {
            is_running: row.try_get("is_running").map_err(io_err)?,
            trading_mode,
            risk_percentage: parse_decimal(
                &row.try_get::<String, _>("risk_percentage").map_err(io_err)?,
                "risk_percentage",
            )?,
            max_risk_amount: parse_decimal(
                &row.try_get::<String, _>("max_risk_amount").map_err(io_err)?,
                "max_risk_amount",
            )?,
            last_updated,
            session_id: row.try_get("session_id").map_err(io_err)?,
            configuration: serde_json::from_str(&configuration_str).unwrap_or(serde_json::json!({})),
        }))
    }

    async fn save(&self, state: &BotState) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO bot_state (id, is_running, trading_mode, risk_percentage, max_risk_amount,
                                    last_updated, session_id, configuration)
            VALUES (1, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                is_running = excluded.is_running,
                trading_mode = excluded.trading_mode,
                risk_percentage = excluded.risk_percentage,
                max_risk_amount = excluded.max_risk_amount,
                last_updated = excluded.last_updated,
                session_id = excluded.session_id,
                configuration = excluded.configuration
            "#,
        )
        .bind(state.is_running)
        .bind(state.trading_mode.as_str())
        .bind(state.risk_percentage.to_string())
        .bind(state.max_risk_amount.to_string())
        .bind(state.last_updated.to_rfc3339())
        .bind(&state.session_id)
        .bind(state.configuration.to_string())
        .execute(&self.pool)
        .await
        .map_err(io_err)?;
        Ok(())
    }
}

