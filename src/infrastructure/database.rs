//! Database singleton: connects, enables WAL, and lays down the schema
//! described in the external interfaces section.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn connect(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)
                .await
                .context("failed to create database directory")?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context("failed to connect to sqlite database")?;

        info!(path, "connected to database");

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    async fn init_schema(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticket INTEGER NOT NULL UNIQUE,
                open_time TEXT NOT NULL,
                close_time TEXT,
                symbol TEXT NOT NULL,
                direction TEXT NOT NULL,
                entry TEXT NOT NULL,
                exit TEXT,
                sl TEXT NOT NULL,
                tp TEXT NOT NULL,
                lot TEXT NOT NULL,
                pnl TEXT,
                status TEXT NOT NULL,
                confidence TEXT NOT NULL,
                setup_quality INTEGER NOT NULL,
                smc_steps TEXT NOT NULL,
                reasoning TEXT NOT NULL,
                session TEXT NOT NULL,
                timeframe TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create trades table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS daily_metrics (
                date TEXT PRIMARY KEY,
                daily_pnl TEXT NOT NULL,
                cumulative_pnl TEXT NOT NULL,
                trades INTEGER NOT NULL,
                wins INTEGER NOT NULL,
                losses INTEGER NOT NULL,
                win_rate TEXT NOT NULL,
                max_drawdown TEXT NOT NULL,
                balance TEXT NOT NULL,
                risk_utilization TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create daily_metrics table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS market_analysis (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                at TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                price TEXT NOT NULL,
                trend TEXT NOT NULL,
                session TEXT NOT NULL,
                ob_count INTEGER NOT NULL,
                bos_detected BOOLEAN NOT NULL,
                grabs_count INTEGER NOT NULL,
                vwap TEXT NOT NULL,
                rsi TEXT NOT NULL,
                atr TEXT NOT NULL,
                setup_quality INTEGER NOT NULL,
                ai_confidence TEXT,
                analysis TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create market_analysis table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS system_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                at TEXT NOT NULL,
                kind TEXT NOT NULL,
                severity TEXT NOT NULL,
                message TEXT NOT NULL,
                details TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create system_events table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bot_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                is_running BOOLEAN NOT NULL,
                trading_mode TEXT NOT NULL,
                risk_percentage TEXT NOT NULL,
                max_risk_amount TEXT NOT NULL,
                last_updated TEXT NOT NULL,
                session_id TEXT NOT NULL,
                configuration TEXT NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("failed to create bot_state table")?;

        info!("database schema initialized");
        Ok(())
    }
}
