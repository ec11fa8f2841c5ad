//! C7: the long-lived control task. Drives one symbol's decision loop
//! end to end, owns no state the repositories don't also durably hold,
//! and is the only task allowed to mutate open positions through the
//! BrokerExecutor.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc, Weekday};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tokio::sync::Notify;
use tokio::time::{self, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::ai_validator::AiValidator;
use crate::application::broker_executor::BrokerExecutor;
use crate::application::risk_gate::{RiskCounters, RiskGate, RiskGateConfig};
use crate::application::signal_engine::{SignalEngine, SignalEngineConfig};
use crate::application::smc_analyzer::SmcAnalyzer;
use crate::domain::ports::{
    AiPort, AiPromptContext, BotStateRepository, BrokerPort, DailyMetricsRepository,
    MarketAnalysisRepository, MarketDataPort, SystemEventRepository, TradeRepository,
};
use crate::domain::types::{
    BotState, DailyMetrics, EventKind, Severity, Symbol, SystemEvent, Timeframe, TradingMode,
};
use crate::infrastructure::metrics::Metrics;

/// Asian 22:00-07:00, London 07:00-10:00, New York 13:30-16:00 UTC.
/// Returns `false` on Saturday, Friday >= 22:00, and Sunday < 22:00.
pub fn is_market_open(now: DateTime<Utc>) -> bool {
    match now.weekday() {
        Weekday::Sat => false,
        Weekday::Fri if now.hour() >= 22 => false,
        Weekday::Sun if now.hour() < 22 => false,
        _ => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketSession {
    Asian,
    London,
    NewYork,
    Overlap,
    Closed,
}

impl MarketSession {
    pub fn as_str(self) -> &'static str {
        match self {
            MarketSession::Asian => "Asian",
            MarketSession::London => "London",
            MarketSession::NewYork => "NewYork",
            MarketSession::Overlap => "Overlap",
            MarketSession::Closed => "Closed",
        }
    }
}

pub fn current_session(now: DateTime<Utc>) -> MarketSession {
    if !is_market_open(now) {
        return MarketSession::Closed;
    }
    let hour = now.hour();
    let in_asian = !(7..22).contains(&hour);
    let in_london = (7..10).contains(&hour);
    let in_ny = (13..16).contains(&hour) && !(hour == 13 && now.minute() < 30);
    match (in_asian, in_london, in_ny) {
        (_, true, true) => MarketSession::Overlap,
        (_, true, false) => MarketSession::London,
        (_, false, true) => MarketSession::NewYork,
        (true, false, false) => MarketSession::Asian,
        _ => MarketSession::Closed,
    }
}

/// Buckets a RiskGate rejection reason into a fixed, low-cardinality label
/// for the `risk_blocks_total` metric; the full reason still goes into the
/// persisted SystemEvent.
fn classify_risk_reason(reason: &str) -> &'static str {
    if reason.contains("Daily loss limit") {
        "daily_loss_limit"
    } else if reason.contains("Drawdown limit") {
        "drawdown_limit"
    } else if reason.contains("Daily trade count") {
        "trade_count_limit"
    } else if reason.contains("entry/SL/TP") {
        "invalid_levels"
    } else if reason.contains("risk_reward_ratio") {
        "risk_reward_floor"
    } else if reason.contains("lot_size") {
        "zero_lot_size"
    } else if reason.contains("risk_amount") {
        "risk_amount_exceeded"
    } else {
        "other"
    }
}

/// Daily-loss and drawdown breaches are the two classes serious enough
/// to page as RiskBreach/HIGH; every other rejection is routine.
fn risk_rejection_event(reason_class: &str) -> (EventKind, Severity) {
    match reason_class {
        "daily_loss_limit" | "drawdown_limit" => (EventKind::RiskBreach, Severity::High),
        _ => (EventKind::Signal, Severity::Low),
    }
}

/// Bounded event queue with genuine drop-oldest backpressure: when full,
/// the oldest queued event is evicted to make room for the new one
/// rather than the new one being silently refused.
pub struct EventQueue {
    capacity: usize,
    inner: StdMutex<VecDeque<SystemEvent>>,
    notify: Notify,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: StdMutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
        }
    }

    /// Returns `true` if pushing this event evicted the oldest one.
    fn push(&self, event: SystemEvent) -> bool {
        let mut queue = self.inner.lock().unwrap();
        let dropped = if queue.len() >= self.capacity {
            queue.pop_front();
            true
        } else {
            false
        };
        queue.push_back(event);
        drop(queue);
        self.notify.notify_one();
        dropped
    }

    /// Waits for and removes the oldest event. Never returns `None`;
    /// callers race this against a cancellation signal.
    async fn pop(&self) -> SystemEvent {
        loop {
            if let Some(event) = self.inner.lock().unwrap().pop_front() {
                return event;
            }
            self.notify.notified().await;
        }
    }

    fn drain(&self) -> Vec<SystemEvent> {
        self.inner.lock().unwrap().drain(..).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OverallStatus {
    Online,
    Starting,
    Stopping,
    Offline,
    Error,
}

impl OverallStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            OverallStatus::Online => "ONLINE",
            OverallStatus::Starting => "STARTING",
            OverallStatus::Stopping => "STOPPING",
            OverallStatus::Offline => "OFFLINE",
            OverallStatus::Error => "ERROR",
        }
    }
}

/// Snapshot handed to the UI collaborator. `overall_status` is derived
/// from `daemon_running` and the persisted `BotState.is_running`, never
/// stored directly.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StatusSnapshot {
    pub overall_status: OverallStatus,
    pub daemon_running: bool,
    pub database_running: bool,
    pub trading_mode: TradingMode,
    pub risk_percentage: Decimal,
    pub max_risk_amount: Decimal,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub uptime_seconds: Option<i64>,
    pub trades_today: u32,
    pub open_positions: usize,
    pub session_id: String,
}

pub struct SupervisorConfig {
    pub symbol: Symbol,
    pub timeframe: Timeframe,
    pub analysis_interval: Duration,
    pub heartbeat_interval: Duration,
    pub trading_mode: TradingMode,
    pub risk_percentage: Decimal,
    pub max_risk_amount: Decimal,
    pub risk: RiskGateConfig,
    pub max_positions: usize,
    pub min_confidence: Decimal,
    pub auto_restart: bool,
}

pub struct Ports {
    pub market_data: Arc<dyn MarketDataPort>,
    pub broker: Arc<dyn BrokerPort>,
    pub ai: Arc<dyn AiPort>,
    pub trades: Arc<dyn TradeRepository>,
    pub daily_metrics: Arc<dyn DailyMetricsRepository>,
    pub market_analysis: Arc<dyn MarketAnalysisRepository>,
    pub system_events: Arc<dyn SystemEventRepository>,
    pub bot_state: Arc<dyn BotStateRepository>,
    pub metrics: Arc<Metrics>,
}

pub struct Supervisor {
    cfg: SupervisorConfig,
    ports: Ports,
    executor: BrokerExecutor,
    session_id: String,
    daily_date: NaiveDate,
    daily_trade_count: u32,
    daily_realized_pnl: Decimal,
    daily_wins: u32,
    daily_losses: u32,
    cumulative_pnl: Decimal,
    cancel: CancellationToken,
    started_at: StdMutex<Option<DateTime<Utc>>>,
}

/// Bounded event queue; dropped events are surfaced as a WARNING
/// rather than blocking the decision tick.
const EVENT_CHANNEL_CAPACITY: usize = 256;

impl Supervisor {
    pub fn new(cfg: SupervisorConfig, ports: Ports) -> Self {
        Self {
            cfg,
            ports,
            executor: BrokerExecutor::new(),
            session_id: Uuid::new_v4().to_string(),
            daily_date: Utc::now().date_naive(),
            daily_trade_count: 0,
            daily_realized_pnl: Decimal::ZERO,
            daily_wins: 0,
            daily_losses: 0,
            cumulative_pnl: Decimal::ZERO,
            cancel: CancellationToken::new(),
            started_at: StdMutex::new(None),
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Handle to the Prometheus registry, for binaries that push or
    /// serve metrics alongside the supervisor loop.
    pub fn metrics(&self) -> Arc<Metrics> {
        self.ports.metrics.clone()
    }

    /// Current status for the UI collaborator. Degrades gracefully on
    /// persistence failure instead of propagating an error: a status
    /// read should never be the thing that fails.
    pub async fn status(&self) -> StatusSnapshot {
        let (database_running, state) = match self.ports.bot_state.load().await {
            Ok(state) => (true, state),
            Err(e) => {
                warn!(error = %e, "status: failed to read bot_state");
                (false, None)
            }
        };

        let started_at: Option<DateTime<Utc>> = *self.started_at.lock().unwrap();
        let daemon_running = started_at.is_some() && !self.cancel.is_cancelled();
        let bot_state_running = state.as_ref().map(|s| s.is_running).unwrap_or(false);

        let overall_status = if !database_running {
            OverallStatus::Error
        } else if daemon_running && bot_state_running {
            OverallStatus::Online
        } else if bot_state_running && !daemon_running {
            OverallStatus::Starting
        } else if daemon_running && !bot_state_running {
            OverallStatus::Stopping
        } else {
            OverallStatus::Offline
        };

        let uptime_seconds = started_at.map(|at| (Utc::now() - at).num_seconds());

        StatusSnapshot {
            overall_status,
            daemon_running,
            database_running,
            trading_mode: state.as_ref().map(|s| s.trading_mode).unwrap_or(self.cfg.trading_mode),
            risk_percentage: state.as_ref().map(|s| s.risk_percentage).unwrap_or(self.cfg.risk_percentage),
            max_risk_amount: state.as_ref().map(|s| s.max_risk_amount).unwrap_or(self.cfg.max_risk_amount),
            last_heartbeat: state.as_ref().map(|s| s.last_updated),
            uptime_seconds,
            trades_today: self.daily_trade_count,
            open_positions: self.executor.open_count(),
            session_id: self.session_id.clone(),
        }
    }

    /// Stop the daemon if running and reset `bot_state` to a clean
    /// not-running Paper state, without touching trade or metrics
    /// history. Safe to call whether or not the daemon is running.
    pub async fn force_cleanup(&self) -> anyhow::Result<()> {
        self.cancel.cancel();
        *self.started_at.lock().unwrap() = None;

        let state = BotState {
            is_running: false,
            trading_mode: TradingMode::Paper,
            risk_percentage: self.cfg.risk_percentage,
            max_risk_amount: self.cfg.max_risk_amount,
            last_updated: Utc::now(),
            session_id: self.session_id.clone(),
            configuration: serde_json::json!({}),
        };
        self.ports.bot_state.save(&state).await?;
        self.emit_event(SystemEvent::new(
            EventKind::Info,
            Severity::Medium,
            "force_cleanup: daemon stopped and bot_state reset to Paper; trade history untouched",
            serde_json::json!({ "session_id": self.session_id }),
        ))
        .await;
        Ok(())
    }

    /// Start the daemon: reconcile against the broker's authoritative
    /// position list, mark BotState running, and enter the tick loop.
    pub async fn start(mut self) -> anyhow::Result<()> {
        self.reconcile_on_startup().await;
        *self.started_at.lock().unwrap() = Some(Utc::now());

        let state = BotState {
            is_running: true,
            trading_mode: self.cfg.trading_mode,
            risk_percentage: self.cfg.risk_percentage,
            max_risk_amount: self.cfg.max_risk_amount,
            last_updated: Utc::now(),
            session_id: self.session_id.clone(),
            configuration: serde_json::json!({}),
        };
        self.ports.bot_state.save(&state).await?;
        self.emit_event(SystemEvent::new(
            EventKind::Lifecycle,
            Severity::Low,
            "daemon started",
            serde_json::json!({ "session_id": self.session_id }),
        ))
        .await;

        let events = Arc::new(EventQueue::new(EVENT_CHANNEL_CAPACITY));
        let system_events = self.ports.system_events.clone();
        let fanout_events = events.clone();
        let fanout_cancel = self.cancel.clone();
        let fanout = tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = fanout_events.pop() => {
                        if let Err(e) = system_events.insert(&event).await {
                            error!(error = %e, "failed to persist system event");
                        }
                    }
                    _ = fanout_cancel.cancelled() => break,
                }
            }
            for event in fanout_events.drain() {
                if let Err(e) = system_events.insert(&event).await {
                    error!(error = %e, "failed to persist system event during shutdown drain");
                }
            }
        });

        let mut analysis_interval = time::interval(self.cfg.analysis_interval);
        let mut heartbeat_interval = time::interval(self.cfg.heartbeat_interval);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("supervisor cancellation received, finishing current tick and stopping");
                    break;
                }
                _ = analysis_interval.tick() => {
                    if let Err(e) = self.run_tick(true, &events).await {
                        error!(error = %e, "tick failed");
                    }
                }
                _ = heartbeat_interval.tick() => {
                    if let Err(e) = self.run_tick(false, &events).await {
                        error!(error = %e, "heartbeat tick failed");
                    }
                }
            }
        }

        self.stop().await?;
        let _ = fanout.await;
        Ok(())
    }

    /// Writes the stopped BotState and emits the stop event directly,
    /// bypassing the queue: the fanout task may already be winding down
    /// by the time this runs.
    async fn stop(&mut self) -> anyhow::Result<()> {
        *self.started_at.lock().unwrap() = None;
        let state = BotState {
            is_running: false,
            trading_mode: self.cfg.trading_mode,
            risk_percentage: self.cfg.risk_percentage,
            max_risk_amount: self.cfg.max_risk_amount,
            last_updated: Utc::now(),
            session_id: self.session_id.clone(),
            configuration: serde_json::json!({}),
        };
        self.ports.bot_state.save(&state).await?;
        self.emit_event(SystemEvent::new(
            EventKind::Lifecycle,
            Severity::Low,
            "daemon stopped",
            serde_json::json!({ "session_id": self.session_id }),
        ))
        .await;
        Ok(())
    }

    /// Diff the broker's authoritative open positions against `trades`
    /// rows still marked OPEN. Orphaned rows are force-closed and
    /// reported as a CRITICAL event.
    async fn reconcile_on_startup(&mut self) {
        let broker_positions = match self.ports.broker.positions().await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "could not fetch broker positions for reconciliation");
                return;
            }
        };
        let recorded_open = match self.ports.trades.open_positions().await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "could not fetch recorded open trades for reconciliation");
                return;
            }
        };

        let broker_tickets: std::collections::HashSet<u64> =
            broker_positions.iter().map(|p| p.ticket).collect();

        self.executor.adopt(broker_positions);

        for mut orphan in recorded_open {
            if broker_tickets.contains(&orphan.ticket) {
                continue;
            }
            orphan.status = crate::domain::types::PositionStatus::ClosedForced;
            orphan.closed_at = Some(Utc::now());
            orphan.exit_price = Some(orphan.current_price);
            let record = crate::domain::types::TradeRecord {
                position: orphan,
                reasoning: "orphaned on restart: no matching broker ticket".to_string(),
                session: "unspecified".to_string(),
                timeframe: self.cfg.timeframe,
            };
            if let Err(e) = self.ports.trades.update_close(&record).await {
                error!(error = %e, "failed to force-close orphaned trade row");
            }
            self.emit_event(SystemEvent::new(
                EventKind::Error,
                Severity::Critical,
                "orphaned open trade force-closed during startup reconciliation",
                serde_json::json!({ "ticket": record.position.ticket }),
            ))
            .await;
        }
    }

    async fn run_tick(&mut self, run_entry_logic: bool, events: &EventQueue) -> anyhow::Result<()> {
        let now = Utc::now();
        if now.date_naive() != self.daily_date {
            self.daily_date = now.date_naive();
            self.daily_trade_count = 0;
            self.daily_realized_pnl = Decimal::ZERO;
            self.daily_wins = 0;
            self.daily_losses = 0;
        }

        let Some(state) = self.ports.bot_state.load().await? else {
            warn!("no bot_state row found, skipping tick");
            return Ok(());
        };
        if !state.is_running {
            debug!("bot_state.is_running is false, skipping tick");
            return Ok(());
        }

        let quote = self.ports.broker.current_price(self.cfg.symbol).await?;
        let bars = self
            .ports
            .market_data
            .bars(self.cfg.symbol, self.cfg.timeframe, 200)
            .await;

        let (bar_low, bar_high) = match &bars {
            Ok(b) if !b.is_empty() => (b.last().unwrap().low, b.last().unwrap().high),
            _ => (quote.bid, quote.bid),
        };

        let closed = self
            .executor
            .evaluate_exits(self.ports.broker.as_ref(), self.cfg.symbol, quote, bar_low, bar_high)
            .await;
        for (record, _reason) in closed {
            let pnl = record.position.realized_pnl.unwrap_or_default();
            self.daily_realized_pnl += pnl;
            self.cumulative_pnl += pnl;
            if pnl.is_sign_positive() && !pnl.is_zero() {
                self.daily_wins += 1;
            } else if pnl.is_sign_negative() {
                self.daily_losses += 1;
            }
            self.ports
                .metrics
                .trades_total
                .with_label_values(&[record.position.status.as_str()])
                .inc();
            if let Err(e) = self.ports.trades.update_close(&record).await {
                error!(error = %e, "failed to persist trade close");
            }
            self.send_event(
                events,
                SystemEvent::new(
                    EventKind::Trade,
                    Severity::Low,
                    format!("position closed: {}", record.position.status.as_str()),
                    serde_json::json!({ "ticket": record.position.ticket, "pnl": record.position.realized_pnl }),
                ),
            );
        }

        let market_open = self.ports.broker.market_open(self.cfg.symbol, now).await;
        self.send_event(
            events,
            SystemEvent::new(
                EventKind::Lifecycle,
                Severity::Low,
                "heartbeat",
                serde_json::json!({ "market_open": market_open, "session": current_session(now).as_str() }),
            ),
        );
        let room_for_new_trade = self.executor.open_count() < self.cfg.max_positions;

        if run_entry_logic && market_open && room_for_new_trade {
            self.run_entry_pipeline(bars, now, events).await?;
        }

        self.ports
            .bot_state
            .save(&BotState {
                last_updated: now,
                ..state
            })
            .await?;

        self.refresh_account_metrics().await;
        self.persist_daily_metrics().await;

        Ok(())
    }

    async fn refresh_account_metrics(&self) {
        let Ok(account) = self.ports.broker.account_info().await else {
            return;
        };
        self.ports
            .metrics
            .account_balance_usd
            .set(account.balance.to_f64().unwrap_or(0.0));
        self.ports
            .metrics
            .account_equity_usd
            .set(account.equity.to_f64().unwrap_or(0.0));
        self.ports
            .metrics
            .open_positions_count
            .set(self.executor.open_count() as f64);
        self.ports
            .metrics
            .daily_pnl_usd
            .set(self.daily_realized_pnl.to_f64().unwrap_or(0.0));
    }

    async fn persist_daily_metrics(&self) {
        let Ok(account) = self.ports.broker.account_info().await else {
            return;
        };
        let total = self.daily_wins + self.daily_losses;
        let win_rate = if total == 0 {
            Decimal::ZERO
        } else {
            Decimal::from(self.daily_wins) / Decimal::from(total)
        };
        let drawdown = if account.balance.is_zero() {
            Decimal::ZERO
        } else {
            ((account.balance - account.equity) / account.balance).max(Decimal::ZERO)
        };
        let metrics = DailyMetrics {
            daily_pnl: self.daily_realized_pnl,
            cumulative_pnl: self.cumulative_pnl,
            trades_count: self.daily_trade_count,
            wins: self.daily_wins,
            losses: self.daily_losses,
            win_rate,
            max_drawdown: drawdown,
            account_balance: account.balance,
            risk_utilization: self.cfg.risk_percentage,
        };
        if let Err(e) = self.ports.daily_metrics.upsert(self.daily_date, &metrics).await {
            error!(error = %e, "failed to persist daily metrics");
        }
    }

    async fn run_entry_pipeline(
        &mut self,
        bars: Result<Vec<crate::domain::types::Bar>, crate::domain::errors::MarketDataError>,
        now: DateTime<Utc>,
        events: &EventQueue,
    ) -> anyhow::Result<()> {
        let bars = match bars {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "market data unavailable, skipping entry logic this tick");
                return Ok(());
            }
        };

        let analysis = match SmcAnalyzer::analyze(&bars, self.cfg.timeframe) {
            Ok(a) => a,
            Err(e) => {
                debug!(error = %e, "SMC analysis rejected input, skipping tick");
                return Ok(());
            }
        };

        if let Err(e) = self.ports.market_analysis.insert(&analysis).await {
            error!(error = %e, "failed to persist market analysis snapshot");
        }

        let signal_cfg = SignalEngineConfig {
            balance: self.ports.broker.account_info().await?.balance,
            risk_percentage: self.cfg.risk_percentage,
            max_risk_amount: self.cfg.max_risk_amount,
        };
        let signal = SignalEngine::generate(analysis, &signal_cfg);
        self.ports
            .metrics
            .setup_quality_current
            .with_label_values(&[self.cfg.symbol.as_ref()])
            .set(f64::from(signal.setup_quality));
        if signal.is_hold() {
            return Ok(());
        }
        self.ports
            .metrics
            .signals_total
            .with_label_values(&[&format!("{:?}", signal.direction)])
            .inc();

        let context = AiPromptContext {
            symbol: self.cfg.symbol.to_string(),
            current_price: signal.analysis.current_price,
            timeframe: self.cfg.timeframe.as_str().to_string(),
            session: current_session(now).as_str().to_string(),
            smc_findings: serde_json::to_value(&signal.analysis).unwrap_or_default(),
            indicators: serde_json::to_value(signal.analysis.indicators).unwrap_or_default(),
            account_balance: signal_cfg.balance,
            risk_percentage: self.cfg.risk_percentage,
            technical_signal: serde_json::json!({
                "direction": format!("{:?}", signal.direction),
                "entry": signal.entry,
                "stop_loss": signal.stop_loss,
                "take_profit": signal.take_profit,
            }),
        };
        let signal = AiValidator::validate(
            signal,
            self.ports.ai.as_ref(),
            context,
            self.cfg.min_confidence,
        )
        .await;
        let ai_outcome = match signal.ai_validated {
            Some(true) => "corroborated",
            Some(false) => "rejected_or_unavailable",
            None => "not_consulted",
        };
        self.ports
            .metrics
            .ai_calls_total
            .with_label_values(&[ai_outcome])
            .inc();
        if signal.is_hold() {
            return Ok(());
        }

        let account = self.ports.broker.account_info().await?;
        let decision = RiskGate::evaluate(
            &signal,
            account,
            RiskCounters {
                daily_realized_pnl: self.daily_realized_pnl,
                daily_trade_count: self.daily_trade_count,
            },
            &self.cfg.risk,
        );

        if !decision.approved {
            let reason_class = decision
                .reasons
                .first()
                .map(|r| classify_risk_reason(r))
                .unwrap_or("unknown");
            self.ports.metrics.risk_blocks_total.with_label_values(&[reason_class]).inc();
            let (kind, severity) = risk_rejection_event(reason_class);
            self.send_event(
                events,
                SystemEvent::new(
                    kind,
                    severity,
                    "signal rejected by risk gate",
                    serde_json::json!({ "reasons": decision.reasons }),
                ),
            );
            return Ok(());
        }

        match self
            .executor
            .open_from_signal(self.ports.broker.as_ref(), self.cfg.symbol, &signal)
            .await
        {
            Ok(position) => {
                self.daily_trade_count += 1;
                if let Err(e) = self.ports.trades.insert_open(&position).await {
                    error!(error = %e, "failed to persist opened position");
                }
                self.send_event(
                    events,
                    SystemEvent::new(
                        EventKind::Trade,
                        Severity::Low,
                        "position opened",
                        serde_json::json!({ "ticket": position.ticket }),
                    ),
                );
            }
            Err(e) => {
                warn!(error = %e, "broker rejected order open");
                self.send_event(
                    events,
                    SystemEvent::new(
                        EventKind::Error,
                        Severity::Medium,
                        "broker rejected order",
                        serde_json::json!({ "reason": e.to_string() }),
                    ),
                );
            }
        }

        Ok(())
    }

    fn send_event(&self, events: &EventQueue, event: SystemEvent) {
        if events.push(event) {
            warn!("event queue full, oldest event dropped under drop-oldest backpressure policy");
        }
    }

    async fn emit_event(&self, event: SystemEvent) {
        if let Err(e) = self.ports.system_events.insert(&event).await {
            error!(error = %e, "failed to persist system event");
        }
    }
}

/// Empty seed used when a symbol has just started trading and no
/// `daily_metrics` row exists yet for the current date.
pub fn empty_metrics_for(balance: Decimal) -> DailyMetrics {
    DailyMetrics::empty(balance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::{BrokerError, MarketDataError, PersistenceError};
    use crate::domain::ports::AiDecision;
    use crate::domain::types::{AccountInfo, Bar, Position, PositionStatus, Quote, Side};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::sync::Mutex;

    #[test]
    fn saturday_is_closed() {
        let saturday = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        assert!(!is_market_open(saturday));
    }

    #[test]
    fn friday_after_22_utc_is_closed() {
        let late_friday = Utc.with_ymd_and_hms(2026, 7, 31, 23, 0, 0).unwrap();
        assert!(!is_market_open(late_friday));
    }

    #[test]
    fn sunday_before_22_utc_is_closed() {
        let sunday_morning = Utc.with_ymd_and_hms(2026, 8, 2, 10, 0, 0).unwrap();
        assert!(!is_market_open(sunday_morning));
    }

    #[test]
    fn sunday_evening_reopens() {
        let sunday_evening = Utc.with_ymd_and_hms(2026, 8, 2, 23, 0, 0).unwrap();
        assert!(is_market_open(sunday_evening));
    }

    #[test]
    fn weekday_midday_is_open() {
        let tuesday = Utc.with_ymd_and_hms(2026, 7, 28, 12, 0, 0).unwrap();
        assert!(is_market_open(tuesday));
    }

    #[test]
    fn classifies_known_risk_reasons() {
        assert_eq!(
            classify_risk_reason("Daily loss limit reached: $500.00"),
            "daily_loss_limit"
        );
        assert_eq!(classify_risk_reason("something unforeseen"), "other");
    }

    struct NullMarketData;

    #[async_trait]
    impl MarketDataPort for NullMarketData {
        async fn bars(&self, _s: Symbol, _t: Timeframe, _c: usize) -> Result<Vec<Bar>, MarketDataError> {
            Ok(vec![])
        }
        async fn current_price(&self, _s: Symbol) -> Result<Quote, MarketDataError> {
            Ok(Quote {
                bid: dec!(2650),
                ask: dec!(2650.10),
                time: Utc::now(),
            })
        }
    }

    struct StubBroker {
        positions: Vec<Position>,
        market_open: bool,
    }

    #[async_trait]
    impl BrokerPort for StubBroker {
        async fn open(
            &self,
            _s: Symbol,
            _side: Side,
            _v: Decimal,
            _sl: Decimal,
            _tp: Decimal,
            _c: &str,
        ) -> Result<(u64, Decimal), BrokerError> {
            Ok((1, dec!(2650)))
        }
        async fn close(&self, _t: u64, exit_price: Decimal) -> Result<Decimal, BrokerError> {
            Ok(exit_price)
        }
        async fn modify(&self, _t: u64, _sl: Decimal, _tp: Decimal) -> Result<(), BrokerError> {
            Ok(())
        }
        async fn current_price(&self, _s: Symbol) -> Result<Quote, BrokerError> {
            Ok(Quote {
                bid: dec!(2650),
                ask: dec!(2650.10),
                time: Utc::now(),
            })
        }
        async fn positions(&self) -> Result<Vec<Position>, BrokerError> {
            Ok(self.positions.clone())
        }
        async fn account_info(&self) -> Result<AccountInfo, BrokerError> {
            Ok(AccountInfo {
                balance: dec!(100_000),
                equity: dec!(100_000),
                currency: "USD",
            })
        }
        async fn market_open(&self, _s: Symbol, _now: DateTime<Utc>) -> bool {
            self.market_open
        }
    }

    struct NullAi;

    #[async_trait]
    impl AiPort for NullAi {
        async fn validate(
            &self,
            _context: &AiPromptContext,
        ) -> Result<AiDecision, crate::domain::errors::AiError> {
            Err(crate::domain::errors::AiError::Transient {
                reason: "not reachable in this test".into(),
            })
        }
    }

    struct RecordingTradeRepo {
        open: Mutex<Vec<Position>>,
        closed: Mutex<Vec<crate::domain::types::TradeRecord>>,
    }

    #[async_trait]
    impl TradeRepository for RecordingTradeRepo {
        async fn insert_open(&self, position: &Position) -> Result<(), PersistenceError> {
            self.open.lock().unwrap().push(position.clone());
            Ok(())
        }
        async fn update_close(
            &self,
            record: &crate::domain::types::TradeRecord,
        ) -> Result<(), PersistenceError> {
            self.closed.lock().unwrap().push(record.clone());
            Ok(())
        }
        async fn open_positions(&self) -> Result<Vec<Position>, PersistenceError> {
            Ok(self.open.lock().unwrap().clone())
        }
    }

    struct NullDailyMetricsRepo;

    #[async_trait]
    impl DailyMetricsRepository for NullDailyMetricsRepo {
        async fn get(&self, _date: NaiveDate) -> Result<Option<DailyMetrics>, PersistenceError> {
            Ok(None)
        }
        async fn upsert(&self, _date: NaiveDate, _metrics: &DailyMetrics) -> Result<(), PersistenceError> {
            Ok(())
        }
    }

    struct NullMarketAnalysisRepo;

    #[async_trait]
    impl MarketAnalysisRepository for NullMarketAnalysisRepo {
        async fn insert(
            &self,
            _analysis: &crate::domain::types::MarketAnalysis,
        ) -> Result<(), PersistenceError> {
            Ok(())
        }
    }

    struct RecordingSystemEventRepo {
        events: Mutex<Vec<SystemEvent>>,
    }

    #[async_trait]
    impl SystemEventRepository for RecordingSystemEventRepo {
        async fn insert(&self, event: &SystemEvent) -> Result<(), PersistenceError> {
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct StaticBotStateRepo {
        state: Mutex<Option<BotState>>,
    }

    #[async_trait]
    impl BotStateRepository for StaticBotStateRepo {
        async fn load(&self) -> Result<Option<BotState>, PersistenceError> {
            Ok(self.state.lock().unwrap().clone())
        }
        async fn save(&self, state: &BotState) -> Result<(), PersistenceError> {
            *self.state.lock().unwrap() = Some(state.clone());
            Ok(())
        }
    }

    fn test_supervisor(
        broker_positions: Vec<Position>,
        market_open: bool,
        recorded_open: Vec<Position>,
        running: bool,
    ) -> (Supervisor, Arc<RecordingSystemEventRepo>, Arc<RecordingTradeRepo>) {
        let system_events = Arc::new(RecordingSystemEventRepo {
            events: Mutex::new(vec![]),
        });
        let trades = Arc::new(RecordingTradeRepo {
            open: Mutex::new(recorded_open),
            closed: Mutex::new(vec![]),
        });
        let bot_state = Arc::new(StaticBotStateRepo {
            state: Mutex::new(Some(BotState {
                is_running: running,
                trading_mode: TradingMode::Paper,
                risk_percentage: dec!(0.01),
                max_risk_amount: dec!(1000),
                last_updated: Utc::now(),
                session_id: "test-session".to_string(),
                configuration: serde_json::json!({}),
            })),
        });

        let ports = Ports {
            market_data: Arc::new(NullMarketData),
            broker: Arc::new(StubBroker {
                positions: broker_positions,
                market_open,
            }),
            ai: Arc::new(NullAi),
            trades: trades.clone(),
            daily_metrics: Arc::new(NullDailyMetricsRepo),
            market_analysis: Arc::new(NullMarketAnalysisRepo),
            system_events: system_events.clone(),
            bot_state,
            metrics: Arc::new(Metrics::new().unwrap()),
        };
        let cfg = SupervisorConfig {
            symbol: Symbol::XAUUSD,
            timeframe: Timeframe::M5,
            analysis_interval: Duration::from_secs(60),
            heartbeat_interval: Duration::from_secs(30),
            trading_mode: TradingMode::Paper,
            risk_percentage: dec!(0.01),
            max_risk_amount: dec!(1000),
            risk: RiskGateConfig {
                max_daily_loss: dec!(500),
                max_trades_per_day: 4,
                max_risk_per_trade: dec!(0.02),
                risk_percentage: dec!(0.01),
            },
            max_positions: 3,
            min_confidence: dec!(0.60),
            auto_restart: true,
        };
        (Supervisor::new(cfg, ports), system_events, trades)
    }

    fn orphan_position(ticket: u64) -> Position {
        Position {
            ticket,
            symbol: Symbol::XAUUSD,
            timeframe: Timeframe::M5,
            direction: Side::Buy,
            volume: dec!(0.10),
            entry_price: dec!(2650),
            stop_loss: dec!(2645),
            take_profit: dec!(2660),
            opened_at: Utc::now(),
            current_price: dec!(2651),
            unrealized_pnl: Decimal::ZERO,
            status: PositionStatus::Open,
            closed_at: None,
            exit_price: None,
            realized_pnl: None,
            confidence_at_entry: dec!(0.8),
            setup_quality_at_entry: 8,
            smc_steps_at_entry: vec![],
        }
    }

    #[tokio::test]
    async fn startup_reconciliation_force_closes_orphaned_trades() {
        let (mut supervisor, system_events, trades) =
            test_supervisor(vec![], true, vec![orphan_position(7)], true);

        supervisor.reconcile_on_startup().await;

        assert_eq!(trades.closed.lock().unwrap().len(), 1);
        let closed = trades.closed.lock().unwrap();
        assert_eq!(closed[0].position.status, PositionStatus::ClosedForced);

        let events = system_events.events.lock().unwrap();
        assert!(
            events
                .iter()
                .any(|e| e.severity == Severity::Critical && e.kind == EventKind::Error)
        );
    }

    #[tokio::test]
    async fn startup_reconciliation_adopts_positions_still_open_at_the_broker() {
        let position = orphan_position(9);
        let (mut supervisor, _events, trades) =
            test_supervisor(vec![position.clone()], true, vec![position], true);

        supervisor.reconcile_on_startup().await;

        assert_eq!(trades.closed.lock().unwrap().len(), 0);
        assert_eq!(supervisor.executor.open_count(), 1);
    }

    #[tokio::test]
    async fn weekend_tick_skips_entry_logic_but_still_runs() {
        let (mut supervisor, system_events, _trades) = test_supervisor(vec![], false, vec![], true);
        let events = EventQueue::new(EVENT_CHANNEL_CAPACITY);

        supervisor.run_tick(true, &events).await.unwrap();

        assert_eq!(supervisor.executor.open_count(), 0);
        let lifecycle_notes_closed_market = events.drain().into_iter().any(|e| {
            e.kind == EventKind::Lifecycle && e.details.get("market_open") == Some(&serde_json::json!(false))
        });
        assert!(lifecycle_notes_closed_market);
        drop(system_events);
    }

    #[tokio::test]
    async fn tick_is_a_no_op_when_bot_state_is_not_running() {
        let (mut supervisor, _events, trades) = test_supervisor(vec![], true, vec![], false);
        let events = EventQueue::new(EVENT_CHANNEL_CAPACITY);

        supervisor.run_tick(true, &events).await.unwrap();

        assert!(trades.open.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn status_before_start_reports_offline() {
        let (supervisor, _events, _trades) = test_supervisor(vec![], true, vec![], false);
        let status = supervisor.status().await;
        assert_eq!(status.overall_status, OverallStatus::Offline);
        assert!(!status.daemon_running);
        assert!(status.database_running);
    }

    #[tokio::test]
    async fn status_reports_online_once_started_and_bot_state_running() {
        let (supervisor, _events, _trades) = test_supervisor(vec![], true, vec![], true);
        *supervisor.started_at.lock().unwrap() = Some(Utc::now());
        let status = supervisor.status().await;
        assert_eq!(status.overall_status, OverallStatus::Online);
        assert!(status.daemon_running);
        assert!(status.uptime_seconds.is_some());
    }

    #[tokio::test]
    async fn force_cleanup_resets_bot_state_without_touching_trade_history() {
        let (supervisor, system_events, trades) = test_supervisor(vec![], true, vec![], true);
        trades.open.lock().unwrap().push(orphan_position(3));
        *supervisor.started_at.lock().unwrap() = Some(Utc::now());

        supervisor.force_cleanup().await.unwrap();

        assert!(supervisor.cancel.is_cancelled());
        assert!(supervisor.started_at.lock().unwrap().is_none());
        assert_eq!(trades.open.lock().unwrap().len(), 1);
        let events = system_events.events.lock().unwrap();
        assert!(events.iter().any(|e| e.kind == EventKind::Info));
    }

    #[test]
    fn daily_loss_and_drawdown_breaches_page_as_risk_breach_high() {
        assert_eq!(
            risk_rejection_event("daily_loss_limit"),
            (EventKind::RiskBreach, Severity::High)
        );
        assert_eq!(
            risk_rejection_event("drawdown_limit"),
            (EventKind::RiskBreach, Severity::High)
        );
    }

    #[test]
    fn other_rejections_stay_routine_signal_events() {
        assert_eq!(
            risk_rejection_event("trade_count_limit"),
            (EventKind::Signal, Severity::Low)
        );
        assert_eq!(risk_rejection_event("other"), (EventKind::Signal, Severity::Low));
    }

    #[tokio::test]
    async fn event_queue_drops_oldest_when_full() {
        let queue = EventQueue::new(2);
        let oldest = SystemEvent::new(EventKind::Info, Severity::Low, "first", serde_json::json!({}));
        let second = SystemEvent::new(EventKind::Info, Severity::Low, "second", serde_json::json!({}));
        let third = SystemEvent::new(EventKind::Info, Severity::Low, "third", serde_json::json!({}));

        assert!(!queue.push(oldest));
        assert!(!queue.push(second));
        assert!(queue.push(third));

        let remaining = queue.drain();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].message, "second");
        assert_eq!(remaining[1].message, "third");
    }
}
