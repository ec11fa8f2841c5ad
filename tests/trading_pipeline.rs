//! End-to-end exercise of SignalEngine -> AIValidator -> RiskGate ->
//! BrokerExecutor against the literal XAU/USD scenarios: a clean
//! bullish setup, an AI veto, a stop-loss hit, and a daily-loss-limit
//! rejection.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Mutex;
use xautrade::application::ai_validator::AiValidator;
use xautrade::application::broker_executor::BrokerExecutor;
use xautrade::application::risk_gate::{RiskCounters, RiskGate, RiskGateConfig};
use xautrade::application::signal_engine::{SignalEngine, SignalEngineConfig};
use xautrade::domain::errors::{AiError, BrokerError};
use xautrade::domain::ports::{AiDecision, AiDecisionKind, AiPort, AiPromptContext, BrokerPort};
use xautrade::domain::types::{
    AccountInfo, BosFinding, Direction, GrabKind, Indicators, LiquidityGrab, MarketAnalysis,
    ObStatus, OrderBlock, PositionStatus, Quote, SessionLevels, Side, Signal, SignalDirection,
    Symbol, Timeframe,
};

struct CannedAi(AiDecision);

#[async_trait]
impl AiPort for CannedAi {
    async fn validate(&self, _context: &AiPromptContext) -> Result<AiDecision, AiError> {
        Ok(self.0.clone())
    }
}

struct PaperBrokerStub {
    next_ticket: Mutex<u64>,
    fill_price: Decimal,
}

#[async_trait]
impl BrokerPort for PaperBrokerStub {
    async fn open(
        &self,
        _symbol: Symbol,
        _side: Side,
        _volume: Decimal,
        _sl: Decimal,
        _tp: Decimal,
        _comment: &str,
    ) -> Result<(u64, Decimal), BrokerError> {
        let mut t = self.next_ticket.lock().unwrap();
        *t += 1;
        Ok((*t, self.fill_price))
    }

    async fn close(&self, _ticket: u64, exit_price: Decimal) -> Result<Decimal, BrokerError> {
        Ok(exit_price)
    }

    async fn modify(&self, _ticket: u64, _sl: Decimal, _tp: Decimal) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn current_price(&self, _symbol: Symbol) -> Result<Quote, BrokerError> {
        Ok(Quote {
            bid: self.fill_price,
            ask: self.fill_price + dec!(0.05),
            time: Utc::now(),
        })
    }

    async fn positions(&self) -> Result<Vec<xautrade::domain::types::Position>, BrokerError> {
        Ok(vec![])
    }

    async fn account_info(&self) -> Result<AccountInfo, BrokerError> {
        Ok(AccountInfo {
            balance: dec!(100_000),
            equity: dec!(100_000),
            currency: "USD",
        })
    }

    async fn market_open(&self, _symbol: Symbol, _now: chrono::DateTime<Utc>) -> bool {
        true
    }
}

/// Bars aren't needed here: this exercises the pipeline from a
/// hand-built `MarketAnalysis` onward, the same seam SMCAnalyzer hands
/// off to SignalEngine at.
fn clean_bullish_analysis() -> MarketAnalysis {
    MarketAnalysis {
        at: Utc::now(),
        timeframe: Timeframe::M5,
        current_price: dec!(2680),
        trend: Direction::Bullish,
        session_levels: SessionLevels {
            session_high: dec!(2690),
            session_low: dec!(2670),
            prev_day_high: dec!(2690),
            prev_day_low: dec!(2670),
            weekly_high: dec!(2690),
            weekly_low: dec!(2670),
        },
        order_blocks: vec![OrderBlock {
            kind: Direction::Bullish,
            top: dec!(2680.00),
            bottom: dec!(2679.00),
            formed_at: Utc::now(),
            strength: dec!(8),
            status: ObStatus::Fresh,
            timeframe: Timeframe::M5,
        }],
        bos: BosFinding {
            detected: true,
            direction: Direction::Bullish,
            break_price: dec!(2685),
            at: Utc::now(),
            strength: dec!(8),
        },
        liquidity_grabs: vec![LiquidityGrab {
            kind: GrabKind::Upward,
            price: dec!(2681),
            at: Utc::now(),
            strength: dec!(5),
        }],
        indicators: Indicators {
            vwap: dec!(2685),
            ema21: dec!(2675),
            ema50: dec!(2670),
            ema200: dec!(2650),
            rsi: dec!(55),
            atr: dec!(2),
        },
        setup_quality: 10,
    }
}

fn signal_cfg() -> SignalEngineConfig {
    SignalEngineConfig {
        balance: dec!(100_000),
        risk_percentage: dec!(0.01),
        max_risk_amount: dec!(1000),
    }
}

fn risk_cfg() -> RiskGateConfig {
    RiskGateConfig {
        max_daily_loss: dec!(500),
        max_trades_per_day: 4,
        max_risk_per_trade: dec!(0.02),
        risk_percentage: dec!(0.01),
    }
}

fn ctx_for(signal: &Signal) -> AiPromptContext {
    AiPromptContext {
        symbol: "XAUUSD".to_string(),
        current_price: signal.analysis.current_price,
        timeframe: "M5".to_string(),
        session: "London".to_string(),
        smc_findings: serde_json::to_value(&signal.analysis).unwrap(),
        indicators: serde_json::to_value(signal.analysis.indicators).unwrap(),
        account_balance: dec!(100_000),
        risk_percentage: dec!(0.01),
        technical_signal: serde_json::json!({}),
    }
}

#[tokio::test]
async fn clean_bullish_setup_is_approved_and_opened() {
    let signal = SignalEngine::generate(clean_bullish_analysis(), &signal_cfg());
    assert_eq!(signal.direction, SignalDirection::Buy);
    assert_eq!(signal.entry, dec!(2680.00));
    assert_eq!(signal.stop_loss, dec!(2678.95));

    let ai = CannedAi(AiDecision {
        decision: AiDecisionKind::Buy,
        confidence: dec!(0.8),
        entry: None,
        stop_loss: None,
        take_profit: None,
        reasoning: "aligned with technicals".to_string(),
    });
    let context = ctx_for(&signal);
    let signal = AiValidator::validate(signal, &ai, context, dec!(0.60)).await;
    assert_eq!(signal.ai_validated, Some(true));
    assert!(signal.confidence >= dec!(0.99));

    let decision = RiskGate::evaluate(
        &signal,
        AccountInfo {
            balance: dec!(100_000),
            equity: dec!(100_000),
            currency: "USD",
        },
        RiskCounters {
            daily_realized_pnl: Decimal::ZERO,
            daily_trade_count: 0,
        },
        &risk_cfg(),
    );
    assert!(decision.approved);

    let broker = PaperBrokerStub {
        next_ticket: Mutex::new(0),
        fill_price: dec!(2680.00),
    };
    let mut executor = BrokerExecutor::new();
    let position = executor
        .open_from_signal(&broker, Symbol::XAUUSD, &signal)
        .await
        .unwrap();
    assert_eq!(position.status, PositionStatus::Open);
    assert_eq!(executor.open_count(), 1);
}

#[tokio::test]
async fn ai_veto_weakens_but_does_not_demote_above_floor() {
    let signal = SignalEngine::generate(clean_bullish_analysis(), &signal_cfg());
    let pre_ai_confidence = signal.confidence;

    let ai = CannedAi(AiDecision {
        decision: AiDecisionKind::Hold,
        confidence: dec!(0.2),
        entry: None,
        stop_loss: None,
        take_profit: None,
        reasoning: "too risky".to_string(),
    });
    let context = ctx_for(&signal);
    let signal = AiValidator::validate(signal, &ai, context, dec!(0.30)).await;

    assert_eq!(signal.direction, SignalDirection::Buy);
    assert_eq!(signal.confidence, pre_ai_confidence - dec!(0.30));
    assert_eq!(signal.ai_validated, Some(false));

    let decision = RiskGate::evaluate(
        &signal,
        AccountInfo {
            balance: dec!(100_000),
            equity: dec!(100_000),
            currency: "USD",
        },
        RiskCounters {
            daily_realized_pnl: Decimal::ZERO,
            daily_trade_count: 0,
        },
        &risk_cfg(),
    );
    assert!(decision.approved);
}

#[tokio::test]
async fn a_position_opened_from_the_clean_setup_closes_at_its_stop_loss() {
    let signal = SignalEngine::generate(clean_bullish_analysis(), &signal_cfg());
    let broker = PaperBrokerStub {
        next_ticket: Mutex::new(0),
        fill_price: dec!(2680.00),
    };
    let mut executor = BrokerExecutor::new();
    executor
        .open_from_signal(&broker, Symbol::XAUUSD, &signal)
        .await
        .unwrap();

    let quote = Quote {
        bid: dec!(2678.90),
        ask: dec!(2679.00),
        time: Utc::now(),
    };
    let closed = executor
        .evaluate_exits(&broker, Symbol::XAUUSD, quote, dec!(2678.90), dec!(2679.00))
        .await;

    assert_eq!(closed.len(), 1);
    let (record, _reason) = &closed[0];
    assert_eq!(record.position.status, PositionStatus::ClosedSl);
    assert_eq!(record.position.exit_price, Some(dec!(2678.95)));
    assert!(record.position.realized_pnl.unwrap() < Decimal::ZERO);
    assert_eq!(executor.open_count(), 0);
}

#[tokio::test]
async fn daily_loss_limit_blocks_new_entries_regardless_of_setup_quality() {
    let signal = SignalEngine::generate(clean_bullish_analysis(), &signal_cfg());
    assert!(!signal.is_hold());

    let decision = RiskGate::evaluate(
        &signal,
        AccountInfo {
            balance: dec!(100_000),
            equity: dec!(100_000),
            currency: "USD",
        },
        RiskCounters {
            daily_realized_pnl: dec!(-500.00),
            daily_trade_count: 1,
        },
        &risk_cfg(),
    );

    assert!(!decision.approved);
    assert!(decision.reasons[0].contains("Daily loss limit"));
}
