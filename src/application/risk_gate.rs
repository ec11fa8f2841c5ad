//! C5: hard risk blockers and the risk-score heuristic. Approves or
//! rejects a signal; never mutates broker or persistence state itself.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::info;

use crate::application::sizing;
use crate::domain::types::{AccountInfo, Signal, SignalDirection};

#[derive(Debug, Clone, Copy)]
pub struct RiskCounters {
    pub daily_realized_pnl: Decimal,
    pub daily_trade_count: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct RiskGateConfig {
    pub max_daily_loss: Decimal,
    pub max_trades_per_day: u32,
    pub max_risk_per_trade: Decimal,
    /// Risk percentage the signal was sized against, as a fraction (0.01 = 1%).
    /// Feeds only the risk_score heuristic, not the hard blockers.
    pub risk_percentage: Decimal,
}

#[derive(Debug, Clone)]
pub struct RiskDecision {
    pub approved: bool,
    pub reasons: Vec<String>,
    pub adjusted_lot_size: Decimal,
    pub risk_score: u8,
}

pub struct RiskGate;

impl RiskGate {
    pub fn evaluate(
        signal: &Signal,
        account: AccountInfo,
        counters: RiskCounters,
        cfg: &RiskGateConfig,
    ) -> RiskDecision {
        let reject = |reason: String| RiskDecision {
            approved: false,
            reasons: vec![reason],
            adjusted_lot_size: Decimal::ZERO,
            risk_score: 1,
        };

        if counters.daily_realized_pnl <= -cfg.max_daily_loss {
            let d = reject(format!(
                "Daily loss limit reached: ${:.2}",
                cfg.max_daily_loss
            ));
            info!(reason = ?d.reasons, "risk gate blocked: daily loss limit");
            return d;
        }

        if !account.balance.is_zero() {
            let drawdown = (account.balance - account.equity) / account.balance;
            if drawdown >= dec!(0.10) {
                return reject(format!("Drawdown limit reached: {:.2}%", drawdown * dec!(100)));
            }
        }

        if counters.daily_trade_count >= cfg.max_trades_per_day {
            return reject(format!(
                "Daily trade count limit reached: {}",
                cfg.max_trades_per_day
            ));
        }

        if signal.direction == SignalDirection::Hold
            || signal.entry.is_zero()
            || signal.stop_loss.is_zero()
            || signal.take_profit.is_zero()
        {
            return reject("missing or invalid entry/SL/TP".to_string());
        }

        if signal.risk_reward_ratio < dec!(1.5) {
            return reject(format!(
                "risk_reward_ratio {} below floor 1.5",
                signal.risk_reward_ratio
            ));
        }

        if signal.lot_size.is_zero() {
            return reject("computed lot_size is zero".to_string());
        }

        let stop_distance = (signal.entry - signal.stop_loss).abs();
        let risk_amount = signal.lot_size * sizing::CONTRACT_SIZE * stop_distance;
        if risk_amount > account.balance * cfg.max_risk_per_trade {
            return reject(format!(
                "risk_amount {risk_amount} exceeds balance*max_risk_per_trade"
            ));
        }

        let risk_score = Self::risk_score(signal, account, cfg.risk_percentage);

        RiskDecision {
            approved: true,
            reasons: vec!["all risk checks passed".to_string()],
            adjusted_lot_size: signal.lot_size,
            risk_score,
        }
    }

    fn risk_score(signal: &Signal, account: AccountInfo, risk_percentage: Decimal) -> u8 {
        let mut score: i32 = 5;
        if signal.risk_reward_ratio >= dec!(3) {
            score += 2;
        } else if signal.risk_reward_ratio >= dec!(2) {
            score += 1;
        }
        if signal.setup_quality >= 8 {
            score += 2;
        } else if signal.setup_quality >= 6 {
            score += 1;
        }
        if signal.confidence >= dec!(0.8) {
            score += 1;
        }
        if !account.balance.is_zero() {
            let equity_ratio = account.equity / account.balance;
            if equity_ratio >= dec!(0.98) {
                score += 1;
            } else if equity_ratio <= dec!(0.90) {
                score -= 2;
            }
        }
        if risk_percentage <= dec!(0.005) {
            score += 1;
        } else if risk_percentage >= dec!(0.02) {
            score -= 1;
        }
        score.clamp(1, 10) as u8
    }
}
