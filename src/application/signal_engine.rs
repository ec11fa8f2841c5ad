//! C3: composes a `MarketAnalysis` into a tentative `Signal`. Pure given
//! its inputs; never touches a port.

use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::debug;

use crate::application::sizing::{self, MIN_LOT, PIP};
use crate::domain::types::{
    Direction, MarketAnalysis, OrderBlock, ObStatus, Signal, SignalDirection,
};

const MIN_RR: Decimal = dec!(1.5);
const FIVE_PIPS: Decimal = dec!(0.05); // 5 * PIP, kept as a literal since PIP is not const-evaluable here

pub struct SignalEngineConfig {
    pub balance: Decimal,
    pub risk_percentage: Decimal,
    pub max_risk_amount: Decimal,
}

pub struct SignalEngine;

impl SignalEngine {
    pub fn generate(analysis: MarketAnalysis, cfg: &SignalEngineConfig) -> Signal {
        // Gate 1: session levels non-empty (always true once analyzed, but
        // a degenerate all-zero window means no real data was present).
        if analysis.session_levels.session_high.is_zero()
            && analysis.session_levels.session_low.is_zero()
        {
            return Signal::hold(analysis, "no session levels available");
        }

        // Gate 2: at least one liquidity grab among the last two recorded.
        let recent_grabs = analysis.liquidity_grabs.len();
        if recent_grabs == 0 {
            return Signal::hold(analysis, "no recent liquidity grab");
        }

        // Gate 3: BOS detected with a non-neutral direction.
        if !analysis.bos.detected || analysis.bos.direction == Direction::Neutral {
            return Signal::hold(analysis, "no break of structure detected");
        }

        // Gate 4: a fresh order block aligned with BOS direction.
        let Some(ob) = strongest_aligned_block(&analysis.order_blocks, analysis.bos.direction)
        else {
            return Signal::hold(analysis, "no fresh order block aligned with BOS direction");
        };

        let direction = match analysis.bos.direction {
            Direction::Bullish => SignalDirection::Buy,
            Direction::Bearish => SignalDirection::Sell,
            Direction::Neutral => unreachable!("gate 3 already excluded Neutral"),
        };

        let vwap = analysis.indicators.vwap;
        let (entry, stop_loss, take_profit) = match direction {
            SignalDirection::Buy => {
                let entry = ob.top;
                let stop_loss = ob.bottom - FIVE_PIPS;
                let risk = entry - stop_loss;
                let tp_ratio = entry + dec!(2) * risk;
                let take_profit = if vwap > entry { vwap.min(tp_ratio) } else { tp_ratio };
                (entry, stop_loss, take_profit)
            }
            SignalDirection::Sell => {
                let entry = ob.bottom;
                let stop_loss = ob.top + FIVE_PIPS;
                let risk = stop_loss - entry;
                let tp_ratio = entry - dec!(2) * risk;
                let take_profit = if vwap < entry { vwap.max(tp_ratio) } else { tp_ratio };
                (entry, stop_loss, take_profit)
            }
            SignalDirection::Hold => unreachable!(),
        };

        let risk_reward_ratio = if (entry - stop_loss).is_zero() {
            Decimal::ZERO
        } else {
            (take_profit - entry).abs() / (entry - stop_loss).abs()
        };

        let mut confidence = dec!(0.60)
            + dec!(0.05) * (Decimal::from(analysis.setup_quality) - dec!(5));
        if recent_grabs >= 2 {
            confidence += dec!(0.10);
        }
        if analysis.bos.strength >= dec!(7) {
            confidence += dec!(0.10);
        }
        confidence = confidence.min(dec!(0.95)).max(Decimal::ZERO);

        let sizing = sizing::position_size(
            cfg.balance,
            cfg.risk_percentage,
            cfg.max_risk_amount,
            entry,
            stop_loss,
        );

        let Ok(size) = sizing else {
            return Signal::hold(analysis, "invalid stop distance for sizing");
        };

        if size.lot_size < MIN_LOT || risk_reward_ratio < MIN_RR {
            debug!(
                lot_size = %size.lot_size,
                risk_reward_ratio = %risk_reward_ratio,
                "signal rejected: lot size or risk/reward below floor"
            );
            return Signal::hold(
                analysis,
                format!(
                    "lot_size {} or risk_reward_ratio {} below floor",
                    size.lot_size, risk_reward_ratio
                ),
            );
        }

        Signal {
            direction,
            confidence,
            entry,
            stop_loss,
            take_profit,
            risk_reward_ratio,
            lot_size: size.lot_size,
            setup_quality: analysis.setup_quality,
            reasons: vec!["all SMC gates passed".to_string()],
            ts: Utc::now(),
            analysis,
            ai_validated: None,
            ai_confidence: None,
        }
    }
}

fn strongest_aligned_block(blocks: &[OrderBlock], bos_direction: Direction) -> Option<&OrderBlock> {
    blocks
        .iter()
        .filter(|ob| ob.status == ObStatus::Fresh && ob.kind == bos_direction)
        .max_by(|a, b| a.strength.cmp(&b.strength))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{
        BosFinding, GrabKind, Indicators, LiquidityGrab, SessionLevels,
    };
    use chrono::Utc;

    fn base_analysis() -> MarketAnalysis {
        MarketAnalysis {
            at: Utc::now(),
            timeframe: crate::domain::types::Timeframe::M5,
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
                timeframe: crate::domain::types::Timeframe::M5,
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

    #[test]
    fn clean_bullish_setup_produces_buy_with_expected_levels() {
        let cfg = SignalEngineConfig {
            balance: dec!(100_000),
            risk_percentage: dec!(0.01),
            max_risk_amount: dec!(1000),
        };
        let signal = SignalEngine::generate(base_analysis(), &cfg);
        assert_eq!(signal.direction, SignalDirection::Buy);
        assert_eq!(signal.entry, dec!(2680.00));
        assert_eq!(signal.stop_loss, dec!(2678.95));
        assert!(signal.risk_reward_ratio >= MIN_RR);
    }

    #[test]
    fn missing_liquidity_grab_holds() {
        let mut analysis = base_analysis();
        analysis.liquidity_grabs.clear();
        let cfg = SignalEngineConfig {
            balance: dec!(100_000),
            risk_percentage: dec!(0.01),
            max_risk_amount: dec!(1000),
        };
        let signal = SignalEngine::generate(analysis, &cfg);
        assert!(signal.is_hold());
    }

    #[test]
    fn misaligned_order_block_holds() {
        let mut analysis = base_analysis();
        analysis.order_blocks[0].kind = Direction::Bearish;
        let cfg = SignalEngineConfig {
            balance: dec!(100_000),
            risk_percentage: dec!(0.01),
            max_risk_amount: dec!(1000),
        };
        let signal = SignalEngine::generate(analysis, &cfg);
        assert!(signal.is_hold());
    }
}
