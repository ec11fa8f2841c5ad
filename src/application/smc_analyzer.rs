//! C2: pure function from a bar series to a `MarketAnalysis`. No I/O, no
//! shared state; same input always yields the same output.

use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use tracing::debug;

use crate::application::indicators;
use crate::domain::errors::AnalysisError;
use crate::domain::types::{
    Bar, BosFinding, Direction, GrabKind, Indicators, LiquidityGrab, MarketAnalysis, ObStatus,
    OrderBlock, SessionLevels, Timeframe,
};

const MIN_BARS: usize = 50;
const ATR_PERIOD: usize = 14;
const RSI_PERIOD: usize = 14;

pub struct SmcAnalyzer;

impl SmcAnalyzer {
    /// Validate and analyze `bars`, returning the full `MarketAnalysis`
    /// for the last bar. `bars` must be sorted ascending by time with
    /// strictly increasing timestamps and at least 50 entries.
    pub fn analyze(bars: &[Bar], timeframe: Timeframe) -> Result<MarketAnalysis, AnalysisError> {
        if bars.len() < MIN_BARS {
            return Err(AnalysisError::InvalidInput {
                reason: format!("need >= {MIN_BARS} bars, got {}", bars.len()),
            });
        }
        for w in bars.windows(2) {
            if w[1].time <= w[0].time {
                return Err(AnalysisError::InvalidInput {
                    reason: "bar times must be strictly increasing".into(),
                });
            }
        }
        for b in bars {
            if b.high < b.low || b.high < b.open || b.high < b.close || b.low > b.open || b.low > b.close
            {
                return Err(AnalysisError::InvalidInput {
                    reason: "bar OHLC is inconsistent".into(),
                });
            }
        }

        let last = bars.last().expect("len checked above");
        let len = bars.len();

        let indicators = Indicators {
            vwap: indicators::vwap(bars),
            ema21: indicators::ema(bars, 21),
            ema50: indicators::ema(bars, 50),
            ema200: indicators::ema(bars, 200),
            rsi: indicators::rsi(bars, RSI_PERIOD),
            atr: indicators::atr(bars, ATR_PERIOD),
        };

        let session_levels = session_levels(bars);
        let order_blocks = detect_order_blocks(bars, timeframe);
        let bos = detect_bos(bars);
        let liquidity_grabs = detect_liquidity_grabs(bars);

        let trend = if last.close > indicators.ema50 && indicators.ema50 > indicators.ema200 {
            Direction::Bullish
        } else if last.close < indicators.ema50 && indicators.ema50 < indicators.ema200 {
            Direction::Bearish
        } else {
            Direction::Neutral
        };

        let setup_quality = setup_quality(
            trend,
            &order_blocks,
            &bos,
            &liquidity_grabs,
            indicators.rsi,
        );

        debug!(
            len,
            trend = ?trend,
            ob = order_blocks.len(),
            bos_detected = bos.detected,
            grabs = liquidity_grabs.len(),
            setup_quality,
            "smc analysis complete"
        );

        Ok(MarketAnalysis {
            at: last.time,
            timeframe,
            current_price: last.close,
            trend,
            session_levels,
            order_blocks,
            bos,
            liquidity_grabs,
            indicators,
            setup_quality,
        })
    }
}

fn session_levels(bars: &[Bar]) -> SessionLevels {
    let window50 = &bars[bars.len().saturating_sub(50)..];
    let window24 = &bars[bars.len().saturating_sub(24)..];

    let (session_high, session_low) = high_low(window50);
    let (prev_day_high, prev_day_low) = if bars.len() >= 24 {
        high_low(window24)
    } else {
        (session_high, session_low)
    };
    let (weekly_high, weekly_low) = high_low(window50);

    SessionLevels {
        session_high,
        session_low,
        prev_day_high,
        prev_day_low,
        weekly_high,
        weekly_low,
    }
}

fn high_low(bars: &[Bar]) -> (Decimal, Decimal) {
    let mut hi = bars[0].high;
    let mut lo = bars[0].low;
    for b in bars {
        hi = hi.max(b.high);
        lo = lo.min(b.low);
    }
    (hi, lo)
}

fn detect_order_blocks(bars: &[Bar], timeframe: Timeframe) -> Vec<OrderBlock> {
    let len = bars.len();
    if len < 16 {
        return Vec::new();
    }
    let mut found = Vec::new();
    for i in 10..len.saturating_sub(6) {
        let b = &bars[i];
        let atr_i = indicators::atr_at(bars, i, ATR_PERIOD);
        if atr_i.is_zero() {
            continue;
        }
        let range = b.high - b.low;
        if range > Decimal::new(15, 1) * atr_i {
            let kind = if b.close > b.open {
                Direction::Bullish
            } else {
                Direction::Bearish
            };
            let strength = (Decimal::from(2) * range / atr_i).clamp(Decimal::ONE, Decimal::from(10));
            found.push(OrderBlock {
                kind,
                top: b.high,
                bottom: b.low,
                formed_at: b.time,
                strength,
                status: ObStatus::Fresh,
                timeframe,
            });
        }
    }
    found.sort_by(|a, b| b.formed_at.cmp(&a.formed_at).then(b.strength.cmp(&a.strength)));
    found.truncate(5);
    found
}

fn detect_bos(bars: &[Bar]) -> BosFinding {
    let len = bars.len();
    let last = bars.last().expect("checked by caller");
    if len < 20 {
        return BosFinding::none(last.time);
    }
    let window = &bars[len - 20..];
    let recent5 = &window[15..20];
    let prior5 = &window[10..15];

    let (recent_max, recent_min) = high_low(recent5);
    let (prior_max, prior_min) = high_low(prior5);

    if recent_max > prior_max {
        BosFinding {
            detected: true,
            direction: Direction::Bullish,
            break_price: recent_max,
            at: last.time,
            strength: Decimal::from(7),
        }
    } else if recent_min < prior_min {
        BosFinding {
            detected: true,
            direction: Direction::Bearish,
            break_price: recent_min,
            at: last.time,
            strength: Decimal::from(7),
        }
    } else {
        BosFinding::none(last.time)
    }
}

fn detect_liquidity_grabs(bars: &[Bar]) -> Vec<LiquidityGrab> {
    let len = bars.len();
    if len < 8 {
        return Vec::new();
    }
    let mut found = Vec::new();
    for i in 5..len.saturating_sub(2) {
        let prev = &bars[i - 1];
        let curr = &bars[i];
        let next = &bars[i + 1];

        if curr.high > prev.high * Decimal::new(1002, 3) && next.close < curr.open {
            found.push(LiquidityGrab {
                kind: GrabKind::Upward,
                price: curr.high,
                at: curr.time,
                strength: Decimal::from(5),
            });
        } else if curr.low < prev.low * Decimal::new(998, 3) && next.close > curr.open {
            found.push(LiquidityGrab {
                kind: GrabKind::Downward,
                price: curr.low,
                at: curr.time,
                strength: Decimal::from(5),
            });
        }
    }
    let keep = found.len().saturating_sub(3);
    found.split_off(keep)
}

fn setup_quality(
    trend: Direction,
    order_blocks: &[OrderBlock],
    bos: &BosFinding,
    liquidity_grabs: &[LiquidityGrab],
    rsi: Decimal,
) -> u8 {
    let mut score: i32 = 5;
    if trend != Direction::Neutral {
        score += 2;
    }
    if !order_blocks.is_empty() {
        score += 1;
    }
    if bos.detected {
        score += 2;
    }
    if !liquidity_grabs.is_empty() {
        score += 1;
    }
    let rsi_f = rsi.to_f64().unwrap_or(50.0);
    if (30.0..=70.0).contains(&rsi_f) {
        score += 1;
    } else if !(20.0..=80.0).contains(&rsi_f) {
        score -= 1;
    }
    score.clamp(1, 10) as u8
}
