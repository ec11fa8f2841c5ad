//! Pure indicator math over a `Bar` slice. Every function is total: it
//! never panics on short input, falling back to a neutral value instead
//! of producing NaN/Inf.

use rust_decimal::Decimal;
use rust_decimal::prelude::*;

use crate::domain::types::Bar;

/// Cumulative VWAP over the whole series. Volume defaults to 1 when zero
/// so the denominator never divides by zero.
pub fn vwap(bars: &[Bar]) -> Decimal {
    let mut pv = Decimal::ZERO;
    let mut vol = Decimal::ZERO;
    for b in bars {
        let typical = (b.high + b.low + b.close) / Decimal::from(3);
        let v = if b.volume == 0 {
            Decimal::ONE
        } else {
            Decimal::from(b.volume)
        };
        pv += typical * v;
        vol += v;
    }
    if vol.is_zero() {
        return bars.last().map(|b| b.close).unwrap_or(Decimal::ZERO);
    }
    pv / vol
}

/// Exponential moving average of closes with the given span. Falls back
/// to the last close when the series is shorter than the span.
pub fn ema(bars: &[Bar], span: usize) -> Decimal {
    if bars.is_empty() {
        return Decimal::ZERO;
    }
    if bars.len() < span {
        return bars.last().unwrap().close;
    }
    let alpha = Decimal::from(2) / Decimal::from(span + 1);
    let mut value = bars[0].close;
    for b in &bars[1..] {
        value = (b.close - value) * alpha + value;
    }
    value
}

/// Wilder-style RSI-14. Returns 50 (neutral) when there is no price
/// movement to measure.
pub fn rsi(bars: &[Bar], period: usize) -> Decimal {
    if bars.len() <= period {
        return Decimal::from(50);
    }
    let mut gains = Decimal::ZERO;
    let mut losses = Decimal::ZERO;
    for w in bars.windows(2).take(period) {
        let change = w[1].close - w[0].close;
        if change > Decimal::ZERO {
            gains += change;
        } else {
            losses += -change;
        }
    }
    let mut avg_gain = gains / Decimal::from(period);
    let mut avg_loss = losses / Decimal::from(period);

    for w in bars.windows(2).skip(period) {
        let change = w[1].close - w[0].close;
        let (gain, loss) = if change > Decimal::ZERO {
            (change, Decimal::ZERO)
        } else {
            (Decimal::ZERO, -change)
        };
        avg_gain = (avg_gain * Decimal::from(period - 1) + gain) / Decimal::from(period);
        avg_loss = (avg_loss * Decimal::from(period - 1) + loss) / Decimal::from(period);
    }

    if avg_loss.is_zero() && avg_gain.is_zero() {
        return Decimal::from(50);
    }
    if avg_loss.is_zero() {
        return Decimal::from(100);
    }
    let rs = avg_gain / avg_loss;
    let hundred = Decimal::from(100);
    hundred - (hundred / (Decimal::ONE + rs))
}

fn true_range(curr: &Bar, prev: &Bar) -> Decimal {
    let hl = curr.high - curr.low;
    let hc = (curr.high - prev.close).abs();
    let lc = (curr.low - prev.close).abs();
    hl.max(hc).max(lc)
}

/// ATR-14: mean of True Range over the trailing `period` bars. When the
/// series is too short to have a previous bar, falls back to the last
/// bar's own high-low range (its own TR with no predecessor).
pub fn atr(bars: &[Bar], period: usize) -> Decimal {
    if bars.len() < 2 {
        return bars
            .last()
            .map(|b| b.high - b.low)
            .unwrap_or(Decimal::ZERO);
    }
    let window = &bars[bars.len().saturating_sub(period + 1)..];
    let mut sum = Decimal::ZERO;
    let mut count = 0i64;
    for w in window.windows(2) {
        sum += true_range(&w[1], &w[0]);
        count += 1;
    }
    if count == 0 {
        return bars[bars.len() - 1].high - bars[bars.len() - 1].low;
    }
    sum / Decimal::from(count)
}

/// ATR as of a specific index `i` (0-based), using the `period` bars
/// ending at `i`. Used by order-block detection which needs a per-bar
/// ATR rather than only the series-trailing one.
pub fn atr_at(bars: &[Bar], i: usize, period: usize) -> Decimal {
    let end = i + 1;
    let start = end.saturating_sub(period + 1);
    atr(&bars[start..end], period)
}
