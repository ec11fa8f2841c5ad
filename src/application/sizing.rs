//! Position-sizing utility shared by SignalEngine and RiskGate. Gold
//! contract constants live here as the single source of truth.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::errors::SizingError;
use crate::domain::types::PositionSize;

pub const CONTRACT_SIZE: Decimal = dec!(100);
pub const MIN_LOT: Decimal = dec!(0.01);
pub const STEP: Decimal = dec!(0.01);
pub const MAX_LOT: Decimal = dec!(50.0);
pub const PIP: Decimal = dec!(0.01);
pub const PIP_VALUE_PER_LOT: Decimal = dec!(10);

/// Round `value` down to the nearest multiple of `step` (lots only ever
/// round down, never up past the risk budget).
fn round_to_step(value: Decimal, step: Decimal) -> Decimal {
    if step.is_zero() {
        return value;
    }
    (value / step).trunc() * step
}

pub fn position_size(
    balance: Decimal,
    risk_percentage: Decimal,
    max_risk_amount: Decimal,
    entry: Decimal,
    stop_loss: Decimal,
) -> Result<PositionSize, SizingError> {
    let stop_distance = (entry - stop_loss).abs();
    if stop_distance.is_zero() {
        return Err(SizingError::InvalidStop);
    }

    let risk_amount = (balance * risk_percentage).min(max_risk_amount);
    let ounces = risk_amount / stop_distance;
    let raw_lot = round_to_step(ounces / CONTRACT_SIZE, STEP);
    let lot_size = raw_lot.clamp(MIN_LOT, MAX_LOT);

    let actual_ounces = lot_size * CONTRACT_SIZE;
    let actual_risk = actual_ounces * stop_distance;
    let pip_value = lot_size * PIP_VALUE_PER_LOT;
    let position_value = actual_ounces * entry;
    let stop_loss_distance_pips = stop_distance / PIP;

    Ok(PositionSize {
        lot_size,
        ounces: actual_ounces,
        risk_amount: actual_risk,
        pip_value,
        stop_loss_distance_pips,
        position_value,
    })
}
