//! 金额处理
//!
//! 台账金额统一保留两位小数；网关侧用最小货币单位（分）

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::{AppError, AppResult};

/// 金额取整到两位小数（四舍五入，远离零）
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// 台账金额 → 网关最小单位（分）
pub fn to_minor_units(amount: Decimal) -> AppResult<i64> {
    let cents = round_money(amount) * Decimal::ONE_HUNDRED;
    cents
        .to_i64()
        .ok_or_else(|| AppError::Validation(format!("金额无法转换为最小单位: {}", amount)))
}

/// 网关最小单位（分） → 台账金额
pub fn from_minor_units(minor: i64) -> Decimal {
    Decimal::new(minor, 2)
}
