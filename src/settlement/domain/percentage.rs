//! 百分比值对象

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PercentageError {
    #[error("百分比超出范围: {0} (允许范围: 0-100)")]
    OutOfRange(Decimal),
}

/// 百分比值对象
///
/// 业务规则:
/// - 范围: 0 - 100
/// - 放款比例、退款比例、佣金比例统一用它承载
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Percentage(Decimal);

impl Percentage {
    /// 创建百分比 (带验证)
    pub fn new(value: Decimal) -> Result<Self, PercentageError> {
        if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
            return Err(PercentageError::OutOfRange(value));
        }
        Ok(Self(value))
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn full() -> Self {
        Self(Decimal::ONE_HUNDRED)
    }

    /// 获取百分比值 (0-100)
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// 剩余比例 (100 - 自身)
    pub fn complement(&self) -> Self {
        Self(Decimal::ONE_HUNDRED - self.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_full(&self) -> bool {
        self.0 == Decimal::ONE_HUNDRED
    }

    /// 计算百分比对应的金额（未做金额取整）
    pub fn of(&self, amount: Decimal) -> Decimal {
        amount * self.0 / Decimal::ONE_HUNDRED
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_new_validates_range() {
        assert!(Percentage::new(dec!(0)).is_ok());
        assert!(Percentage::new(dec!(50)).is_ok());
        assert!(Percentage::new(dec!(100)).is_ok());
        assert!(Percentage::new(dec!(-1)).is_err());
        assert!(Percentage::new(dec!(100.01)).is_err());
    }

    #[test]
    fn test_of_amount() {
        let half = Percentage::new(dec!(50)).unwrap();
        assert_eq!(half.of(dec!(1000.00)), dec!(500.0000));
    }

    #[test]
    fn test_complement() {
        let p = Percentage::new(dec!(30)).unwrap();
        assert_eq!(p.complement().value(), dec!(70));
        assert!(Percentage::full().complement().is_zero());
    }

    #[test]
    fn test_display() {
        let p = Percentage::new(dec!(12.5)).unwrap();
        assert_eq!(p.to_string(), "12.5%");
    }
}
