//! 佣金费率模型
//!
//! 费率以结构化 JSON 落盘，读取时一次性解码并校验，配置损坏直接报错而不是算出 0

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{AppError, AppResult};
use crate::settlement::domain::money::round_money;
use crate::settlement::domain::status::ProductKind;

/// 阶梯费率的单个档位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTier {
    /// 档位上限（含），None 表示兜底档
    pub up_to: Option<Decimal>,
    /// 该档佣金百分比
    pub percent: Decimal,
}

/// 佣金费率
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommissionRate {
    /// 按比例抽佣
    Percentage { percent: Decimal },
    /// 固定金额
    Fixed { amount: Decimal },
    /// 按基数落在的档位抽佣，可选封顶金额
    Tiered {
        tiers: Vec<RateTier>,
        #[serde(default)]
        cap: Option<Decimal>,
    },
}

impl CommissionRate {
    /// 落盘用的类型标识
    pub fn kind(&self) -> &'static str {
        match self {
            CommissionRate::Percentage { .. } => "percentage",
            CommissionRate::Fixed { .. } => "fixed",
            CommissionRate::Tiered { .. } => "tiered",
        }
    }

    /// 简单费率的数值（percentage 的百分比 / fixed 的金额），阶梯费率无单值
    pub fn rate_value(&self) -> Option<Decimal> {
        match self {
            CommissionRate::Percentage { percent } => Some(*percent),
            CommissionRate::Fixed { amount } => Some(*amount),
            CommissionRate::Tiered { .. } => None,
        }
    }

    /// 校验费率配置
    pub fn validate(&self) -> AppResult<()> {
        match self {
            CommissionRate::Percentage { percent } => {
                if *percent < Decimal::ZERO || *percent > Decimal::ONE_HUNDRED {
                    return Err(AppError::Validation(format!(
                        "佣金比例超出范围: {}",
                        percent
                    )));
                }
            }
            CommissionRate::Fixed { amount } => {
                if *amount < Decimal::ZERO {
                    return Err(AppError::Validation(format!("固定佣金为负: {}", amount)));
                }
            }
            CommissionRate::Tiered { tiers, cap } => {
                if tiers.is_empty() {
                    return Err(AppError::Validation("阶梯费率档位为空".to_string()));
                }
                let mut prev_bound: Option<Decimal> = None;
                for (i, tier) in tiers.iter().enumerate() {
                    if tier.percent < Decimal::ZERO || tier.percent > Decimal::ONE_HUNDRED {
                        return Err(AppError::Validation(format!(
                            "第{}档比例超出范围: {}",
                            i + 1,
                            tier.percent
                        )));
                    }
                    match tier.up_to {
                        Some(bound) => {
                            if bound <= Decimal::ZERO {
                                return Err(AppError::Validation(format!(
                                    "第{}档上限非法: {}",
                                    i + 1,
                                    bound
                                )));
                            }
                            if let Some(prev) = prev_bound {
                                if bound <= prev {
                                    return Err(AppError::Validation(format!(
                                        "档位上限必须严格递增: {} -> {}",
                                        prev, bound
                                    )));
                                }
                            }
                            prev_bound = Some(bound);
                        }
                        // 兜底档只能出现在最后
                        None => {
                            if i + 1 != tiers.len() {
                                return Err(AppError::Validation(
                                    "兜底档位必须是最后一档".to_string(),
                                ));
                            }
                        }
                    }
                }
                if let Some(cap) = cap {
                    if *cap < Decimal::ZERO {
                        return Err(AppError::Validation(format!("佣金封顶为负: {}", cap)));
                    }
                }
            }
        }
        Ok(())
    }

    /// 计算基数对应的佣金金额（两位小数，且不超过基数本身）
    pub fn commission_for(&self, base: Decimal) -> AppResult<Decimal> {
        self.validate()?;
        if base < Decimal::ZERO {
            return Err(AppError::Validation(format!("佣金基数为负: {}", base)));
        }
        let raw = match self {
            CommissionRate::Percentage { percent } => base * *percent / Decimal::ONE_HUNDRED,
            CommissionRate::Fixed { amount } => *amount,
            CommissionRate::Tiered { tiers, cap } => {
                let tier = tiers
                    .iter()
                    .find(|t| match t.up_to {
                        Some(bound) => base <= bound,
                        None => true,
                    })
                    // 超过最高有界档位时按最后一档计
                    .unwrap_or_else(|| &tiers[tiers.len() - 1]);
                let mut amount = base * tier.percent / Decimal::ONE_HUNDRED;
                if let Some(cap) = cap {
                    amount = amount.min(*cap);
                }
                amount
            }
        };
        Ok(round_money(raw.min(base)))
    }

    /// 从落盘的 JSON 配置解码，配置损坏时报错
    pub fn from_config_json(raw: &str) -> AppResult<Self> {
        let rate: CommissionRate = serde_json::from_str(raw)
            .map_err(|e| AppError::Validation(format!("费率配置损坏: {}", e)))?;
        rate.validate()?;
        Ok(rate)
    }
}

/// 佣金费率注册表
///
/// 解析顺序：商家覆盖 → 产品形态费率 → 平台默认
#[derive(Debug, Clone)]
pub struct CommissionRegistry {
    default_rate: CommissionRate,
    by_product: HashMap<ProductKind, CommissionRate>,
}

impl CommissionRegistry {
    pub fn new(default_rate: CommissionRate) -> Self {
        Self {
            default_rate,
            by_product: HashMap::new(),
        }
    }

    pub fn with_product_rate(mut self, kind: ProductKind, rate: CommissionRate) -> Self {
        self.by_product.insert(kind, rate);
        self
    }

    pub fn resolve<'a>(
        &'a self,
        product: ProductKind,
        vendor_override: Option<&'a CommissionRate>,
    ) -> &'a CommissionRate {
        if let Some(rate) = vendor_override {
            return rate;
        }
        self.by_product.get(&product).unwrap_or(&self.default_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_percentage_rate() {
        let rate = CommissionRate::Percentage { percent: dec!(20) };
        assert_eq!(rate.commission_for(dec!(1000.00)).unwrap(), dec!(200.00));
        assert_eq!(rate.commission_for(dec!(0)).unwrap(), dec!(0));
    }

    #[test]
    fn test_fixed_rate_clamped_to_base() {
        let rate = CommissionRate::Fixed { amount: dec!(80) };
        assert_eq!(rate.commission_for(dec!(1000.00)).unwrap(), dec!(80.00));
        // 固定佣金不能吃掉超过实收的部分
        assert_eq!(rate.commission_for(dec!(50.00)).unwrap(), dec!(50.00));
    }

    #[test]
    fn test_tiered_rate() {
        let rate = CommissionRate::Tiered {
            tiers: vec![
                RateTier {
                    up_to: Some(dec!(500)),
                    percent: dec!(25),
                },
                RateTier {
                    up_to: Some(dec!(2000)),
                    percent: dec!(20),
                },
                RateTier {
                    up_to: None,
                    percent: dec!(15),
                },
            ],
            cap: None,
        };
        assert_eq!(rate.commission_for(dec!(400.00)).unwrap(), dec!(100.00));
        assert_eq!(rate.commission_for(dec!(1000.00)).unwrap(), dec!(200.00));
        assert_eq!(rate.commission_for(dec!(10000.00)).unwrap(), dec!(1500.00));
    }

    #[test]
    fn test_tiered_cap() {
        let rate = CommissionRate::Tiered {
            tiers: vec![RateTier {
                up_to: None,
                percent: dec!(20),
            }],
            cap: Some(dec!(150)),
        };
        assert_eq!(rate.commission_for(dec!(1000.00)).unwrap(), dec!(150.00));
    }

    #[test]
    fn test_malformed_tiers_fail_loudly() {
        let empty = CommissionRate::Tiered {
            tiers: vec![],
            cap: None,
        };
        assert!(empty.commission_for(dec!(100)).is_err());

        let unordered = CommissionRate::Tiered {
            tiers: vec![
                RateTier {
                    up_to: Some(dec!(2000)),
                    percent: dec!(20),
                },
                RateTier {
                    up_to: Some(dec!(500)),
                    percent: dec!(25),
                },
            ],
            cap: None,
        };
        assert!(unordered.validate().is_err());

        assert!(CommissionRate::from_config_json("{not json").is_err());
        assert!(
            CommissionRate::from_config_json(r#"{"type":"tiered","tiers":[]}"#).is_err()
        );
    }

    #[test]
    fn test_config_json_round_trip() {
        let rate = CommissionRate::Percentage { percent: dec!(20) };
        let raw = serde_json::to_string(&rate).unwrap();
        assert_eq!(CommissionRate::from_config_json(&raw).unwrap(), rate);
    }

    #[test]
    fn test_registry_resolution_order() {
        let registry = CommissionRegistry::new(CommissionRate::Percentage { percent: dec!(20) })
            .with_product_rate(
                ProductKind::MultiDay,
                CommissionRate::Percentage { percent: dec!(15) },
            );
        let vendor_rate = CommissionRate::Percentage { percent: dec!(10) };

        assert_eq!(
            registry.resolve(ProductKind::DayTrip, None).rate_value(),
            Some(dec!(20))
        );
        assert_eq!(
            registry.resolve(ProductKind::MultiDay, None).rate_value(),
            Some(dec!(15))
        );
        assert_eq!(
            registry
                .resolve(ProductKind::MultiDay, Some(&vendor_rate))
                .rate_value(),
            Some(dec!(10))
        );
    }
}
