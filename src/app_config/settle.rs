//! 结算策略配置
//!
//! 佣金比例、放款窗口、退款政策等数值全部由环境变量覆盖，默认值与线上口径一致

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::app_config::env::{env_decimal, env_i64, env_opt};

/// 结算策略参数
#[derive(Debug, Clone)]
pub struct SettleConfig {
    /// 平台默认佣金百分比
    pub platform_commission_percent: Decimal,
    /// 行前部分放款默认百分比（订单可覆盖）
    pub partial_release_percent: Decimal,
    /// 行前部分放款提前天数
    pub partial_release_lead_days: i64,
    /// 客人取消默认退款百分比（订单可覆盖）
    pub cancellation_refund_percent: Decimal,
    /// 客人取消免责窗口（行前天数，窗口内拒绝自动退款）
    pub cancellation_window_days: i64,
    /// 支付失败自动取消的行前天数下限
    pub payment_failure_cancel_days: i64,
    /// 一日游自动确认窗口（小时）
    pub auto_confirm_day_trip_hours: i64,
    /// 多日游自动确认窗口（小时）
    pub auto_confirm_multi_day_hours: i64,
    /// 周结算回溯天数（只结算近期完成的订单）
    pub payout_lookback_days: i64,
    /// 商家开通流程的跳转地址
    pub onboarding_refresh_url: String,
    pub onboarding_return_url: String,
    /// 管理端操作令牌，未配置时不做校验（本地/测试）
    pub admin_token: Option<String>,
}

impl Default for SettleConfig {
    fn default() -> Self {
        Self {
            platform_commission_percent: dec!(20),
            partial_release_percent: dec!(50),
            partial_release_lead_days: 30,
            cancellation_refund_percent: dec!(50),
            cancellation_window_days: 30,
            payment_failure_cancel_days: 30,
            auto_confirm_day_trip_hours: 24,
            auto_confirm_multi_day_hours: 48,
            payout_lookback_days: 7,
            onboarding_refresh_url: "https://example.com/vendor/onboarding/refresh".to_string(),
            onboarding_return_url: "https://example.com/vendor/onboarding/return".to_string(),
            admin_token: None,
        }
    }
}

impl SettleConfig {
    /// 从环境变量加载，缺省回退到默认口径
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            platform_commission_percent: env_decimal(
                "PLATFORM_COMMISSION_PERCENT",
                base.platform_commission_percent,
            ),
            partial_release_percent: env_decimal(
                "PARTIAL_RELEASE_PERCENT",
                base.partial_release_percent,
            ),
            partial_release_lead_days: env_i64(
                "PARTIAL_RELEASE_LEAD_DAYS",
                base.partial_release_lead_days,
            ),
            cancellation_refund_percent: env_decimal(
                "CANCELLATION_REFUND_PERCENT",
                base.cancellation_refund_percent,
            ),
            cancellation_window_days: env_i64(
                "CANCELLATION_WINDOW_DAYS",
                base.cancellation_window_days,
            ),
            payment_failure_cancel_days: env_i64(
                "PAYMENT_FAILURE_CANCEL_DAYS",
                base.payment_failure_cancel_days,
            ),
            auto_confirm_day_trip_hours: env_i64(
                "AUTO_CONFIRM_DAY_TRIP_HOURS",
                base.auto_confirm_day_trip_hours,
            ),
            auto_confirm_multi_day_hours: env_i64(
                "AUTO_CONFIRM_MULTI_DAY_HOURS",
                base.auto_confirm_multi_day_hours,
            ),
            payout_lookback_days: env_i64("PAYOUT_LOOKBACK_DAYS", base.payout_lookback_days),
            onboarding_refresh_url: crate::app_config::env::env_or_default(
                "ONBOARDING_REFRESH_URL",
                &base.onboarding_refresh_url,
            ),
            onboarding_return_url: crate::app_config::env::env_or_default(
                "ONBOARDING_RETURN_URL",
                &base.onboarding_return_url,
            ),
            admin_token: env_opt("ADMIN_API_TOKEN"),
        }
    }
}
