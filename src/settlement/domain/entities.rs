//! 台账实体
//!
//! 订单上只建模结算引擎拥有的字段，目录/行程等信息归订单协作方

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::settlement::domain::percentage::Percentage;
use crate::settlement::domain::rate::CommissionRate;
use crate::settlement::domain::status::{
    BookingStatus, CommissionStatus, EscrowStatus, PaymentStatus, PayoutCadence, ProductKind,
    TransactionStatus,
};

/// 订单（结算视角）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    /// 订单号（对客展示用）
    pub reference: String,
    pub client_id: i64,
    pub vendor_id: i64,
    pub product_kind: ProductKind,
    pub trip_start_date: NaiveDate,
    /// 订单应付金额（下单价）
    pub amount: Decimal,
    pub currency: String,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub escrow_status: EscrowStatus,
    pub paid_amount: Option<Decimal>,
    pub paid_currency: Option<String>,
    /// 已放款的累计比例，0 到 100
    pub released_percent: Decimal,
    /// 行前30天部分放款比例覆盖，None 用平台默认
    pub release_percentage_30days: Option<Decimal>,
    /// 取消退款比例覆盖，None 用平台默认
    pub cancellation_refund_percent: Option<Decimal>,
    pub provider_confirmed_at: Option<DateTime<Utc>>,
    pub client_confirmed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// 未决争议的开启时间，置位期间放款全部冻结
    pub disputed_at: Option<DateTime<Utc>>,
    /// 审计备注，逐行追加
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// 行前部分放款比例（订单覆盖优先），配置越界按校验失败处理
    pub fn partial_release_percent(&self, default_percent: Decimal) -> AppResult<Percentage> {
        let value = self.release_percentage_30days.unwrap_or(default_percent);
        Percentage::new(value).map_err(|e| AppError::Validation(e.to_string()))
    }

    /// 距行程开始的天数（已开始为负）
    pub fn days_until_trip(&self, today: NaiveDate) -> i64 {
        crate::time_util::days_until(today, self.trip_start_date)
    }

    /// 支付是否已成功且有实收金额
    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Succeeded && self.paid_amount.is_some()
    }
}

/// 新建订单的输入
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub reference: String,
    pub client_id: i64,
    pub vendor_id: i64,
    pub product_kind: ProductKind,
    pub trip_start_date: NaiveDate,
    pub amount: Decimal,
    pub currency: String,
    pub release_percentage_30days: Option<Decimal>,
    pub cancellation_refund_percent: Option<Decimal>,
}

/// 支付流水，一条对应一次网关 intent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: i64,
    pub booking_id: i64,
    /// 网关 intent id，唯一
    pub reference_number: String,
    pub status: TransactionStatus,
    /// 应收金额
    pub amount: Decimal,
    pub currency: String,
    /// 实收金额（成功后回填）
    pub paid_amount: Option<Decimal>,
    pub paid_currency: Option<String>,
    /// 网关状态原文
    pub raw_status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 新建支付流水的输入
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub booking_id: i64,
    pub reference_number: String,
    pub amount: Decimal,
    pub currency: String,
    pub raw_status: String,
}

/// 佣金计算记录
///
/// 每个 (订单, 收款方) 至多一条未删除记录；金额一经写入不再改动，只有状态会流转
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommissionCalculation {
    pub id: i64,
    pub booking_id: i64,
    pub recipient_id: i64,
    pub base_amount: Decimal,
    pub rate: CommissionRate,
    pub commission_amount: Decimal,
    pub vendor_payout: Decimal,
    pub currency: String,
    pub status: CommissionStatus,
    pub approved_at: Option<DateTime<Utc>>,
    pub disputed_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 新建佣金记录的输入
#[derive(Debug, Clone)]
pub struct NewCommission {
    pub booking_id: i64,
    pub recipient_id: i64,
    pub base_amount: Decimal,
    pub rate: CommissionRate,
    pub commission_amount: Decimal,
    pub vendor_payout: Decimal,
    pub currency: String,
}

/// 商家（收款方）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vendor {
    pub id: i64,
    pub display_name: String,
    /// 网关侧关联收款账户，未绑定时放款会被拦下
    pub gateway_account_id: Option<String>,
    pub payout_cadence: PayoutCadence,
    /// 商家级佣金费率覆盖
    pub commission_rate: Option<CommissionRate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 新建商家的输入
#[derive(Debug, Clone)]
pub struct NewVendor {
    pub display_name: String,
    pub gateway_account_id: Option<String>,
    pub payout_cadence: PayoutCadence,
    pub commission_rate: Option<CommissionRate>,
}
