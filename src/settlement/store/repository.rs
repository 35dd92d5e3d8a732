//! 台账仓储接口
//!
//! 所有写操作都要求幂等：状态相等短路或 CAS 条件更新，重复投递不产生第二次效果

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::error::AppResult;
use crate::settlement::domain::entities::{
    Booking, CommissionCalculation, NewBooking, NewCommission, NewTransaction, NewVendor,
    PaymentTransaction, Vendor,
};
use crate::settlement::domain::status::{
    CommissionStatus, EscrowStatus, PaymentStatus, TransactionStatus,
};

/// 网关状态落盘入参
#[derive(Debug, Clone)]
pub struct GatewayUpdate<'a> {
    pub reference_number: &'a str,
    pub status: TransactionStatus,
    pub raw_status: &'a str,
    pub paid_amount: Option<Decimal>,
    pub paid_currency: Option<&'a str>,
}

/// 网关状态落盘结果
#[derive(Debug, Clone, Copy)]
pub struct StatusApplied {
    pub booking_id: i64,
    /// 本次写入是否改变了流水状态
    pub changed: bool,
    /// 是否首次进入 succeeded（下游动作只在首次触发）
    pub first_succeeded: bool,
}

/// 订单仓储（结算引擎拥有的字段）
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn insert(&self, input: NewBooking) -> AppResult<i64>;

    async fn find_by_id(&self, id: i64) -> AppResult<Option<Booking>>;

    /// 标记支付成功并回填实收金额；已经成功过则返回 false
    async fn mark_paid(&self, id: i64, amount: Decimal, currency: &str) -> AppResult<bool>;

    /// 支付失败/取消落盘；只允许从 pending/failed 迁移，成功态不回退
    async fn mark_payment_outcome(&self, id: i64, to: PaymentStatus) -> AppResult<bool>;

    /// CAS 推进托管状态：当前状态在 from 集合内才写入
    async fn update_escrow_status(
        &self,
        id: i64,
        from: &[EscrowStatus],
        to: EscrowStatus,
    ) -> AppResult<bool>;

    /// 放款落盘：CAS 推进托管状态并写入累计已放比例，同一条更新完成
    async fn record_release(
        &self,
        id: i64,
        from: &[EscrowStatus],
        to: EscrowStatus,
        released_percent: Decimal,
    ) -> AppResult<bool>;

    /// 订单完成（回填客确时间与完成时间）；非进行中订单返回 false
    async fn mark_complete(&self, id: i64, confirmed_at: DateTime<Utc>) -> AppResult<bool>;

    /// 商家确认行程，订单 pending -> confirmed；重复确认返回 false
    async fn mark_provider_confirmed(&self, id: i64, at: DateTime<Utc>) -> AppResult<bool>;

    /// 打上争议标记；已有未决争议返回 false
    async fn mark_disputed(&self, id: i64, at: DateTime<Utc>) -> AppResult<bool>;

    /// 清除争议标记；本就没有未决争议返回 false
    async fn clear_dispute(&self, id: i64) -> AppResult<bool>;

    /// 取消订单并关闭托管、作废未支付佣金（同一事务）
    async fn cancel_and_close(
        &self,
        id: i64,
        payment_status: PaymentStatus,
        note: &str,
    ) -> AppResult<bool>;

    async fn append_note(&self, id: i64, note: &str) -> AppResult<()>;

    /// 周打款候选：已完成、商家周结、托管未放完、支付成功、完成时间不早于给定时刻
    async fn list_weekly_payout_candidates(
        &self,
        completed_after: DateTime<Utc>,
    ) -> AppResult<Vec<Booking>>;

    /// 行前部分放款候选：托管中、支付成功、进行中、行程开始日不晚于给定日期
    async fn list_partial_release_candidates(
        &self,
        start_on_or_before: NaiveDate,
    ) -> AppResult<Vec<Booking>>;

    /// 自动确认候选：商家已确认、客人未确认、订单进行中、支付成功
    async fn list_auto_confirm_candidates(&self) -> AppResult<Vec<Booking>>;

    /// 商家名下托管中的订单（含部分放款），留存资金看板用
    async fn list_escrowed_by_vendor(&self, vendor_id: i64) -> AppResult<Vec<Booking>>;
}

/// 支付流水仓储
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert_pending(&self, input: NewTransaction) -> AppResult<i64>;

    async fn find_by_reference(&self, reference: &str) -> AppResult<Option<PaymentTransaction>>;

    async fn find_latest_by_booking(&self, booking_id: i64)
        -> AppResult<Option<PaymentTransaction>>;

    /// 网关状态落盘：行锁读改写，succeeded 不被过期事件回退；
    /// 未知 reference 返回 None 交由调用方记录
    async fn apply_gateway_update(
        &self,
        update: GatewayUpdate<'_>,
    ) -> AppResult<Option<StatusApplied>>;
}

/// 佣金记录仓储
#[async_trait]
pub trait CommissionStore: Send + Sync {
    /// (订单, 收款方) 不存在未删除记录时才插入；存在性检查与插入在同一事务里
    async fn insert_if_absent(&self, input: NewCommission) -> AppResult<bool>;

    async fn find_active(
        &self,
        booking_id: i64,
        recipient_id: i64,
    ) -> AppResult<Option<CommissionCalculation>>;

    async fn list_by_booking(&self, booking_id: i64) -> AppResult<Vec<CommissionCalculation>>;

    /// CAS 状态流转并回填对应时间戳
    async fn set_status(
        &self,
        id: i64,
        from: &[CommissionStatus],
        to: CommissionStatus,
        at: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// 争议开启：订单下未删除、未支付的佣金全部置为 disputed
    async fn mark_disputed_for_booking(&self, booking_id: i64, at: DateTime<Utc>)
        -> AppResult<u64>;

    /// 争议解除：disputed 记录恢复为目标状态
    async fn restore_for_booking(&self, booking_id: i64, to: CommissionStatus) -> AppResult<u64>;

    /// 订单关闭：未支付佣金全部作废
    async fn cancel_for_booking(&self, booking_id: i64) -> AppResult<u64>;
}

/// 商家仓储
#[async_trait]
pub trait VendorStore: Send + Sync {
    async fn insert(&self, input: NewVendor) -> AppResult<i64>;

    async fn find_by_id(&self, id: i64) -> AppResult<Option<Vendor>>;

    async fn set_gateway_account(&self, id: i64, account_id: &str) -> AppResult<bool>;
}
