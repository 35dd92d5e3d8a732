//! 托管状态机
//!
//! pending -> held -> {released_partial -> released_full} | refunded。
//! 分段放款按累计比例取整后做差，各段之和恰好等于总额，不产生分尾差。
//! 转账成功后状态落盘失败只告警不回滚，资金动向以网关为准

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{error, info, warn};

use crate::app_config::settle::SettleConfig;
use crate::error::{AppError, AppResult};
use crate::settlement::domain::entities::Booking;
use crate::settlement::domain::money::{round_money, to_minor_units};
use crate::settlement::domain::percentage::Percentage;
use crate::settlement::domain::status::{BookingStatus, CommissionStatus, EscrowStatus};
use crate::settlement::gateway::dto::{IntentDto, TransferRequest};
use crate::settlement::gateway::PaymentGateway;
use crate::settlement::services::commission_service::CommissionService;
use crate::settlement::store::Ledger;
use crate::time_util::partial_release_open_date;

/// 单次放款结果
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseOutcome {
    pub booking_id: i64,
    /// 本次离开托管的总额（商家份 + 平台留存份）
    pub release_total: Decimal,
    /// 转给商家的金额
    pub vendor_cut: Decimal,
    /// 平台留存的佣金份额
    pub commission_cut: Decimal,
    /// 放款后的累计比例
    pub released_percent: Decimal,
    pub escrow_status: EscrowStatus,
    pub transfer_id: String,
    /// 状态是否成功落盘（false 表示资金已出但状态待人工对账）
    pub status_recorded: bool,
}

#[derive(Clone)]
pub struct EscrowService {
    ledger: Ledger,
    gateway: Arc<dyn PaymentGateway>,
    config: SettleConfig,
    commissions: CommissionService,
    /// 每单一把放款锁，克隆体之间共享，读单-转账-落盘全程持有
    release_locks: Arc<Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>>,
}

impl EscrowService {
    pub fn new(
        ledger: Ledger,
        gateway: Arc<dyn PaymentGateway>,
        config: SettleConfig,
        commissions: CommissionService,
    ) -> Self {
        Self {
            ledger,
            gateway,
            config,
            commissions,
            release_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn release_lock(&self, booking_id: i64) -> Arc<AsyncMutex<()>> {
        let mut locks = match self.release_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(booking_id).or_default().clone()
    }

    /// 建立托管
    ///
    /// 意向待扣款时先划扣并把新鲜意向交还调用方回灌状态；
    /// 流水已成功则把托管推进到 held。重复调用无副作用
    pub async fn hold(&self, booking_id: i64) -> AppResult<Option<IntentDto>> {
        let booking = self.require_booking(booking_id).await?;
        // 争议可能提前把托管占位到 held，此时划扣仍要执行，资金先进托管
        if !matches!(
            booking.escrow_status,
            EscrowStatus::Pending | EscrowStatus::Held
        ) {
            return Ok(None);
        }

        let Some(tx) = self
            .ledger
            .transactions
            .find_latest_by_booking(booking_id)
            .await?
        else {
            warn!("订单 {} 无支付流水，托管不动作", booking_id);
            return Ok(None);
        };

        use crate::settlement::domain::status::TransactionStatus::*;
        match tx.status {
            RequiresCapture => {
                let intent = self.gateway.capture_intent(&tx.reference_number).await?;
                info!(
                    "📦 资金已划扣入托管: booking_id={}, reference={}",
                    booking_id, tx.reference_number
                );
                Ok(Some(intent))
            }
            Succeeded => {
                let held = self
                    .ledger
                    .bookings
                    .update_escrow_status(booking_id, &[EscrowStatus::Pending], EscrowStatus::Held)
                    .await?;
                if held {
                    info!("📦 托管建立: booking_id={}", booking_id);
                }
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    /// 手动放款：从 held 释放总额的 percent
    pub async fn release(
        &self,
        booking_id: i64,
        percent: Percentage,
        reason: &str,
    ) -> AppResult<ReleaseOutcome> {
        if percent.is_zero() {
            return Err(AppError::Validation("放款比例不能为 0".to_string()));
        }
        let booking = self.require_booking(booking_id).await?;
        if booking.escrow_status != EscrowStatus::Held {
            return Err(AppError::InvalidState(format!(
                "订单 {} 托管状态为 {}，不能放款",
                booking_id,
                booking.escrow_status.as_str()
            )));
        }
        let target = if percent.is_full() {
            EscrowStatus::ReleasedFull
        } else {
            EscrowStatus::ReleasedPartial
        };
        self.do_release(booking.id, percent.value(), target, reason)
            .await
    }

    /// 行前部分放款：today 达到 (行程开始 - 提前天数) 才放行
    pub async fn release_partial_if_due(
        &self,
        booking_id: i64,
        today: NaiveDate,
    ) -> AppResult<ReleaseOutcome> {
        let booking = self.require_booking(booking_id).await?;
        if booking.escrow_status != EscrowStatus::Held {
            return Err(AppError::InvalidState(format!(
                "订单 {} 已执行过部分放款或托管未建立",
                booking_id
            )));
        }
        let open_date =
            partial_release_open_date(booking.trip_start_date, self.config.partial_release_lead_days);
        if today < open_date {
            return Err(AppError::InvalidState(format!(
                "订单 {} 未到部分放款窗口，{} 起可放",
                booking_id, open_date
            )));
        }

        let percent = booking.partial_release_percent(self.config.partial_release_percent)?;
        let target = if percent.is_full() {
            EscrowStatus::ReleasedFull
        } else {
            EscrowStatus::ReleasedPartial
        };
        self.do_release(booking.id, percent.value(), target, "行前部分放款")
            .await
    }

    /// 放出剩余全部托管资金，终态 released_full
    pub async fn release_remaining(
        &self,
        booking_id: i64,
        reason: &str,
    ) -> AppResult<ReleaseOutcome> {
        let booking = self.require_booking(booking_id).await?;
        if !matches!(
            booking.escrow_status,
            EscrowStatus::Held | EscrowStatus::ReleasedPartial
        ) {
            return Err(AppError::InvalidState(format!(
                "订单 {} 托管状态为 {}，无剩余资金可放",
                booking_id,
                booking.escrow_status.as_str()
            )));
        }
        self.do_release(booking.id, Decimal::ONE_HUNDRED, EscrowStatus::ReleasedFull, reason)
            .await
    }

    /// 尾款放款：订单完成后放出剩余比例
    pub async fn release_final(&self, booking_id: i64) -> AppResult<ReleaseOutcome> {
        let booking = self.require_booking(booking_id).await?;
        if booking.status != BookingStatus::Complete {
            return Err(AppError::InvalidState(format!(
                "订单 {} 尚未完成，不能放尾款",
                booking_id
            )));
        }
        self.release_remaining(booking_id, "订单完成尾款放款").await
    }

    /// 解析订单的网关扣款凭据（退款 / 转账的资金源）
    pub async fn charge_for_booking(&self, booking_id: i64) -> AppResult<String> {
        let tx = self
            .ledger
            .transactions
            .find_latest_by_booking(booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("订单 {} 无支付流水", booking_id)))?;
        let intent = self.gateway.retrieve_intent(&tx.reference_number).await?;
        intent.latest_charge.ok_or_else(|| {
            AppError::InvalidState(format!("订单 {} 的支付意向尚未产生扣款", booking_id))
        })
    }

    /// 放款核心：校验商家账户，按累计比例差额转账，再推进托管状态
    ///
    /// 同一订单的放款持锁串行执行，锁内重读订单，两个触发源（扫单与管理端）
    /// 同时过检时后到的一方会在重读后被状态挡下，不会产生第二笔转账
    async fn do_release(
        &self,
        booking_id: i64,
        new_percent: Decimal,
        target: EscrowStatus,
        reason: &str,
    ) -> AppResult<ReleaseOutcome> {
        let lock = self.release_lock(booking_id);
        let _serial = lock.lock().await;

        let booking = self.require_booking(booking_id).await?;
        if !matches!(
            booking.escrow_status,
            EscrowStatus::Held | EscrowStatus::ReleasedPartial
        ) {
            return Err(AppError::InvalidState(format!(
                "订单 {} 托管状态为 {}，不能放款",
                booking.id,
                booking.escrow_status.as_str()
            )));
        }
        if booking.disputed_at.is_some() {
            return Err(AppError::InvalidState(format!(
                "订单 {} 存在未决争议，放款已冻结",
                booking.id
            )));
        }
        let paid = booking.paid_amount.ok_or_else(|| {
            AppError::InvalidState(format!("订单 {} 未支付，不能放款", booking.id))
        })?;
        let prior_percent = booking.released_percent;
        if new_percent <= prior_percent {
            return Err(AppError::InvalidState(format!(
                "订单 {} 已放款 {}%，目标比例 {}% 无增量",
                booking.id, prior_percent, new_percent
            )));
        }

        let commission = self.commissions.ensure_for_booking(&booking).await?;
        if commission.status == CommissionStatus::Disputed {
            return Err(AppError::InvalidState(format!(
                "订单 {} 存在未决争议，放款已冻结",
                booking.id
            )));
        }

        let release_total = scaled(paid, new_percent) - scaled(paid, prior_percent);
        let commission_cut = scaled(commission.commission_amount, new_percent)
            - scaled(commission.commission_amount, prior_percent);
        let vendor_cut = release_total - commission_cut;
        if vendor_cut <= Decimal::ZERO {
            return Err(AppError::Validation(format!(
                "订单 {} 本次放款商家份额为 {}，金额过小",
                booking.id, vendor_cut
            )));
        }

        let vendor = self
            .ledger
            .vendors
            .find_by_id(booking.vendor_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("商家 {} 不存在", booking.vendor_id)))?;
        let account_id = vendor.gateway_account_id.clone().ok_or_else(|| {
            AppError::OnboardingIncomplete {
                message: format!("商家 {} 未绑定收款账户", vendor.id),
                onboarding_url: None,
            }
        })?;

        let account = self.gateway.retrieve_account(&account_id).await?;
        if !account.can_receive_transfers() {
            let onboarding_url = match self
                .gateway
                .create_account_link(
                    &account_id,
                    &self.config.onboarding_refresh_url,
                    &self.config.onboarding_return_url,
                )
                .await
            {
                Ok(link) => Some(link.url),
                Err(e) => {
                    warn!("生成开通链接失败: account={}, err={}", account_id, e);
                    None
                }
            };
            return Err(AppError::OnboardingIncomplete {
                message: format!("商家 {} 收款账户未完成开通，暂不能打款", vendor.id),
                onboarding_url,
            });
        }

        let charge = self.charge_for_booking(booking.id).await?;
        let currency = booking
            .paid_currency
            .clone()
            .unwrap_or_else(|| booking.currency.clone());
        let transfer = self
            .gateway
            .create_transfer(&TransferRequest {
                amount_minor: to_minor_units(vendor_cut)?,
                currency: currency.clone(),
                destination_account: account_id,
                source_charge: charge,
                booking_reference: booking.reference.clone(),
            })
            .await?;

        let status_recorded = self
            .ledger
            .bookings
            .record_release(booking.id, &[booking.escrow_status], target, new_percent)
            .await?;
        if !status_recorded {
            error!(
                "❌ 资金已转出但托管状态落盘失败，需人工对账: booking_id={}, transfer_id={}, target={}",
                booking.id,
                transfer.id,
                target.as_str()
            );
        }

        if target == EscrowStatus::ReleasedFull {
            let paid_marked = self
                .ledger
                .commissions
                .set_status(
                    commission.id,
                    &[CommissionStatus::Pending, CommissionStatus::Approved],
                    CommissionStatus::Paid,
                    chrono::Utc::now(),
                )
                .await?;
            if !paid_marked {
                warn!(
                    "佣金记录 {} 状态未能置为已结算，当前可能已被处理",
                    commission.id
                );
            }
        }

        self.ledger
            .bookings
            .append_note(
                booking.id,
                &format!(
                    "放款至 {}%：本次 {} {}，商家 {}，平台留存 {}（{}）",
                    new_percent, release_total, currency, vendor_cut, commission_cut, reason
                ),
            )
            .await?;

        info!(
            "🚀 放款完成: booking_id={}, percent={}->{}%, vendor_cut={}, transfer_id={}",
            booking.id, prior_percent, new_percent, vendor_cut, transfer.id
        );

        Ok(ReleaseOutcome {
            booking_id: booking.id,
            release_total,
            vendor_cut,
            commission_cut,
            released_percent: new_percent,
            escrow_status: target,
            transfer_id: transfer.id,
            status_recorded,
        })
    }

    async fn require_booking(&self, booking_id: i64) -> AppResult<Booking> {
        self.ledger
            .bookings
            .find_by_id(booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("订单 {} 不存在", booking_id)))
    }
}

/// 按累计比例取整的金额（中点远离零）
fn scaled(amount: Decimal, percent: Decimal) -> Decimal {
    round_money(amount * percent / Decimal::ONE_HUNDRED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_scaled_segments_sum_to_total() {
        let paid = dec!(1000.00);
        let first = scaled(paid, dec!(50));
        let second = scaled(paid, dec!(100)) - scaled(paid, dec!(50));
        assert_eq!(first + second, paid);

        // 典型分尾场景也不丢分
        let odd = dec!(99.99);
        let p1 = scaled(odd, dec!(33));
        let p2 = scaled(odd, dec!(100)) - scaled(odd, dec!(33));
        assert_eq!(p1 + p2, odd);
    }
}
