//! 取消与争议处理
//!
//! 这些通道把状态机从正常路径上引开：支付失败自动取消、客人/商家取消退款、
//! 争议冻结与裁决。退款出账后关单失败只告警，资金动向以网关为准

use std::str::FromStr;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::app_config::settle::SettleConfig;
use crate::error::{AppError, AppResult};
use crate::settlement::domain::entities::Booking;
use crate::settlement::domain::money::{round_money, to_minor_units};
use crate::settlement::domain::percentage::Percentage;
use crate::settlement::domain::status::{
    CommissionStatus, EscrowStatus, PaymentStatus, TransactionStatus,
};
use crate::settlement::gateway::PaymentGateway;
use crate::settlement::services::commission_service::CommissionService;
use crate::settlement::services::escrow_service::{EscrowService, ReleaseOutcome};
use crate::settlement::store::Ledger;

/// 争议裁决方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeResolution {
    Release,
    Refund,
}

impl FromStr for DisputeResolution {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "release" => Ok(Self::Release),
            "refund" => Ok(Self::Refund),
            other => Err(AppError::Validation(format!(
                "未知的争议裁决方向: {}",
                other
            ))),
        }
    }
}

/// 取消结果
#[derive(Debug, Clone, Serialize)]
pub struct CancellationOutcome {
    pub booking_id: i64,
    pub refund_amount: Option<Decimal>,
    pub refund_id: Option<String>,
}

/// 争议裁决结果
#[derive(Debug, Clone, Serialize)]
pub struct DisputeOutcome {
    pub booking_id: i64,
    pub resolution: DisputeResolution,
    pub refund_id: Option<String>,
    pub release: Option<ReleaseOutcome>,
}

#[derive(Clone)]
pub struct ExceptionService {
    ledger: Ledger,
    gateway: Arc<dyn PaymentGateway>,
    escrow: EscrowService,
    commissions: CommissionService,
    config: SettleConfig,
}

impl ExceptionService {
    pub fn new(
        ledger: Ledger,
        gateway: Arc<dyn PaymentGateway>,
        escrow: EscrowService,
        commissions: CommissionService,
        config: SettleConfig,
    ) -> Self {
        Self {
            ledger,
            gateway,
            escrow,
            commissions,
            config,
        }
    }

    /// 支付失败处理
    ///
    /// 行前足够早（>= 配置天数）直接取消关单；临近行程只记失败转人工。
    /// 资金从未划扣，不需要退款
    pub async fn handle_payment_failure(
        &self,
        booking_id: i64,
        today: NaiveDate,
    ) -> AppResult<()> {
        let booking = self.require_booking(booking_id).await?;
        if !booking.status.is_active() {
            return Ok(());
        }

        let days = booking.days_until_trip(today);
        if days >= self.config.payment_failure_cancel_days {
            self.cancel_gateway_intent_best_effort(booking_id).await;
            let closed = self
                .ledger
                .bookings
                .cancel_and_close(
                    booking_id,
                    PaymentStatus::Failed,
                    &format!("支付失败，行前 {} 天自动取消，未扣款无需退款", days),
                )
                .await?;
            if closed {
                info!("订单因支付失败自动取消: booking_id={}, days={}", booking_id, days);
            }
        } else {
            self.ledger
                .bookings
                .mark_payment_outcome(booking_id, PaymentStatus::Failed)
                .await?;
            self.ledger
                .bookings
                .append_note(booking_id, "支付失败，行程临近，转人工跟进")
                .await?;
            warn!(
                "支付失败但行程临近，保留订单: booking_id={}, days={}",
                booking_id, days
            );
        }
        Ok(())
    }

    /// 客人取消
    ///
    /// 未支付直接关单；已支付要求在行前窗口之外，按政策比例退款。
    /// 窗口内的取消由客服通道处理，这里拒绝
    pub async fn cancel_by_client(
        &self,
        booking_id: i64,
        reason: Option<&str>,
        today: NaiveDate,
    ) -> AppResult<CancellationOutcome> {
        let booking = self.require_booking(booking_id).await?;
        if !booking.status.is_active() {
            return Err(AppError::InvalidState(format!(
                "订单 {} 已取消或已完成",
                booking_id
            )));
        }
        let reason_text = reason.unwrap_or("未说明");

        if !booking.is_paid() {
            self.cancel_gateway_intent_best_effort(booking_id).await;
            self.ledger
                .bookings
                .cancel_and_close(
                    booking_id,
                    PaymentStatus::Cancelled,
                    &format!("客人取消（未支付），原因: {}", reason_text),
                )
                .await?;
            return Ok(CancellationOutcome {
                booking_id,
                refund_amount: None,
                refund_id: None,
            });
        }

        let days = booking.days_until_trip(today);
        if days <= self.config.cancellation_window_days {
            return Err(AppError::InvalidState(format!(
                "行前 {} 天内不适用此取消通道（当前距行程 {} 天）",
                self.config.cancellation_window_days, days
            )));
        }
        if booking.escrow_status != EscrowStatus::Held {
            return Err(AppError::InvalidState(format!(
                "订单 {} 托管状态为 {}，资金已有动向，需人工处理",
                booking_id,
                booking.escrow_status.as_str()
            )));
        }

        let paid = booking.paid_amount.unwrap_or(Decimal::ZERO);
        let refund_percent = Percentage::new(
            booking
                .cancellation_refund_percent
                .unwrap_or(self.config.cancellation_refund_percent),
        )
        .map_err(|e| AppError::Validation(e.to_string()))?;
        let refund_amount = round_money(refund_percent.of(paid));

        let charge = self.escrow.charge_for_booking(booking_id).await?;
        let refund = self
            .gateway
            .refund_charge(
                &charge,
                Some(to_minor_units(refund_amount)?),
                "requested_by_customer",
            )
            .await?;

        self.close_after_refund(
            booking_id,
            &format!(
                "客人取消：按政策退款 {}%（{}），原因: {}",
                refund_percent.value(),
                refund_amount,
                reason_text
            ),
            &refund.id,
        )
        .await?;

        info!(
            "✅ 客人取消完成: booking_id={}, refund={}, refund_id={}",
            booking_id, refund_amount, refund.id
        );
        Ok(CancellationOutcome {
            booking_id,
            refund_amount: Some(refund_amount),
            refund_id: Some(refund.id),
        })
    }

    /// 商家取消：无论距行程多久都全额退款
    pub async fn cancel_by_provider(
        &self,
        booking_id: i64,
        reason: Option<&str>,
    ) -> AppResult<CancellationOutcome> {
        let booking = self.require_booking(booking_id).await?;
        if !booking.status.is_active() {
            return Err(AppError::InvalidState(format!(
                "订单 {} 已取消或已完成",
                booking_id
            )));
        }
        let reason_text = reason.unwrap_or("未说明");

        if !booking.is_paid() {
            self.cancel_gateway_intent_best_effort(booking_id).await;
            self.ledger
                .bookings
                .cancel_and_close(
                    booking_id,
                    PaymentStatus::Cancelled,
                    &format!("商家取消（未支付），原因: {}", reason_text),
                )
                .await?;
            return Ok(CancellationOutcome {
                booking_id,
                refund_amount: None,
                refund_id: None,
            });
        }
        if booking.escrow_status.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "订单 {} 资金已结清，不能走取消退款",
                booking_id
            )));
        }

        let paid = booking.paid_amount.unwrap_or(Decimal::ZERO);
        let charge = self.escrow.charge_for_booking(booking_id).await?;
        let refund = self.gateway.refund_charge(&charge, None, "provider_cancelled").await?;

        self.close_after_refund(
            booking_id,
            &format!("商家取消：全额退款 {}，原因: {}", paid, reason_text),
            &refund.id,
        )
        .await?;

        info!(
            "✅ 商家取消完成: booking_id={}, full_refund={}, refund_id={}",
            booking_id, paid, refund.id
        );
        Ok(CancellationOutcome {
            booking_id,
            refund_amount: Some(paid),
            refund_id: Some(refund.id),
        })
    }

    /// 开启争议：订单打争议标记冻结放款，托管钉在 held
    ///
    /// pending 的托管先行占位到 held；released_partial 保持不动，不回退。
    /// 支付尚未完成时也要落标记，成功后补算的佣金同样被冻结
    pub async fn open_dispute(&self, booking_id: i64, reason: &str) -> AppResult<()> {
        let booking = self.require_booking(booking_id).await?;
        if booking.escrow_status.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "订单 {} 资金已结清，争议请走线下仲裁",
                booking_id
            )));
        }

        self.ledger
            .bookings
            .mark_disputed(booking_id, Utc::now())
            .await?;
        self.ledger
            .bookings
            .update_escrow_status(
                booking_id,
                &[EscrowStatus::Pending, EscrowStatus::Held],
                EscrowStatus::Held,
            )
            .await?;

        if booking.is_paid() {
            // 先保证佣金记录存在，否则放款补算通道会绕过冻结
            self.commissions.ensure_for_booking(&booking).await?;
            let frozen = self
                .ledger
                .commissions
                .mark_disputed_for_booking(booking_id, Utc::now())
                .await?;
            info!(
                "⚠️ 争议开启，放款冻结: booking_id={}, frozen_records={}",
                booking_id, frozen
            );
        } else {
            info!(
                "⚠️ 争议开启（支付未完成），放款冻结: booking_id={}",
                booking_id
            );
        }
        self.ledger
            .bookings
            .append_note(booking_id, &format!("争议开启: {}", reason))
            .await?;
        Ok(())
    }

    /// 裁决争议：release 放出剩余资金给商家，refund 把剩余资金退给客人
    pub async fn resolve_dispute(
        &self,
        booking_id: i64,
        resolution: DisputeResolution,
        notes: Option<&str>,
    ) -> AppResult<DisputeOutcome> {
        let booking = self.require_booking(booking_id).await?;
        let notes_text = notes.unwrap_or("无");

        match resolution {
            DisputeResolution::Release => {
                // 先解除冻结，放款通道才会放行
                self.ledger.bookings.clear_dispute(booking_id).await?;
                self.ledger
                    .commissions
                    .restore_for_booking(booking_id, CommissionStatus::Approved)
                    .await?;
                let outcome = self
                    .escrow
                    .release_remaining(booking_id, "争议裁决：放款给商家")
                    .await?;
                self.ledger
                    .bookings
                    .append_note(booking_id, &format!("争议裁决为放款，备注: {}", notes_text))
                    .await?;
                Ok(DisputeOutcome {
                    booking_id,
                    resolution,
                    refund_id: None,
                    release: Some(outcome),
                })
            }
            DisputeResolution::Refund => {
                if booking.escrow_status.is_terminal() {
                    return Err(AppError::InvalidState(format!(
                        "订单 {} 资金已结清，不能退款",
                        booking_id
                    )));
                }
                let paid = booking.paid_amount.ok_or_else(|| {
                    AppError::InvalidState(format!("订单 {} 未支付，无可退资金", booking_id))
                })?;
                // 已部分放款的只退还在托管的剩余部分
                let remaining = paid
                    - round_money(paid * booking.released_percent / Decimal::ONE_HUNDRED);
                if remaining <= Decimal::ZERO {
                    return Err(AppError::InvalidState(format!(
                        "订单 {} 托管已无剩余资金",
                        booking_id
                    )));
                }

                let charge = self.escrow.charge_for_booking(booking_id).await?;
                let refund = self
                    .gateway
                    .refund_charge(&charge, Some(to_minor_units(remaining)?), "dispute_refund")
                    .await?;

                self.close_after_refund(
                    booking_id,
                    &format!(
                        "争议裁决为退款：退还托管剩余 {}，备注: {}",
                        remaining, notes_text
                    ),
                    &refund.id,
                )
                .await?;
                self.ledger.bookings.clear_dispute(booking_id).await?;
                Ok(DisputeOutcome {
                    booking_id,
                    resolution,
                    refund_id: Some(refund.id),
                    release: None,
                })
            }
        }
    }

    /// 退款出账后的关单；落盘失败不回滚，留痕等人工对账
    async fn close_after_refund(
        &self,
        booking_id: i64,
        note: &str,
        refund_id: &str,
    ) -> AppResult<()> {
        let closed = self
            .ledger
            .bookings
            .cancel_and_close(booking_id, PaymentStatus::Refunded, note)
            .await?;
        if !closed {
            error!(
                "❌ 退款已出账但关单失败，需人工对账: booking_id={}, refund_id={}",
                booking_id, refund_id
            );
        }
        Ok(())
    }

    /// 撤销网关侧未扣款的意向，失败只记日志
    async fn cancel_gateway_intent_best_effort(&self, booking_id: i64) {
        let tx = match self
            .ledger
            .transactions
            .find_latest_by_booking(booking_id)
            .await
        {
            Ok(Some(tx)) => tx,
            Ok(None) => return,
            Err(e) => {
                warn!("查询支付流水失败: booking_id={}, err={}", booking_id, e);
                return;
            }
        };
        if matches!(
            tx.status,
            TransactionStatus::Succeeded | TransactionStatus::Cancelled
        ) {
            return;
        }
        if let Err(e) = self.gateway.cancel_intent(&tx.reference_number).await {
            warn!(
                "撤销支付意向失败: reference={}, err={}",
                tx.reference_number, e
            );
        }
    }

    async fn require_booking(&self, booking_id: i64) -> AppResult<Booking> {
        self.ledger
            .bookings
            .find_by_id(booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("订单 {} 不存在", booking_id)))
    }
}
