//! 下单收款
//!
//! 创建手动扣款意向并登记流水。授权与划扣分离，客人付款只是授权，
//! 资金要等托管建立时才真正划走

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::settlement::domain::entities::{Booking, NewBooking, NewTransaction};
use crate::settlement::domain::money::to_minor_units;
use crate::settlement::domain::percentage::Percentage;
use crate::settlement::domain::status::PaymentStatus;
use crate::settlement::gateway::dto::CreateIntentRequest;
use crate::settlement::gateway::PaymentGateway;
use crate::settlement::store::Ledger;

/// 发起收款的结果，前端拿 reference_number 走网关付款
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutStarted {
    pub booking_id: i64,
    pub reference_number: String,
    pub amount: Decimal,
    pub currency: String,
    pub gateway_status: String,
}

#[derive(Clone)]
pub struct CheckoutService {
    ledger: Ledger,
    gateway: Arc<dyn PaymentGateway>,
}

impl CheckoutService {
    pub fn new(ledger: Ledger, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { ledger, gateway }
    }

    /// 登记订单（结算视角的字段）
    pub async fn create_booking(&self, input: NewBooking) -> AppResult<Booking> {
        if input.amount <= Decimal::ZERO {
            return Err(AppError::Validation("订单金额必须大于 0".to_string()));
        }
        if input.currency.trim().is_empty() {
            return Err(AppError::Validation("币种不能为空".to_string()));
        }
        if input.reference.trim().is_empty() {
            return Err(AppError::Validation("订单号不能为空".to_string()));
        }
        for (name, value) in [
            ("release_percentage_30days", input.release_percentage_30days),
            (
                "cancellation_refund_percent",
                input.cancellation_refund_percent,
            ),
        ] {
            if let Some(v) = value {
                Percentage::new(v)
                    .map_err(|e| AppError::Validation(format!("{} 非法: {}", name, e)))?;
            }
        }

        let id = self.ledger.bookings.insert(input).await?;
        self.ledger
            .bookings
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::DbError(format!("订单 {} 写入后读取失败", id)))
    }

    /// 为订单发起一笔手动扣款的支付意向
    pub async fn start_checkout(
        &self,
        booking_id: i64,
        customer_email: Option<String>,
    ) -> AppResult<CheckoutStarted> {
        let booking = self
            .ledger
            .bookings
            .find_by_id(booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("订单 {} 不存在", booking_id)))?;
        if !booking.status.is_active() {
            return Err(AppError::InvalidState(format!(
                "订单 {} 已取消或已完成，不能发起收款",
                booking_id
            )));
        }
        if !matches!(
            booking.payment_status,
            PaymentStatus::Pending | PaymentStatus::Failed
        ) {
            return Err(AppError::InvalidState(format!(
                "订单 {} 支付状态为 {}，不能重复收款",
                booking_id,
                booking.payment_status.as_str()
            )));
        }

        let intent = self
            .gateway
            .create_manual_capture_intent(&CreateIntentRequest {
                amount_minor: to_minor_units(booking.amount)?,
                currency: booking.currency.clone(),
                booking_id,
                booking_reference: booking.reference.clone(),
                customer_email,
            })
            .await?;

        self.ledger
            .transactions
            .insert_pending(NewTransaction {
                booking_id,
                reference_number: intent.id.clone(),
                amount: booking.amount,
                currency: booking.currency.clone(),
                raw_status: intent.status.clone(),
            })
            .await?;

        info!(
            "✅ 收款已发起: booking_id={}, reference={}, amount={}",
            booking_id, intent.id, booking.amount
        );
        Ok(CheckoutStarted {
            booking_id,
            reference_number: intent.id,
            amount: booking.amount,
            currency: booking.currency,
            gateway_status: intent.status,
        })
    }
}
