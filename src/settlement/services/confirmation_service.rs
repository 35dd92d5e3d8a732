//! 订单确认服务
//!
//! 客人主动确认，或商家确认后超时自动确认。
//! 多日游自动确认时立即放尾款，一日游留给周结算批次

use chrono::{DateTime, Utc};
use tracing::info;

use crate::app_config::settle::SettleConfig;
use crate::error::{AppError, AppResult};
use crate::settlement::domain::entities::Booking;
use crate::settlement::domain::status::ProductKind;
use crate::settlement::services::escrow_service::EscrowService;
use crate::settlement::store::Ledger;
use crate::time_util::hours_since;

#[derive(Clone)]
pub struct ConfirmationService {
    ledger: Ledger,
    escrow: EscrowService,
    config: SettleConfig,
}

impl ConfirmationService {
    pub fn new(ledger: Ledger, escrow: EscrowService, config: SettleConfig) -> Self {
        Self {
            ledger,
            escrow,
            config,
        }
    }

    /// 商家确认接单，订单进入 confirmed，自动确认窗口从这一刻起算
    pub async fn provider_confirm(&self, booking_id: i64) -> AppResult<Booking> {
        let exists = self
            .ledger
            .bookings
            .find_by_id(booking_id)
            .await?
            .is_some();
        if !exists {
            return Err(AppError::NotFound(format!("订单 {} 不存在", booking_id)));
        }

        let moved = self
            .ledger
            .bookings
            .mark_provider_confirmed(booking_id, Utc::now())
            .await?;
        if !moved {
            return Err(AppError::InvalidState(format!(
                "订单 {} 不在待确认状态，或商家已确认过",
                booking_id
            )));
        }
        info!("✅ 商家已确认接单: booking_id={}", booking_id);

        self.ledger
            .bookings
            .find_by_id(booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("订单 {} 不存在", booking_id)))
    }

    /// 客人确认行程完成，订单进入 complete
    pub async fn client_confirm(&self, booking_id: i64) -> AppResult<Booking> {
        let booking = self
            .ledger
            .bookings
            .find_by_id(booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("订单 {} 不存在", booking_id)))?;
        if !booking.is_paid() {
            return Err(AppError::InvalidState(format!(
                "订单 {} 未支付，不能确认完成",
                booking_id
            )));
        }

        let moved = self
            .ledger
            .bookings
            .mark_complete(booking_id, Utc::now())
            .await?;
        if !moved {
            return Err(AppError::InvalidState(format!(
                "订单 {} 不在进行中，不能确认完成",
                booking_id
            )));
        }
        info!("✅ 客人已确认完成: booking_id={}", booking_id);

        self.ledger
            .bookings
            .find_by_id(booking_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("订单 {} 不存在", booking_id)))
    }

    /// 品类对应的自动确认窗口（小时）
    pub fn auto_confirm_window_hours(&self, kind: ProductKind) -> i64 {
        match kind {
            ProductKind::DayTrip => self.config.auto_confirm_day_trip_hours,
            ProductKind::MultiDay => self.config.auto_confirm_multi_day_hours,
        }
    }

    /// 对单个候选订单执行超时自动确认
    ///
    /// 未到窗口返回 Ok(false)；确认后多日游立即放尾款
    pub async fn auto_confirm_one(
        &self,
        booking: &Booking,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        let Some(provider_confirmed_at) = booking.provider_confirmed_at else {
            return Ok(false);
        };
        let window_hours = self.auto_confirm_window_hours(booking.product_kind);
        if hours_since(provider_confirmed_at, now) < window_hours {
            return Ok(false);
        }

        let moved = self.ledger.bookings.mark_complete(booking.id, now).await?;
        if !moved {
            return Ok(false);
        }
        self.ledger
            .bookings
            .append_note(
                booking.id,
                &format!("商家确认后 {} 小时内客人未确认，系统自动确认完成", window_hours),
            )
            .await?;
        info!(
            "✅ 超时自动确认: booking_id={}, kind={}, window={}h",
            booking.id,
            booking.product_kind.as_str(),
            window_hours
        );

        if booking.product_kind == ProductKind::MultiDay {
            self.escrow.release_final(booking.id).await?;
        }
        Ok(true)
    }
}
