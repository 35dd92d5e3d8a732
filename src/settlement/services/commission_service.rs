//! 佣金计算服务
//!
//! 每个 (订单, 收款方) 只算一次，金额在支付成功时定死，后续放款不重算

use chrono::Utc;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::settlement::domain::entities::{Booking, CommissionCalculation, NewCommission};
use crate::settlement::domain::money::round_money;
use crate::settlement::domain::rate::CommissionRegistry;
use crate::settlement::domain::status::CommissionStatus;
use crate::settlement::store::Ledger;

#[derive(Clone)]
pub struct CommissionService {
    ledger: Ledger,
    registry: CommissionRegistry,
}

impl CommissionService {
    pub fn new(ledger: Ledger, registry: CommissionRegistry) -> Self {
        Self { ledger, registry }
    }

    /// 为订单计算并落盘佣金
    ///
    /// 已存在记录时直接返回现有记录。费率解析顺序：商家专属 > 品类 > 平台默认
    pub async fn calculate_for_booking(
        &self,
        booking: &Booking,
    ) -> AppResult<CommissionCalculation> {
        let paid = booking.paid_amount.ok_or_else(|| {
            AppError::InvalidState(format!("订单 {} 未支付，不能计算佣金", booking.id))
        })?;

        if let Some(existing) = self
            .ledger
            .commissions
            .find_active(booking.id, booking.vendor_id)
            .await?
        {
            return Ok(existing);
        }

        let vendor = self
            .ledger
            .vendors
            .find_by_id(booking.vendor_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("商家 {} 不存在", booking.vendor_id)))?;

        let rate = self
            .registry
            .resolve(booking.product_kind, vendor.commission_rate.as_ref());
        let commission_amount = rate.commission_for(paid)?;
        let vendor_payout = round_money(paid - commission_amount);

        let inserted = self
            .ledger
            .commissions
            .insert_if_absent(NewCommission {
                booking_id: booking.id,
                recipient_id: booking.vendor_id,
                base_amount: paid,
                rate: rate.clone(),
                commission_amount,
                vendor_payout,
                currency: booking
                    .paid_currency
                    .clone()
                    .unwrap_or_else(|| "usd".to_string()),
            })
            .await?;

        if inserted {
            info!(
                "✅ 佣金已计算: booking_id={}, base={}, commission={}, vendor_payout={}",
                booking.id, paid, commission_amount, vendor_payout
            );
        } else {
            warn!(
                "佣金记录已存在，跳过重算: booking_id={}, recipient_id={}",
                booking.id, booking.vendor_id
            );
        }

        self.ledger
            .commissions
            .find_active(booking.id, booking.vendor_id)
            .await?
            .ok_or_else(|| {
                AppError::DbError(format!("订单 {} 佣金记录写入后读取失败", booking.id))
            })
    }

    /// 取订单的有效佣金记录，缺失时现场补算
    pub async fn ensure_for_booking(&self, booking: &Booking) -> AppResult<CommissionCalculation> {
        match self
            .ledger
            .commissions
            .find_active(booking.id, booking.vendor_id)
            .await?
        {
            Some(existing) => Ok(existing),
            None => {
                warn!("订单 {} 放款时缺少佣金记录，现场补算", booking.id);
                self.calculate_for_booking(booking).await
            }
        }
    }

    /// 审批通过，pending -> approved
    pub async fn approve(&self, commission_id: i64) -> AppResult<()> {
        let moved = self
            .ledger
            .commissions
            .set_status(
                commission_id,
                &[CommissionStatus::Pending],
                CommissionStatus::Approved,
                Utc::now(),
            )
            .await?;
        if !moved {
            return Err(AppError::InvalidState(format!(
                "佣金记录 {} 不在待审批状态",
                commission_id
            )));
        }
        info!("✅ 佣金审批通过: commission_id={}", commission_id);
        Ok(())
    }
}
