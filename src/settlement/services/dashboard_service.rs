//! 商家侧只读汇总

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::app_config::settle::SettleConfig;
use crate::error::{AppError, AppResult};
use crate::settlement::domain::money::round_money;
use crate::settlement::domain::status::EscrowStatus;
use crate::settlement::gateway::dto::AccountLinkDto;
use crate::settlement::gateway::PaymentGateway;
use crate::settlement::store::Ledger;

/// 单个订单的留存明细
#[derive(Debug, Clone, Serialize)]
pub struct RetainedBooking {
    pub booking_id: i64,
    pub reference: String,
    pub escrow_status: EscrowStatus,
    pub paid_amount: Decimal,
    pub released_percent: Decimal,
    /// 仍在托管中的总额
    pub retained_amount: Decimal,
    /// 其中商家应得的份额（佣金未计算时为空）
    pub vendor_share: Option<Decimal>,
}

/// 商家留存资金汇总
#[derive(Debug, Clone, Serialize)]
pub struct RetainedFunds {
    pub vendor_id: i64,
    pub currency: Option<String>,
    pub bookings: Vec<RetainedBooking>,
    pub total_retained: Decimal,
    /// 商家应得份额合计，只累计已有佣金记录的订单
    pub total_vendor_share: Decimal,
}

#[derive(Clone)]
pub struct DashboardService {
    ledger: Ledger,
    gateway: Arc<dyn PaymentGateway>,
    config: SettleConfig,
}

impl DashboardService {
    pub fn new(ledger: Ledger, gateway: Arc<dyn PaymentGateway>, config: SettleConfig) -> Self {
        Self {
            ledger,
            gateway,
            config,
        }
    }

    /// 商家名下仍在托管中的资金
    pub async fn vendor_retained_funds(&self, vendor_id: i64) -> AppResult<RetainedFunds> {
        let vendor = self
            .ledger
            .vendors
            .find_by_id(vendor_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("商家 {} 不存在", vendor_id)))?;

        let escrowed = self
            .ledger
            .bookings
            .list_escrowed_by_vendor(vendor.id)
            .await?;

        let mut bookings = Vec::new();
        let mut total_retained = Decimal::ZERO;
        let mut total_vendor_share = Decimal::ZERO;
        let mut currency: Option<String> = None;

        for booking in escrowed {
            let Some(paid) = booking.paid_amount else {
                continue;
            };
            let released = scaled(paid, booking.released_percent);
            let retained = paid - released;
            if currency.is_none() {
                currency = booking.paid_currency.clone();
            }

            let vendor_share = match self
                .ledger
                .commissions
                .find_active(booking.id, vendor.id)
                .await?
            {
                Some(commission) => {
                    let released_vendor = scaled(paid, booking.released_percent)
                        - scaled(commission.commission_amount, booking.released_percent);
                    Some(commission.vendor_payout - released_vendor)
                }
                None => None,
            };

            total_retained += retained;
            if let Some(share) = vendor_share {
                total_vendor_share += share;
            }
            bookings.push(RetainedBooking {
                booking_id: booking.id,
                reference: booking.reference.clone(),
                escrow_status: booking.escrow_status,
                paid_amount: paid,
                released_percent: booking.released_percent,
                retained_amount: retained,
                vendor_share,
            });
        }

        Ok(RetainedFunds {
            vendor_id: vendor.id,
            currency,
            bookings,
            total_retained,
            total_vendor_share,
        })
    }

    /// 商家收款账户的开通引导链接
    pub async fn vendor_onboarding_link(&self, vendor_id: i64) -> AppResult<AccountLinkDto> {
        let vendor = self
            .ledger
            .vendors
            .find_by_id(vendor_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("商家 {} 不存在", vendor_id)))?;
        let account_id = vendor.gateway_account_id.ok_or_else(|| {
            AppError::OnboardingIncomplete {
                message: format!("商家 {} 未绑定收款账户，无法生成开通链接", vendor_id),
                onboarding_url: None,
            }
        })?;

        self.gateway
            .create_account_link(
                &account_id,
                &self.config.onboarding_refresh_url,
                &self.config.onboarding_return_url,
            )
            .await
    }
}

fn scaled(amount: Decimal, percent: Decimal) -> Decimal {
    round_money(amount * percent / Decimal::ONE_HUNDRED)
}
