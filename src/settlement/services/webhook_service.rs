//! 回调对账
//!
//! 网关事件至少一次投递、可能乱序重复，这里是全部支付状态迁移的唯一入口：
//! webhook 与手动同步都走 apply_intent。签名校验失败按兼容模式继续处理，
//! 只告警不丢事件（收紧为拒绝需要和网关侧确认后再改）

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::error::{AppError, AppResult};
use crate::settlement::domain::entities::PaymentTransaction;
use crate::settlement::domain::money::from_minor_units;
use crate::settlement::domain::status::{PaymentStatus, TransactionStatus};
use crate::settlement::gateway::dto::{IntentDto, WebhookEvent};
use crate::settlement::gateway::{PaymentGateway, WebhookVerifier};
use crate::settlement::services::commission_service::CommissionService;
use crate::settlement::services::escrow_service::EscrowService;
use crate::settlement::services::exception_service::ExceptionService;
use crate::settlement::store::repository::{GatewayUpdate, StatusApplied};
use crate::settlement::store::Ledger;

#[derive(Clone)]
pub struct WebhookReconciler {
    ledger: Ledger,
    gateway: Arc<dyn PaymentGateway>,
    verifier: WebhookVerifier,
    commissions: CommissionService,
    escrow: EscrowService,
    exceptions: ExceptionService,
}

impl WebhookReconciler {
    pub fn new(
        ledger: Ledger,
        gateway: Arc<dyn PaymentGateway>,
        verifier: WebhookVerifier,
        commissions: CommissionService,
        escrow: EscrowService,
        exceptions: ExceptionService,
    ) -> Self {
        Self {
            ledger,
            gateway,
            verifier,
            commissions,
            escrow,
            exceptions,
        }
    }

    /// 处理一条回调事件
    ///
    /// 只消费 payment_intent.* 事件，其余类型直接忽略
    pub async fn handle_event(
        &self,
        payload: &str,
        signature_header: Option<&str>,
    ) -> AppResult<()> {
        match signature_header {
            Some(header) => {
                if let Err(e) = self.verifier.verify(payload, header, Utc::now().timestamp()) {
                    warn!("⚠️ 回调签名校验失败，按兼容模式继续处理: {}", e);
                }
            }
            None => warn!("⚠️ 回调缺少签名头，按兼容模式继续处理"),
        }

        let event: WebhookEvent = serde_json::from_str(payload)?;
        if !event.event_type.starts_with("payment_intent.") {
            debug!("忽略事件类型: {}", event.event_type);
            return Ok(());
        }
        info!("收到网关事件: id={}, type={}", event.id, event.event_type);

        let intent: IntentDto = serde_json::from_value(event.data.object)?;
        self.apply_intent(intent).await
    }

    /// 手动同步：按意向号从网关拉取最新状态，走与回调相同的落盘路径
    pub async fn sync_by_reference(&self, reference: &str) -> AppResult<PaymentTransaction> {
        let intent = self.gateway.retrieve_intent(reference).await?;
        self.apply_intent(intent).await?;
        self.ledger
            .transactions
            .find_by_reference(reference)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("支付流水 {} 不存在", reference)))
    }

    /// 状态迁移唯一通道
    ///
    /// 待扣款意向在托管建立时被划扣，划扣产生的新鲜意向再回灌一次，
    /// 所以最多走两轮
    async fn apply_intent(&self, intent: IntentDto) -> AppResult<()> {
        let mut intent = intent;
        for _ in 0..2 {
            let Some(applied) = self.apply_once(&intent).await? else {
                return Ok(());
            };
            match self.follow_up(&intent, applied).await? {
                Some(fresh) => intent = fresh,
                None => break,
            }
        }
        Ok(())
    }

    /// 把网关意向状态写入流水；未知流水只告警
    async fn apply_once(&self, intent: &IntentDto) -> AppResult<Option<StatusApplied>> {
        let status = TransactionStatus::from_gateway(&intent.status);
        let (paid_amount, paid_currency) = if status == TransactionStatus::Succeeded {
            let minor = if intent.amount_received > 0 {
                intent.amount_received
            } else {
                intent.amount
            };
            (Some(from_minor_units(minor)), Some(intent.currency.as_str()))
        } else {
            (None, None)
        };

        let applied = self
            .ledger
            .transactions
            .apply_gateway_update(GatewayUpdate {
                reference_number: &intent.id,
                status,
                raw_status: &intent.status,
                paid_amount,
                paid_currency,
            })
            .await?;

        match &applied {
            None => warn!(
                "收到未知流水的事件，忽略: reference={}, status={}, metadata_booking_id={:?}",
                intent.id,
                intent.status,
                intent.booking_id()
            ),
            Some(applied) => {
                // metadata 里的订单号以台账为准，不一致说明网关侧被人工改过
                if let Some(meta_id) = intent.booking_id() {
                    if meta_id != applied.booking_id {
                        warn!(
                            "事件 metadata 订单号与台账不一致: reference={}, metadata={}, ledger={}",
                            intent.id, meta_id, applied.booking_id
                        );
                    }
                }
            }
        }
        Ok(applied)
    }

    /// 状态落盘后的联动
    ///
    /// 首次成功：回填订单实收、算佣金、建托管，三步各自幂等，重复投递安全。
    /// 佣金失败不阻断支付流程，只记错误日志
    async fn follow_up(
        &self,
        intent: &IntentDto,
        applied: StatusApplied,
    ) -> AppResult<Option<IntentDto>> {
        if applied.first_succeeded {
            let minor = if intent.amount_received > 0 {
                intent.amount_received
            } else {
                intent.amount
            };
            let paid = from_minor_units(minor);
            let marked = self
                .ledger
                .bookings
                .mark_paid(applied.booking_id, paid, &intent.currency)
                .await?;
            if marked {
                info!(
                    "✅ 订单支付成功: booking_id={}, paid={}, currency={}",
                    applied.booking_id, paid, intent.currency
                );
            }

            if let Some(booking) = self.ledger.bookings.find_by_id(applied.booking_id).await? {
                if let Err(e) = self.commissions.calculate_for_booking(&booking).await {
                    error!(
                        "❌ 佣金计算失败（不阻断支付流程）: booking_id={}, err={}",
                        applied.booking_id, e
                    );
                }
            }

            return self.escrow.hold(applied.booking_id).await;
        }

        if !applied.changed {
            return Ok(None);
        }
        match TransactionStatus::from_gateway(&intent.status) {
            TransactionStatus::RequiresCapture => self.escrow.hold(applied.booking_id).await,
            TransactionStatus::Failed => {
                self.exceptions
                    .handle_payment_failure(applied.booking_id, Utc::now().date_naive())
                    .await?;
                Ok(None)
            }
            TransactionStatus::Cancelled => {
                self.ledger
                    .bookings
                    .mark_payment_outcome(applied.booking_id, PaymentStatus::Cancelled)
                    .await?;
                Ok(None)
            }
            _ => Ok(None),
        }
    }
}
