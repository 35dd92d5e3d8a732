//! 测试共用脚手架：内存台账 + 模拟网关上拼出完整服务栈

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use travel_pay::app_config::settle::SettleConfig;
use travel_pay::job::{AutoConfirmJob, PartialReleaseJob, WeeklyPayoutJob};
use travel_pay::settlement::domain::entities::{Booking, NewBooking, NewVendor};
use travel_pay::settlement::domain::rate::{CommissionRate, CommissionRegistry};
use travel_pay::settlement::domain::status::{PayoutCadence, ProductKind};
use travel_pay::settlement::gateway::{PaymentGateway, SimulatedGateway, WebhookVerifier};
use travel_pay::settlement::services::{
    CheckoutService, CommissionService, ConfirmationService, DashboardService, EscrowService,
    ExceptionService, WebhookReconciler,
};
use travel_pay::settlement::store::Ledger;

pub const WEBHOOK_SECRET: &str = "whsec_test";

pub struct Harness {
    pub ledger: Ledger,
    pub sim: Arc<SimulatedGateway>,
    pub config: SettleConfig,
    pub checkout: CheckoutService,
    pub commissions: CommissionService,
    pub escrow: EscrowService,
    pub exceptions: ExceptionService,
    pub confirmation: ConfirmationService,
    pub dashboard: DashboardService,
    pub reconciler: WebhookReconciler,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(SettleConfig::default())
    }

    pub fn with_config(config: SettleConfig) -> Self {
        let ledger = Ledger::in_memory();
        let sim = Arc::new(SimulatedGateway::new());
        let gateway: Arc<dyn PaymentGateway> = sim.clone();

        let registry = CommissionRegistry::new(CommissionRate::Percentage {
            percent: config.platform_commission_percent,
        });
        let commissions = CommissionService::new(ledger.clone(), registry);
        let escrow = EscrowService::new(
            ledger.clone(),
            gateway.clone(),
            config.clone(),
            commissions.clone(),
        );
        let exceptions = ExceptionService::new(
            ledger.clone(),
            gateway.clone(),
            escrow.clone(),
            commissions.clone(),
            config.clone(),
        );
        let confirmation =
            ConfirmationService::new(ledger.clone(), escrow.clone(), config.clone());
        let checkout = CheckoutService::new(ledger.clone(), gateway.clone());
        let dashboard = DashboardService::new(ledger.clone(), gateway.clone(), config.clone());
        let verifier = WebhookVerifier::new(WEBHOOK_SECRET.to_string());
        let reconciler = WebhookReconciler::new(
            ledger.clone(),
            gateway.clone(),
            verifier,
            commissions.clone(),
            escrow.clone(),
            exceptions.clone(),
        );

        Self {
            ledger,
            sim,
            config,
            checkout,
            commissions,
            escrow,
            exceptions,
            confirmation,
            dashboard,
            reconciler,
        }
    }

    pub fn weekly_job(&self) -> WeeklyPayoutJob {
        WeeklyPayoutJob::new(
            self.ledger.clone(),
            self.escrow.clone(),
            self.config.payout_lookback_days,
        )
    }

    pub fn auto_confirm_job(&self) -> AutoConfirmJob {
        AutoConfirmJob::new(self.ledger.clone(), self.confirmation.clone())
    }

    pub fn partial_release_job(&self) -> PartialReleaseJob {
        PartialReleaseJob::new(
            self.ledger.clone(),
            self.escrow.clone(),
            self.config.partial_release_lead_days,
        )
    }

    /// 建商家并在模拟网关注册收款账户
    pub async fn create_vendor(&self, transfers_active: bool) -> i64 {
        self.create_vendor_with(transfers_active, PayoutCadence::Weekly, None)
            .await
    }

    pub async fn create_vendor_with(
        &self,
        transfers_active: bool,
        cadence: PayoutCadence,
        rate: Option<CommissionRate>,
    ) -> i64 {
        let id = self
            .ledger
            .vendors
            .insert(NewVendor {
                display_name: "测试商家".to_string(),
                gateway_account_id: None,
                payout_cadence: cadence,
                commission_rate: rate,
            })
            .await
            .unwrap();
        let account = format!("acct_v{}", id);
        self.ledger
            .vendors
            .set_gateway_account(id, &account)
            .await
            .unwrap();
        self.sim.seed_account(&account, transfers_active);
        id
    }

    /// 无收款账户的商家（开通流程未开始）
    pub async fn create_vendor_without_account(&self) -> i64 {
        self.ledger
            .vendors
            .insert(NewVendor {
                display_name: "未开通商家".to_string(),
                gateway_account_id: None,
                payout_cadence: PayoutCadence::Weekly,
                commission_rate: None,
            })
            .await
            .unwrap()
    }

    pub async fn create_booking(
        &self,
        vendor_id: i64,
        amount: Decimal,
        kind: ProductKind,
        trip_start: NaiveDate,
    ) -> i64 {
        let booking = self
            .checkout
            .create_booking(NewBooking {
                reference: format!("BK-{}", Uuid::new_v4().simple()),
                client_id: 1,
                vendor_id,
                product_kind: kind,
                trip_start_date: trip_start,
                amount,
                currency: "usd".to_string(),
                release_percentage_30days: None,
                cancellation_refund_percent: None,
            })
            .await
            .unwrap();
        booking.id
    }

    /// 发起收款并拿到网关意向号（客人未付款）
    pub async fn start_payment(&self, booking_id: i64) -> String {
        self.checkout
            .start_checkout(booking_id, None)
            .await
            .unwrap()
            .reference_number
    }

    /// 把模拟网关里的意向状态封装成签名回调事件投递一次
    pub async fn deliver_intent_event(&self, reference: &str, event_type: &str) {
        let intent = self.sim.retrieve_intent(reference).await.unwrap();
        let payload = webhook_payload(&serde_json::to_value(&intent).unwrap(), event_type);
        let header = signed_header(&payload);
        self.reconciler
            .handle_event(&payload, Some(&header))
            .await
            .unwrap();
    }

    /// 完整付款链路：发起收款 → 客人确认 → 回调对账（划扣 + 算佣 + 托管）
    pub async fn pay_booking(&self, booking_id: i64) -> String {
        let reference = self.start_payment(booking_id).await;
        self.sim.confirm_intent(&reference).unwrap();
        self.deliver_intent_event(&reference, "payment_intent.amount_capturable_updated")
            .await;
        reference
    }

    pub async fn booking(&self, id: i64) -> Booking {
        self.ledger.bookings.find_by_id(id).await.unwrap().unwrap()
    }
}

pub fn webhook_payload(intent_object: &serde_json::Value, event_type: &str) -> String {
    serde_json::json!({
        "id": format!("evt_{}", Uuid::new_v4().simple()),
        "type": event_type,
        "created": Utc::now().timestamp(),
        "data": {"object": intent_object}
    })
    .to_string()
}

pub fn signed_header(payload: &str) -> String {
    WebhookVerifier::sign_header(WEBHOOK_SECRET, Utc::now().timestamp(), payload)
}

/// 距今 N 天后的日期
pub fn days_from_today(days: i64) -> NaiveDate {
    Utc::now().date_naive() + Duration::days(days)
}
