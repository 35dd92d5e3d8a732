//! 结算业务服务层
//!
//! 状态迁移的业务规则都在这里，存储只做条件写入，网关只做透传

pub mod checkout_service;
pub mod commission_service;
pub mod confirmation_service;
pub mod dashboard_service;
pub mod escrow_service;
pub mod exception_service;
pub mod webhook_service;

pub use checkout_service::{CheckoutService, CheckoutStarted};
pub use commission_service::CommissionService;
pub use confirmation_service::ConfirmationService;
pub use dashboard_service::{DashboardService, RetainedFunds};
pub use escrow_service::{EscrowService, ReleaseOutcome};
pub use exception_service::{
    CancellationOutcome, DisputeOutcome, DisputeResolution, ExceptionService,
};
pub use webhook_service::WebhookReconciler;
