//! 支付网关层
//!
//! PaymentGateway 抽象托管资金的进出，stripe 走真实 API，simulated 供本地与测试

pub mod dto;
pub mod simulated;
pub mod stripe;
pub mod webhook;

use async_trait::async_trait;

use crate::error::AppResult;
use dto::{
    AccountDto, AccountLinkDto, CreateIntentRequest, IntentDto, RefundDto, TransferDto,
    TransferRequest,
};

pub use simulated::SimulatedGateway;
pub use stripe::StripeClient;
pub use webhook::WebhookVerifier;

/// 支付网关抽象
///
/// 扣款方式固定为手动 capture：下单先冻结，行程节点到了才真正划扣
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// 创建手动扣款的支付意向
    async fn create_manual_capture_intent(&self, req: &CreateIntentRequest)
        -> AppResult<IntentDto>;

    /// 查询意向当前状态
    async fn retrieve_intent(&self, intent_id: &str) -> AppResult<IntentDto>;

    /// 划扣已授权的资金
    async fn capture_intent(&self, intent_id: &str) -> AppResult<IntentDto>;

    /// 撤销未扣款的意向
    async fn cancel_intent(&self, intent_id: &str) -> AppResult<IntentDto>;

    /// 从平台账户向收款方转账，资金来源绑定原始扣款
    async fn create_transfer(&self, req: &TransferRequest) -> AppResult<TransferDto>;

    /// 按原扣款退款，amount_minor 为空表示全额
    async fn refund_charge(
        &self,
        charge_id: &str,
        amount_minor: Option<i64>,
        reason: &str,
    ) -> AppResult<RefundDto>;

    /// 查询收款方账户的能力开通情况
    async fn retrieve_account(&self, account_id: &str) -> AppResult<AccountDto>;

    /// 生成收款方的开户引导链接
    async fn create_account_link(
        &self,
        account_id: &str,
        refresh_url: &str,
        return_url: &str,
    ) -> AppResult<AccountLinkDto>;
}
