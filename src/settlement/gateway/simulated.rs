//! 模拟支付网关
//!
//! IS_SIMULATED_PAY=true 时替代真实 Stripe，本地联调与测试不出外网。
//! 意向状态机与真实网关一致：requires_payment_method -> requires_capture -> succeeded

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::settlement::gateway::dto::{
    AccountDto, AccountLinkDto, CreateIntentRequest, IntentDto, RefundDto, TransferDto,
    TransferRequest,
};
use crate::settlement::gateway::PaymentGateway;

#[derive(Default)]
struct SimState {
    intents: HashMap<String, IntentDto>,
    transfers: Vec<TransferDto>,
    refunds: Vec<RefundDto>,
    accounts: HashMap<String, AccountDto>,
    fail_transfers: bool,
    seq: u64,
}

impl SimState {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }
}

pub struct SimulatedGateway {
    state: Mutex<SimState>,
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// 测试直接塞入指定状态的意向
    pub fn seed_intent(&self, intent: IntentDto) {
        self.state().intents.insert(intent.id.clone(), intent);
    }

    /// 测试注册收款方账户，transfers_active 控制打款能力
    pub fn seed_account(&self, account_id: &str, transfers_active: bool) {
        let mut capabilities = HashMap::new();
        capabilities.insert(
            "transfers".to_string(),
            if transfers_active { "active" } else { "pending" }.to_string(),
        );
        self.state().accounts.insert(
            account_id.to_string(),
            AccountDto {
                id: account_id.to_string(),
                charges_enabled: transfers_active,
                payouts_enabled: transfers_active,
                capabilities,
            },
        );
    }

    /// 客户侧确认付款，意向进入待扣款
    pub fn confirm_intent(&self, intent_id: &str) -> AppResult<IntentDto> {
        let mut state = self.state();
        let Some(intent) = state.intents.get_mut(intent_id) else {
            return Err(AppError::NotFound(format!("no such payment_intent: {}", intent_id)));
        };
        if intent.status != "requires_payment_method" && intent.status != "requires_confirmation" {
            return Err(AppError::Gateway(format!(
                "模拟网关: 意向 {} 当前状态 {} 不可确认",
                intent_id, intent.status
            )));
        }
        intent.status = "requires_capture".to_string();
        Ok(intent.clone())
    }

    pub fn set_fail_transfers(&self, fail: bool) {
        self.state().fail_transfers = fail;
    }

    pub fn transfers(&self) -> Vec<TransferDto> {
        self.state().transfers.clone()
    }

    pub fn refunds(&self) -> Vec<RefundDto> {
        self.state().refunds.clone()
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn create_manual_capture_intent(
        &self,
        req: &CreateIntentRequest,
    ) -> AppResult<IntentDto> {
        let mut state = self.state();
        let seq = state.next_seq();
        let mut metadata = HashMap::new();
        metadata.insert("booking_id".to_string(), req.booking_id.to_string());
        metadata.insert(
            "booking_reference".to_string(),
            req.booking_reference.clone(),
        );
        let intent = IntentDto {
            id: format!("pi_sim_{}", seq),
            status: "requires_payment_method".to_string(),
            amount: req.amount_minor,
            amount_received: 0,
            currency: req.currency.clone(),
            latest_charge: None,
            metadata,
        };
        state.intents.insert(intent.id.clone(), intent.clone());
        info!("⏩ 模拟网关创建意向: id={}, amount={}", intent.id, intent.amount);
        Ok(intent)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> AppResult<IntentDto> {
        self.state()
            .intents
            .get(intent_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("no such payment_intent: {}", intent_id)))
    }

    async fn capture_intent(&self, intent_id: &str) -> AppResult<IntentDto> {
        let mut state = self.state();
        let seq = state.next_seq();
        let Some(intent) = state.intents.get_mut(intent_id) else {
            return Err(AppError::NotFound(format!("no such payment_intent: {}", intent_id)));
        };
        if intent.status != "requires_capture" {
            return Err(AppError::Gateway(format!(
                "模拟网关: 意向 {} 当前状态 {} 不可扣款",
                intent_id, intent.status
            )));
        }
        intent.status = "succeeded".to_string();
        intent.amount_received = intent.amount;
        intent.latest_charge = Some(format!("ch_sim_{}", seq));
        info!("⏩ 模拟网关扣款成功: id={}", intent_id);
        Ok(intent.clone())
    }

    async fn cancel_intent(&self, intent_id: &str) -> AppResult<IntentDto> {
        let mut state = self.state();
        let Some(intent) = state.intents.get_mut(intent_id) else {
            return Err(AppError::NotFound(format!("no such payment_intent: {}", intent_id)));
        };
        if intent.status == "succeeded" {
            return Err(AppError::Gateway(format!(
                "模拟网关: 意向 {} 已扣款，不可撤销",
                intent_id
            )));
        }
        intent.status = "canceled".to_string();
        Ok(intent.clone())
    }

    async fn create_transfer(&self, req: &TransferRequest) -> AppResult<TransferDto> {
        let mut state = self.state();
        if state.fail_transfers {
            return Err(AppError::Gateway("模拟网关: 转账失败".to_string()));
        }
        let seq = state.next_seq();
        let transfer = TransferDto {
            id: format!("tr_sim_{}", seq),
            amount: req.amount_minor,
            currency: req.currency.clone(),
            destination: req.destination_account.clone(),
        };
        state.transfers.push(transfer.clone());
        info!(
            "⏩ 模拟网关转账: id={}, dest={}, amount={}",
            transfer.id, transfer.destination, transfer.amount
        );
        Ok(transfer)
    }

    async fn refund_charge(
        &self,
        charge_id: &str,
        amount_minor: Option<i64>,
        _reason: &str,
    ) -> AppResult<RefundDto> {
        let mut state = self.state();
        let seq = state.next_seq();
        let refund = RefundDto {
            id: format!("re_sim_{}", seq),
            status: "succeeded".to_string(),
            amount: amount_minor.unwrap_or(0),
            charge: Some(charge_id.to_string()),
        };
        state.refunds.push(refund.clone());
        info!(
            "⏩ 模拟网关退款: id={}, charge={}, amount={}",
            refund.id, charge_id, refund.amount
        );
        Ok(refund)
    }

    async fn retrieve_account(&self, account_id: &str) -> AppResult<AccountDto> {
        self.state()
            .accounts
            .get(account_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("no such account: {}", account_id)))
    }

    async fn create_account_link(
        &self,
        account_id: &str,
        _refresh_url: &str,
        _return_url: &str,
    ) -> AppResult<AccountLinkDto> {
        Ok(AccountLinkDto {
            url: format!("https://connect.stripe.sim/onboarding/{}", account_id),
            expires_at: Utc::now().timestamp() + 300,
        })
    }
}
