//! Stripe REST 客户端
//!
//! 表单编码请求，POST 带幂等键，404 之外的错误统一映射为网关错误

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::settlement::gateway::dto::{
    AccountDto, AccountLinkDto, CreateIntentRequest, IntentDto, RefundDto, TransferDto,
    TransferRequest,
};
use crate::settlement::gateway::PaymentGateway;

const DEFAULT_BASE_URL: &str = "https://api.stripe.com";

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(rename = "type", default)]
    error_type: String,
}

pub struct StripeClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl StripeClient {
    pub fn new(api_key: String) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| AppError::Gateway(format!("HTTP 客户端构建失败: {}", e)))?;
        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// 从环境变量读取密钥，STRIPE_BASE_URL 供本地桩服务覆盖
    pub fn from_env() -> AppResult<Self> {
        let api_key = env::var("STRIPE_SECRET_KEY")
            .map_err(|_| AppError::Gateway("STRIPE_SECRET_KEY 未配置".to_string()))?;
        let mut client = Self::new(api_key)?;
        if let Ok(base) = env::var("STRIPE_BASE_URL") {
            if !base.is_empty() {
                client.base_url = base;
            }
        }
        Ok(client)
    }

    async fn send_request<T: for<'a> Deserialize<'a>>(
        &self,
        method: Method,
        path: &str,
        form: Option<&[(&str, String)]>,
    ) -> AppResult<T> {
        let url = format!("{}{}", self.base_url, path);
        let mut request_builder = self
            .client
            .request(method.clone(), &url)
            .bearer_auth(&self.api_key);

        if method == Method::POST {
            // 幂等键保证网关侧重试不重复扣款
            request_builder =
                request_builder.header("Idempotency-Key", Uuid::new_v4().to_string());
        }
        if let Some(params) = form {
            request_builder = request_builder.form(params);
        }

        let response = request_builder
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("stripe 请求失败: {}", e)))?;

        let status_code = response.status();
        let response_body = response
            .text()
            .await
            .map_err(|e| AppError::Gateway(format!("stripe 响应读取失败: {}", e)))?;
        debug!("stripe 响应: path={}, status={}", path, status_code);

        if status_code.is_success() {
            serde_json::from_str(&response_body)
                .map_err(|e| AppError::Gateway(format!("stripe 响应解析失败: {}", e)))
        } else {
            let message = serde_json::from_str::<ErrorEnvelope>(&response_body)
                .map(|e| {
                    if e.error.error_type.is_empty() {
                        e.error.message
                    } else {
                        format!("{}: {}", e.error.error_type, e.error.message)
                    }
                })
                .unwrap_or(response_body);
            warn!("stripe 请求被拒: path={}, status={}, msg={}", path, status_code, message);
            if status_code == StatusCode::NOT_FOUND {
                Err(AppError::NotFound(message))
            } else {
                Err(AppError::Gateway(message))
            }
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_manual_capture_intent(
        &self,
        req: &CreateIntentRequest,
    ) -> AppResult<IntentDto> {
        let mut form = vec![
            ("amount", req.amount_minor.to_string()),
            ("currency", req.currency.clone()),
            ("capture_method", "manual".to_string()),
            ("metadata[booking_id]", req.booking_id.to_string()),
            ("metadata[booking_reference]", req.booking_reference.clone()),
        ];
        if let Some(email) = &req.customer_email {
            form.push(("receipt_email", email.clone()));
        }
        self.send_request(Method::POST, "/v1/payment_intents", Some(&form))
            .await
    }

    async fn retrieve_intent(&self, intent_id: &str) -> AppResult<IntentDto> {
        let path = format!("/v1/payment_intents/{}", intent_id);
        self.send_request(Method::GET, &path, None).await
    }

    async fn capture_intent(&self, intent_id: &str) -> AppResult<IntentDto> {
        let path = format!("/v1/payment_intents/{}/capture", intent_id);
        self.send_request(Method::POST, &path, None).await
    }

    async fn cancel_intent(&self, intent_id: &str) -> AppResult<IntentDto> {
        let path = format!("/v1/payment_intents/{}/cancel", intent_id);
        self.send_request(Method::POST, &path, None).await
    }

    async fn create_transfer(&self, req: &TransferRequest) -> AppResult<TransferDto> {
        let form = vec![
            ("amount", req.amount_minor.to_string()),
            ("currency", req.currency.clone()),
            ("destination", req.destination_account.clone()),
            ("source_transaction", req.source_charge.clone()),
            ("transfer_group", req.booking_reference.clone()),
        ];
        self.send_request(Method::POST, "/v1/transfers", Some(&form))
            .await
    }

    async fn refund_charge(
        &self,
        charge_id: &str,
        amount_minor: Option<i64>,
        reason: &str,
    ) -> AppResult<RefundDto> {
        let mut form = vec![
            ("charge", charge_id.to_string()),
            ("metadata[reason]", reason.to_string()),
        ];
        if let Some(amount) = amount_minor {
            form.push(("amount", amount.to_string()));
        }
        self.send_request(Method::POST, "/v1/refunds", Some(&form))
            .await
    }

    async fn retrieve_account(&self, account_id: &str) -> AppResult<AccountDto> {
        let path = format!("/v1/accounts/{}", account_id);
        self.send_request(Method::GET, &path, None).await
    }

    async fn create_account_link(
        &self,
        account_id: &str,
        refresh_url: &str,
        return_url: &str,
    ) -> AppResult<AccountLinkDto> {
        let form = vec![
            ("account", account_id.to_string()),
            ("refresh_url", refresh_url.to_string()),
            ("return_url", return_url.to_string()),
            ("type", "account_onboarding".to_string()),
        ];
        self.send_request(Method::POST, "/v1/account_links", Some(&form))
            .await
    }
}
