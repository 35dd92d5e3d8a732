//! 支付网关传输对象
//!
//! 字段与 Stripe 返回的 JSON 对齐，金额一律用最小货币单位（分）

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// 支付意向
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentDto {
    pub id: String,
    pub status: String,
    pub amount: i64,
    #[serde(default)]
    pub amount_received: i64,
    pub currency: String,
    #[serde(default)]
    pub latest_charge: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl IntentDto {
    /// 从 metadata 取回订单号
    pub fn booking_id(&self) -> Option<i64> {
        self.metadata.get("booking_id").and_then(|v| v.parse().ok())
    }
}

/// 创建支付意向的入参
#[derive(Debug, Clone)]
pub struct CreateIntentRequest {
    pub amount_minor: i64,
    pub currency: String,
    pub booking_id: i64,
    pub booking_reference: String,
    pub customer_email: Option<String>,
}

/// 向收款方转账的入参
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub amount_minor: i64,
    pub currency: String,
    pub destination_account: String,
    pub source_charge: String,
    pub booking_reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferDto {
    pub id: String,
    pub amount: i64,
    pub currency: String,
    pub destination: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundDto {
    pub id: String,
    pub status: String,
    pub amount: i64,
    #[serde(default)]
    pub charge: Option<String>,
}

/// 收款方网关账户
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountDto {
    pub id: String,
    #[serde(default)]
    pub charges_enabled: bool,
    #[serde(default)]
    pub payouts_enabled: bool,
    #[serde(default)]
    pub capabilities: HashMap<String, String>,
}

impl AccountDto {
    /// transfers 能力激活才允许打款
    pub fn can_receive_transfers(&self) -> bool {
        self.capabilities
            .get("transfers")
            .map(|s| s == "active")
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountLinkDto {
    pub url: String,
    #[serde(default)]
    pub expires_at: i64,
}

/// 回调事件信封
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub created: i64,
    pub data: WebhookData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookData {
    pub object: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intent_deserialize_with_defaults() {
        let raw = r#"{
            "id": "pi_123",
            "status": "requires_capture",
            "amount": 100000,
            "currency": "usd",
            "metadata": {"booking_id": "42"}
        }"#;
        let intent: IntentDto = serde_json::from_str(raw).unwrap();
        assert_eq!(intent.amount_received, 0);
        assert_eq!(intent.latest_charge, None);
        assert_eq!(intent.booking_id(), Some(42));
    }

    #[test]
    fn test_account_transfers_capability() {
        let mut account = AccountDto {
            id: "acct_1".to_string(),
            charges_enabled: true,
            payouts_enabled: true,
            capabilities: HashMap::new(),
        };
        assert!(!account.can_receive_transfers());

        account
            .capabilities
            .insert("transfers".to_string(), "pending".to_string());
        assert!(!account.can_receive_transfers());

        account
            .capabilities
            .insert("transfers".to_string(), "active".to_string());
        assert!(account.can_receive_transfers());
    }

    #[test]
    fn test_webhook_event_type_field() {
        let raw = r#"{
            "id": "evt_1",
            "type": "payment_intent.succeeded",
            "created": 1700000000,
            "data": {"object": {"id": "pi_123"}}
        }"#;
        let event: WebhookEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.event_type, "payment_intent.succeeded");
        assert_eq!(event.data.object["id"], "pi_123");
    }
}
