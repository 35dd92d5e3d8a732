//! 回调签名校验
//!
//! 签名头格式 `t=<unix秒>,v1=<hex>`，签名串为 `{t}.{payload}` 的 HMAC-SHA256

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_TOLERANCE_SECS: i64 = 300;

#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: String) -> Self {
        Self {
            secret,
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    pub fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// 校验签名头。时间戳超窗或所有 v1 都不匹配时报错
    pub fn verify(&self, payload: &str, signature_header: &str, now_ts: i64) -> AppResult<()> {
        let mut timestamp: Option<i64> = None;
        let mut candidates: Vec<&str> = Vec::new();

        for item in signature_header.split(',') {
            match item.trim().split_once('=') {
                Some(("t", value)) => {
                    timestamp = value.parse().ok();
                }
                Some(("v1", value)) => candidates.push(value),
                _ => {}
            }
        }

        let Some(ts) = timestamp else {
            return Err(AppError::Validation("签名头缺少时间戳".to_string()));
        };
        if candidates.is_empty() {
            return Err(AppError::Validation("签名头缺少 v1 签名".to_string()));
        }
        if (now_ts - ts).abs() > self.tolerance_secs {
            return Err(AppError::Validation(format!(
                "签名时间戳超出容忍窗口: ts={}, now={}",
                ts, now_ts
            )));
        }

        let signed_payload = format!("{}.{}", ts, payload);
        for candidate in candidates {
            let Ok(raw) = hex::decode(candidate) else {
                continue;
            };
            let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
                .map_err(|e| AppError::Validation(format!("签名密钥无效: {}", e)))?;
            mac.update(signed_payload.as_bytes());
            if mac.verify_slice(&raw).is_ok() {
                return Ok(());
            }
        }

        Err(AppError::Validation("签名不匹配".to_string()))
    }

    /// 计算签名头，模拟网关和测试发事件时用
    pub fn sign_header(secret: &str, timestamp: i64, payload: &str) -> String {
        let signed_payload = format!("{}.{}", timestamp, payload);
        // HMAC 对密钥长度无限制，这里不会失败
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC 密钥长度不受限");
        mac.update(signed_payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        format!("t={},v1={}", timestamp, signature)
    }
}
