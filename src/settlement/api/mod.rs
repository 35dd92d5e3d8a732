//! 对外 HTTP 面
//!
//! 管理端与商家端操作走 /api，网关回调走 /webhooks/stripe。
//! 所有响应统一 {success, message, data?, onboarding_url?} 信封，
//! 业务失败返回结构化信息而不是裸异常

pub mod handlers;

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::app_config::settle::SettleConfig;
use crate::error::AppError;
use crate::job::{AutoConfirmJob, PartialReleaseJob, WeeklyPayoutJob};
use crate::settlement::services::{
    CheckoutService, CommissionService, ConfirmationService, DashboardService, EscrowService,
    ExceptionService, WebhookReconciler,
};

/// 路由共享状态，服务在 main 里注线后整体注入
#[derive(Clone)]
pub struct ApiState {
    pub config: SettleConfig,
    pub checkout: CheckoutService,
    pub reconciler: WebhookReconciler,
    pub escrow: EscrowService,
    pub exceptions: ExceptionService,
    pub confirmation: ConfirmationService,
    pub dashboard: DashboardService,
    pub commissions: CommissionService,
    pub weekly_job: Arc<WeeklyPayoutJob>,
    pub auto_confirm_job: Arc<AutoConfirmJob>,
    pub partial_release_job: Arc<PartialReleaseJob>,
}

/// 统一响应信封
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub onboarding_url: Option<String>,
}

impl Envelope {
    pub fn ok(message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
            onboarding_url: None,
        }
    }
}

/// 处理器错误，出响应时映射状态码但保持信封格式
pub enum ApiError {
    App(AppError),
    Unauthorized,
}

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError::App(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, onboarding_url) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "管理令牌缺失或不正确".to_string(),
                None,
            ),
            ApiError::App(err) => {
                let status = match &err {
                    AppError::NotFound(_) => StatusCode::NOT_FOUND,
                    AppError::InvalidState(_) => StatusCode::CONFLICT,
                    AppError::OnboardingIncomplete { .. } => StatusCode::CONFLICT,
                    AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    AppError::Gateway(_) => StatusCode::BAD_GATEWAY,
                    AppError::DbError(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                let onboarding_url = match &err {
                    AppError::OnboardingIncomplete { onboarding_url, .. } => {
                        onboarding_url.clone()
                    }
                    _ => None,
                };
                (status, err.to_string(), onboarding_url)
            }
        };

        (
            status,
            Json(Envelope {
                success: false,
                message,
                data: None,
                onboarding_url,
            }),
        )
            .into_response()
    }
}

pub type ApiResult = Result<Json<Envelope>, ApiError>;

/// 组装全部路由
pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/webhooks/stripe", post(handlers::stripe_webhook))
        .route(
            "/api/vendors/{id}/retained-funds",
            get(handlers::vendor_retained_funds),
        )
        .route(
            "/api/vendors/{id}/onboarding-link",
            get(handlers::vendor_onboarding_link),
        )
        .route("/api/bookings/{id}/checkout", post(handlers::start_checkout))
        .route("/api/bookings/{id}/confirm", post(handlers::client_confirm))
        .route(
            "/api/bookings/{id}/provider-confirm",
            post(handlers::provider_confirm),
        )
        .route("/api/bookings/{id}/cancel", post(handlers::client_cancel))
        .route(
            "/api/bookings/{id}/provider-cancel",
            post(handlers::provider_cancel),
        )
        .route("/api/bookings/{id}/dispute", post(handlers::open_dispute))
        .route(
            "/api/bookings/{id}/dispute/resolve",
            post(handlers::resolve_dispute),
        )
        .route(
            "/api/payments/{reference}/sync",
            post(handlers::sync_payment),
        )
        .route(
            "/api/admin/bookings/{id}/release",
            post(handlers::admin_release),
        )
        .route(
            "/api/admin/bookings/{id}/release-final",
            post(handlers::admin_release_final),
        )
        .route(
            "/api/admin/commissions/{id}/approve",
            post(handlers::admin_approve_commission),
        )
        .route("/api/admin/jobs/{name}/run", post(handlers::admin_run_job))
        .with_state(state)
}
