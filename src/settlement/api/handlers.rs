//! 各路由的处理器
//!
//! 回调端点无论内部处理成败都回 200，避免网关重试风暴；
//! 其余端点的失败走 ApiError 映射

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::error;

use crate::error::AppError;
use crate::settlement::api::{ApiError, ApiResult, ApiState, Envelope};
use crate::settlement::domain::percentage::Percentage;
use crate::settlement::services::exception_service::DisputeResolution;

const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// 存活探针；配置了数据库时顺带 ping 一次连接池
pub async fn health() -> ApiResult {
    crate::app_config::db::health_check()
        .await
        .map_err(|e| ApiError::App(AppError::DbError(e.to_string())))?;
    Ok(Json(Envelope::ok("ok", None)))
}

/// 管理组路由的令牌校验；未配置令牌时放行（本地/测试）
fn require_admin(state: &ApiState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = &state.config.admin_token else {
        return Ok(());
    };
    match headers.get(ADMIN_TOKEN_HEADER).and_then(|v| v.to_str().ok()) {
        Some(token) if token == expected => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

fn to_data<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(value)
        .map_err(|e| ApiError::App(AppError::DbError(format!("响应序列化失败: {}", e))))
}

// ---- 网关回调 ----

/// 始终 200 应答；处理失败只落日志等人工对账
pub async fn stripe_webhook(
    State(state): State<ApiState>,
    headers: HeaderMap,
    body: String,
) -> Json<Envelope> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok());
    if let Err(e) = state.reconciler.handle_event(&body, signature).await {
        error!("❌ 回调处理失败（已应答网关）: {}", e);
    }
    Json(Envelope::ok("received", None))
}

// ---- 商家端 ----

pub async fn vendor_retained_funds(
    State(state): State<ApiState>,
    Path(vendor_id): Path<i64>,
) -> ApiResult {
    let funds = state.dashboard.vendor_retained_funds(vendor_id).await?;
    Ok(Json(Envelope::ok("查询成功", Some(to_data(&funds)?))))
}

pub async fn vendor_onboarding_link(
    State(state): State<ApiState>,
    Path(vendor_id): Path<i64>,
) -> ApiResult {
    let link = state.dashboard.vendor_onboarding_link(vendor_id).await?;
    Ok(Json(Envelope {
        success: true,
        message: "开通链接已生成".to_string(),
        data: Some(to_data(&link)?),
        onboarding_url: Some(link.url.clone()),
    }))
}

// ---- 订单操作 ----

#[derive(Debug, Default, Deserialize)]
pub struct CheckoutBody {
    pub customer_email: Option<String>,
}

pub async fn start_checkout(
    State(state): State<ApiState>,
    Path(booking_id): Path<i64>,
    body: Option<Json<CheckoutBody>>,
) -> ApiResult {
    let Json(body) = body.unwrap_or_default();
    let started = state
        .checkout
        .start_checkout(booking_id, body.customer_email)
        .await?;
    Ok(Json(Envelope::ok("收款已发起", Some(to_data(&started)?))))
}

pub async fn client_confirm(
    State(state): State<ApiState>,
    Path(booking_id): Path<i64>,
) -> ApiResult {
    let booking = state.confirmation.client_confirm(booking_id).await?;
    Ok(Json(Envelope::ok("订单已确认完成", Some(to_data(&booking)?))))
}

pub async fn provider_confirm(
    State(state): State<ApiState>,
    Path(booking_id): Path<i64>,
) -> ApiResult {
    let booking = state.confirmation.provider_confirm(booking_id).await?;
    Ok(Json(Envelope::ok("商家已确认接单", Some(to_data(&booking)?))))
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelBody {
    pub reason: Option<String>,
}

pub async fn client_cancel(
    State(state): State<ApiState>,
    Path(booking_id): Path<i64>,
    body: Option<Json<CancelBody>>,
) -> ApiResult {
    let Json(body) = body.unwrap_or_default();
    let outcome = state
        .exceptions
        .cancel_by_client(booking_id, body.reason.as_deref(), Utc::now().date_naive())
        .await?;
    Ok(Json(Envelope::ok("取消完成", Some(to_data(&outcome)?))))
}

pub async fn provider_cancel(
    State(state): State<ApiState>,
    Path(booking_id): Path<i64>,
    body: Option<Json<CancelBody>>,
) -> ApiResult {
    let Json(body) = body.unwrap_or_default();
    let outcome = state
        .exceptions
        .cancel_by_provider(booking_id, body.reason.as_deref())
        .await?;
    Ok(Json(Envelope::ok("取消完成", Some(to_data(&outcome)?))))
}

#[derive(Debug, Deserialize)]
pub struct DisputeBody {
    pub reason: String,
}

pub async fn open_dispute(
    State(state): State<ApiState>,
    Path(booking_id): Path<i64>,
    Json(body): Json<DisputeBody>,
) -> ApiResult {
    if body.reason.trim().is_empty() {
        return Err(ApiError::App(AppError::Validation(
            "争议原因不能为空".to_string(),
        )));
    }
    state.exceptions.open_dispute(booking_id, &body.reason).await?;
    Ok(Json(Envelope::ok("争议已登记，放款冻结", None)))
}

#[derive(Debug, Deserialize)]
pub struct ResolveBody {
    pub resolution: String,
    pub notes: Option<String>,
}

pub async fn resolve_dispute(
    State(state): State<ApiState>,
    Path(booking_id): Path<i64>,
    Json(body): Json<ResolveBody>,
) -> ApiResult {
    let resolution: DisputeResolution = body.resolution.parse()?;
    let outcome = state
        .exceptions
        .resolve_dispute(booking_id, resolution, body.notes.as_deref())
        .await?;
    Ok(Json(Envelope::ok("争议已裁决", Some(to_data(&outcome)?))))
}

pub async fn sync_payment(
    State(state): State<ApiState>,
    Path(reference): Path<String>,
) -> ApiResult {
    let tx = state.reconciler.sync_by_reference(&reference).await?;
    Ok(Json(Envelope::ok("同步完成", Some(to_data(&tx)?))))
}

// ---- 管理端 ----

#[derive(Debug, Deserialize)]
pub struct ReleaseBody {
    pub percentage: Decimal,
}

pub async fn admin_release(
    State(state): State<ApiState>,
    Path(booking_id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<ReleaseBody>,
) -> ApiResult {
    require_admin(&state, &headers)?;
    let percent = Percentage::new(body.percentage)
        .map_err(|e| ApiError::App(AppError::Validation(e.to_string())))?;
    let outcome = state
        .escrow
        .release(booking_id, percent, "管理端手动放款")
        .await?;
    Ok(Json(Envelope::ok("放款完成", Some(to_data(&outcome)?))))
}

pub async fn admin_release_final(
    State(state): State<ApiState>,
    Path(booking_id): Path<i64>,
    headers: HeaderMap,
) -> ApiResult {
    require_admin(&state, &headers)?;
    let outcome = state.escrow.release_final(booking_id).await?;
    Ok(Json(Envelope::ok("尾款放款完成", Some(to_data(&outcome)?))))
}

pub async fn admin_approve_commission(
    State(state): State<ApiState>,
    Path(commission_id): Path<i64>,
    headers: HeaderMap,
) -> ApiResult {
    require_admin(&state, &headers)?;
    state.commissions.approve(commission_id).await?;
    Ok(Json(Envelope::ok("佣金已审批", None)))
}

/// 手动触发一轮扫单，验收和补跑用
pub async fn admin_run_job(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> ApiResult {
    require_admin(&state, &headers)?;
    let report = match name.as_str() {
        "weekly_payout" => state.weekly_job.run().await?,
        "auto_confirm" => state.auto_confirm_job.run().await?,
        "partial_release" => state.partial_release_job.run().await?,
        other => {
            return Err(ApiError::App(AppError::Validation(format!(
                "未知任务: {}，可选 weekly_payout / auto_confirm / partial_release",
                other
            ))));
        }
    };
    Ok(Json(Envelope::ok("任务执行完成", Some(to_data(&report)?))))
}
