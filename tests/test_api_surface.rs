//! HTTP 面验收：信封格式、状态码映射、管理令牌与回调端点的 200 约定

mod common;

use std::sync::Arc;

use common::{days_from_today, Harness};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

use travel_pay::app_config::settle::SettleConfig;
use travel_pay::settlement::api::{router, ApiState};
use travel_pay::settlement::domain::status::{EscrowStatus, ProductKind};

const ADMIN_TOKEN: &str = "token-test-123";

/// 把测试服务栈挂到随机端口，返回基地址
async fn serve(h: &Harness) -> String {
    let state = ApiState {
        config: h.config.clone(),
        checkout: h.checkout.clone(),
        reconciler: h.reconciler.clone(),
        escrow: h.escrow.clone(),
        exceptions: h.exceptions.clone(),
        confirmation: h.confirmation.clone(),
        dashboard: h.dashboard.clone(),
        commissions: h.commissions.clone(),
        weekly_job: Arc::new(h.weekly_job()),
        auto_confirm_job: Arc::new(h.auto_confirm_job()),
        partial_release_job: Arc::new(h.partial_release_job()),
    };
    let app = router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn admin_harness() -> Harness {
    Harness::with_config(SettleConfig {
        admin_token: Some(ADMIN_TOKEN.to_string()),
        ..SettleConfig::default()
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let h = Harness::new();
    let base = serve(&h).await;

    let resp = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["message"], json!("ok"));
}

#[tokio::test]
async fn test_webhook_endpoint_always_acknowledges() {
    let h = Harness::new();
    let base = serve(&h).await;
    let client = reqwest::Client::new();

    // 连 JSON 都不是的载荷也要回 200，避免网关重试风暴
    let resp = client
        .post(format!("{}/webhooks/stripe", base))
        .body("not even json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["message"], json!("received"));
}

#[tokio::test]
async fn test_retained_funds_endpoint() {
    let h = Harness::new();
    let vendor_id = h.create_vendor(true).await;
    let booking_id = h
        .create_booking(vendor_id, dec!(1000.00), ProductKind::DayTrip, days_from_today(40))
        .await;
    h.pay_booking(booking_id).await;

    let base = serve(&h).await;
    let resp = reqwest::get(format!("{}/api/vendors/{}/retained-funds", base, vendor_id))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], json!(true));

    let total: Decimal = body["data"]["total_retained"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(total, dec!(1000.00));
    assert_eq!(body["data"]["bookings"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_unknown_vendor_maps_to_404_envelope() {
    let h = Harness::new();
    let base = serve(&h).await;

    let resp = reqwest::get(format!("{}/api/vendors/9999/retained-funds", base))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], json!(false));
    assert!(body["message"].as_str().unwrap().contains("9999"));
}

#[tokio::test]
async fn test_onboarding_link_endpoint_carries_url() {
    let h = Harness::new();
    let vendor_id = h.create_vendor(false).await;
    let base = serve(&h).await;

    let resp = reqwest::get(format!("{}/api/vendors/{}/onboarding-link", base, vendor_id))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(body["onboarding_url"].as_str().unwrap().starts_with("https://"));
}

#[tokio::test]
async fn test_admin_release_requires_token() {
    let h = admin_harness();
    let vendor_id = h.create_vendor(true).await;
    let booking_id = h
        .create_booking(vendor_id, dec!(1000.00), ProductKind::DayTrip, days_from_today(40))
        .await;
    h.pay_booking(booking_id).await;

    let base = serve(&h).await;
    let client = reqwest::Client::new();
    let url = format!("{}/api/admin/bookings/{}/release", base, booking_id);

    // 缺令牌
    let resp = client
        .post(&url)
        .json(&json!({"percentage": 100}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], json!(false));

    // 带令牌
    let resp = client
        .post(&url)
        .header("x-admin-token", ADMIN_TOKEN)
        .json(&json!({"percentage": 100}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], json!(true));

    assert_eq!(
        h.booking(booking_id).await.escrow_status,
        EscrowStatus::ReleasedFull
    );
}

#[tokio::test]
async fn test_release_on_unheld_escrow_maps_to_409() {
    let h = Harness::new();
    let vendor_id = h.create_vendor(true).await;
    let booking_id = h
        .create_booking(vendor_id, dec!(500.00), ProductKind::DayTrip, days_from_today(40))
        .await;

    let base = serve(&h).await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/admin/bookings/{}/release", base, booking_id))
        .json(&json!({"percentage": 100}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
}

#[tokio::test]
async fn test_dispute_with_blank_reason_maps_to_422() {
    let h = Harness::new();
    let vendor_id = h.create_vendor(true).await;
    let booking_id = h
        .create_booking(vendor_id, dec!(500.00), ProductKind::DayTrip, days_from_today(40))
        .await;
    h.pay_booking(booking_id).await;

    let base = serve(&h).await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/bookings/{}/dispute", base, booking_id))
        .json(&json!({"reason": "   "}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);
}

#[tokio::test]
async fn test_manual_sync_endpoint_settles_payment() {
    let h = Harness::new();
    let vendor_id = h.create_vendor(true).await;
    let booking_id = h
        .create_booking(vendor_id, dec!(800.00), ProductKind::MultiDay, days_from_today(40))
        .await;
    let reference = h.start_payment(booking_id).await;
    h.sim.confirm_intent(&reference).unwrap();

    let base = serve(&h).await;
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/payments/{}/sync", base, reference))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["status"], json!("succeeded"));

    assert_eq!(h.booking(booking_id).await.escrow_status, EscrowStatus::Held);
}

#[tokio::test]
async fn test_admin_run_job_endpoint_returns_report() {
    let h = admin_harness();
    let base = serve(&h).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/admin/jobs/weekly_payout/run", base))
        .header("x-admin-token", ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["scanned"], json!(0));

    // 未知任务名
    let resp = client
        .post(format!("{}/api/admin/jobs/nope/run", base))
        .header("x-admin-token", ADMIN_TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);
}

#[tokio::test]
async fn test_booking_lifecycle_over_http() {
    let h = Harness::new();
    let vendor_id = h.create_vendor(true).await;
    let booking_id = h
        .create_booking(vendor_id, dec!(1000.00), ProductKind::DayTrip, days_from_today(40))
        .await;
    h.pay_booking(booking_id).await;

    let base = serve(&h).await;
    let client = reqwest::Client::new();

    // 商家确认 → 客人确认
    let resp = client
        .post(format!("{}/api/bookings/{}/provider-confirm", base, booking_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .post(format!("{}/api/bookings/{}/confirm", base, booking_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["status"], json!("complete"));

    // 重复确认映射 409
    let resp = client
        .post(format!("{}/api/bookings/{}/confirm", base, booking_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);
}
