//! 取消与争议通道

mod common;

use common::{days_from_today, Harness};
use chrono::Utc;
use rust_decimal_macros::dec;

use travel_pay::error::AppError;
use travel_pay::settlement::domain::percentage::Percentage;
use travel_pay::settlement::domain::status::{
    BookingStatus, CommissionStatus, EscrowStatus, PaymentStatus, ProductKind,
};
use travel_pay::settlement::services::exception_service::DisputeResolution;

#[tokio::test]
async fn test_client_cancel_outside_window_refunds_half() {
    let h = Harness::new();
    let vendor_id = h.create_vendor(true).await;
    let booking_id = h
        .create_booking(vendor_id, dec!(1000.00), ProductKind::MultiDay, days_from_today(40))
        .await;
    h.pay_booking(booking_id).await;

    let today = Utc::now().date_naive();
    let outcome = h
        .exceptions
        .cancel_by_client(booking_id, Some("行程有变"), today)
        .await
        .unwrap();
    assert_eq!(outcome.refund_amount, Some(dec!(500.00)));
    assert!(outcome.refund_id.is_some());

    let refunds = h.sim.refunds();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].amount, 50_000);

    let booking = h.booking(booking_id).await;
    assert_eq!(booking.status, BookingStatus::Cancelled);
    assert_eq!(booking.escrow_status, EscrowStatus::Refunded);
    assert_eq!(booking.payment_status, PaymentStatus::Refunded);
}

#[tokio::test]
async fn test_client_cancel_inside_window_rejected() {
    let h = Harness::new();
    let vendor_id = h.create_vendor(true).await;
    let booking_id = h
        .create_booking(vendor_id, dec!(1000.00), ProductKind::DayTrip, days_from_today(20))
        .await;
    h.pay_booking(booking_id).await;

    let today = Utc::now().date_naive();
    let err = h
        .exceptions
        .cancel_by_client(booking_id, None, today)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    // 资金原封不动
    assert!(h.sim.refunds().is_empty());
    let booking = h.booking(booking_id).await;
    assert_eq!(booking.escrow_status, EscrowStatus::Held);
}

#[tokio::test]
async fn test_client_cancel_unpaid_closes_without_refund() {
    let h = Harness::new();
    let vendor_id = h.create_vendor(true).await;
    let booking_id = h
        .create_booking(vendor_id, dec!(1000.00), ProductKind::DayTrip, days_from_today(40))
        .await;
    h.start_payment(booking_id).await;

    let today = Utc::now().date_naive();
    let outcome = h
        .exceptions
        .cancel_by_client(booking_id, Some("不去了"), today)
        .await
        .unwrap();
    assert_eq!(outcome.refund_amount, None);
    assert!(h.sim.refunds().is_empty());

    let booking = h.booking(booking_id).await;
    assert_eq!(booking.status, BookingStatus::Cancelled);
    assert_eq!(booking.payment_status, PaymentStatus::Cancelled);
}

#[tokio::test]
async fn test_booking_refund_percent_override() {
    let h = Harness::new();
    let vendor_id = h.create_vendor(true).await;
    let booking = h
        .checkout
        .create_booking(travel_pay::settlement::domain::entities::NewBooking {
            reference: "BK-refund-override".to_string(),
            client_id: 1,
            vendor_id,
            product_kind: ProductKind::MultiDay,
            trip_start_date: days_from_today(45),
            amount: dec!(1000.00),
            currency: "usd".to_string(),
            release_percentage_30days: None,
            cancellation_refund_percent: Some(dec!(80)),
        })
        .await
        .unwrap();
    h.pay_booking(booking.id).await;

    let outcome = h
        .exceptions
        .cancel_by_client(booking.id, None, Utc::now().date_naive())
        .await
        .unwrap();
    assert_eq!(outcome.refund_amount, Some(dec!(800.00)));
}

#[tokio::test]
async fn test_provider_cancel_refunds_in_full_near_trip() {
    let h = Harness::new();
    let vendor_id = h.create_vendor(true).await;
    let booking_id = h
        .create_booking(vendor_id, dec!(500.00), ProductKind::DayTrip, days_from_today(5))
        .await;
    h.pay_booking(booking_id).await;

    let outcome = h
        .exceptions
        .cancel_by_provider(booking_id, Some("导游病了"))
        .await
        .unwrap();
    // 商家取消不看窗口，整单退
    assert_eq!(outcome.refund_amount, Some(dec!(500.00)));
    assert_eq!(h.sim.refunds().len(), 1);

    let booking = h.booking(booking_id).await;
    assert_eq!(booking.status, BookingStatus::Cancelled);
    assert_eq!(booking.escrow_status, EscrowStatus::Refunded);
}

#[tokio::test]
async fn test_provider_cancel_after_full_release_rejected() {
    let h = Harness::new();
    let vendor_id = h.create_vendor(true).await;
    let booking_id = h
        .create_booking(vendor_id, dec!(500.00), ProductKind::DayTrip, days_from_today(40))
        .await;
    h.pay_booking(booking_id).await;
    h.escrow
        .release(booking_id, Percentage::full(), "结清")
        .await
        .unwrap();

    let err = h
        .exceptions
        .cancel_by_provider(booking_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
}

#[tokio::test]
async fn test_open_dispute_freezes_release() {
    let h = Harness::new();
    let vendor_id = h.create_vendor(true).await;
    let booking_id = h
        .create_booking(vendor_id, dec!(1000.00), ProductKind::MultiDay, days_from_today(40))
        .await;
    h.pay_booking(booking_id).await;

    h.exceptions
        .open_dispute(booking_id, "服务与描述不符")
        .await
        .unwrap();
    let calc = h
        .ledger
        .commissions
        .find_active(booking_id, vendor_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(calc.status, CommissionStatus::Disputed);

    let err = h
        .escrow
        .release(booking_id, Percentage::full(), "冻结期放款")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
    assert!(h.sim.transfers().is_empty());
}

#[tokio::test]
async fn test_dispute_before_payment_freezes_later_release() {
    let h = Harness::new();
    let vendor_id = h.create_vendor(true).await;
    let booking_id = h
        .create_booking(vendor_id, dec!(1000.00), ProductKind::MultiDay, days_from_today(40))
        .await;
    let reference = h.start_payment(booking_id).await;

    // 支付完成前开争议：托管先占位到 held，冻结标记落在订单上
    h.exceptions
        .open_dispute(booking_id, "出行前争议")
        .await
        .unwrap();
    let booking = h.booking(booking_id).await;
    assert_eq!(booking.escrow_status, EscrowStatus::Held);
    assert!(booking.disputed_at.is_some());

    // 支付随后才成功，佣金此时才补算出来
    h.sim.confirm_intent(&reference).unwrap();
    h.deliver_intent_event(&reference, "payment_intent.amount_capturable_updated")
        .await;
    let booking = h.booking(booking_id).await;
    assert_eq!(booking.payment_status, PaymentStatus::Succeeded);
    assert_eq!(booking.escrow_status, EscrowStatus::Held);

    // 争议未决，放款被挡，资金不出托管
    let err = h
        .escrow
        .release(booking_id, Percentage::full(), "争议期放款")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
    assert!(h.sim.transfers().is_empty());

    // 裁决为放款后通道恢复
    let outcome = h
        .exceptions
        .resolve_dispute(booking_id, DisputeResolution::Release, None)
        .await
        .unwrap();
    assert!(outcome.release.is_some());
    assert_eq!(h.sim.transfers().len(), 1);
    assert_eq!(
        h.booking(booking_id).await.escrow_status,
        EscrowStatus::ReleasedFull
    );
}

#[tokio::test]
async fn test_dispute_on_settled_booking_rejected() {
    let h = Harness::new();
    let vendor_id = h.create_vendor(true).await;
    let booking_id = h
        .create_booking(vendor_id, dec!(500.00), ProductKind::DayTrip, days_from_today(40))
        .await;
    h.pay_booking(booking_id).await;
    h.escrow
        .release(booking_id, Percentage::full(), "结清")
        .await
        .unwrap();

    let err = h
        .exceptions
        .open_dispute(booking_id, "来晚了")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
}

#[tokio::test]
async fn test_resolve_dispute_release_pays_vendor() {
    let h = Harness::new();
    let vendor_id = h.create_vendor(true).await;
    let booking_id = h
        .create_booking(vendor_id, dec!(1000.00), ProductKind::MultiDay, days_from_today(40))
        .await;
    h.pay_booking(booking_id).await;
    h.exceptions.open_dispute(booking_id, "争议").await.unwrap();

    let outcome = h
        .exceptions
        .resolve_dispute(booking_id, DisputeResolution::Release, Some("证据充分"))
        .await
        .unwrap();
    assert_eq!(outcome.resolution, DisputeResolution::Release);
    let release = outcome.release.unwrap();
    assert_eq!(release.vendor_cut, dec!(800.00));

    let booking = h.booking(booking_id).await;
    assert_eq!(booking.escrow_status, EscrowStatus::ReleasedFull);
    let calc = h
        .ledger
        .commissions
        .find_active(booking_id, vendor_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(calc.status, CommissionStatus::Paid);
}

#[tokio::test]
async fn test_resolve_dispute_refund_returns_remaining_only() {
    let h = Harness::new();
    let vendor_id = h.create_vendor(true).await;
    let booking_id = h
        .create_booking(vendor_id, dec!(1000.00), ProductKind::MultiDay, days_from_today(40))
        .await;
    h.pay_booking(booking_id).await;

    // 已放过 50%，争议退款只退托管里剩下的一半
    h.escrow
        .release(booking_id, Percentage::new(dec!(50)).unwrap(), "行前放款")
        .await
        .unwrap();
    h.exceptions.open_dispute(booking_id, "后半程取消").await.unwrap();

    let outcome = h
        .exceptions
        .resolve_dispute(booking_id, DisputeResolution::Refund, None)
        .await
        .unwrap();
    assert!(outcome.refund_id.is_some());

    let refunds = h.sim.refunds();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].amount, 50_000);

    let booking = h.booking(booking_id).await;
    assert_eq!(booking.status, BookingStatus::Cancelled);
    assert_eq!(booking.escrow_status, EscrowStatus::Refunded);
    assert_eq!(booking.payment_status, PaymentStatus::Refunded);
}

#[tokio::test]
async fn test_payment_failure_ignores_closed_booking() {
    let h = Harness::new();
    let vendor_id = h.create_vendor(true).await;
    let booking_id = h
        .create_booking(vendor_id, dec!(300.00), ProductKind::DayTrip, days_from_today(40))
        .await;
    h.start_payment(booking_id).await;
    h.exceptions
        .cancel_by_client(booking_id, None, Utc::now().date_naive())
        .await
        .unwrap();

    // 关单后迟到的失败通知不再改状态
    h.exceptions
        .handle_payment_failure(booking_id, Utc::now().date_naive())
        .await
        .unwrap();
    let booking = h.booking(booking_id).await;
    assert_eq!(booking.payment_status, PaymentStatus::Cancelled);
}
