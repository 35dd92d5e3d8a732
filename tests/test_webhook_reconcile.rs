//! 回调对账链路：重复投递、乱序、未知流水、签名异常与手动同步

mod common;

use common::{days_from_today, signed_header, webhook_payload, Harness};
use rust_decimal_macros::dec;
use serde_json::json;

use travel_pay::settlement::domain::status::{
    BookingStatus, EscrowStatus, PaymentStatus, ProductKind, TransactionStatus,
};
use travel_pay::settlement::gateway::PaymentGateway;

#[tokio::test]
async fn test_payment_success_marks_paid_commissions_and_holds() {
    let h = Harness::new();
    let vendor_id = h.create_vendor(true).await;
    let booking_id = h
        .create_booking(vendor_id, dec!(1000.00), ProductKind::MultiDay, days_from_today(60))
        .await;

    let reference = h.pay_booking(booking_id).await;

    let booking = h.booking(booking_id).await;
    assert_eq!(booking.payment_status, PaymentStatus::Succeeded);
    assert_eq!(booking.paid_amount, Some(dec!(1000.00)));
    assert_eq!(booking.paid_currency.as_deref(), Some("usd"));
    assert_eq!(booking.escrow_status, EscrowStatus::Held);

    let tx = h
        .ledger
        .transactions
        .find_by_reference(&reference)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tx.status, TransactionStatus::Succeeded);
    assert_eq!(tx.paid_amount, Some(dec!(1000.00)));

    let calcs = h.ledger.commissions.list_by_booking(booking_id).await.unwrap();
    assert_eq!(calcs.len(), 1);
    assert_eq!(calcs[0].commission_amount, dec!(200.00));
    assert_eq!(calcs[0].vendor_payout, dec!(800.00));
}

#[tokio::test]
async fn test_duplicate_success_delivery_is_idempotent() {
    let h = Harness::new();
    let vendor_id = h.create_vendor(true).await;
    let booking_id = h
        .create_booking(vendor_id, dec!(1000.00), ProductKind::DayTrip, days_from_today(45))
        .await;
    let reference = h.pay_booking(booking_id).await;

    // 同一成功事件再投三次
    for _ in 0..3 {
        h.deliver_intent_event(&reference, "payment_intent.succeeded").await;
    }

    let booking = h.booking(booking_id).await;
    assert_eq!(booking.escrow_status, EscrowStatus::Held);
    assert_eq!(booking.paid_amount, Some(dec!(1000.00)));

    // 流水、佣金都只有一条，且没有第二次转账/划扣发生
    let calcs = h.ledger.commissions.list_by_booking(booking_id).await.unwrap();
    assert_eq!(calcs.len(), 1);
    assert!(h.sim.transfers().is_empty());
}

#[tokio::test]
async fn test_stale_out_of_order_event_cannot_regress_succeeded() {
    let h = Harness::new();
    let vendor_id = h.create_vendor(true).await;
    let booking_id = h
        .create_booking(vendor_id, dec!(500.00), ProductKind::DayTrip, days_from_today(45))
        .await;
    let reference = h.pay_booking(booking_id).await;

    // 迟到的 processing 事件
    let stale = webhook_payload(
        &json!({
            "id": reference,
            "status": "processing",
            "amount": 50000,
            "currency": "usd",
            "metadata": {"booking_id": booking_id.to_string()}
        }),
        "payment_intent.processing",
    );
    let header = signed_header(&stale);
    h.reconciler.handle_event(&stale, Some(&header)).await.unwrap();

    let tx = h
        .ledger
        .transactions
        .find_by_reference(&reference)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tx.status, TransactionStatus::Succeeded);
}

#[tokio::test]
async fn test_unknown_reference_is_acknowledged_without_effect() {
    let h = Harness::new();
    let payload = webhook_payload(
        &json!({
            "id": "pi_ghost",
            "status": "succeeded",
            "amount": 10000,
            "amount_received": 10000,
            "currency": "usd"
        }),
        "payment_intent.succeeded",
    );
    let header = signed_header(&payload);
    // 未知流水不报错，只记日志
    h.reconciler.handle_event(&payload, Some(&header)).await.unwrap();
    assert!(h
        .ledger
        .transactions
        .find_by_reference("pi_ghost")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_bad_signature_still_processed() {
    let h = Harness::new();
    let vendor_id = h.create_vendor(true).await;
    let booking_id = h
        .create_booking(vendor_id, dec!(300.00), ProductKind::DayTrip, days_from_today(45))
        .await;
    let reference = h.start_payment(booking_id).await;
    h.sim.confirm_intent(&reference).unwrap();

    let intent = serde_json::to_value(h.sim.retrieve_intent(&reference).await.unwrap()).unwrap();
    let payload = webhook_payload(&intent, "payment_intent.amount_capturable_updated");

    // 签名完全不对，兼容模式下仍然处理
    h.reconciler
        .handle_event(&payload, Some("t=1,v1=deadbeef"))
        .await
        .unwrap();

    let booking = h.booking(booking_id).await;
    assert_eq!(booking.escrow_status, EscrowStatus::Held);
}

#[tokio::test]
async fn test_non_payment_intent_event_ignored() {
    let h = Harness::new();
    let payload = webhook_payload(&json!({"id": "ch_1"}), "charge.refunded");
    let header = signed_header(&payload);
    h.reconciler.handle_event(&payload, Some(&header)).await.unwrap();
}

#[tokio::test]
async fn test_manual_sync_uses_same_transition_path() {
    let h = Harness::new();
    let vendor_id = h.create_vendor(true).await;
    let booking_id = h
        .create_booking(vendor_id, dec!(800.00), ProductKind::MultiDay, days_from_today(50))
        .await;
    let reference = h.start_payment(booking_id).await;
    h.sim.confirm_intent(&reference).unwrap();

    // 不投回调，直接手动同步
    let tx = h.reconciler.sync_by_reference(&reference).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::Succeeded);

    let booking = h.booking(booking_id).await;
    assert_eq!(booking.payment_status, PaymentStatus::Succeeded);
    assert_eq!(booking.escrow_status, EscrowStatus::Held);
    let calcs = h.ledger.commissions.list_by_booking(booking_id).await.unwrap();
    assert_eq!(calcs.len(), 1);
}

#[tokio::test]
async fn test_payment_failure_far_from_trip_auto_cancels() {
    let h = Harness::new();
    let vendor_id = h.create_vendor(true).await;
    let booking_id = h
        .create_booking(vendor_id, dec!(400.00), ProductKind::DayTrip, days_from_today(40))
        .await;
    let reference = h.start_payment(booking_id).await;

    let payload = webhook_payload(
        &json!({
            "id": reference,
            "status": "payment_failed",
            "amount": 40000,
            "currency": "usd",
            "metadata": {"booking_id": booking_id.to_string()}
        }),
        "payment_intent.payment_failed",
    );
    let header = signed_header(&payload);
    h.reconciler.handle_event(&payload, Some(&header)).await.unwrap();

    let booking = h.booking(booking_id).await;
    assert_eq!(booking.status, BookingStatus::Cancelled);
    assert_eq!(booking.escrow_status, EscrowStatus::Refunded);
    // 从未划扣，不产生网关退款
    assert!(h.sim.refunds().is_empty());
}

#[tokio::test]
async fn test_payment_failure_near_trip_keeps_booking() {
    let h = Harness::new();
    let vendor_id = h.create_vendor(true).await;
    let booking_id = h
        .create_booking(vendor_id, dec!(400.00), ProductKind::DayTrip, days_from_today(10))
        .await;
    let reference = h.start_payment(booking_id).await;

    let payload = webhook_payload(
        &json!({
            "id": reference,
            "status": "payment_failed",
            "amount": 40000,
            "currency": "usd",
            "metadata": {"booking_id": booking_id.to_string()}
        }),
        "payment_intent.payment_failed",
    );
    let header = signed_header(&payload);
    h.reconciler.handle_event(&payload, Some(&header)).await.unwrap();

    let booking = h.booking(booking_id).await;
    assert_eq!(booking.status, BookingStatus::Pending);
    assert_eq!(booking.payment_status, PaymentStatus::Failed);
    assert!(booking.notes.unwrap_or_default().contains("转人工"));
}
