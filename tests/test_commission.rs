//! 佣金：一单一条、费率解析、审批流转与现场补算

mod common;

use common::{days_from_today, Harness};
use rust_decimal_macros::dec;

use travel_pay::error::AppError;
use travel_pay::settlement::domain::rate::CommissionRate;
use travel_pay::settlement::domain::status::{CommissionStatus, PayoutCadence, ProductKind};

#[tokio::test]
async fn test_recalculation_returns_existing_record() {
    let h = Harness::new();
    let vendor_id = h.create_vendor(true).await;
    let booking_id = h
        .create_booking(vendor_id, dec!(1000.00), ProductKind::DayTrip, days_from_today(45))
        .await;
    h.pay_booking(booking_id).await;

    let booking = h.booking(booking_id).await;
    let first = h.commissions.calculate_for_booking(&booking).await.unwrap();
    let second = h.commissions.calculate_for_booking(&booking).await.unwrap();
    assert_eq!(first.id, second.id);
    assert_eq!(first.commission_amount, dec!(200.00));

    let calcs = h.ledger.commissions.list_by_booking(booking_id).await.unwrap();
    assert_eq!(calcs.len(), 1);
}

#[tokio::test]
async fn test_vendor_override_rate_wins() {
    let h = Harness::new();
    let vendor_id = h
        .create_vendor_with(
            true,
            PayoutCadence::Weekly,
            Some(CommissionRate::Percentage { percent: dec!(10) }),
        )
        .await;
    let booking_id = h
        .create_booking(vendor_id, dec!(1000.00), ProductKind::DayTrip, days_from_today(45))
        .await;
    h.pay_booking(booking_id).await;

    let calc = h
        .ledger
        .commissions
        .find_active(booking_id, vendor_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(calc.commission_amount, dec!(100.00));
    assert_eq!(calc.vendor_payout, dec!(900.00));
}

#[tokio::test]
async fn test_fixed_rate_vendor() {
    let h = Harness::new();
    let vendor_id = h
        .create_vendor_with(
            true,
            PayoutCadence::Weekly,
            Some(CommissionRate::Fixed { amount: dec!(75) }),
        )
        .await;
    let booking_id = h
        .create_booking(vendor_id, dec!(400.00), ProductKind::MultiDay, days_from_today(45))
        .await;
    h.pay_booking(booking_id).await;

    let calc = h
        .ledger
        .commissions
        .find_active(booking_id, vendor_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(calc.commission_amount, dec!(75.00));
    assert_eq!(calc.vendor_payout, dec!(325.00));
}

#[tokio::test]
async fn test_unpaid_booking_cannot_be_commissioned() {
    let h = Harness::new();
    let vendor_id = h.create_vendor(true).await;
    let booking_id = h
        .create_booking(vendor_id, dec!(400.00), ProductKind::DayTrip, days_from_today(45))
        .await;

    let booking = h.booking(booking_id).await;
    let err = h.commissions.calculate_for_booking(&booking).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
}

#[tokio::test]
async fn test_approve_moves_pending_once() {
    let h = Harness::new();
    let vendor_id = h.create_vendor(true).await;
    let booking_id = h
        .create_booking(vendor_id, dec!(1000.00), ProductKind::DayTrip, days_from_today(45))
        .await;
    h.pay_booking(booking_id).await;

    let calc = h
        .ledger
        .commissions
        .find_active(booking_id, vendor_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(calc.status, CommissionStatus::Pending);

    h.commissions.approve(calc.id).await.unwrap();
    let approved = h
        .ledger
        .commissions
        .find_active(booking_id, vendor_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(approved.status, CommissionStatus::Approved);
    assert!(approved.approved_at.is_some());

    // 重复审批被拒
    let err = h.commissions.approve(calc.id).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));
}

#[tokio::test]
async fn test_ensure_backfills_missing_record() {
    let h = Harness::new();
    let vendor_id = h.create_vendor(true).await;
    let booking_id = h
        .create_booking(vendor_id, dec!(500.00), ProductKind::DayTrip, days_from_today(45))
        .await;

    // 绕过回调直接落支付结果，模拟佣金步骤丢失的历史单
    h.ledger
        .bookings
        .mark_paid(booking_id, dec!(500.00), "usd")
        .await
        .unwrap();
    let booking = h.booking(booking_id).await;

    let calc = h.commissions.ensure_for_booking(&booking).await.unwrap();
    assert_eq!(calc.commission_amount, dec!(100.00));
    assert_eq!(
        h.ledger
            .commissions
            .list_by_booking(booking_id)
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_cancelled_booking_voids_unpaid_commission() {
    let h = Harness::new();
    let vendor_id = h.create_vendor(true).await;
    let booking_id = h
        .create_booking(vendor_id, dec!(1000.00), ProductKind::DayTrip, days_from_today(45))
        .await;
    h.pay_booking(booking_id).await;

    h.exceptions.cancel_by_provider(booking_id, Some("无法成团")).await.unwrap();

    let calc = h
        .ledger
        .commissions
        .find_active(booking_id, vendor_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(calc.status, CommissionStatus::Cancelled);
}
