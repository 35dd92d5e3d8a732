//! 内存版台账
//!
//! 本地模拟运行与测试用。语义与 MySQL 版保持一致：
//! 单把互斥锁天然满足"同一订单不被并发写"的串行化要求

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;

use crate::error::AppResult;
use crate::settlement::domain::entities::{
    Booking, CommissionCalculation, NewBooking, NewCommission, NewTransaction, NewVendor,
    PaymentTransaction, Vendor,
};
use crate::settlement::domain::money::round_money;
use crate::settlement::domain::status::{
    BookingStatus, CommissionStatus, EscrowStatus, PaymentStatus, PayoutCadence,
    TransactionStatus,
};
use crate::settlement::store::repository::{
    BookingStore, CommissionStore, GatewayUpdate, StatusApplied, TransactionStore, VendorStore,
};
use crate::time_util::format_ts;

#[derive(Default)]
struct MemoryState {
    bookings: Vec<Booking>,
    transactions: Vec<PaymentTransaction>,
    commissions: Vec<CommissionCalculation>,
    vendors: Vec<Vendor>,
    next_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// 内存台账，同一实例同时充当四个仓储
pub struct MemoryLedger {
    state: Mutex<MemoryState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

fn append_note_text(notes: &mut Option<String>, note: &str, at: DateTime<Utc>) {
    let line = format!("[{}] {}", format_ts(&at), note);
    match notes {
        Some(existing) => {
            existing.push('\n');
            existing.push_str(&line);
        }
        None => *notes = Some(line),
    }
}

#[async_trait]
impl BookingStore for MemoryLedger {
    async fn insert(&self, input: NewBooking) -> AppResult<i64> {
        let mut state = self.state();
        let now = Utc::now();
        let id = state.next_id();
        state.bookings.push(Booking {
            id,
            reference: input.reference,
            client_id: input.client_id,
            vendor_id: input.vendor_id,
            product_kind: input.product_kind,
            trip_start_date: input.trip_start_date,
            amount: round_money(input.amount),
            currency: input.currency,
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            escrow_status: EscrowStatus::Pending,
            paid_amount: None,
            paid_currency: None,
            released_percent: Decimal::ZERO,
            release_percentage_30days: input.release_percentage_30days,
            cancellation_refund_percent: input.cancellation_refund_percent,
            provider_confirmed_at: None,
            client_confirmed_at: None,
            completed_at: None,
            disputed_at: None,
            notes: None,
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    async fn find_by_id(&self, id: i64) -> AppResult<Option<Booking>> {
        Ok(self.state().bookings.iter().find(|b| b.id == id).cloned())
    }

    async fn mark_paid(&self, id: i64, amount: Decimal, currency: &str) -> AppResult<bool> {
        let mut state = self.state();
        let Some(booking) = state.bookings.iter_mut().find(|b| b.id == id) else {
            return Ok(false);
        };
        if !matches!(
            booking.payment_status,
            PaymentStatus::Pending | PaymentStatus::Failed
        ) {
            return Ok(false);
        }
        booking.payment_status = PaymentStatus::Succeeded;
        booking.paid_amount = Some(round_money(amount));
        booking.paid_currency = Some(currency.to_string());
        booking.updated_at = Utc::now();
        Ok(true)
    }

    async fn mark_payment_outcome(&self, id: i64, to: PaymentStatus) -> AppResult<bool> {
        let mut state = self.state();
        let Some(booking) = state.bookings.iter_mut().find(|b| b.id == id) else {
            return Ok(false);
        };
        let movable = matches!(
            booking.payment_status,
            PaymentStatus::Pending | PaymentStatus::Failed
        );
        if !movable || booking.payment_status == to {
            return Ok(false);
        }
        booking.payment_status = to;
        booking.updated_at = Utc::now();
        Ok(true)
    }

    async fn update_escrow_status(
        &self,
        id: i64,
        from: &[EscrowStatus],
        to: EscrowStatus,
    ) -> AppResult<bool> {
        let mut state = self.state();
        let Some(booking) = state.bookings.iter_mut().find(|b| b.id == id) else {
            return Ok(false);
        };
        if !from.contains(&booking.escrow_status) {
            return Ok(false);
        }
        booking.escrow_status = to;
        booking.updated_at = Utc::now();
        Ok(true)
    }

    async fn record_release(
        &self,
        id: i64,
        from: &[EscrowStatus],
        to: EscrowStatus,
        released_percent: Decimal,
    ) -> AppResult<bool> {
        let mut state = self.state();
        let Some(booking) = state.bookings.iter_mut().find(|b| b.id == id) else {
            return Ok(false);
        };
        if !from.contains(&booking.escrow_status) {
            return Ok(false);
        }
        booking.escrow_status = to;
        booking.released_percent = released_percent;
        booking.updated_at = Utc::now();
        Ok(true)
    }

    async fn mark_complete(&self, id: i64, confirmed_at: DateTime<Utc>) -> AppResult<bool> {
        let mut state = self.state();
        let Some(booking) = state.bookings.iter_mut().find(|b| b.id == id) else {
            return Ok(false);
        };
        if !booking.status.is_active() {
            return Ok(false);
        }
        booking.status = BookingStatus::Complete;
        booking.completed_at = Some(confirmed_at);
        if booking.client_confirmed_at.is_none() {
            booking.client_confirmed_at = Some(confirmed_at);
        }
        booking.updated_at = Utc::now();
        Ok(true)
    }

    async fn mark_provider_confirmed(&self, id: i64, at: DateTime<Utc>) -> AppResult<bool> {
        let mut state = self.state();
        let Some(booking) = state.bookings.iter_mut().find(|b| b.id == id) else {
            return Ok(false);
        };
        if booking.status != BookingStatus::Pending || booking.provider_confirmed_at.is_some() {
            return Ok(false);
        }
        booking.status = BookingStatus::Confirmed;
        booking.provider_confirmed_at = Some(at);
        booking.updated_at = Utc::now();
        Ok(true)
    }

    async fn mark_disputed(&self, id: i64, at: DateTime<Utc>) -> AppResult<bool> {
        let mut state = self.state();
        let Some(booking) = state.bookings.iter_mut().find(|b| b.id == id) else {
            return Ok(false);
        };
        if booking.disputed_at.is_some() {
            return Ok(false);
        }
        booking.disputed_at = Some(at);
        booking.updated_at = Utc::now();
        Ok(true)
    }

    async fn clear_dispute(&self, id: i64) -> AppResult<bool> {
        let mut state = self.state();
        let Some(booking) = state.bookings.iter_mut().find(|b| b.id == id) else {
            return Ok(false);
        };
        if booking.disputed_at.is_none() {
            return Ok(false);
        }
        booking.disputed_at = None;
        booking.updated_at = Utc::now();
        Ok(true)
    }

    async fn cancel_and_close(
        &self,
        id: i64,
        payment_status: PaymentStatus,
        note: &str,
    ) -> AppResult<bool> {
        let mut state = self.state();
        let now = Utc::now();
        let Some(pos) = state.bookings.iter().position(|b| b.id == id) else {
            return Ok(false);
        };
        {
            let booking = &mut state.bookings[pos];
            if booking.status == BookingStatus::Cancelled
                || booking.escrow_status.is_terminal()
            {
                return Ok(false);
            }
            booking.status = BookingStatus::Cancelled;
            booking.escrow_status = EscrowStatus::Refunded;
            booking.payment_status = payment_status;
            append_note_text(&mut booking.notes, note, now);
            booking.updated_at = now;
        }
        for calc in state
            .commissions
            .iter_mut()
            .filter(|c| c.booking_id == id && c.deleted_at.is_none())
        {
            if calc.status != CommissionStatus::Paid {
                calc.status = CommissionStatus::Cancelled;
                calc.updated_at = now;
            }
        }
        Ok(true)
    }

    async fn append_note(&self, id: i64, note: &str) -> AppResult<()> {
        let mut state = self.state();
        if let Some(booking) = state.bookings.iter_mut().find(|b| b.id == id) {
            append_note_text(&mut booking.notes, note, Utc::now());
            booking.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn list_weekly_payout_candidates(
        &self,
        completed_after: DateTime<Utc>,
    ) -> AppResult<Vec<Booking>> {
        let state = self.state();
        let out = state
            .bookings
            .iter()
            .filter(|b| {
                b.status == BookingStatus::Complete
                    && b.payment_status == PaymentStatus::Succeeded
                    && matches!(
                        b.escrow_status,
                        EscrowStatus::Held | EscrowStatus::ReleasedPartial
                    )
                    && b.completed_at.map(|t| t >= completed_after).unwrap_or(false)
                    && state
                        .vendors
                        .iter()
                        .any(|v| v.id == b.vendor_id && v.payout_cadence == PayoutCadence::Weekly)
            })
            .cloned()
            .collect();
        Ok(out)
    }

    async fn list_partial_release_candidates(
        &self,
        start_on_or_before: NaiveDate,
    ) -> AppResult<Vec<Booking>> {
        let state = self.state();
        let out = state
            .bookings
            .iter()
            .filter(|b| {
                b.status.is_active()
                    && b.payment_status == PaymentStatus::Succeeded
                    && b.escrow_status == EscrowStatus::Held
                    && b.trip_start_date <= start_on_or_before
            })
            .cloned()
            .collect();
        Ok(out)
    }

    async fn list_auto_confirm_candidates(&self) -> AppResult<Vec<Booking>> {
        let state = self.state();
        let out = state
            .bookings
            .iter()
            .filter(|b| {
                b.status.is_active()
                    && b.payment_status == PaymentStatus::Succeeded
                    && b.provider_confirmed_at.is_some()
                    && b.client_confirmed_at.is_none()
            })
            .cloned()
            .collect();
        Ok(out)
    }

    async fn list_escrowed_by_vendor(&self, vendor_id: i64) -> AppResult<Vec<Booking>> {
        let state = self.state();
        let out = state
            .bookings
            .iter()
            .filter(|b| {
                b.vendor_id == vendor_id
                    && matches!(
                        b.escrow_status,
                        EscrowStatus::Held | EscrowStatus::ReleasedPartial
                    )
            })
            .cloned()
            .collect();
        Ok(out)
    }
}

#[async_trait]
impl TransactionStore for MemoryLedger {
    async fn insert_pending(&self, input: NewTransaction) -> AppResult<i64> {
        let mut state = self.state();
        let now = Utc::now();
        let id = state.next_id();
        state.transactions.push(PaymentTransaction {
            id,
            booking_id: input.booking_id,
            reference_number: input.reference_number,
            status: TransactionStatus::Pending,
            amount: round_money(input.amount),
            currency: input.currency,
            paid_amount: None,
            paid_currency: None,
            raw_status: input.raw_status,
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    async fn find_by_reference(&self, reference: &str) -> AppResult<Option<PaymentTransaction>> {
        Ok(self
            .state()
            .transactions
            .iter()
            .find(|t| t.reference_number == reference)
            .cloned())
    }

    async fn find_latest_by_booking(
        &self,
        booking_id: i64,
    ) -> AppResult<Option<PaymentTransaction>> {
        Ok(self
            .state()
            .transactions
            .iter()
            .filter(|t| t.booking_id == booking_id)
            .max_by_key(|t| t.id)
            .cloned())
    }

    async fn apply_gateway_update(
        &self,
        update: GatewayUpdate<'_>,
    ) -> AppResult<Option<StatusApplied>> {
        let mut state = self.state();
        let Some(tx) = state
            .transactions
            .iter_mut()
            .find(|t| t.reference_number == update.reference_number)
        else {
            return Ok(None);
        };

        let prev = tx.status;
        // 成功是流水的单向终态，过期的乱序事件不允许把它写回去
        if prev == TransactionStatus::Succeeded && update.status != TransactionStatus::Succeeded {
            return Ok(Some(StatusApplied {
                booking_id: tx.booking_id,
                changed: false,
                first_succeeded: false,
            }));
        }

        tx.status = update.status;
        tx.raw_status = update.raw_status.to_string();
        if let Some(paid) = update.paid_amount {
            tx.paid_amount = Some(round_money(paid));
        }
        if let Some(currency) = update.paid_currency {
            tx.paid_currency = Some(currency.to_string());
        }
        tx.updated_at = Utc::now();

        Ok(Some(StatusApplied {
            booking_id: tx.booking_id,
            changed: prev != update.status,
            first_succeeded: update.status == TransactionStatus::Succeeded
                && prev != TransactionStatus::Succeeded,
        }))
    }
}

#[async_trait]
impl CommissionStore for MemoryLedger {
    async fn insert_if_absent(&self, input: NewCommission) -> AppResult<bool> {
        let mut state = self.state();
        let exists = state.commissions.iter().any(|c| {
            c.booking_id == input.booking_id
                && c.recipient_id == input.recipient_id
                && c.deleted_at.is_none()
        });
        if exists {
            return Ok(false);
        }
        let now = Utc::now();
        let id = state.next_id();
        state.commissions.push(CommissionCalculation {
            id,
            booking_id: input.booking_id,
            recipient_id: input.recipient_id,
            base_amount: round_money(input.base_amount),
            rate: input.rate,
            commission_amount: round_money(input.commission_amount),
            vendor_payout: round_money(input.vendor_payout),
            currency: input.currency,
            status: CommissionStatus::Pending,
            approved_at: None,
            disputed_at: None,
            paid_at: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        });
        Ok(true)
    }

    async fn find_active(
        &self,
        booking_id: i64,
        recipient_id: i64,
    ) -> AppResult<Option<CommissionCalculation>> {
        Ok(self
            .state()
            .commissions
            .iter()
            .find(|c| {
                c.booking_id == booking_id
                    && c.recipient_id == recipient_id
                    && c.deleted_at.is_none()
            })
            .cloned())
    }

    async fn list_by_booking(&self, booking_id: i64) -> AppResult<Vec<CommissionCalculation>> {
        Ok(self
            .state()
            .commissions
            .iter()
            .filter(|c| c.booking_id == booking_id && c.deleted_at.is_none())
            .cloned()
            .collect())
    }

    async fn set_status(
        &self,
        id: i64,
        from: &[CommissionStatus],
        to: CommissionStatus,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let mut state = self.state();
        let Some(calc) = state
            .commissions
            .iter_mut()
            .find(|c| c.id == id && c.deleted_at.is_none())
        else {
            return Ok(false);
        };
        if !from.contains(&calc.status) {
            return Ok(false);
        }
        calc.status = to;
        match to {
            CommissionStatus::Approved => calc.approved_at = Some(at),
            CommissionStatus::Disputed => calc.disputed_at = Some(at),
            CommissionStatus::Paid => calc.paid_at = Some(at),
            _ => {}
        }
        calc.updated_at = at;
        Ok(true)
    }

    async fn mark_disputed_for_booking(
        &self,
        booking_id: i64,
        at: DateTime<Utc>,
    ) -> AppResult<u64> {
        let mut state = self.state();
        let mut count = 0;
        for calc in state.commissions.iter_mut().filter(|c| {
            c.booking_id == booking_id
                && c.deleted_at.is_none()
                && matches!(
                    c.status,
                    CommissionStatus::Pending | CommissionStatus::Approved
                )
        }) {
            calc.status = CommissionStatus::Disputed;
            calc.disputed_at = Some(at);
            calc.updated_at = at;
            count += 1;
        }
        Ok(count)
    }

    async fn restore_for_booking(
        &self,
        booking_id: i64,
        to: CommissionStatus,
    ) -> AppResult<u64> {
        let mut state = self.state();
        let now = Utc::now();
        let mut count = 0;
        for calc in state.commissions.iter_mut().filter(|c| {
            c.booking_id == booking_id
                && c.deleted_at.is_none()
                && c.status == CommissionStatus::Disputed
        }) {
            calc.status = to;
            if to == CommissionStatus::Approved {
                calc.approved_at = Some(now);
            }
            calc.updated_at = now;
            count += 1;
        }
        Ok(count)
    }

    async fn cancel_for_booking(&self, booking_id: i64) -> AppResult<u64> {
        let mut state = self.state();
        let now = Utc::now();
        let mut count = 0;
        for calc in state.commissions.iter_mut().filter(|c| {
            c.booking_id == booking_id
                && c.deleted_at.is_none()
                && c.status != CommissionStatus::Paid
                && c.status != CommissionStatus::Cancelled
        }) {
            calc.status = CommissionStatus::Cancelled;
            calc.updated_at = now;
            count += 1;
        }
        Ok(count)
    }
}

#[async_trait]
impl VendorStore for MemoryLedger {
    async fn insert(&self, input: NewVendor) -> AppResult<i64> {
        let mut state = self.state();
        let now = Utc::now();
        let id = state.next_id();
        state.vendors.push(Vendor {
            id,
            display_name: input.display_name,
            gateway_account_id: input.gateway_account_id,
            payout_cadence: input.payout_cadence,
            commission_rate: input.commission_rate,
            created_at: now,
            updated_at: now,
        });
        Ok(id)
    }

    async fn find_by_id(&self, id: i64) -> AppResult<Option<Vendor>> {
        Ok(self.state().vendors.iter().find(|v| v.id == id).cloned())
    }

    async fn set_gateway_account(&self, id: i64, account_id: &str) -> AppResult<bool> {
        let mut state = self.state();
        let Some(vendor) = state.vendors.iter_mut().find(|v| v.id == id) else {
            return Ok(false);
        };
        vendor.gateway_account_id = Some(account_id.to_string());
        vendor.updated_at = Utc::now();
        Ok(true)
    }
}
