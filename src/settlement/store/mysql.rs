//! MySQL 版台账实现
//!
//! 对应数据库表 `bookings` / `payment_transactions` / `commission_calculations` / `vendors`

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, MySql, Pool};
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::settlement::domain::entities::{
    Booking, CommissionCalculation, NewBooking, NewCommission, NewTransaction, NewVendor,
    PaymentTransaction, Vendor,
};
use crate::settlement::domain::money::round_money;
use crate::settlement::domain::rate::CommissionRate;
use crate::settlement::domain::status::{CommissionStatus, EscrowStatus, PaymentStatus, TransactionStatus};
use crate::settlement::store::repository::{
    BookingStore, CommissionStore, GatewayUpdate, StatusApplied, TransactionStore, VendorStore,
};
use crate::time_util::format_ts;

/// 订单数据库实体
#[derive(Debug, Clone, FromRow)]
pub struct BookingEntity {
    pub id: i64,
    pub reference: String,
    pub client_id: i64,
    pub vendor_id: i64,
    pub product_kind: String,
    pub trip_start_date: NaiveDate,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    pub payment_status: String,
    pub escrow_status: String,
    pub paid_amount: Option<Decimal>,
    pub paid_currency: Option<String>,
    pub released_percent: Decimal,
    pub release_percentage_30days: Option<Decimal>,
    pub cancellation_refund_percent: Option<Decimal>,
    pub provider_confirmed_at: Option<NaiveDateTime>,
    pub client_confirmed_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
    pub disputed_at: Option<NaiveDateTime>,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl BookingEntity {
    /// 转换为领域实体
    pub fn to_domain(&self) -> AppResult<Booking> {
        Ok(Booking {
            id: self.id,
            reference: self.reference.clone(),
            client_id: self.client_id,
            vendor_id: self.vendor_id,
            product_kind: self.product_kind.parse()?,
            trip_start_date: self.trip_start_date,
            amount: self.amount,
            currency: self.currency.clone(),
            status: self.status.parse()?,
            payment_status: self.payment_status.parse()?,
            escrow_status: self.escrow_status.parse()?,
            paid_amount: self.paid_amount,
            paid_currency: self.paid_currency.clone(),
            released_percent: self.released_percent,
            release_percentage_30days: self.release_percentage_30days,
            cancellation_refund_percent: self.cancellation_refund_percent,
            provider_confirmed_at: self.provider_confirmed_at.map(|dt| Utc.from_utc_datetime(&dt)),
            client_confirmed_at: self.client_confirmed_at.map(|dt| Utc.from_utc_datetime(&dt)),
            completed_at: self.completed_at.map(|dt| Utc.from_utc_datetime(&dt)),
            disputed_at: self.disputed_at.map(|dt| Utc.from_utc_datetime(&dt)),
            notes: self.notes.clone(),
            created_at: Utc.from_utc_datetime(&self.created_at),
            updated_at: Utc.from_utc_datetime(&self.updated_at),
        })
    }
}

/// 支付流水数据库实体
#[derive(Debug, Clone, FromRow)]
pub struct TransactionEntity {
    pub id: i64,
    pub booking_id: i64,
    pub reference_number: String,
    pub status: String,
    pub amount: Decimal,
    pub currency: String,
    pub paid_amount: Option<Decimal>,
    pub paid_currency: Option<String>,
    pub raw_status: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl TransactionEntity {
    pub fn to_domain(&self) -> AppResult<PaymentTransaction> {
        Ok(PaymentTransaction {
            id: self.id,
            booking_id: self.booking_id,
            reference_number: self.reference_number.clone(),
            status: self.status.parse()?,
            amount: self.amount,
            currency: self.currency.clone(),
            paid_amount: self.paid_amount,
            paid_currency: self.paid_currency.clone(),
            raw_status: self.raw_status.clone(),
            created_at: Utc.from_utc_datetime(&self.created_at),
            updated_at: Utc.from_utc_datetime(&self.updated_at),
        })
    }
}

/// 分佣计算数据库实体，rate_config 列存 JSON
#[derive(Debug, Clone, FromRow)]
pub struct CommissionEntity {
    pub id: i64,
    pub booking_id: i64,
    pub recipient_id: i64,
    pub base_amount: Decimal,
    pub rate_config: String,
    pub commission_amount: Decimal,
    pub vendor_payout: Decimal,
    pub currency: String,
    pub status: String,
    pub approved_at: Option<NaiveDateTime>,
    pub disputed_at: Option<NaiveDateTime>,
    pub paid_at: Option<NaiveDateTime>,
    pub deleted_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl CommissionEntity {
    pub fn to_domain(&self) -> AppResult<CommissionCalculation> {
        let rate: CommissionRate = serde_json::from_str(&self.rate_config)?;
        Ok(CommissionCalculation {
            id: self.id,
            booking_id: self.booking_id,
            recipient_id: self.recipient_id,
            base_amount: self.base_amount,
            rate,
            commission_amount: self.commission_amount,
            vendor_payout: self.vendor_payout,
            currency: self.currency.clone(),
            status: self.status.parse()?,
            approved_at: self.approved_at.map(|dt| Utc.from_utc_datetime(&dt)),
            disputed_at: self.disputed_at.map(|dt| Utc.from_utc_datetime(&dt)),
            paid_at: self.paid_at.map(|dt| Utc.from_utc_datetime(&dt)),
            deleted_at: self.deleted_at.map(|dt| Utc.from_utc_datetime(&dt)),
            created_at: Utc.from_utc_datetime(&self.created_at),
            updated_at: Utc.from_utc_datetime(&self.updated_at),
        })
    }
}

/// 收款方数据库实体
#[derive(Debug, Clone, FromRow)]
pub struct VendorEntity {
    pub id: i64,
    pub display_name: String,
    pub gateway_account_id: Option<String>,
    pub payout_cadence: String,
    pub commission_config: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl VendorEntity {
    pub fn to_domain(&self) -> AppResult<Vendor> {
        let commission_rate = match &self.commission_config {
            Some(raw) => Some(serde_json::from_str::<CommissionRate>(raw)?),
            None => None,
        };
        Ok(Vendor {
            id: self.id,
            display_name: self.display_name.clone(),
            gateway_account_id: self.gateway_account_id.clone(),
            payout_cadence: self.payout_cadence.parse()?,
            commission_rate,
            created_at: Utc.from_utc_datetime(&self.created_at),
            updated_at: Utc.from_utc_datetime(&self.updated_at),
        })
    }
}

const BOOKING_COLUMNS: &str = "id, reference, client_id, vendor_id, product_kind, trip_start_date, \
     amount, currency, status, payment_status, escrow_status, paid_amount, paid_currency, \
     released_percent, release_percentage_30days, cancellation_refund_percent, \
     provider_confirmed_at, client_confirmed_at, completed_at, disputed_at, notes, \
     created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, booking_id, reference_number, status, amount, currency, \
     paid_amount, paid_currency, raw_status, created_at, updated_at";

const COMMISSION_COLUMNS: &str = "id, booking_id, recipient_id, base_amount, rate_config, \
     commission_amount, vendor_payout, currency, status, approved_at, disputed_at, paid_at, \
     deleted_at, created_at, updated_at";

/// MySQL 台账，同一实例同时充当四个仓储
pub struct MysqlLedger {
    pool: Pool<MySql>,
}

impl MysqlLedger {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    /// 获取数据库连接池引用
    pub fn pool(&self) -> &Pool<MySql> {
        &self.pool
    }
}

#[async_trait]
impl BookingStore for MysqlLedger {
    async fn insert(&self, input: NewBooking) -> AppResult<i64> {
        info!(
            "创建订单: reference={}, vendor_id={}, trip_start={}",
            input.reference, input.vendor_id, input.trip_start_date
        );

        let result = sqlx::query(
            r#"INSERT INTO bookings
               (reference, client_id, vendor_id, product_kind, trip_start_date,
                amount, currency, status, payment_status, escrow_status,
                release_percentage_30days, cancellation_refund_percent,
                created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', 'pending', 'pending', ?, ?, NOW(), NOW())"#,
        )
        .bind(&input.reference)
        .bind(input.client_id)
        .bind(input.vendor_id)
        .bind(input.product_kind.as_str())
        .bind(input.trip_start_date)
        .bind(round_money(input.amount))
        .bind(&input.currency)
        .bind(input.release_percentage_30days)
        .bind(input.cancellation_refund_percent)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_id() as i64)
    }

    async fn find_by_id(&self, id: i64) -> AppResult<Option<Booking>> {
        let sql = format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ? LIMIT 1");
        let entity = sqlx::query_as::<_, BookingEntity>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        entity.map(|e| e.to_domain()).transpose()
    }

    async fn mark_paid(&self, id: i64, amount: Decimal, currency: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r#"UPDATE bookings
               SET payment_status = 'succeeded', paid_amount = ?, paid_currency = ?, updated_at = NOW()
               WHERE id = ? AND payment_status IN ('pending', 'failed')"#,
        )
        .bind(round_money(amount))
        .bind(currency)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_payment_outcome(&self, id: i64, to: PaymentStatus) -> AppResult<bool> {
        let result = sqlx::query(
            r#"UPDATE bookings
               SET payment_status = ?, updated_at = NOW()
               WHERE id = ? AND payment_status IN ('pending', 'failed') AND payment_status <> ?"#,
        )
        .bind(to.as_str())
        .bind(id)
        .bind(to.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_escrow_status(
        &self,
        id: i64,
        from: &[EscrowStatus],
        to: EscrowStatus,
    ) -> AppResult<bool> {
        if from.is_empty() {
            return Ok(false);
        }
        let placeholders = vec!["?"; from.len()].join(", ");
        let sql = format!(
            "UPDATE bookings SET escrow_status = ?, updated_at = NOW() \
             WHERE id = ? AND escrow_status IN ({placeholders})"
        );

        let mut query = sqlx::query(&sql).bind(to.as_str()).bind(id);
        for status in from {
            query = query.bind(status.as_str());
        }
        let result = query.execute(&self.pool).await?;

        debug!(
            "托管状态 CAS: booking_id={}, to={}, applied={}",
            id,
            to.as_str(),
            result.rows_affected() > 0
        );
        Ok(result.rows_affected() > 0)
    }

    async fn record_release(
        &self,
        id: i64,
        from: &[EscrowStatus],
        to: EscrowStatus,
        released_percent: Decimal,
    ) -> AppResult<bool> {
        if from.is_empty() {
            return Ok(false);
        }
        let placeholders = vec!["?"; from.len()].join(", ");
        let sql = format!(
            "UPDATE bookings SET escrow_status = ?, released_percent = ?, updated_at = NOW() \
             WHERE id = ? AND escrow_status IN ({placeholders})"
        );

        let mut query = sqlx::query(&sql)
            .bind(to.as_str())
            .bind(released_percent)
            .bind(id);
        for status in from {
            query = query.bind(status.as_str());
        }
        let result = query.execute(&self.pool).await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_complete(&self, id: i64, confirmed_at: DateTime<Utc>) -> AppResult<bool> {
        let result = sqlx::query(
            r#"UPDATE bookings
               SET status = 'complete', completed_at = ?,
                   client_confirmed_at = COALESCE(client_confirmed_at, ?), updated_at = NOW()
               WHERE id = ? AND status IN ('pending', 'confirmed')"#,
        )
        .bind(confirmed_at.naive_utc())
        .bind(confirmed_at.naive_utc())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_provider_confirmed(&self, id: i64, at: DateTime<Utc>) -> AppResult<bool> {
        let result = sqlx::query(
            r#"UPDATE bookings
               SET status = 'confirmed', provider_confirmed_at = ?, updated_at = NOW()
               WHERE id = ? AND status = 'pending' AND provider_confirmed_at IS NULL"#,
        )
        .bind(at.naive_utc())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_disputed(&self, id: i64, at: DateTime<Utc>) -> AppResult<bool> {
        let result = sqlx::query(
            r#"UPDATE bookings
               SET disputed_at = ?, updated_at = NOW()
               WHERE id = ? AND disputed_at IS NULL"#,
        )
        .bind(at.naive_utc())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear_dispute(&self, id: i64) -> AppResult<bool> {
        let result = sqlx::query(
            r#"UPDATE bookings
               SET disputed_at = NULL, updated_at = NOW()
               WHERE id = ? AND disputed_at IS NOT NULL"#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn cancel_and_close(
        &self,
        id: i64,
        payment_status: PaymentStatus,
        note: &str,
    ) -> AppResult<bool> {
        let now = Utc::now();
        let note_line = format!("[{}] {}", format_ts(&now), note);
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"UPDATE bookings
               SET status = 'cancelled', escrow_status = 'refunded', payment_status = ?,
                   notes = CONCAT(COALESCE(CONCAT(notes, '\n'), ''), ?), updated_at = NOW()
               WHERE id = ? AND status <> 'cancelled'
                 AND escrow_status NOT IN ('released_full', 'refunded')"#,
        )
        .bind(payment_status.as_str())
        .bind(&note_line)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query(
            r#"UPDATE commission_calculations
               SET status = 'cancelled', updated_at = NOW()
               WHERE booking_id = ? AND deleted_at IS NULL AND status <> 'paid'"#,
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!("订单关闭: booking_id={}, payment_status={}", id, payment_status.as_str());
        Ok(true)
    }

    async fn append_note(&self, id: i64, note: &str) -> AppResult<()> {
        let note_line = format!("[{}] {}", format_ts(&Utc::now()), note);
        sqlx::query(
            r#"UPDATE bookings
               SET notes = CONCAT(COALESCE(CONCAT(notes, '\n'), ''), ?), updated_at = NOW()
               WHERE id = ?"#,
        )
        .bind(&note_line)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_weekly_payout_candidates(
        &self,
        completed_after: DateTime<Utc>,
    ) -> AppResult<Vec<Booking>> {
        let sql = format!(
            "SELECT b.{} FROM bookings b \
             JOIN vendors v ON v.id = b.vendor_id \
             WHERE b.status = 'complete' AND b.payment_status = 'succeeded' \
               AND b.escrow_status IN ('held', 'released_partial') \
               AND b.completed_at >= ? AND v.payout_cadence = 'weekly' \
             ORDER BY b.completed_at ASC",
            BOOKING_COLUMNS.replace(", ", ", b.")
        );
        let entities = sqlx::query_as::<_, BookingEntity>(&sql)
            .bind(completed_after.naive_utc())
            .fetch_all(&self.pool)
            .await?;

        entities.iter().map(|e| e.to_domain()).collect()
    }

    async fn list_partial_release_candidates(
        &self,
        start_on_or_before: NaiveDate,
    ) -> AppResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE status IN ('pending', 'confirmed') AND payment_status = 'succeeded' \
               AND escrow_status = 'held' AND trip_start_date <= ? \
             ORDER BY trip_start_date ASC"
        );
        let entities = sqlx::query_as::<_, BookingEntity>(&sql)
            .bind(start_on_or_before)
            .fetch_all(&self.pool)
            .await?;

        entities.iter().map(|e| e.to_domain()).collect()
    }

    async fn list_auto_confirm_candidates(&self) -> AppResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE status IN ('pending', 'confirmed') AND payment_status = 'succeeded' \
               AND provider_confirmed_at IS NOT NULL AND client_confirmed_at IS NULL \
             ORDER BY provider_confirmed_at ASC"
        );
        let entities = sqlx::query_as::<_, BookingEntity>(&sql)
            .fetch_all(&self.pool)
            .await?;

        entities.iter().map(|e| e.to_domain()).collect()
    }

    async fn list_escrowed_by_vendor(&self, vendor_id: i64) -> AppResult<Vec<Booking>> {
        let sql = format!(
            "SELECT {BOOKING_COLUMNS} FROM bookings \
             WHERE vendor_id = ? AND escrow_status IN ('held', 'released_partial') \
             ORDER BY trip_start_date ASC"
        );
        let entities = sqlx::query_as::<_, BookingEntity>(&sql)
            .bind(vendor_id)
            .fetch_all(&self.pool)
            .await?;

        entities.iter().map(|e| e.to_domain()).collect()
    }
}

#[async_trait]
impl TransactionStore for MysqlLedger {
    async fn insert_pending(&self, input: NewTransaction) -> AppResult<i64> {
        debug!(
            "登记支付流水: booking_id={}, reference={}",
            input.booking_id, input.reference_number
        );

        let result = sqlx::query(
            r#"INSERT INTO payment_transactions
               (booking_id, reference_number, status, amount, currency, raw_status,
                created_at, updated_at)
               VALUES (?, ?, 'pending', ?, ?, ?, NOW(), NOW())"#,
        )
        .bind(input.booking_id)
        .bind(&input.reference_number)
        .bind(round_money(input.amount))
        .bind(&input.currency)
        .bind(&input.raw_status)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_id() as i64)
    }

    async fn find_by_reference(&self, reference: &str) -> AppResult<Option<PaymentTransaction>> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM payment_transactions \
             WHERE reference_number = ? LIMIT 1"
        );
        let entity = sqlx::query_as::<_, TransactionEntity>(&sql)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?;

        entity.map(|e| e.to_domain()).transpose()
    }

    async fn find_latest_by_booking(
        &self,
        booking_id: i64,
    ) -> AppResult<Option<PaymentTransaction>> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM payment_transactions \
             WHERE booking_id = ? ORDER BY id DESC LIMIT 1"
        );
        let entity = sqlx::query_as::<_, TransactionEntity>(&sql)
            .bind(booking_id)
            .fetch_optional(&self.pool)
            .await?;

        entity.map(|e| e.to_domain()).transpose()
    }

    async fn apply_gateway_update(
        &self,
        update: GatewayUpdate<'_>,
    ) -> AppResult<Option<StatusApplied>> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM payment_transactions \
             WHERE reference_number = ? LIMIT 1 FOR UPDATE"
        );
        let Some(entity) = sqlx::query_as::<_, TransactionEntity>(&sql)
            .bind(update.reference_number)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };

        let prev: TransactionStatus = entity.status.parse()?;
        // 成功是流水的单向终态，过期的乱序事件不允许把它写回去
        if prev == TransactionStatus::Succeeded && update.status != TransactionStatus::Succeeded {
            return Ok(Some(StatusApplied {
                booking_id: entity.booking_id,
                changed: false,
                first_succeeded: false,
            }));
        }

        sqlx::query(
            r#"UPDATE payment_transactions
               SET status = ?, raw_status = ?,
                   paid_amount = COALESCE(?, paid_amount),
                   paid_currency = COALESCE(?, paid_currency),
                   updated_at = NOW()
               WHERE id = ?"#,
        )
        .bind(update.status.as_str())
        .bind(update.raw_status)
        .bind(update.paid_amount.map(round_money))
        .bind(update.paid_currency)
        .bind(entity.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(StatusApplied {
            booking_id: entity.booking_id,
            changed: prev != update.status,
            first_succeeded: update.status == TransactionStatus::Succeeded
                && prev != TransactionStatus::Succeeded,
        }))
    }
}

#[async_trait]
impl CommissionStore for MysqlLedger {
    async fn insert_if_absent(&self, input: NewCommission) -> AppResult<bool> {
        let rate_config = serde_json::to_string(&input.rate)?;

        // uk_booking_recipient 唯一键兜底并发重复计算
        let result = sqlx::query(
            r#"INSERT INTO commission_calculations
               (booking_id, recipient_id, base_amount, rate_config, commission_amount,
                vendor_payout, currency, status, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', NOW(), NOW())"#,
        )
        .bind(input.booking_id)
        .bind(input.recipient_id)
        .bind(round_money(input.base_amount))
        .bind(&rate_config)
        .bind(round_money(input.commission_amount))
        .bind(round_money(input.vendor_payout))
        .bind(&input.currency)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                debug!(
                    "分佣已存在，跳过: booking_id={}, recipient_id={}",
                    input.booking_id, input.recipient_id
                );
                Ok(false)
            }
            Err(e) => Err(AppError::from(e)),
        }
    }

    async fn find_active(
        &self,
        booking_id: i64,
        recipient_id: i64,
    ) -> AppResult<Option<CommissionCalculation>> {
        let sql = format!(
            "SELECT {COMMISSION_COLUMNS} FROM commission_calculations \
             WHERE booking_id = ? AND recipient_id = ? AND deleted_at IS NULL LIMIT 1"
        );
        let entity = sqlx::query_as::<_, CommissionEntity>(&sql)
            .bind(booking_id)
            .bind(recipient_id)
            .fetch_optional(&self.pool)
            .await?;

        entity.map(|e| e.to_domain()).transpose()
    }

    async fn list_by_booking(&self, booking_id: i64) -> AppResult<Vec<CommissionCalculation>> {
        let sql = format!(
            "SELECT {COMMISSION_COLUMNS} FROM commission_calculations \
             WHERE booking_id = ? AND deleted_at IS NULL ORDER BY id ASC"
        );
        let entities = sqlx::query_as::<_, CommissionEntity>(&sql)
            .bind(booking_id)
            .fetch_all(&self.pool)
            .await?;

        entities.iter().map(|e| e.to_domain()).collect()
    }

    async fn set_status(
        &self,
        id: i64,
        from: &[CommissionStatus],
        to: CommissionStatus,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        if from.is_empty() {
            return Ok(false);
        }
        let stamp = match to {
            CommissionStatus::Approved => ", approved_at = ?",
            CommissionStatus::Disputed => ", disputed_at = ?",
            CommissionStatus::Paid => ", paid_at = ?",
            _ => "",
        };
        let placeholders = vec!["?"; from.len()].join(", ");
        let sql = format!(
            "UPDATE commission_calculations SET status = ?{stamp}, updated_at = NOW() \
             WHERE id = ? AND deleted_at IS NULL AND status IN ({placeholders})"
        );

        let mut query = sqlx::query(&sql).bind(to.as_str());
        if !stamp.is_empty() {
            query = query.bind(at.naive_utc());
        }
        query = query.bind(id);
        for status in from {
            query = query.bind(status.as_str());
        }
        let result = query.execute(&self.pool).await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_disputed_for_booking(
        &self,
        booking_id: i64,
        at: DateTime<Utc>,
    ) -> AppResult<u64> {
        let result = sqlx::query(
            r#"UPDATE commission_calculations
               SET status = 'disputed', disputed_at = ?, updated_at = NOW()
               WHERE booking_id = ? AND deleted_at IS NULL
                 AND status IN ('pending', 'approved')"#,
        )
        .bind(at.naive_utc())
        .bind(booking_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn restore_for_booking(
        &self,
        booking_id: i64,
        to: CommissionStatus,
    ) -> AppResult<u64> {
        let sql = if to == CommissionStatus::Approved {
            r#"UPDATE commission_calculations
               SET status = ?, approved_at = NOW(), updated_at = NOW()
               WHERE booking_id = ? AND deleted_at IS NULL AND status = 'disputed'"#
        } else {
            r#"UPDATE commission_calculations
               SET status = ?, updated_at = NOW()
               WHERE booking_id = ? AND deleted_at IS NULL AND status = 'disputed'"#
        };
        let result = sqlx::query(sql)
            .bind(to.as_str())
            .bind(booking_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn cancel_for_booking(&self, booking_id: i64) -> AppResult<u64> {
        let result = sqlx::query(
            r#"UPDATE commission_calculations
               SET status = 'cancelled', updated_at = NOW()
               WHERE booking_id = ? AND deleted_at IS NULL
                 AND status NOT IN ('paid', 'cancelled')"#,
        )
        .bind(booking_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl VendorStore for MysqlLedger {
    async fn insert(&self, input: NewVendor) -> AppResult<i64> {
        let commission_config = match &input.commission_rate {
            Some(rate) => Some(serde_json::to_string(rate)?),
            None => None,
        };
        let result = sqlx::query(
            r#"INSERT INTO vendors
               (display_name, gateway_account_id, payout_cadence, commission_config,
                created_at, updated_at)
               VALUES (?, ?, ?, ?, NOW(), NOW())"#,
        )
        .bind(&input.display_name)
        .bind(&input.gateway_account_id)
        .bind(input.payout_cadence.as_str())
        .bind(&commission_config)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_id() as i64)
    }

    async fn find_by_id(&self, id: i64) -> AppResult<Option<Vendor>> {
        let entity = sqlx::query_as::<_, VendorEntity>(
            r#"SELECT id, display_name, gateway_account_id, payout_cadence, commission_config,
                      created_at, updated_at
               FROM vendors WHERE id = ? LIMIT 1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        entity.map(|e| e.to_domain()).transpose()
    }

    async fn set_gateway_account(&self, id: i64, account_id: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r#"UPDATE vendors SET gateway_account_id = ?, updated_at = NOW() WHERE id = ?"#,
        )
        .bind(account_id)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// 建表引导，DB_AUTO_MIGRATE=true 时启动执行
pub async fn init_schema(pool: &Pool<MySql>) -> AppResult<()> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS bookings (
            id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT,
            reference VARCHAR(64) NOT NULL,
            client_id BIGINT NOT NULL,
            vendor_id BIGINT NOT NULL,
            product_kind VARCHAR(16) NOT NULL,
            trip_start_date DATE NOT NULL,
            amount DECIMAL(12, 2) NOT NULL,
            currency VARCHAR(8) NOT NULL DEFAULT 'usd',
            status VARCHAR(16) NOT NULL DEFAULT 'pending',
            payment_status VARCHAR(16) NOT NULL DEFAULT 'pending',
            escrow_status VARCHAR(24) NOT NULL DEFAULT 'pending',
            paid_amount DECIMAL(12, 2) NULL,
            paid_currency VARCHAR(8) NULL,
            released_percent DECIMAL(5, 2) NOT NULL DEFAULT 0,
            release_percentage_30days DECIMAL(5, 2) NULL,
            cancellation_refund_percent DECIMAL(5, 2) NULL,
            provider_confirmed_at DATETIME NULL,
            client_confirmed_at DATETIME NULL,
            completed_at DATETIME NULL,
            disputed_at DATETIME NULL,
            notes TEXT NULL,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            PRIMARY KEY (id),
            UNIQUE KEY uk_reference (reference),
            KEY idx_vendor_escrow (vendor_id, escrow_status),
            KEY idx_trip_start (trip_start_date)
        ) ENGINE = InnoDB DEFAULT CHARSET = utf8mb4"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS payment_transactions (
            id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT,
            booking_id BIGINT NOT NULL,
            reference_number VARCHAR(128) NOT NULL,
            status VARCHAR(24) NOT NULL DEFAULT 'pending',
            amount DECIMAL(12, 2) NOT NULL,
            currency VARCHAR(8) NOT NULL,
            paid_amount DECIMAL(12, 2) NULL,
            paid_currency VARCHAR(8) NULL,
            raw_status VARCHAR(64) NOT NULL DEFAULT '',
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            PRIMARY KEY (id),
            UNIQUE KEY uk_reference (reference_number),
            KEY idx_booking (booking_id)
        ) ENGINE = InnoDB DEFAULT CHARSET = utf8mb4"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS commission_calculations (
            id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT,
            booking_id BIGINT NOT NULL,
            recipient_id BIGINT NOT NULL,
            base_amount DECIMAL(12, 2) NOT NULL,
            rate_config TEXT NOT NULL,
            commission_amount DECIMAL(12, 2) NOT NULL,
            vendor_payout DECIMAL(12, 2) NOT NULL,
            currency VARCHAR(8) NOT NULL,
            status VARCHAR(16) NOT NULL DEFAULT 'pending',
            approved_at DATETIME NULL,
            disputed_at DATETIME NULL,
            paid_at DATETIME NULL,
            deleted_at DATETIME NULL,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            PRIMARY KEY (id),
            UNIQUE KEY uk_booking_recipient (booking_id, recipient_id),
            KEY idx_status (status)
        ) ENGINE = InnoDB DEFAULT CHARSET = utf8mb4"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS vendors (
            id BIGINT UNSIGNED NOT NULL AUTO_INCREMENT,
            display_name VARCHAR(128) NOT NULL,
            gateway_account_id VARCHAR(64) NULL,
            payout_cadence VARCHAR(16) NOT NULL DEFAULT 'weekly',
            commission_config TEXT NULL,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            PRIMARY KEY (id)
        ) ENGINE = InnoDB DEFAULT CHARSET = utf8mb4"#,
    )
    .execute(pool)
    .await?;

    info!("✓ 数据库表结构就绪");
    Ok(())
}
