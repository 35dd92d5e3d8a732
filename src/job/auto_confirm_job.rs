//! 超时自动确认任务
//!
//! 商家确认后客人迟迟不点确认的订单，超过品类窗口（一日游 24h / 多日游 48h）
//! 由系统代为确认。多日游确认后立即放尾款，一日游留给周结算批次

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::error::AppResult;
use crate::job::SweepReport;
use crate::settlement::services::confirmation_service::ConfirmationService;
use crate::settlement::store::Ledger;

pub struct AutoConfirmJob {
    ledger: Ledger,
    confirmation: ConfirmationService,
}

impl AutoConfirmJob {
    pub fn new(ledger: Ledger, confirmation: ConfirmationService) -> Self {
        Self {
            ledger,
            confirmation,
        }
    }

    pub async fn run(&self) -> AppResult<SweepReport> {
        self.run_at(Utc::now()).await
    }

    pub async fn run_at(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let candidates = self.ledger.bookings.list_auto_confirm_candidates().await?;

        let mut report = SweepReport {
            scanned: candidates.len(),
            ..Default::default()
        };
        info!("📋 自动确认扫单开始: candidates={}", candidates.len());

        for booking in candidates {
            match self.confirmation.auto_confirm_one(&booking, now).await {
                // 未到窗口
                Ok(false) => report.record_skip(),
                Ok(true) => report.record_ok(),
                Err(e) => {
                    error!("❌ 自动确认失败: booking_id={}, err={}", booking.id, e);
                    report.record_fail();
                }
            }
        }

        info!(
            "📋 自动确认扫单结束: scanned={}, processed={}, skipped={}, failed={}",
            report.scanned, report.processed, report.skipped, report.failed
        );
        Ok(report)
    }
}
