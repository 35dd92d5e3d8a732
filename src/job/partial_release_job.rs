//! 行前部分放款任务
//!
//! 每天扫一次：行程开始日进入提前窗口（默认 30 天）的托管订单，
//! 放出部分比例给商家（默认 50%，订单可覆盖）

use chrono::{Duration, NaiveDate, Utc};
use tracing::{error, info, warn};

use crate::error::AppResult;
use crate::job::SweepReport;
use crate::settlement::services::escrow_service::EscrowService;
use crate::settlement::store::Ledger;

pub struct PartialReleaseJob {
    ledger: Ledger,
    escrow: EscrowService,
    lead_days: i64,
}

impl PartialReleaseJob {
    pub fn new(ledger: Ledger, escrow: EscrowService, lead_days: i64) -> Self {
        Self {
            ledger,
            escrow,
            lead_days,
        }
    }

    pub async fn run(&self) -> AppResult<SweepReport> {
        self.run_on(Utc::now().date_naive()).await
    }

    /// 以指定日期为"今天"执行一轮
    pub async fn run_on(&self, today: NaiveDate) -> AppResult<SweepReport> {
        // 窗口开启条件 today >= trip_start - lead_days，换算成行程开始日上限
        let start_on_or_before = today + Duration::days(self.lead_days);
        let candidates = self
            .ledger
            .bookings
            .list_partial_release_candidates(start_on_or_before)
            .await?;

        let mut report = SweepReport {
            scanned: candidates.len(),
            ..Default::default()
        };
        info!("📋 行前放款扫单开始: candidates={}", candidates.len());

        for booking in candidates {
            match self.escrow.release_partial_if_due(booking.id, today).await {
                Ok(outcome) => {
                    info!(
                        "行前部分放款成功: booking_id={}, percent={}, vendor_cut={}",
                        booking.id, outcome.released_percent, outcome.vendor_cut
                    );
                    report.record_ok();
                }
                Err(e) if e.is_business() => {
                    warn!("行前放款跳过订单: booking_id={}, reason={}", booking.id, e);
                    report.record_skip();
                }
                Err(e) => {
                    error!("❌ 行前放款失败: booking_id={}, err={}", booking.id, e);
                    report.record_fail();
                }
            }
        }

        info!(
            "📋 行前放款扫单结束: scanned={}, processed={}, skipped={}, failed={}",
            report.scanned, report.processed, report.skipped, report.failed
        );
        Ok(report)
    }
}
