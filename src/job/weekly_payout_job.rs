//! 周结算放款任务
//!
//! 扫描近一周完成、商家走周结、托管里还有钱的订单，放出剩余全部资金。
//! 已做过行前部分放款的订单在这里拿到尾款

use chrono::{DateTime, Duration, Utc};
use tracing::{error, info, warn};

use crate::error::AppResult;
use crate::job::SweepReport;
use crate::settlement::services::escrow_service::EscrowService;
use crate::settlement::store::Ledger;

pub struct WeeklyPayoutJob {
    ledger: Ledger,
    escrow: EscrowService,
    /// 只结算最近 N 天内完成的订单
    lookback_days: i64,
}

impl WeeklyPayoutJob {
    pub fn new(ledger: Ledger, escrow: EscrowService, lookback_days: i64) -> Self {
        Self {
            ledger,
            escrow,
            lookback_days,
        }
    }

    pub async fn run(&self) -> AppResult<SweepReport> {
        self.run_at(Utc::now()).await
    }

    /// 以指定时刻为基准执行一轮，测试直接传时间
    pub async fn run_at(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let completed_after = now - Duration::days(self.lookback_days);
        let candidates = self
            .ledger
            .bookings
            .list_weekly_payout_candidates(completed_after)
            .await?;

        let mut report = SweepReport {
            scanned: candidates.len(),
            ..Default::default()
        };
        info!("📋 周结算扫单开始: candidates={}", candidates.len());

        for booking in candidates {
            match self.escrow.release_remaining(booking.id, "周结算放款").await {
                Ok(outcome) => {
                    info!(
                        "周结算放款成功: booking_id={}, vendor_cut={}",
                        booking.id, outcome.vendor_cut
                    );
                    report.record_ok();
                }
                Err(e) if e.is_business() => {
                    warn!("周结算跳过订单: booking_id={}, reason={}", booking.id, e);
                    report.record_skip();
                }
                Err(e) => {
                    error!("❌ 周结算放款失败: booking_id={}, err={}", booking.id, e);
                    report.record_fail();
                }
            }
        }

        info!(
            "📋 周结算扫单结束: scanned={}, processed={}, skipped={}, failed={}",
            report.scanned, report.processed, report.skipped, report.failed
        );
        Ok(report)
    }
}
