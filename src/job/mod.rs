//! 定时批处理
//!
//! 三个互相独立的扫单任务：周结算放款、超时自动确认、行前部分放款。
//! 任务本体是普通结构体，run 可以在任意时刻手动触发，不依赖墙钟

pub mod auto_confirm_job;
pub mod partial_release_job;
pub mod scheduler;
pub mod weekly_payout_job;

use serde::Serialize;

pub use auto_confirm_job::AutoConfirmJob;
pub use partial_release_job::PartialReleaseJob;
pub use scheduler::start_scheduler;
pub use weekly_payout_job::WeeklyPayoutJob;

/// 单轮扫单结果
///
/// 单个订单失败只累加计数，不中断整轮
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SweepReport {
    /// 候选订单数
    pub scanned: usize,
    /// 本轮实际动账/改状态的订单数
    pub processed: usize,
    /// 业务规则拦下的订单数（未到窗口、账户未开通等）
    pub skipped: usize,
    /// 网关或内部错误的订单数
    pub failed: usize,
}

impl SweepReport {
    pub fn record_skip(&mut self) {
        self.skipped += 1;
    }

    pub fn record_ok(&mut self) {
        self.processed += 1;
    }

    pub fn record_fail(&mut self) {
        self.failed += 1;
    }
}
