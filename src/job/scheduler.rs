//! 扫单任务的调度接线
//!
//! cron 表达式可用环境变量覆盖，方便灰度环境加密度。
//! 任务逻辑都在各 job 结构体里，这里只负责挂钟

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::app_config::env::env_or_default;
use crate::job::{AutoConfirmJob, PartialReleaseJob, WeeklyPayoutJob};

// 默认节奏：周一凌晨周结算、整点自动确认、每天凌晨行前放款
const DEFAULT_WEEKLY_PAYOUT_CRON: &str = "0 0 3 * * Mon";
const DEFAULT_AUTO_CONFIRM_CRON: &str = "0 0 * * * *";
const DEFAULT_PARTIAL_RELEASE_CRON: &str = "0 30 2 * * *";

/// 挂载三个扫单任务并启动调度器
pub async fn start_scheduler(
    weekly: Arc<WeeklyPayoutJob>,
    auto_confirm: Arc<AutoConfirmJob>,
    partial: Arc<PartialReleaseJob>,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await.context("调度器初始化失败")?;

    let weekly_cron = env_or_default("WEEKLY_PAYOUT_CRON", DEFAULT_WEEKLY_PAYOUT_CRON);
    let auto_confirm_cron = env_or_default("AUTO_CONFIRM_CRON", DEFAULT_AUTO_CONFIRM_CRON);
    let partial_cron = env_or_default("PARTIAL_RELEASE_CRON", DEFAULT_PARTIAL_RELEASE_CRON);

    {
        let weekly = Arc::clone(&weekly);
        scheduler
            .add(
                Job::new_async(weekly_cron.as_str(), move |_uuid, _lock| {
                    let weekly = Arc::clone(&weekly);
                    Box::pin(async move {
                        if let Err(e) = weekly.run().await {
                            error!("周结算任务执行失败: {}", e);
                        }
                    })
                })
                .with_context(|| format!("周结算 cron 非法: {}", weekly_cron))?,
            )
            .await
            .context("周结算任务注册失败")?;
    }

    {
        let auto_confirm = Arc::clone(&auto_confirm);
        scheduler
            .add(
                Job::new_async(auto_confirm_cron.as_str(), move |_uuid, _lock| {
                    let auto_confirm = Arc::clone(&auto_confirm);
                    Box::pin(async move {
                        if let Err(e) = auto_confirm.run().await {
                            error!("自动确认任务执行失败: {}", e);
                        }
                    })
                })
                .with_context(|| format!("自动确认 cron 非法: {}", auto_confirm_cron))?,
            )
            .await
            .context("自动确认任务注册失败")?;
    }

    {
        let partial = Arc::clone(&partial);
        scheduler
            .add(
                Job::new_async(partial_cron.as_str(), move |_uuid, _lock| {
                    let partial = Arc::clone(&partial);
                    Box::pin(async move {
                        if let Err(e) = partial.run().await {
                            error!("行前放款任务执行失败: {}", e);
                        }
                    })
                })
                .with_context(|| format!("行前放款 cron 非法: {}", partial_cron))?,
            )
            .await
            .context("行前放款任务注册失败")?;
    }

    scheduler.start().await.context("调度器启动失败")?;
    info!(
        "✓ 扫单调度已启动: weekly='{}', auto_confirm='{}', partial='{}'",
        weekly_cron, auto_confirm_cron, partial_cron
    );
    Ok(scheduler)
}
