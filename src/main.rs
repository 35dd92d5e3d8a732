use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::Parser;
use dotenv::dotenv;
use tracing::{info, warn};

use travel_pay::app_config::db::{close_db_pool, get_db_pool, init_db_pool};
use travel_pay::app_config::env::{env_is_true, env_opt, env_or_default};
use travel_pay::app_config::log::setup_logging;
use travel_pay::app_config::settle::SettleConfig;
use travel_pay::job::{start_scheduler, AutoConfirmJob, PartialReleaseJob, WeeklyPayoutJob};
use travel_pay::settlement::api::{router, ApiState};
use travel_pay::settlement::domain::rate::{CommissionRate, CommissionRegistry};
use travel_pay::settlement::gateway::{
    PaymentGateway, SimulatedGateway, StripeClient, WebhookVerifier,
};
use travel_pay::settlement::services::{
    CheckoutService, CommissionService, ConfirmationService, DashboardService, EscrowService,
    ExceptionService, WebhookReconciler,
};
use travel_pay::settlement::store::mysql::init_schema;
use travel_pay::settlement::store::Ledger;

/// 结算引擎入口：默认常驻（HTTP + 定时扫单），--job 单跑一轮后退出
#[derive(Parser, Debug)]
#[command(name = "travel_pay", about = "旅行平台支付结算与托管引擎")]
struct Args {
    /// 手动执行一轮扫单任务后退出: weekly_payout / auto_confirm / partial_release
    #[arg(long)]
    job: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    setup_logging().await?;

    let args = Args::parse();
    let config = SettleConfig::from_env();

    // 网关选择：本地联调走模拟网关，不出外网
    let gateway: Arc<dyn PaymentGateway> = if env_is_true("IS_SIMULATED_PAY", false) {
        warn!("IS_SIMULATED_PAY=true，使用模拟支付网关");
        Arc::new(SimulatedGateway::new())
    } else {
        Arc::new(StripeClient::from_env().context("Stripe 客户端初始化失败")?)
    };

    // 台账选择：有 DATABASE_URL 用 MySQL，否则内存台账（进程退出即丢）
    let ledger = match env_opt("DATABASE_URL") {
        Some(_) => {
            init_db_pool().await?;
            let pool = get_db_pool().clone();
            if env_is_true("DB_AUTO_MIGRATE", false) {
                init_schema(&pool).await.context("数据库建表失败")?;
            }
            Ledger::mysql(pool)
        }
        None => {
            warn!("DATABASE_URL 未配置，使用内存台账（仅限本地联调）");
            Ledger::in_memory()
        }
    };

    let registry = CommissionRegistry::new(CommissionRate::Percentage {
        percent: config.platform_commission_percent,
    });

    let commissions = CommissionService::new(ledger.clone(), registry);
    let escrow = EscrowService::new(
        ledger.clone(),
        gateway.clone(),
        config.clone(),
        commissions.clone(),
    );
    let exceptions = ExceptionService::new(
        ledger.clone(),
        gateway.clone(),
        escrow.clone(),
        commissions.clone(),
        config.clone(),
    );
    let confirmation = ConfirmationService::new(ledger.clone(), escrow.clone(), config.clone());
    let checkout = CheckoutService::new(ledger.clone(), gateway.clone());
    let dashboard = DashboardService::new(ledger.clone(), gateway.clone(), config.clone());
    let verifier = WebhookVerifier::new(env_or_default("STRIPE_WEBHOOK_SECRET", ""));
    let reconciler = WebhookReconciler::new(
        ledger.clone(),
        gateway.clone(),
        verifier,
        commissions.clone(),
        escrow.clone(),
        exceptions.clone(),
    );

    let weekly_job = Arc::new(WeeklyPayoutJob::new(
        ledger.clone(),
        escrow.clone(),
        config.payout_lookback_days,
    ));
    let auto_confirm_job = Arc::new(AutoConfirmJob::new(ledger.clone(), confirmation.clone()));
    let partial_release_job = Arc::new(PartialReleaseJob::new(
        ledger.clone(),
        escrow.clone(),
        config.partial_release_lead_days,
    ));

    // 单跑模式：执行一轮指定扫单后退出
    if let Some(job_name) = args.job {
        let report = match job_name.as_str() {
            "weekly_payout" => weekly_job.run().await?,
            "auto_confirm" => auto_confirm_job.run().await?,
            "partial_release" => partial_release_job.run().await?,
            other => {
                return Err(anyhow!(
                    "未知任务: {}，可选 weekly_payout / auto_confirm / partial_release",
                    other
                ))
            }
        };
        info!(
            "任务 {} 执行完成: scanned={}, processed={}, skipped={}, failed={}",
            job_name, report.scanned, report.processed, report.skipped, report.failed
        );
        return Ok(());
    }

    let mut scheduler = start_scheduler(
        weekly_job.clone(),
        auto_confirm_job.clone(),
        partial_release_job.clone(),
    )
    .await?;

    let state = ApiState {
        config,
        checkout,
        reconciler,
        escrow,
        exceptions,
        confirmation,
        dashboard,
        commissions,
        weekly_job,
        auto_confirm_job,
        partial_release_job,
    };
    let app = router(state);

    let listen_addr = env_or_default("LISTEN_ADDR", "0.0.0.0:8080");
    let listener = tokio::net::TcpListener::bind(&listen_addr)
        .await
        .with_context(|| format!("监听地址绑定失败: {}", listen_addr))?;
    info!("✓ 结算服务已启动: http://{}", listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("收到退出信号，开始平滑关闭");
        })
        .await?;

    scheduler
        .shutdown()
        .await
        .map_err(|e| anyhow!("调度器关闭失败: {}", e))?;
    close_db_pool().await?;
    info!("✓ 结算服务已退出");
    Ok(())
}
