//! SQLx 数据库连接池管理
//!
//! 结算引擎的所有台账读写都经由这里的 MySQL 连接池

use anyhow::Context;
use once_cell::sync::OnceCell;
use sqlx::{MySql, MySqlPool, Pool};
use tracing::info;

static DB_POOL: OnceCell<Pool<MySql>> = OnceCell::new();

/// 初始化数据库连接池
pub async fn init_db_pool() -> anyhow::Result<()> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL 未配置")?;

    info!("正在初始化数据库连接池...");

    let pool = MySqlPool::connect_with(
        database_url
            .parse()
            .map_err(|e| anyhow::anyhow!("数据库URL解析失败: {}", e))?,
    )
    .await
    .map_err(|e| anyhow::anyhow!("数据库连接失败: {}", e))?;

    DB_POOL
        .set(pool)
        .map_err(|_| anyhow::anyhow!("数据库连接池已初始化"))?;

    info!("✓ 数据库连接池初始化成功");
    Ok(())
}

/// 获取数据库连接池
pub fn get_db_pool() -> &'static Pool<MySql> {
    DB_POOL.get().expect("数据库连接池未初始化，请先调用 init_db_pool()")
}

/// 关闭数据库连接池
pub async fn close_db_pool() -> anyhow::Result<()> {
    if let Some(pool) = DB_POOL.get() {
        info!("正在关闭数据库连接池...");
        pool.close().await;
        info!("✓ 数据库连接池已关闭");
    }
    Ok(())
}

/// 健康检查；内存台账模式（连接池未初始化）直接通过
pub async fn health_check() -> anyhow::Result<()> {
    if let Some(pool) = DB_POOL.get() {
        sqlx::query("SELECT 1")
            .fetch_one(pool)
            .await
            .map_err(|e| anyhow::anyhow!("数据库健康检查失败: {}", e))?;
    }
    Ok(())
}
