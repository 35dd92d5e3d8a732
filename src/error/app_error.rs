use thiserror::Error;

/// 结算服务统一结果类型
pub type AppResult<T> = Result<T, AppError>;

/// 应用错误
#[derive(Error, Debug)]
pub enum AppError {
    /// 记录不存在（订单/商家/支付流水）
    #[error("记录不存在: {0}")]
    NotFound(String),

    /// 当前状态不允许执行该操作
    #[error("非法状态: {0}")]
    InvalidState(String),

    /// 商家收款账户未完成开通，附带补救链接
    #[error("收款账户未完成开通: {message}")]
    OnboardingIncomplete {
        message: String,
        onboarding_url: Option<String>,
    },

    /// 支付网关错误（网关报错原文透传）
    #[error("支付网关错误: {0}")]
    Gateway(String),

    /// 入参校验失败
    #[error("参数校验失败: {0}")]
    Validation(String),

    /// 数据库错误
    #[error("数据库错误: {0}")]
    DbError(String),
}

impl AppError {
    /// 是否属于业务规则类失败（批处理遇到时计为失败项并继续）
    pub fn is_business(&self) -> bool {
        matches!(
            self,
            AppError::NotFound(_)
                | AppError::InvalidState(_)
                | AppError::OnboardingIncomplete { .. }
                | AppError::Validation(_)
        )
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::DbError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(format!("JSON解析失败: {}", err))
    }
}
