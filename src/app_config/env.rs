use rust_decimal::Decimal;
use std::env;
use tracing::warn;

/// 读取布尔型环境变量：支持 true/false/1/0（大小写不敏感）
pub fn env_is_true(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(v) => {
            let v = v.trim();
            v.eq_ignore_ascii_case("true") || v == "1"
        }
        Err(_) => default,
    }
}

/// 读取字符串环境变量，若不存在则返回默认值
pub fn env_or_default(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(v) => v,
        Err(_) => default.to_string(),
    }
}

/// 读取整型环境变量，解析失败时告警并回退默认值
pub fn env_i64(key: &str, default: i64) -> i64 {
    match env::var(key) {
        Ok(v) => match v.trim().parse::<i64>() {
            Ok(n) => n,
            Err(_) => {
                warn!("环境变量 {} 不是合法整数: {}，使用默认值 {}", key, v, default);
                default
            }
        },
        Err(_) => default,
    }
}

/// 读取金额/百分比类环境变量，解析失败时告警并回退默认值
pub fn env_decimal(key: &str, default: Decimal) -> Decimal {
    match env::var(key) {
        Ok(v) => match v.trim().parse::<Decimal>() {
            Ok(d) => d,
            Err(_) => {
                warn!("环境变量 {} 不是合法数值: {}，使用默认值 {}", key, v, default);
                default
            }
        },
        Err(_) => default,
    }
}

/// 读取可选环境变量（空串视为未设置）
pub fn env_opt(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}
