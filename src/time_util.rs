use chrono::{DateTime, Duration, NaiveDate, Utc};

/// 距离目标日期还有多少天（目标已过则为负数）
pub fn days_until(today: NaiveDate, target: NaiveDate) -> i64 {
    (target - today).num_days()
}

/// 行前部分放款窗口的开启日期
pub fn partial_release_open_date(trip_start: NaiveDate, lead_days: i64) -> NaiveDate {
    trip_start - Duration::days(lead_days)
}

/// 从某时刻起已经过去的整小时数
pub fn hours_since(from: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - from).num_hours()
}

/// 审计备注里用的时间戳格式
pub fn format_ts(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}
