// time_utils.rs
//
// 提供時間轉換相關的工具函數，用於解析事件時間戳與計算重播延遲。

use chrono::{DateTime, TimeZone, Utc};
use std::time::Duration;

/// 將毫秒時間戳轉換為 DateTime<Utc>，超出範圍時返回 None
pub fn timestamp_ms_to_datetime(ts: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ts).single()
}

/// 解析 ISO-8601 (RFC 3339) 時間字串
pub fn parse_iso8601(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// 解析時間字串：先嘗試 ISO-8601，再嘗試毫秒時間戳
pub fn parse_timestamp_text(text: &str) -> Option<DateTime<Utc>> {
    parse_iso8601(text).or_else(|| {
        text.trim()
            .parse::<i64>()
            .ok()
            .and_then(timestamp_ms_to_datetime)
    })
}

/// 兩個時間點之間的非負間隔，`later` 早於 `earlier` 時為零
pub fn non_negative_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> Duration {
    (later - earlier).to_std().unwrap_or(Duration::ZERO)
}
