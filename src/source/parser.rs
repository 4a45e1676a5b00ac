//! Chipmunk 行解析與事件分類
//!
//! 兩種來源共用此模組：每一行獨立解碼為 JSON 物件，解碼失敗的行
//! 記錄警告後丟棄，不佔用序號；序號只分配給成功解析的行。

use chrono::{DateTime, Utc};
use futures::stream;
use serde_json::{Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{EventStream, SourceError};
use crate::domain_types::{EventRecord, EventType};
use crate::utils::{parse_timestamp_text, timestamp_ms_to_datetime};

/// 成交識別欄位
const TRADE_ID_FIELDS: [&str; 2] = ["trade_id", "tradeId"];
/// 貨幣對欄位
const CURRENCY_PAIR_FIELDS: [&str; 2] = ["currency_pair", "base_currency"];
/// 時間戳候選欄位，依優先順序
const TIMESTAMP_FIELDS: [&str; 3] = ["timestamp", "time", "event_time"];
/// 地區欄位
const REGION_FIELD: &str = "region";

/// 單行處理結果
#[derive(Debug)]
pub enum LineOutcome {
    /// 空行或註解行
    Skipped,
    /// 無法解碼而丟棄的行
    Dropped(String),
    /// 成功解析的事件
    Parsed(EventRecord),
}

/// 逐行解析器，負責分配連續序號
#[derive(Debug)]
pub struct EventParser {
    next_sequence: u64,
}

impl Default for EventParser {
    fn default() -> Self {
        Self::new()
    }
}

impl EventParser {
    pub fn new() -> Self {
        Self { next_sequence: 1 }
    }

    /// 處理一行原始內容
    pub fn feed(&mut self, line: &str) -> LineOutcome {
        if !is_record_line(line) {
            return LineOutcome::Skipped;
        }

        match parse_line(line, self.next_sequence) {
            Ok(event) => {
                self.next_sequence += 1;
                LineOutcome::Parsed(event)
            }
            Err(err) => LineOutcome::Dropped(err.to_string()),
        }
    }

    /// 處理一行原始位元組；非 UTF-8 的行視為無法解碼而丟棄
    pub fn feed_bytes(&mut self, raw: &[u8]) -> LineOutcome {
        match std::str::from_utf8(trim_line_ending(raw)) {
            Ok(line) => self.feed(line),
            Err(err) => LineOutcome::Dropped(format!("invalid UTF-8: {}", err)),
        }
    }

    /// 已分配的事件數
    pub fn parsed_count(&self) -> u64 {
        self.next_sequence - 1
    }
}

/// 是否為需要處理的記錄行（非空行、非 `#` 註解）
pub fn is_record_line(line: &str) -> bool {
    !line.trim().is_empty() && !line.starts_with('#')
}

/// 去除行尾的 `\r`（`\n` 已由分割移除）
fn trim_line_ending(raw: &[u8]) -> &[u8] {
    raw.strip_suffix(b"\r").unwrap_or(raw)
}

/// 將一行解析為事件記錄
pub fn parse_line(line: &str, sequence_number: u64) -> Result<EventRecord, serde_json::Error> {
    let data: Map<String, Value> = serde_json::from_str(line)?;

    Ok(EventRecord::new(
        Uuid::new_v4().to_string(),
        classify(&data),
        extract_timestamp(&data),
        extract_region(&data),
        line,
        sequence_number,
    ))
}

/// 依欄位存在與否推斷事件類型
///
/// 優先順序固定：成交識別 > 代碼加價格 > 貨幣對，皆不符合時視為成交。
/// 同時帶有成交識別與貨幣對的記錄會被歸類為成交。
pub fn classify(data: &Map<String, Value>) -> EventType {
    if TRADE_ID_FIELDS.iter().any(|field| data.contains_key(*field)) {
        EventType::Trade
    } else if data.contains_key("symbol") && data.contains_key("price") {
        EventType::MarketData
    } else if CURRENCY_PAIR_FIELDS.iter().any(|field| data.contains_key(*field)) {
        EventType::FxRate
    } else {
        EventType::Trade
    }
}

/// 取出事件時間：依序嘗試候選欄位，全部失敗時使用當前時間
fn extract_timestamp(data: &Map<String, Value>) -> DateTime<Utc> {
    TIMESTAMP_FIELDS
        .iter()
        .filter_map(|field| data.get(*field))
        .find_map(timestamp_from_value)
        .unwrap_or_else(|| {
            debug!("No parseable timestamp field, substituting wall-clock time");
            Utc::now()
        })
}

fn timestamp_from_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(text) => parse_timestamp_text(text),
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|ms| ms as i64))
            .and_then(timestamp_ms_to_datetime),
        _ => None,
    }
}

fn extract_region(data: &Map<String, Value>) -> String {
    match data.get(REGION_FIELD) {
        Some(Value::String(region)) => region.clone(),
        _ => EventRecord::UNKNOWN_REGION.to_string(),
    }
}

/// 將逐行讀取器包裝為事件串流
///
/// 按 `\n` 分割原始位元組，逐行解碼；只有底層 I/O 錯誤會作為串流
/// 最後一個元素返回，之後串流結束。
pub fn event_stream<R>(reader: R, origin: impl Into<String>) -> EventStream
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let origin = origin.into();
    let state = Some((reader.split(b'\n'), EventParser::new(), 0u64));

    Box::pin(stream::unfold(state, move |state| {
        let origin = origin.clone();
        async move {
            let (mut lines, mut parser, mut line_number) = state?;
            loop {
                match lines.next_segment().await {
                    Ok(Some(raw)) => {
                        line_number += 1;
                        match parser.feed_bytes(&raw) {
                            LineOutcome::Parsed(event) => {
                                return Some((Ok(event), Some((lines, parser, line_number))));
                            }
                            LineOutcome::Skipped => continue,
                            LineOutcome::Dropped(reason) => {
                                warn!(
                                    "Failed to parse line {} of {}: {} ({})",
                                    line_number,
                                    origin,
                                    String::from_utf8_lossy(&raw),
                                    reason
                                );
                            }
                        }
                    }
                    Ok(None) => {
                        debug!("Reached end of {} after {} events", origin, parser.parsed_count());
                        return None;
                    }
                    Err(err) => return Some((Err(SourceError::Read(err)), None)),
                }
            }
        }
    }))
}

/// 計算讀取器中記錄行的數量（不做解析）
pub async fn count_record_lines<R>(reader: R) -> Result<u64, SourceError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.split(b'\n');
    let mut count = 0;
    while let Some(raw) = lines.next_segment().await? {
        if is_record_line(&String::from_utf8_lossy(trim_line_ending(&raw))) {
            count += 1;
        }
    }
    Ok(count)
}
