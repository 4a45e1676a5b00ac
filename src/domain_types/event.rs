use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 事件類型枚舉，決定事件的路由主題
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Trade,      // 成交
    MarketData, // 行情
    FxRate,     // 匯率
}

impl EventType {
    /// 所有事件類型
    pub const ALL: [EventType; 3] = [EventType::Trade, EventType::MarketData, EventType::FxRate];

    /// 轉換為字串表示（亦用於分區鍵與訊息標頭）
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Trade => "TRADE",
            EventType::MarketData => "MARKET_DATA",
            EventType::FxRate => "FX_RATE",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TRADE" => Ok(EventType::Trade),
            "MARKET_DATA" => Ok(EventType::MarketData),
            "FX_RATE" => Ok(EventType::FxRate),
            other => Err(format!("未知的事件類型: {}", other)),
        }
    }
}

/// 從 Chipmunk 檔案解析出的一筆事件
///
/// 建立後不可變。`payload` 保留原始行內容，發布時原樣傳遞，
/// 不做任何解碼再編碼。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// 唯一事件ID（解析時產生）
    id: String,
    /// 事件類型
    event_type: EventType,
    /// 事件原始發生時間
    timestamp: DateTime<Utc>,
    /// 來源地區
    region: String,
    /// 原始序列化內容
    payload: String,
    /// 在來源中的位置，從 1 開始且連續遞增
    sequence_number: u64,
}

impl EventRecord {
    /// 預設地區標籤
    pub const UNKNOWN_REGION: &'static str = "UNKNOWN";

    /// 創建新的事件記錄
    pub fn new(
        id: impl Into<String>,
        event_type: EventType,
        timestamp: DateTime<Utc>,
        region: impl Into<String>,
        payload: impl Into<String>,
        sequence_number: u64,
    ) -> Self {
        Self {
            id: id.into(),
            event_type,
            timestamp,
            region: region.into(),
            payload: payload.into(),
            sequence_number,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }
}
