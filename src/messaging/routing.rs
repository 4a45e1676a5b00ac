//! 事件路由：主題、分區鍵與訊息標頭

use crate::config::TopicsConfig;
use crate::domain_types::{EventRecord, EventType};

/// 事件ID標頭
pub const HEADER_EVENT_ID: &str = "eventId";
/// 事件類型標頭
pub const HEADER_EVENT_TYPE: &str = "eventType";
/// 地區標頭
pub const HEADER_REGION: &str = "region";
/// 序號標頭
pub const HEADER_SEQUENCE_NUMBER: &str = "sequenceNumber";

/// 事件類型到主題的靜態對應
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicTable {
    trade_events: String,
    market_data: String,
    fx_rates: String,
}

impl Default for TopicTable {
    fn default() -> Self {
        Self::from_config(&TopicsConfig::default())
    }
}

impl TopicTable {
    pub fn from_config(config: &TopicsConfig) -> Self {
        Self {
            trade_events: config.trade_events.clone(),
            market_data: config.market_data.clone(),
            fx_rates: config.fx_rates.clone(),
        }
    }

    /// 事件類型對應的主題
    pub fn topic_for(&self, event_type: EventType) -> &str {
        match event_type {
            EventType::Trade => &self.trade_events,
            EventType::MarketData => &self.market_data,
            EventType::FxRate => &self.fx_rates,
        }
    }

    /// 所有主題
    pub fn topics(&self) -> [&str; 3] {
        [&self.trade_events, &self.market_data, &self.fx_rates]
    }
}

/// 分區鍵：`地區_類型`
pub fn partition_key(event: &EventRecord) -> String {
    format!("{}_{}", event.region(), event.event_type().as_str())
}

/// 待發送的訊息
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub topic: String,
    pub key: String,
    pub payload: Vec<u8>,
    pub headers: Vec<(&'static str, String)>,
}

impl OutboundMessage {
    /// 依路由規則將事件轉為訊息，內容原樣傳遞
    pub fn for_event(event: &EventRecord, topics: &TopicTable) -> Self {
        Self {
            topic: topics.topic_for(event.event_type()).to_string(),
            key: partition_key(event),
            payload: event.payload().as_bytes().to_vec(),
            headers: vec![
                (HEADER_EVENT_ID, event.id().to_string()),
                (HEADER_EVENT_TYPE, event.event_type().as_str().to_string()),
                (HEADER_REGION, event.region().to_string()),
                (HEADER_SEQUENCE_NUMBER, event.sequence_number().to_string()),
            ],
        }
    }

    /// 取得標頭值
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }
}
