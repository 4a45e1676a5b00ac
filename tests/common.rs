#![allow(dead_code)]

use async_trait::async_trait;
use futures::{stream, StreamExt};
use parking_lot::Mutex;
use replay_engine::checkpoint::{CheckpointBackend, CheckpointError, CheckpointManager};
use replay_engine::domain_types::ReplayCheckpoint;
use replay_engine::messaging::{
    BrokerTransport, EventPublisher, OutboundMessage, PublishError, PublishReceipt, TopicTable,
};
use replay_engine::replay::ReplayScheduler;
use replay_engine::source::parser::{event_stream, is_record_line};
use replay_engine::source::{EventSource, EventStream, SourceError};
use std::io::{Cursor, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// 已送出的訊息與送出時刻
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub message: OutboundMessage,
    pub at: Instant,
}

impl SentMessage {
    pub fn sequence_number(&self) -> u64 {
        self.message
            .header("sequenceNumber")
            .and_then(|value| value.parse().ok())
            .unwrap_or_default()
    }
}

/// 記憶體傳輸層，記錄每則訊息
#[derive(Default)]
pub struct MemoryTransport {
    sent: Mutex<Vec<SentMessage>>,
    reject_topic: Option<String>,
    closes: AtomicUsize,
}

impl MemoryTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn rejecting(topic: &str) -> Arc<Self> {
        Arc::new(Self {
            reject_topic: Some(topic.to_string()),
            ..Self::default()
        })
    }

    /// 依送出順序排列的訊息
    pub fn sent(&self) -> Vec<SentMessage> {
        let mut sent = self.sent.lock().clone();
        sent.sort_by_key(|m| (m.at, m.sequence_number()));
        sent
    }

    /// 排序後的序號
    pub fn sequence_numbers(&self) -> Vec<u64> {
        let mut numbers: Vec<u64> = self.sent.lock().iter().map(SentMessage::sequence_number).collect();
        numbers.sort_unstable();
        numbers
    }

    pub fn count_for_topic(&self, topic: &str) -> usize {
        self.sent.lock().iter().filter(|m| m.message.topic == topic).count()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerTransport for MemoryTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<PublishReceipt, PublishError> {
        if self.reject_topic.as_deref() == Some(message.topic.as_str()) {
            return Err(PublishError::Rejected {
                topic: message.topic.clone(),
                key: message.key.clone(),
            });
        }

        self.sent.lock().push(SentMessage {
            message: message.clone(),
            at: Instant::now(),
        });
        Ok(PublishReceipt {
            topic: message.topic.clone(),
            key: message.key.clone(),
            acknowledged: true,
        })
    }

    async fn close(&self) -> Result<(), PublishError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn check_health(&self) -> Result<(), PublishError> {
        Ok(())
    }
}

/// 記憶體檢查點後端
#[derive(Default)]
pub struct MemoryCheckpointStore {
    stored: Mutex<Option<ReplayCheckpoint>>,
    saves: AtomicUsize,
}

impl MemoryCheckpointStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn stored(&self) -> Option<ReplayCheckpoint> {
        self.stored.lock().clone()
    }

    pub fn put(&self, checkpoint: ReplayCheckpoint) {
        *self.stored.lock() = Some(checkpoint);
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CheckpointBackend for MemoryCheckpointStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn save(&self, checkpoint: &ReplayCheckpoint) -> Result<(), CheckpointError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.stored.lock() = Some(checkpoint.clone());
        Ok(())
    }

    async fn load(&self) -> Result<Option<ReplayCheckpoint>, CheckpointError> {
        Ok(self.stored.lock().clone())
    }

    async fn delete(&self) -> Result<(), CheckpointError> {
        *self.stored.lock() = None;
        Ok(())
    }
}

/// 以字串內容提供事件的來源，可在指定事件數後注入讀取錯誤
pub struct ScriptedSource {
    id: String,
    content: String,
    fail_after: Option<usize>,
    read_delay: Option<Duration>,
    closes: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(id: &str, lines: &[String]) -> Self {
        Self {
            id: id.to_string(),
            content: lines.join("\n"),
            fail_after: None,
            read_delay: None,
            closes: AtomicUsize::new(0),
        }
    }

    pub fn failing_after(mut self, events: usize) -> Self {
        self.fail_after = Some(events);
        self
    }

    /// 每讀出一筆事件前等待 `delay`
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventSource for ScriptedSource {
    fn source_id(&self) -> String {
        self.id.clone()
    }

    async fn open(&self) -> Result<EventStream, SourceError> {
        let mut events = event_stream(Cursor::new(self.content.clone().into_bytes()), self.id.clone());
        if let Some(delay) = self.read_delay {
            events = Box::pin(events.then(move |item| async move {
                sleep(delay).await;
                item
            }));
        }
        match self.fail_after {
            None => Ok(events),
            Some(limit) => {
                let failure = stream::once(async {
                    Err(SourceError::Read(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "storage went away",
                    )))
                });
                Ok(Box::pin(events.take(limit).chain(failure)))
            }
        }
    }

    async fn count(&self) -> Result<Option<u64>, SourceError> {
        Ok(Some(self.content.lines().filter(|line| is_record_line(line)).count() as u64))
    }

    async fn close(&self) -> Result<(), SourceError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// 2024-01-01T10:MM:SS 的成交事件行
pub fn trade_at(seconds: u32, trade_id: &str) -> String {
    format!(
        r#"{{"timestamp": "2024-01-01T10:{:02}:{:02}Z", "trade_id": "{}", "symbol": "AAPL", "price": 150.0, "region": "US"}}"#,
        seconds / 60,
        seconds % 60,
        trade_id
    )
}

/// 相同時間戳的 n 筆成交事件
pub fn trades(count: usize) -> Vec<String> {
    (0..count).map(|i| trade_at(0, &format!("T{:04}", i))).collect()
}

/// 10 筆事件（4 成交、3 行情、3 匯率），另含空行與註解
pub const TEN_EVENT_FILE: &str = r#"# replay fixture
{"timestamp": "2024-01-01T10:00:00Z", "trade_id": "T001", "symbol": "AAPL", "price": 150.25, "region": "US"}
{"timestamp": "2024-01-01T10:00:01Z", "symbol": "AAPL", "price": 150.30, "bid": 150.28, "region": "US"}
{"timestamp": "2024-01-01T10:00:02Z", "base_currency": "USD", "target_currency": "EUR", "rate": 0.91, "region": "EU"}
{"timestamp": "2024-01-01T10:00:03Z", "tradeId": "T002", "symbol": "VOD", "price": 72.1, "region": "UK"}

{"timestamp": "2024-01-01T10:00:04Z", "symbol": "MSFT", "price": 375.1, "region": "US"}
{"time": 1704103205000, "currency_pair": "GBPUSD", "rate": 1.27, "region": "UK"}
{"timestamp": "2024-01-01T10:00:06Z", "trade_id": "T003", "currency_pair": "EURUSD", "region": "EU"}
{"event_time": "2024-01-01T10:00:07Z", "symbol": "TSLA", "price": 248.5}
{"timestamp": "2024-01-01T10:00:08Z", "currency_pair": "USDJPY", "rate": 141.2, "region": "JP"}
{"timestamp": "2024-01-01T10:00:09Z", "trade_id": "T004", "region": "US"}
"#;

/// 將內容寫入暫存檔
pub fn chipmunk_file(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

pub fn publisher(transport: Arc<MemoryTransport>) -> Arc<EventPublisher> {
    Arc::new(EventPublisher::new(transport, TopicTable::default()))
}

pub fn memory_checkpoints(store: Arc<MemoryCheckpointStore>, interval: Duration) -> Arc<CheckpointManager> {
    Arc::new(CheckpointManager::new(store, true, interval))
}

/// 不寫檢查點的排程器
pub fn scheduler_without_checkpoints(
    source: Arc<dyn EventSource>,
    transport: Arc<MemoryTransport>,
) -> ReplayScheduler {
    ReplayScheduler::new(source, publisher(transport), Arc::new(CheckpointManager::disabled()))
}
