use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::RabbitMQConfig;
use crate::domain_types::EventRecord;
use crate::messaging::connection::RabbitMQConnection;
use crate::messaging::error::PublishError;
use crate::messaging::routing::{OutboundMessage, TopicTable};
use crate::messaging::transport::{BrokerTransport, PublishReceipt, RabbitMQTransport, TransportConfig};
use crate::monitor::ReplayMetrics;

/// 發布者累計計數
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublisherStats {
    pub published: u64,
    pub failed: u64,
}

/// 事件發布者
///
/// 依事件類型選擇主題、依地區與類型產生分區鍵，透過傳輸層送出。
/// 不論調用方如何處理結果，發布者自行累計成功與失敗數並記錄延遲。
pub struct EventPublisher {
    transport: Arc<dyn BrokerTransport>,
    topics: TopicTable,
    published: AtomicU64,
    failed: AtomicU64,
}

impl EventPublisher {
    /// 創建新的事件發布者
    pub fn new(transport: Arc<dyn BrokerTransport>, topics: TopicTable) -> Self {
        Self {
            transport,
            topics,
            published: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// 從 RabbitMQ 配置創建發布者（連線延後到首次發布）
    pub fn from_config(config: &RabbitMQConfig) -> Result<Self, PublishError> {
        let connection = RabbitMQConnection::from_config(config)?;
        let transport = RabbitMQTransport::new(connection, TransportConfig::from(config));
        info!(
            "Event publisher configured for topics: {:?}",
            TopicTable::from_config(&config.topics).topics()
        );
        Ok(Self::new(Arc::new(transport), TopicTable::from_config(&config.topics)))
    }

    pub fn topics(&self) -> &TopicTable {
        &self.topics
    }

    /// 發布單筆事件
    pub async fn publish(&self, event: &EventRecord) -> Result<PublishReceipt, PublishError> {
        let message = OutboundMessage::for_event(event, &self.topics);
        let start = Instant::now();

        let result = self.transport.send(&message).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(_) => {
                self.published.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Published event {} (seq {}) to {} with key {} in {:?}",
                    event.id(),
                    event.sequence_number(),
                    message.topic,
                    message.key,
                    elapsed
                );
            }
            Err(err) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Failed to publish event {} (seq {}) to {}: {}",
                    event.id(),
                    event.sequence_number(),
                    message.topic,
                    err
                );
            }
        }
        ReplayMetrics::record_publish(&message.topic, result.is_ok(), elapsed);

        result
    }

    /// 累計計數
    pub fn stats(&self) -> PublisherStats {
        PublisherStats {
            published: self.published.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// 送出未完成的訊息並釋放連線
    pub async fn close(&self) -> Result<(), PublishError> {
        let stats = self.stats();
        info!(
            "Closing event publisher (published: {}, failed: {})",
            stats.published, stats.failed
        );
        self.transport.close().await
    }

    /// 檢查發布者健康狀態
    pub async fn check_health(&self) -> Result<(), PublishError> {
        self.transport.check_health().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_types::EventType;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;

    /// 對指定主題回傳拒絕的記憶體傳輸層
    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<OutboundMessage>>,
        reject_topic: Option<&'static str>,
    }

    #[async_trait]
    impl BrokerTransport for RecordingTransport {
        async fn send(&self, message: &OutboundMessage) -> Result<PublishReceipt, PublishError> {
            if self.reject_topic == Some(message.topic.as_str()) {
                return Err(PublishError::Rejected {
                    topic: message.topic.clone(),
                    key: message.key.clone(),
                });
            }
            self.sent.lock().push(message.clone());
            Ok(PublishReceipt {
                topic: message.topic.clone(),
                key: message.key.clone(),
                acknowledged: true,
            })
        }

        async fn close(&self) -> Result<(), PublishError> {
            Ok(())
        }

        async fn check_health(&self) -> Result<(), PublishError> {
            Ok(())
        }
    }

    fn event(event_type: EventType, region: &str, sequence_number: u64) -> EventRecord {
        EventRecord::new(
            format!("evt-{}", sequence_number),
            event_type,
            Utc::now(),
            region,
            "{}",
            sequence_number,
        )
    }

    #[tokio::test]
    async fn test_publish_routes_by_event_type() {
        let transport = Arc::new(RecordingTransport::default());
        let publisher = EventPublisher::new(transport.clone(), TopicTable::default());

        let receipt = publisher.publish(&event(EventType::MarketData, "US", 1)).await.unwrap();
        assert_eq!(receipt.topic, "market-data");
        assert_eq!(receipt.key, "US_MARKET_DATA");

        publisher.publish(&event(EventType::FxRate, "EU", 2)).await.unwrap();

        let sent = transport.sent.lock();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].topic, "fx-rates");
        assert_eq!(sent[1].header("sequenceNumber"), Some("2"));
        assert_eq!(publisher.stats(), PublisherStats { published: 2, failed: 0 });
    }

    #[tokio::test]
    async fn test_failed_publish_is_counted() {
        let transport = Arc::new(RecordingTransport {
            reject_topic: Some("trade-events"),
            ..RecordingTransport::default()
        });
        let publisher = EventPublisher::new(transport, TopicTable::default());

        let result = publisher.publish(&event(EventType::Trade, "UK", 1)).await;
        assert_matches!(result, Err(PublishError::Rejected { .. }));

        publisher.publish(&event(EventType::FxRate, "UK", 2)).await.unwrap();
        assert_eq!(publisher.stats(), PublisherStats { published: 1, failed: 1 });

        publisher.close().await.unwrap();
        publisher.check_health().await.unwrap();
    }
}
