use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions},
    types::{AMQPValue, FieldTable},
    BasicProperties, Channel, ExchangeKind,
};
use std::collections::HashSet;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::RabbitMQConfig;
use crate::messaging::connection::RabbitMQConnection;
use crate::messaging::error::PublishError;
use crate::messaging::routing::{OutboundMessage, HEADER_EVENT_ID};

/// 一次成功發送的回執
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    pub topic: String,
    pub key: String,
    /// 代理是否已確認（未啟用發布確認時為 false）
    pub acknowledged: bool,
}

/// 訊息代理傳輸層
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    /// 發送單則訊息
    async fn send(&self, message: &OutboundMessage) -> Result<PublishReceipt, PublishError>;

    /// 送出未完成的訊息並釋放連線，可重複調用
    async fn close(&self) -> Result<(), PublishError>;

    /// 檢查代理連線
    async fn check_health(&self) -> Result<(), PublishError>;
}

/// 傳輸層配置
#[derive(Clone, Debug)]
pub struct TransportConfig {
    pub exchange_durable: bool,
    pub persistent: bool,
    pub publish_confirm: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            exchange_durable: true,
            persistent: true,
            publish_confirm: true,
        }
    }
}

impl From<&RabbitMQConfig> for TransportConfig {
    fn from(config: &RabbitMQConfig) -> Self {
        Self {
            exchange_durable: config.exchange_durable,
            persistent: config.persistent,
            publish_confirm: config.publish_confirm,
        }
    }
}

/// RabbitMQ 傳輸層
///
/// 每個主題對應一個 topic 交換機，分區鍵作為路由鍵。
/// 通道在首次發送時開啟，關閉後的下一次發送會重新開啟。
pub struct RabbitMQTransport {
    connection: RabbitMQConnection,
    config: TransportConfig,
    channel: Mutex<Option<Channel>>,
    declared_exchanges: Mutex<HashSet<String>>,
}

impl RabbitMQTransport {
    pub fn new(connection: RabbitMQConnection, config: TransportConfig) -> Self {
        Self {
            connection,
            config,
            channel: Mutex::new(None),
            declared_exchanges: Mutex::new(HashSet::new()),
        }
    }

    /// 確保通道可用
    async fn ensure_channel(&self) -> Result<Channel, PublishError> {
        let mut channel_guard = self.channel.lock().await;

        if let Some(channel) = channel_guard.as_ref() {
            if channel.status().connected() {
                return Ok(channel.clone());
            }
            debug!("Channel no longer connected, reopening");
        }

        let channel = self.connection.create_channel().await?;
        if self.config.publish_confirm {
            channel.confirm_select(ConfirmSelectOptions::default()).await?;
        }
        self.declared_exchanges.lock().await.clear();

        info!("Publishing channel opened (confirm: {})", self.config.publish_confirm);
        *channel_guard = Some(channel.clone());
        Ok(channel)
    }

    /// 宣告主題交換機（每個通道只宣告一次）
    async fn ensure_exchange(&self, channel: &Channel, topic: &str) -> Result<(), PublishError> {
        let mut declared = self.declared_exchanges.lock().await;
        if declared.contains(topic) {
            return Ok(());
        }

        debug!("Declaring exchange: {}", topic);
        channel
            .exchange_declare(
                topic,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: self.config.exchange_durable,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        declared.insert(topic.to_string());
        Ok(())
    }

    fn properties(&self, message: &OutboundMessage) -> BasicProperties {
        let mut headers = FieldTable::default();
        for (name, value) in &message.headers {
            headers.insert((*name).into(), AMQPValue::LongString(value.clone().into()));
        }

        let mut properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_headers(headers);

        if let Some(event_id) = message.header(HEADER_EVENT_ID) {
            properties = properties.with_message_id(event_id.into());
        }

        // 持久化模式
        if self.config.persistent {
            properties = properties.with_delivery_mode(2);
        }

        properties
    }

    async fn publish_on(&self, channel: &Channel, message: &OutboundMessage) -> Result<PublishReceipt, PublishError> {
        self.ensure_exchange(channel, &message.topic).await?;

        let confirmation = channel
            .basic_publish(
                &message.topic,
                &message.key,
                BasicPublishOptions::default(),
                &message.payload,
                self.properties(message),
            )
            .await?
            .await?;

        if confirmation.is_nack() {
            return Err(PublishError::Rejected {
                topic: message.topic.clone(),
                key: message.key.clone(),
            });
        }

        Ok(PublishReceipt {
            topic: message.topic.clone(),
            key: message.key.clone(),
            acknowledged: confirmation.is_ack(),
        })
    }
}

#[async_trait]
impl BrokerTransport for RabbitMQTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<PublishReceipt, PublishError> {
        let channel = self.ensure_channel().await?;

        let result = self.publish_on(&channel, message).await;
        if let Err(PublishError::Lapin(_)) = &result {
            // 通道層錯誤後重新開啟通道
            let mut channel_guard = self.channel.lock().await;
            if channel_guard.as_ref().map(|c| c.id()) == Some(channel.id()) {
                *channel_guard = None;
            }
        }
        result
    }

    async fn close(&self) -> Result<(), PublishError> {
        let channel = self.channel.lock().await.take();
        self.declared_exchanges.lock().await.clear();

        let Some(channel) = channel else {
            return Ok(());
        };

        if self.config.publish_confirm && channel.status().connected() {
            let returned = channel.wait_for_confirms().await?;
            if !returned.is_empty() {
                warn!("{} messages were returned by the broker on close", returned.len());
            }
        }

        if channel.status().connected() {
            channel.close(200, "Replay finished").await?;
        }
        info!("Publishing channel closed");
        Ok(())
    }

    async fn check_health(&self) -> Result<(), PublishError> {
        self.connection.check_health().await
    }
}
