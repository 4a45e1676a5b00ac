use deadpool_lapin::{Manager, Pool, Runtime};
use lapin::{Channel, ConnectionProperties};
use std::time::Duration;
use tracing::info;

use crate::config::RabbitMQConfig;
use crate::messaging::error::PublishError;

pub type RabbitMQPool = Pool;

/// RabbitMQ 連接池
#[derive(Clone)]
pub struct RabbitMQConnection {
    pool: RabbitMQPool,
}

impl RabbitMQConnection {
    /// 創建新的連接池，不立即連線
    pub fn new(amqp_url: &str, pool_size: usize, timeout: Duration) -> Result<Self, PublishError> {
        info!("Creating RabbitMQ connection pool (max {} connections)", pool_size);

        let properties = ConnectionProperties::default()
            .with_executor(tokio_executor_trait::Tokio::current());
        let manager = Manager::new(amqp_url.to_string(), properties);
        let pool = Pool::builder(manager)
            .max_size(pool_size)
            .wait_timeout(Some(timeout))
            .create_timeout(Some(timeout))
            .runtime(Runtime::Tokio1)
            .build()?;

        Ok(Self { pool })
    }

    /// 從配置創建連接池
    pub fn from_config(config: &RabbitMQConfig) -> Result<Self, PublishError> {
        Self::new(
            &config.url,
            config.pool_size as usize,
            Duration::from_secs(config.connection_timeout_secs),
        )
    }

    /// 從池中取得連線並開啟新通道
    pub async fn create_channel(&self) -> Result<Channel, PublishError> {
        let conn = self.pool.get().await?;
        let channel = conn.create_channel().await?;
        Ok(channel)
    }

    /// 檢查連接狀態
    pub async fn check_health(&self) -> Result<(), PublishError> {
        let conn = self.pool.get().await?;
        if conn.status().connected() {
            Ok(())
        } else {
            Err(PublishError::ChannelClosed)
        }
    }
}
