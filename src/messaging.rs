// 消息系統模組
// 將重播事件發布到 RabbitMQ，每種事件類型對應一個主題交換機

// 導出子模組
pub mod connection;
pub mod error;
pub mod publisher;
pub mod routing;
pub mod transport;

// 重新導出常用類型
pub use connection::{RabbitMQConnection, RabbitMQPool};
pub use error::PublishError;
pub use publisher::{EventPublisher, PublisherStats};
pub use routing::{partition_key, OutboundMessage, TopicTable};
pub use transport::{BrokerTransport, PublishReceipt, RabbitMQTransport, TransportConfig};
