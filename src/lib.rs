//! PgRelay - Bridge PostgreSQL NOTIFY events to AMQP message brokers
//!
//! Listens for asynchronous notifications on configured PostgreSQL channels
//! and republishes each payload to a RabbitMQ exchange under the routing key
//! embedded in the payload. Each configured bridge runs as an independent
//! task with its own database and broker connections.

pub mod bridge;
pub mod config;
pub mod listener;
pub mod payload;
pub mod publisher;

pub use bridge::{BridgeError, BridgeSupervisor};
pub use config::{BridgeConfig, ConfigError, PostgresConfig, RabbitMqConfig};
pub use listener::{ListenError, Notification, NotificationSource, PgListener};
pub use payload::{PayloadError, RoutedMessage};
pub use publisher::{
    AmqpConnection, AmqpConnector, BrokerConnection, BrokerConnector, BrokerHandle, PublishError,
};
