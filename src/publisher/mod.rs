//! AMQP Broker Publisher
//!
//! Delivers routed messages to the configured RabbitMQ exchange. The
//! connection lifetime is selected per bridge: persistent mode opens one
//! connection at bridge start and reuses it for every publish; ephemeral
//! mode opens a fresh connection per message and closes it after every
//! attempt, success or failure.

use std::fmt;

use async_trait::async_trait;
use lapin::options::{BasicPublishOptions, ExchangeDeclareOptions, QueueDeclareOptions};
use lapin::types::FieldTable;
use lapin::uri::{AMQPAuthority, AMQPScheme, AMQPUri, AMQPUserInfo};
use lapin::{BasicProperties, Connection, ConnectionProperties, ExchangeKind};
use tracing::{debug, info};

use crate::config::RabbitMqConfig;

/// Error type for broker publish operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// Could not open a connection to the broker
    Connect(String),
    /// Channel setup, declaration, or publish failed
    Broker(String),
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishError::Connect(e) => write!(f, "could not connect to RabbitMQ: {}", e),
            PublishError::Broker(e) => write!(f, "broker error: {}", e),
        }
    }
}

impl std::error::Error for PublishError {}

impl From<lapin::Error> for PublishError {
    fn from(e: lapin::Error) -> Self {
        PublishError::Broker(e.to_string())
    }
}

/// A live broker connection that can publish routed messages.
#[async_trait]
pub trait BrokerConnection: Send {
    /// Publish `body` under `routing_key` to the configured exchange.
    async fn publish(&mut self, routing_key: &str, body: &str) -> Result<(), PublishError>;

    /// Close the connection, releasing the broker-side resources.
    async fn close(self);
}

/// Opens broker connections for one bridge's target.
#[async_trait]
pub trait BrokerConnector: Send {
    type Conn: BrokerConnection;

    async fn connect(&self) -> Result<Self::Conn, PublishError>;
}

/// Per-bridge broker connection lifetime.
///
/// Persistent holds one connection for the bridge's entire life; Ephemeral
/// opens and closes a connection around every message, even when the
/// publish fails, so no connection ever leaks.
pub enum BrokerHandle<C: BrokerConnector> {
    Persistent(C::Conn),
    Ephemeral(C),
}

impl<C: BrokerConnector> BrokerHandle<C> {
    /// Publish one message through this handle's connection policy.
    pub async fn dispatch(&mut self, routing_key: &str, body: &str) -> Result<(), PublishError> {
        match self {
            BrokerHandle::Persistent(conn) => conn.publish(routing_key, body).await,
            BrokerHandle::Ephemeral(connector) => {
                let mut conn = connector.connect().await?;
                let outcome = conn.publish(routing_key, body).await;
                conn.close().await;
                outcome
            }
        }
    }
}

fn exchange_kind(exchange_type: &str) -> ExchangeKind {
    match exchange_type {
        "direct" => ExchangeKind::Direct,
        "fanout" => ExchangeKind::Fanout,
        "headers" => ExchangeKind::Headers,
        "topic" => ExchangeKind::Topic,
        other => ExchangeKind::Custom(other.to_string()),
    }
}

/// Opens connections to one bridge's RabbitMQ target.
pub struct AmqpConnector {
    config: RabbitMqConfig,
}

impl AmqpConnector {
    pub fn new(config: RabbitMqConfig) -> Self {
        Self { config }
    }

    fn uri(&self) -> AMQPUri {
        AMQPUri {
            scheme: AMQPScheme::AMQP,
            authority: AMQPAuthority {
                userinfo: AMQPUserInfo {
                    username: self.config.username.clone(),
                    password: self.config.password.clone(),
                },
                host: self.config.host.clone(),
                port: self.config.port,
            },
            vhost: self.config.vhost.clone(),
            query: Default::default(),
        }
    }
}

#[async_trait]
impl BrokerConnector for AmqpConnector {
    type Conn = AmqpConnection;

    async fn connect(&self) -> Result<AmqpConnection, PublishError> {
        debug!("Connecting to the RabbitMQ broker");
        let connection = Connection::connect_uri(self.uri(), ConnectionProperties::default())
            .await
            .map_err(|e| PublishError::Connect(e.to_string()))?;
        info!("Connection to RabbitMQ established");
        Ok(AmqpConnection {
            connection,
            config: self.config.clone(),
        })
    }
}

/// One live AMQP connection plus the bridge's publish target.
pub struct AmqpConnection {
    connection: Connection,
    config: RabbitMqConfig,
}

#[async_trait]
impl BrokerConnection for AmqpConnection {
    async fn publish(&mut self, routing_key: &str, body: &str) -> Result<(), PublishError> {
        let channel = self.connection.create_channel().await?;

        // Declarations are idempotent; repeating them per message is safe.
        if !self.config.exchange.is_empty() {
            channel
                .exchange_declare(
                    &self.config.exchange,
                    exchange_kind(&self.config.exchange_type),
                    ExchangeDeclareOptions::default(),
                    FieldTable::default(),
                )
                .await?;
        }
        if let Some(queue) = &self.config.queue {
            channel
                .queue_declare(queue, QueueDeclareOptions::default(), FieldTable::default())
                .await?;
        }

        channel
            .basic_publish(
                &self.config.exchange,
                routing_key,
                BasicPublishOptions::default(),
                body.as_bytes(),
                BasicProperties::default(),
            )
            .await?
            .await?;
        Ok(())
    }

    async fn close(self) {
        // 200 is the AMQP reply-success code.
        if let Err(e) = self.connection.close(200, "done").await {
            debug!("Error closing RabbitMQ connection: {}", e);
        }
    }
}
