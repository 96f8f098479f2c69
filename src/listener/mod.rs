//! PostgreSQL Notification Listener
//!
//! Owns one database connection per bridge and the single LISTEN
//! subscription on its configured channel. The tokio-postgres connection is
//! driven by a background task that forwards `AsyncMessage::Notification`
//! values into an in-order buffer; the bridge loop waits on that buffer
//! with a bounded timeout so it never busy-spins.
//!
//! tokio-postgres runs in autocommit outside explicit transactions, so
//! notifications become visible without any commit handling here.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, StreamExt};
use tokio::sync::mpsc;
use tokio_postgres::{AsyncMessage, Client, NoTls};
use tracing::{debug, info, warn};

use crate::config::PostgresConfig;

/// Error type for database subscription operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenError {
    /// Could not open the database connection
    Connect(String),
    /// The LISTEN command failed
    Subscribe(String),
    /// The connection died while the bridge was running
    ConnectionLost,
}

impl fmt::Display for ListenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenError::Connect(e) => write!(f, "could not connect to PostgreSQL: {}", e),
            ListenError::Subscribe(e) => write!(f, "could not listen on channel: {}", e),
            ListenError::ConnectionLost => write!(f, "PostgreSQL connection lost"),
        }
    }
}

impl std::error::Error for ListenError {}

/// An asynchronous event delivered by the database on a subscribed channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Channel the notification arrived on
    pub channel: String,
    /// Raw payload, expected to be `<routing_key>:<body>`
    pub payload: String,
}

/// Source of buffered notifications, the seam the bridge loop polls.
///
/// Implemented by [`PgListener`] for real bridges and by test doubles for
/// exercising the loop without a database.
#[async_trait]
pub trait NotificationSource: Send {
    /// Block up to `timeout` waiting for any activity on the subscription.
    ///
    /// `Ok(false)` is a normal, silent timeout. `Ok(true)` means at least
    /// one notification is buffered for [`drain`](Self::drain). An error
    /// means the connection is gone and the bridge must stop.
    async fn wait_for_activity(&mut self, timeout: Duration) -> Result<bool, ListenError>;

    /// Remove and return all buffered notifications in arrival order.
    fn drain(&mut self) -> Vec<Notification>;
}

/// In-order notification buffer shared by [`PgListener`] and its driver
/// task. A notification picked up while waiting stays pending until the
/// next drain.
struct NotificationBuffer {
    rx: mpsc::UnboundedReceiver<Notification>,
    pending: Vec<Notification>,
}

impl NotificationBuffer {
    fn new(rx: mpsc::UnboundedReceiver<Notification>) -> Self {
        Self {
            rx,
            pending: Vec::new(),
        }
    }

    async fn wait_for_activity(&mut self, timeout: Duration) -> Result<bool, ListenError> {
        if !self.pending.is_empty() {
            return Ok(true);
        }
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Err(_) => Ok(false),
            Ok(Some(notification)) => {
                self.pending.push(notification);
                Ok(true)
            }
            // The sender lives in the connection driver task; a closed
            // channel means the connection itself is gone.
            Ok(None) => Err(ListenError::ConnectionLost),
        }
    }

    /// Drain preserves arrival (FIFO) order within a cycle.
    fn drain(&mut self) -> Vec<Notification> {
        let mut drained = std::mem::take(&mut self.pending);
        while let Ok(notification) = self.rx.try_recv() {
            drained.push(notification);
        }
        drained
    }
}

/// Listening side of one bridge: a dedicated PostgreSQL connection plus its
/// channel subscription.
pub struct PgListener {
    client: Client,
    buffer: NotificationBuffer,
}

impl PgListener {
    /// Connect to the database and spawn the connection driver task.
    ///
    /// Connection failure is fatal for the bridge; there is no retry.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, ListenError> {
        debug!("Connecting to the PostgreSQL server");

        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&config.host)
            .port(config.port)
            .dbname(&config.database)
            .user(&config.username)
            .password(&config.password);

        let (client, mut connection) = pg_config
            .connect(NoTls)
            .await
            .map_err(|e| ListenError::Connect(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut messages = stream::poll_fn(move |cx| connection.poll_message(cx));
        tokio::spawn(async move {
            while let Some(message) = messages.next().await {
                match message {
                    Ok(AsyncMessage::Notification(n)) => {
                        let forwarded = tx.send(Notification {
                            channel: n.channel().to_string(),
                            payload: n.payload().to_string(),
                        });
                        if forwarded.is_err() {
                            // Listener dropped; stop driving the connection.
                            break;
                        }
                    }
                    Ok(AsyncMessage::Notice(notice)) => {
                        debug!("PostgreSQL notice: {}", notice);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("PostgreSQL connection error: {}", e);
                        break;
                    }
                }
            }
            // Dropping tx here closes the buffer, which the bridge loop
            // observes as ConnectionLost.
        });

        info!("Connection to PostgreSQL established");
        Ok(Self {
            client,
            buffer: NotificationBuffer::new(rx),
        })
    }

    /// Start listening on the configured channel. Failure is fatal for the
    /// bridge.
    pub async fn subscribe(&self, channel: &str) -> Result<(), ListenError> {
        debug!("Preparing to start listening on channel '{}'", channel);
        // The channel name was validated as a plain identifier at config
        // load; quoting keeps LISTEN exact about case.
        self.client
            .batch_execute(&format!("LISTEN \"{}\"", channel))
            .await
            .map_err(|e| ListenError::Subscribe(e.to_string()))?;
        info!("Listening on channel '{}'", channel);
        Ok(())
    }
}

#[async_trait]
impl NotificationSource for PgListener {
    async fn wait_for_activity(&mut self, timeout: Duration) -> Result<bool, ListenError> {
        self.buffer.wait_for_activity(timeout).await
    }

    fn drain(&mut self) -> Vec<Notification> {
        self.buffer.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(payload: &str) -> Notification {
        Notification {
            channel: "test_channel".to_string(),
            payload: payload.to_string(),
        }
    }

    #[tokio::test]
    async fn test_wait_times_out_without_activity() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let mut buffer = NotificationBuffer::new(rx);
        let activity = buffer
            .wait_for_activity(Duration::from_millis(10))
            .await
            .unwrap();
        assert!(!activity);
        assert!(buffer.drain().is_empty());
    }

    #[tokio::test]
    async fn test_drain_preserves_arrival_order() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut buffer = NotificationBuffer::new(rx);

        tx.send(notification("a:1")).unwrap();
        tx.send(notification("b:2")).unwrap();
        tx.send(notification("c:3")).unwrap();

        let activity = buffer
            .wait_for_activity(Duration::from_secs(1))
            .await
            .unwrap();
        assert!(activity);

        let payloads: Vec<_> = buffer.drain().into_iter().map(|n| n.payload).collect();
        assert_eq!(payloads, vec!["a:1", "b:2", "c:3"]);
        assert!(buffer.drain().is_empty());
    }

    #[tokio::test]
    async fn test_notification_seen_while_waiting_stays_pending() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut buffer = NotificationBuffer::new(rx);

        tx.send(notification("a:1")).unwrap();
        assert!(buffer
            .wait_for_activity(Duration::from_secs(1))
            .await
            .unwrap());
        // A second wait without a drain must still report activity.
        assert!(buffer
            .wait_for_activity(Duration::from_millis(10))
            .await
            .unwrap());
        assert_eq!(buffer.drain().len(), 1);
    }

    #[tokio::test]
    async fn test_closed_channel_is_connection_lost() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut buffer = NotificationBuffer::new(rx);
        drop(tx);
        let err = buffer
            .wait_for_activity(Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, ListenError::ConnectionLost);
    }

    #[tokio::test]
    async fn test_buffered_notifications_survive_sender_drop() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut buffer = NotificationBuffer::new(rx);
        tx.send(notification("a:1")).unwrap();
        drop(tx);

        // The buffered notification is still delivered before the loss is
        // reported.
        assert!(buffer
            .wait_for_activity(Duration::from_secs(1))
            .await
            .unwrap());
        assert_eq!(buffer.drain().len(), 1);
        let err = buffer
            .wait_for_activity(Duration::from_secs(1))
            .await
            .unwrap_err();
        assert_eq!(err, ListenError::ConnectionLost);
    }
}
