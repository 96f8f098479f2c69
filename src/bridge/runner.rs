//! Bridge Loop
//!
//! The per-bridge state machine: connect the broker (persistent mode) and
//! the database, subscribe to the channel, then poll for notifications,
//! drain them in arrival order, and republish each one. Startup failures
//! and a lost database connection are fatal for this bridge only; every
//! per-message failure is logged and swallowed so the loop keeps running.

use std::fmt;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::BridgeConfig;
use crate::listener::{ListenError, Notification, NotificationSource, PgListener};
use crate::payload::RoutedMessage;
use crate::publisher::{AmqpConnector, BrokerConnector, BrokerHandle, PublishError};

/// How long one poll waits before giving the loop a chance to observe
/// process-level signals.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(2);

/// Fatal bridge failure, distinguishing the failing collaborator
#[derive(Debug)]
pub enum BridgeError {
    /// The database connection or subscription failed
    Database(ListenError),
    /// The broker connection failed during persistent-mode startup
    Broker(PublishError),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::Database(e) => write!(f, "{}", e),
            BridgeError::Broker(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for BridgeError {}

impl From<ListenError> for BridgeError {
    fn from(e: ListenError) -> Self {
        BridgeError::Database(e)
    }
}

impl From<PublishError> for BridgeError {
    fn from(e: PublishError) -> Self {
        BridgeError::Broker(e)
    }
}

/// Run one bridge to completion.
///
/// Returns only on a fatal error; a healthy bridge runs until the process
/// is terminated externally.
pub async fn run(config: BridgeConfig, persistent: bool) -> Result<(), BridgeError> {
    info!("Initiating bridge '{}'", config.name);

    let connector = AmqpConnector::new(config.rabbitmq.clone());
    let broker = if persistent {
        match connector.connect().await {
            Ok(conn) => BrokerHandle::Persistent(conn),
            Err(e) => {
                error!("Could not connect to RabbitMQ broker: {}", e);
                return Err(e.into());
            }
        }
    } else {
        BrokerHandle::Ephemeral(connector)
    };

    let mut listener = match PgListener::connect(&config.postgres).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Could not connect to PostgreSQL server: {}", e);
            return Err(e.into());
        }
    };
    if let Err(e) = listener.subscribe(&config.postgres.channel).await {
        error!(
            "Could not listen on channel '{}': {}",
            config.postgres.channel, e
        );
        return Err(e.into());
    }

    run_loop(&config, &mut listener, broker).await
}

/// Poll for notifications and republish them until the source fails.
///
/// Generic over the source and broker seams so the loop can be exercised
/// without live connections.
pub async fn run_loop<S, C>(
    config: &BridgeConfig,
    source: &mut S,
    mut broker: BrokerHandle<C>,
) -> Result<(), BridgeError>
where
    S: NotificationSource,
    C: BrokerConnector,
{
    info!("Beginning polling for notifications");
    loop {
        match source.wait_for_activity(POLL_TIMEOUT).await {
            Ok(false) => {
                debug!("Timed out while polling (this is normal)");
            }
            Ok(true) => {
                let drained = source.drain();
                debug!("Drained {} notification(s)", drained.len());
                for notification in drained {
                    forward(config, &mut broker, &notification).await;
                }
            }
            Err(e) => {
                error!("Unable to continue polling: {}", e);
                return Err(e.into());
            }
        }
    }
}

/// Parse one notification and republish it. Malformed payloads and publish
/// failures are discarded here with a warning; they never abort the drain.
async fn forward<C: BrokerConnector>(
    config: &BridgeConfig,
    broker: &mut BrokerHandle<C>,
    notification: &Notification,
) {
    let routed = match RoutedMessage::parse(&notification.payload) {
        Ok(routed) => routed,
        Err(e) => {
            warn!(
                "Improperly formatted notification received ({}); discarding: {}",
                e, notification.payload
            );
            return;
        }
    };

    match broker.dispatch(&routed.routing_key, &routed.body).await {
        Ok(()) => {
            info!("Message republished via '{}' bridge", config.name);
            debug!("Routing key: {}", routed.routing_key);
            debug!("Message: {}", routed.body);
        }
        Err(e) => {
            warn!(
                "Unable to republish message via '{}' bridge ({}); discarding: {}",
                config.name, e, notification.payload
            );
        }
    }
}
