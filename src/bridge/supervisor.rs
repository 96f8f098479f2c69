//! Bridge Supervisor
//!
//! Launches one isolated task per configured bridge and waits for all of
//! them. Bridges share no mutable state; a fatal error or panic in one is
//! logged here and never disturbs its siblings.

use tokio::task::JoinSet;
use tracing::{error, info, info_span, Instrument};

use super::runner;
use crate::config::BridgeConfig;

/// Runs every configured bridge concurrently until all have terminated.
pub struct BridgeSupervisor {
    configs: Vec<BridgeConfig>,
    persistent: bool,
}

impl BridgeSupervisor {
    /// `persistent` selects the broker connection lifetime for every
    /// bridge: one long-lived connection per bridge, or one per message.
    pub fn new(configs: Vec<BridgeConfig>, persistent: bool) -> Self {
        Self {
            configs,
            persistent,
        }
    }

    /// Spawn all bridges and block until every one has terminated. In
    /// practice bridges run forever, so this returns only once each has
    /// hit a fatal error or the process is shutting down.
    pub async fn run(self) {
        let mut bridges = JoinSet::new();
        for config in self.configs {
            let persistent = self.persistent;
            let span = info_span!("bridge", name = %config.name);
            let name = config.name.clone();
            bridges.spawn(
                async move { (name, runner::run(config, persistent).await) }.instrument(span),
            );
        }

        while let Some(joined) = bridges.join_next().await {
            match joined {
                Ok((name, Err(e))) => {
                    error!("Bridge '{}' terminated: {}", name, e);
                }
                Ok((name, Ok(()))) => {
                    info!("Bridge '{}' exited", name);
                }
                Err(e) => {
                    error!("Bridge task failed: {}", e);
                }
            }
        }
    }
}
