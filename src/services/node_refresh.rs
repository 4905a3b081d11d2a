//! Periodic node-set refresh
//!
//! Pulls a fresh node set from the configured source, renders it and hands it
//! to the supervisor. The registry is reseeded only when the configuration
//! actually changed. Fetch and render failures are logged and retried on the
//! next tick.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::engine::EngineSupervisor;
use crate::error::Result;
use crate::health::HealthRegistry;
use crate::sources::{ConfigKind, ConfigRenderer, NodeSource};

pub struct NodeRefreshService {
    source: Arc<dyn NodeSource>,
    renderer: Arc<dyn ConfigRenderer>,
    supervisor: Arc<EngineSupervisor>,
    registry: Arc<HealthRegistry>,
    groups: Vec<String>,
    kind: ConfigKind,
    interval: Duration,
}

impl NodeRefreshService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: Arc<dyn NodeSource>,
        renderer: Arc<dyn ConfigRenderer>,
        supervisor: Arc<EngineSupervisor>,
        registry: Arc<HealthRegistry>,
        groups: Vec<String>,
        kind: ConfigKind,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            renderer,
            supervisor,
            registry,
            groups,
            kind,
            interval,
        }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick fires immediately; the node set was just loaded.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.refresh_once().await {
                        Ok(true) => info!("node set refreshed"),
                        Ok(false) => debug!("node set unchanged"),
                        Err(e) => warn!(error = %e, "node refresh failed, will retry"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("node refresh shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Fetch, render and apply one refresh; returns whether anything changed
    pub async fn refresh_once(&self) -> Result<bool> {
        let nodes = self.source.fetch_nodes().await?;
        debug!(count = nodes.len(), "fetched node set");

        let rendered = self.renderer.render(&nodes, &self.groups, self.kind)?;
        let changed = self.supervisor.apply_config(&rendered).await?;
        if changed {
            self.registry.seed(&nodes);
        }
        Ok(changed)
    }
}
