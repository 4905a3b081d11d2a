//! Background probe loop
//!
//! Ticks on a short interval, asks the scheduler which nodes are due and fans
//! their probes out with bounded concurrency. Results are applied through the
//! registry unless the engine configuration changed while the probe was in
//! flight.

use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::config::ProbeConfig;
use crate::engine::{EngineStatus, EngineSupervisor};
use crate::health::{AdaptiveScheduler, HealthRegistry, Prober, ScoreModel};
use crate::models::ProbeResult;

pub struct ProbeService {
    registry: Arc<HealthRegistry>,
    scheduler: AdaptiveScheduler,
    model: ScoreModel,
    prober: Prober,
    supervisor: Arc<EngineSupervisor>,
    tick: Duration,
    max_concurrent: usize,
}

impl ProbeService {
    pub fn new(
        registry: Arc<HealthRegistry>,
        prober: Prober,
        supervisor: Arc<EngineSupervisor>,
        config: &ProbeConfig,
    ) -> Self {
        Self {
            registry,
            scheduler: AdaptiveScheduler::from_config(config),
            model: ScoreModel::new(
                config.smoothing_alpha,
                config.latency_ceiling_ms,
                config.min_success_ratio,
            ),
            prober,
            supervisor,
            tick: config.tick(),
            max_concurrent: config.max_concurrent.max(1),
        }
    }

    /// Run until the shutdown signal flips
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.supervisor.status() != EngineStatus::Running {
                        trace!("engine not running, skipping probe pass");
                        continue;
                    }
                    let Some(fingerprint) = self.supervisor.fingerprint() else {
                        continue;
                    };
                    self.run_pass(&fingerprint).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("probe loop shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One scheduling pass: probe everything due, bounded by max_concurrent
    pub async fn run_pass(&self, fingerprint: &str) {
        let snapshot = self.registry.snapshot();
        let due = self
            .scheduler
            .due_nodes(&snapshot, chrono::Utc::now(), self.max_concurrent);
        if due.is_empty() {
            return;
        }
        debug!(count = due.len(), "probing due nodes");

        let mut probes = stream::iter(due)
            .map(|name| {
                let prober = self.prober.clone();
                let fingerprint = fingerprint.to_string();
                async move { prober.probe(&name, &fingerprint).await }
            })
            .buffer_unordered(self.max_concurrent);

        while let Some(result) = probes.next().await {
            self.apply(result);
        }
    }

    /// Apply one result, discarding it when the configuration moved on
    fn apply(&self, result: ProbeResult) {
        let current = self.supervisor.fingerprint();
        if current.as_deref() != Some(result.fingerprint.as_str()) {
            warn!(node = %result.node, "discarding probe result from stale configuration");
            return;
        }

        match self.registry.apply(&self.model, &self.scheduler, &result) {
            Some(class) => {
                trace!(node = %result.node, success = result.success, %class, "probe applied")
            }
            None => debug!(node = %result.node, "probe result for unregistered node dropped"),
        }
    }
}
