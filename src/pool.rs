//! Pool facade
//!
//! The single entry point callers hold: starts the supervised engine, runs
//! the background probe and refresh services, and answers selection requests
//! from registry snapshots without ever blocking on a probe.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::engine::{EngineStatus, EngineSupervisor};
use crate::error::{PoolError, Result};
use crate::health::{HealthRegistry, Prober, ProberConfig};
use crate::models::{HealthClass, ProbeReport, ProxyNode};
use crate::selection::{SelectionStrategy, SelectorSet};
use crate::services::{NodeRefreshService, ProbeService};
use crate::sources::{ConfigKind, ConfigRenderer, NodeSource, RouteRules};

/// Budget for the best-effort selector switch inside `get_proxy`
const SWITCH_TIMEOUT: Duration = Duration::from_secs(2);

/// Health and usage summary for one node
#[derive(Debug, Clone, Serialize)]
pub struct NodeHealthSummary {
    pub name: String,
    pub class: HealthClass,
    pub score: f64,
    pub success_count: u64,
    pub failure_count: u64,
    pub avg_latency_ms: f64,
    pub usage: u64,
}

/// Point-in-time view of the whole pool
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub engine_status: String,
    pub config_fingerprint: Option<String>,
    pub restart_count: u32,
    pub node_count: usize,
    pub eligible_count: usize,
    pub last_error: Option<String>,
    pub nodes: Vec<NodeHealthSummary>,
}

impl std::fmt::Debug for ProxyPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyPool")
            .field("default_strategy", &self.default_strategy)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

pub struct ProxyPool {
    config: Config,
    registry: Arc<HealthRegistry>,
    supervisor: Arc<EngineSupervisor>,
    selectors: SelectorSet,
    prober: Prober,
    renderer: Arc<dyn ConfigRenderer>,
    rules: parking_lot::RwLock<Arc<dyn RouteRules>>,
    node_source: Option<(Arc<dyn NodeSource>, Duration)>,
    default_strategy: SelectionStrategy,
    shutdown_tx: parking_lot::RwLock<Option<watch::Sender<bool>>>,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
}

impl ProxyPool {
    pub fn new(config: Config, renderer: Arc<dyn ConfigRenderer>) -> Result<Self> {
        let default_strategy = SelectionStrategy::from_str(&config.selection.default_strategy)
            .ok_or_else(|| {
                PoolError::InvalidConfig(format!(
                    "unknown selection strategy: {}",
                    config.selection.default_strategy
                ))
            })?;

        let supervisor = Arc::new(EngineSupervisor::new(config.engine.clone())?);
        let prober = Prober::new(
            supervisor.control().clone(),
            config.engine.proxy_url(),
            config.engine.selector_group.clone(),
            ProberConfig::from_probe_config(&config.probe),
        );

        Ok(Self {
            config,
            registry: Arc::new(HealthRegistry::new()),
            supervisor,
            selectors: SelectorSet::new(),
            prober,
            renderer,
            rules: parking_lot::RwLock::new(Arc::new(crate::sources::ProxyAll)),
            node_source: None,
            default_strategy,
            shutdown_tx: parking_lot::RwLock::new(None),
            tasks: parking_lot::Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        })
    }

    /// Enable periodic node-set refresh from an external source
    pub fn with_node_source(mut self, source: Arc<dyn NodeSource>, interval: Duration) -> Self {
        self.node_source = Some((source, interval));
        self
    }

    /// Local forward-proxy URL handed out by `get_proxy`
    pub fn proxy_url(&self) -> String {
        self.config.engine.proxy_url()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Render the configuration, start the engine and launch the background
    /// services
    #[instrument(skip(self, nodes, rules), fields(nodes = nodes.len()))]
    pub async fn start(
        &self,
        nodes: Vec<ProxyNode>,
        rules: Arc<dyn RouteRules>,
        kind: ConfigKind,
    ) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        *self.rules.write() = rules;

        let groups = vec![self.config.engine.selector_group.clone()];
        let rendered = match self.renderer.render(&nodes, &groups, kind) {
            Ok(rendered) => rendered,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        if let Err(e) = self.supervisor.start(&rendered).await {
            self.running.store(false, Ordering::SeqCst);
            return Err(e);
        }

        self.registry.seed(&nodes);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        let probe_service = ProbeService::new(
            Arc::clone(&self.registry),
            self.prober.clone(),
            Arc::clone(&self.supervisor),
            &self.config.probe,
        );
        let probe_shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            probe_service.run(probe_shutdown).await;
        }));

        let liveness_supervisor = Arc::clone(&self.supervisor);
        let liveness_shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            liveness_supervisor.run_liveness_loop(liveness_shutdown).await;
        }));

        if let Some((source, interval)) = &self.node_source {
            let refresh = NodeRefreshService::new(
                Arc::clone(source),
                Arc::clone(&self.renderer),
                Arc::clone(&self.supervisor),
                Arc::clone(&self.registry),
                groups,
                kind,
                *interval,
            );
            let refresh_shutdown = shutdown_rx;
            tasks.push(tokio::spawn(async move {
                refresh.run(refresh_shutdown).await;
            }));
        }

        *self.shutdown_tx.write() = Some(shutdown_tx);
        *self.tasks.lock() = tasks;
        info!("pool started");
        Ok(())
    }

    /// Pick a node for a request and return the local proxy URL
    ///
    /// Never blocks on probing: selection runs on the current registry
    /// snapshot. The selector switch is best-effort; if the control API is
    /// slow the URL is returned anyway and traffic rides the previous node.
    pub async fn get_proxy(
        &self,
        url: Option<&str>,
        strategy: Option<SelectionStrategy>,
    ) -> Option<String> {
        if let Some(url) = url {
            if !self.rules.read().should_proxy(url) {
                debug!(url, "route rules bypass the pool");
                return None;
            }
        }
        if !self.is_running() {
            return None;
        }

        let strategy = strategy.unwrap_or(self.default_strategy);
        let snapshot = self.registry.snapshot();
        let picked = self.selectors.select(strategy, &snapshot)?;

        let switch = self
            .supervisor
            .control()
            .switch(&self.config.engine.selector_group, &picked);
        match tokio::time::timeout(SWITCH_TIMEOUT, switch).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(node = %picked, error = %e, "selector switch failed"),
            Err(_) => warn!(node = %picked, "selector switch timed out"),
        }

        Some(self.proxy_url())
    }

    /// Switch the selector group explicitly
    ///
    /// With a name, switches to that node; without one, selects by strategy.
    /// Returns the node now active, or `None` when nothing was selectable.
    pub async fn switch_proxy(
        &self,
        name: Option<&str>,
        strategy: Option<SelectionStrategy>,
    ) -> Result<Option<String>> {
        if !self.is_running() {
            return Err(PoolError::NotRunning);
        }

        let target = match name {
            Some(name) => {
                if !self.registry.contains(name) {
                    return Err(PoolError::NodeUnknown(name.to_string()));
                }
                name.to_string()
            }
            None => {
                let strategy = strategy.unwrap_or(self.default_strategy);
                match self.selectors.select(strategy, &self.registry.snapshot()) {
                    Some(picked) => picked,
                    None => return Ok(None),
                }
            }
        };

        self.supervisor
            .control()
            .switch(&self.config.engine.selector_group, &target)
            .await?;
        info!(node = %target, "switched active proxy");
        Ok(Some(target))
    }

    /// End-to-end test of one node through the local proxy port
    pub async fn test_proxy(&self, name: &str, test_url: Option<&str>) -> Result<ProbeReport> {
        if !self.is_running() {
            return Err(PoolError::NotRunning);
        }
        if !self.registry.contains(name) {
            return Err(PoolError::NodeUnknown(name.to_string()));
        }

        let default_url = self
            .config
            .probe
            .test_urls
            .first()
            .map(String::as_str)
            .unwrap_or("http://httpbin.org/ip");
        self.prober
            .test_through_proxy(name, test_url.unwrap_or(default_url))
            .await
    }

    /// Snapshot of engine state and per-node health
    pub fn get_stats(&self) -> PoolStats {
        let snapshot = self.registry.snapshot();
        let nodes = snapshot
            .iter()
            .map(|(name, record)| NodeHealthSummary {
                name: name.clone(),
                class: record.class,
                score: record.score,
                success_count: record.success_count,
                failure_count: record.failure_count,
                avg_latency_ms: record.avg_latency_ms,
                usage: self.selectors.usage().usage(name),
            })
            .collect();

        PoolStats {
            engine_status: self.supervisor.status().to_string(),
            config_fingerprint: self.supervisor.fingerprint(),
            restart_count: self.supervisor.restart_count(),
            node_count: snapshot.len(),
            eligible_count: self.registry.eligible_count(),
            last_error: self.supervisor.last_error(),
            nodes,
        }
    }

    /// Request an immediate probe of one node on the next pass
    pub fn mark_node_due(&self, name: &str) {
        self.registry.mark_due(name);
    }

    /// Stop the background services and the engine
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        if let Some(tx) = self.shutdown_tx.write().take() {
            let _ = tx.send(true);
        }

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "background task did not shut down cleanly");
            }
        }

        self.supervisor.stop().await;
        info!("pool stopped");
    }

    /// Current engine status
    pub fn engine_status(&self) -> EngineStatus {
        self.supervisor.status()
    }
}
