//! proxypool: health-tracked proxy selection over a supervised proxy engine
//!
//! The pool owns an external proxy engine process, probes every registered
//! node on an adaptive schedule, keeps a per-node health score, and answers
//! selection requests from in-memory state. Callers plug in a node source, a
//! configuration renderer and route rules; everything else is handled here.
//!
//! Typical usage:
//!
//! ```no_run
//! use std::sync::Arc;
//! use proxypool::{Config, ConfigKind, ProxyPool, ProxyAll};
//! # use proxypool::{ConfigRenderer, RenderedConfig, ProxyNode, Result};
//! # struct MyRenderer;
//! # impl ConfigRenderer for MyRenderer {
//! #     fn render(&self, _: &[ProxyNode], _: &[String], _: ConfigKind) -> Result<RenderedConfig> {
//! #         Ok(RenderedConfig::new(""))
//! #     }
//! # }
//! # async fn run(nodes: Vec<ProxyNode>) -> Result<()> {
//! let config = Config::from_env()?;
//! let pool = ProxyPool::new(config, Arc::new(MyRenderer))?;
//! pool.start(nodes, Arc::new(ProxyAll), ConfigKind::Scraping).await?;
//!
//! if let Some(proxy_url) = pool.get_proxy(Some("https://example.com"), None).await {
//!     // route the request through proxy_url
//! }
//!
//! pool.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod health;
pub mod models;
pub mod pool;
pub mod selection;
pub mod services;
pub mod sources;

pub use config::{Config, EngineSettings, ProbeConfig, SelectionConfig};
pub use engine::{EngineControl, EngineStatus, EngineSupervisor};
pub use error::{PoolError, Result};
pub use health::{AdaptiveScheduler, HealthRegistry, Prober, ProberConfig, ScoreModel};
pub use models::{HealthClass, HealthRecord, ProbeReport, ProbeResult, ProxyNode, ProxyProtocol};
pub use pool::{NodeHealthSummary, PoolStats, ProxyPool};
pub use selection::{NodeScore, NodeSelector, SelectionStrategy, UsageTracker};
pub use sources::{ConfigKind, ConfigRenderer, NodeSource, ProxyAll, RenderedConfig, RouteRules};
