//! Integration seams: node sources, configuration rendering and route rules
//!
//! The pool core does not know where proxy nodes come from or what the
//! engine's configuration format looks like. Callers plug those in through
//! the traits here.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::models::ProxyNode;

/// Which rendering profile to build the engine configuration for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigKind {
    /// Tuned for scraping: aggressive timeouts, no fallback groups
    #[default]
    Scraping,
    /// Latency-ordered groups for speed-sensitive traffic
    Speed,
    /// Engine defaults
    General,
}

impl ConfigKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigKind::Scraping => "scraping",
            ConfigKind::Speed => "speed",
            ConfigKind::General => "general",
        }
    }
}

/// An engine configuration document plus its content fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedConfig {
    pub document: String,
    pub fingerprint: String,
}

impl RenderedConfig {
    pub fn new(document: impl Into<String>) -> Self {
        let document = document.into();
        let digest = Sha256::digest(document.as_bytes());
        Self {
            document,
            fingerprint: format!("{digest:x}"),
        }
    }
}

/// Supplies the current set of candidate proxy nodes
#[async_trait]
pub trait NodeSource: Send + Sync {
    async fn fetch_nodes(&self) -> Result<Vec<ProxyNode>>;
}

/// Renders a node set into a full engine configuration document
pub trait ConfigRenderer: Send + Sync {
    fn render(
        &self,
        nodes: &[ProxyNode],
        groups: &[String],
        kind: ConfigKind,
    ) -> Result<RenderedConfig>;
}

/// Decides whether a target URL should go through the pool at all
pub trait RouteRules: Send + Sync {
    fn should_proxy(&self, url: &str) -> bool;
}

/// Route rules that send everything through the pool
#[derive(Debug, Clone, Copy, Default)]
pub struct ProxyAll;

impl RouteRules for ProxyAll {
    fn should_proxy(&self, _url: &str) -> bool {
        true
    }
}
