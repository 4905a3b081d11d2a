//! HTTP control client for the supervised proxy engine
//!
//! Thin wrapper over the engine's local REST API: list proxies, switch the
//! selector group, measure per-proxy delay and hot-reload configuration.

use reqwest::StatusCode;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::error::{PoolError, Result};

const CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-request budget for a delay check: the engine-side timeout plus slack,
/// so the engine finishes the measurement before the client gives up
fn delay_request_timeout(timeout_ms: u64) -> Duration {
    Duration::from_millis(timeout_ms) + CONTROL_TIMEOUT
}

/// Client for the engine control API, cheap to clone
#[derive(Debug, Clone)]
pub struct EngineControl {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    version: String,
}

#[derive(Debug, Deserialize)]
struct ProxiesResponse {
    proxies: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct DelayResponse {
    delay: u64,
}

impl EngineControl {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(CONTROL_TIMEOUT)
            .no_proxy()
            .build()?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url)?;
        {
            let mut parts = url
                .path_segments_mut()
                .map_err(|_| PoolError::Control("control URL cannot be a base".to_string()))?;
            for segment in segments {
                parts.push(segment);
            }
        }
        Ok(url)
    }

    /// Engine version string, also serves as the readiness probe
    pub async fn version(&self) -> Result<String> {
        let url = self.url(&["version"])?;
        let response = self.client.get(url).send().await?.error_for_status()?;
        let body: VersionResponse = response.json().await?;
        Ok(body.version)
    }

    pub async fn is_reachable(&self) -> bool {
        self.version().await.is_ok()
    }

    /// Proxy names the engine currently knows about
    pub async fn list_proxies(&self) -> Result<Vec<String>> {
        let url = self.url(&["proxies"])?;
        let response = self.client.get(url).send().await?.error_for_status()?;
        let body: ProxiesResponse = response.json().await?;
        Ok(body.proxies.keys().cloned().collect())
    }

    /// Point a selector group at a specific proxy
    pub async fn switch(&self, group: &str, name: &str) -> Result<()> {
        let url = self.url(&["proxies", group])?;
        let response = self
            .client
            .put(url)
            .json(&serde_json::json!({ "name": name }))
            .send()
            .await?;

        match response.status() {
            StatusCode::NO_CONTENT => {
                debug!(group, name, "selector switched");
                Ok(())
            }
            status if status.is_success() => Ok(()),
            status => Err(PoolError::Control(format!(
                "switch {group} -> {name} returned {status}"
            ))),
        }
    }

    /// Measure one proxy's delay against a test URL, in milliseconds
    ///
    /// The request timeout is the engine-side budget plus slack so the engine
    /// always gets to finish (or fail) the check itself; the client default
    /// would otherwise cut off slow-but-working nodes early.
    pub async fn delay(&self, name: &str, test_url: &str, timeout_ms: u64) -> Result<u64> {
        let mut url = self.url(&["proxies", name, "delay"])?;
        url.query_pairs_mut()
            .append_pair("url", test_url)
            .append_pair("timeout", &timeout_ms.to_string());

        let response = self
            .client
            .get(url)
            .timeout(delay_request_timeout(timeout_ms))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(PoolError::Control(format!(
                "delay probe for {name} returned {}",
                response.status()
            )));
        }
        let body: DelayResponse = response.json().await?;
        Ok(body.delay)
    }

    /// Ask the engine to reload its configuration from a file on disk
    pub async fn reload(&self, config_path: &Path) -> Result<()> {
        let url = self.url(&["configs"])?;
        let response = self
            .client
            .put(url)
            .json(&serde_json::json!({ "path": config_path.to_string_lossy() }))
            .send()
            .await?;

        if response.status().is_success() {
            debug!(path = %config_path.display(), "configuration reloaded");
            Ok(())
        } else {
            Err(PoolError::Control(format!(
                "reload returned {}",
                response.status()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building_encodes_segments() {
        let control = EngineControl::new("http://127.0.0.1:9090").unwrap();

        let url = control.url(&["proxies", "jp 01/special"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:9090/proxies/jp%2001%2Fspecial"
        );
    }

    #[test]
    fn test_delay_url_carries_query() {
        let control = EngineControl::new("http://127.0.0.1:9090").unwrap();

        let mut url = control.url(&["proxies", "a", "delay"]).unwrap();
        url.query_pairs_mut()
            .append_pair("url", "http://t.example/204")
            .append_pair("timeout", "5000");

        assert!(url.as_str().contains("delay?url="));
        assert!(url.as_str().contains("timeout=5000"));
    }

    #[test]
    fn test_delay_budget_outlives_client_default() {
        // Delay checks configured longer than the shared client timeout must
        // not be cut off client-side; the engine owns the measurement budget.
        assert!(delay_request_timeout(15_000) > Duration::from_secs(15));
        assert!(delay_request_timeout(15_000) > CONTROL_TIMEOUT);
        assert_eq!(
            delay_request_timeout(100),
            Duration::from_millis(100) + CONTROL_TIMEOUT
        );
    }

    #[tokio::test]
    async fn test_unreachable_engine_reports_false() {
        // Port 1 is expected to refuse connections.
        let control = EngineControl::new("http://127.0.0.1:1").unwrap();
        assert!(!control.is_reachable().await);
    }
}
