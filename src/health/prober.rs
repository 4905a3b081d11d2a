//! Active probing of individual proxy nodes
//!
//! Probes go through the engine's per-proxy delay endpoint so a node can be
//! measured without touching the live selector group. A probe never returns
//! an error: every outcome, including transport failures, becomes a
//! [`ProbeResult`] for the score model to absorb.

use futures::future::join_all;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

use crate::config::ProbeConfig;
use crate::engine::EngineControl;
use crate::error::Result;
use crate::models::{ProbeReport, ProbeResult};

/// Grace on top of the engine-side budget before a whole probe is abandoned
const PROBE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ProberConfig {
    /// URLs each probe is measured against
    pub test_urls: Vec<String>,
    /// Overall budget for one node's probe
    pub timeout: Duration,
    /// How many test URLs must answer for the probe to count as a success
    pub required_successes: usize,
}

impl ProberConfig {
    pub fn from_probe_config(config: &ProbeConfig) -> Self {
        Self {
            test_urls: config.test_urls.clone(),
            timeout: config.timeout(),
            required_successes: config.required_url_successes.max(1),
        }
    }
}

/// Measures node health through the engine control API
#[derive(Debug, Clone)]
pub struct Prober {
    control: EngineControl,
    /// Local proxy endpoint used by on-demand tests
    proxy_url: String,
    selector_group: String,
    config: ProberConfig,
}

impl Prober {
    pub fn new(
        control: EngineControl,
        proxy_url: impl Into<String>,
        selector_group: impl Into<String>,
        config: ProberConfig,
    ) -> Self {
        Self {
            control,
            proxy_url: proxy_url.into(),
            selector_group: selector_group.into(),
            config,
        }
    }

    /// Probe one node against every test URL
    ///
    /// The result carries the configuration fingerprint active at dispatch
    /// time so the caller can drop it if a reload happened in between.
    #[instrument(skip(self), fields(node = %name))]
    pub async fn probe(&self, name: &str, fingerprint: &str) -> ProbeResult {
        let per_url_timeout_ms = self.config.timeout.as_millis().min(u64::MAX as u128) as u64;

        let attempts = self.config.test_urls.iter().map(|url| {
            let control = self.control.clone();
            let name = name.to_string();
            let url = url.clone();
            async move { control.delay(&name, &url, per_url_timeout_ms).await }
        });

        let budget = self.config.timeout + PROBE_GRACE;
        let outcomes = match tokio::time::timeout(budget, join_all(attempts)).await {
            Ok(outcomes) => outcomes,
            Err(_) => {
                return ProbeResult::failure(name, "probe timed out", fingerprint);
            }
        };

        let mut best: Option<(u64, &str)> = None;
        let mut successes = 0usize;
        let mut last_error = None;
        for (url, outcome) in self.config.test_urls.iter().zip(outcomes) {
            match outcome {
                Ok(delay_ms) => {
                    successes += 1;
                    if best.map_or(true, |(current, _)| delay_ms < current) {
                        best = Some((delay_ms, url.as_str()));
                    }
                }
                Err(e) => last_error = Some(e.to_string()),
            }
        }

        if successes >= self.config.required_successes {
            let (latency_ms, url) = best.unwrap_or((0, ""));
            debug!(latency_ms, successes, "probe succeeded");
            ProbeResult::success(name, latency_ms as f64, url, fingerprint)
        } else {
            let reason = last_error.unwrap_or_else(|| "no test URL answered".to_string());
            debug!(successes, required = self.config.required_successes, "probe failed");
            ProbeResult::failure(name, reason, fingerprint)
        }
    }

    /// On-demand end-to-end test: switch to the node, fetch a test URL
    /// through the local proxy port and report what the endpoint saw
    ///
    /// Transport failures are reported inside the `ProbeReport`; only control
    /// API errors propagate.
    pub async fn test_through_proxy(&self, name: &str, test_url: &str) -> Result<ProbeReport> {
        self.control.switch(&self.selector_group, name).await?;

        let client = reqwest::Client::builder()
            .proxy(reqwest::Proxy::all(&self.proxy_url)?)
            .timeout(self.config.timeout)
            .build()?;

        let started = Instant::now();
        match client.get(test_url).send().await {
            Ok(response) if response.status().is_success() => {
                let latency_ms = started.elapsed().as_millis() as f64;
                let ip = response
                    .json::<serde_json::Value>()
                    .await
                    .ok()
                    .and_then(|body| {
                        body.get("origin")
                            .or_else(|| body.get("ip"))
                            .and_then(|v| v.as_str())
                            .map(str::to_string)
                    });
                Ok(ProbeReport {
                    node: name.to_string(),
                    success: true,
                    latency_ms,
                    ip,
                })
            }
            Ok(response) => {
                debug!(status = %response.status(), "proxy test returned non-success");
                Ok(ProbeReport {
                    node: name.to_string(),
                    success: false,
                    latency_ms: started.elapsed().as_millis() as f64,
                    ip: None,
                })
            }
            Err(e) => {
                debug!(error = %e, "proxy test request failed");
                Ok(ProbeReport {
                    node: name.to_string(),
                    success: false,
                    latency_ms: 0.0,
                    ip: None,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_prober() -> Prober {
        // Port 1 refuses connections; every control call fails fast.
        let control = EngineControl::new("http://127.0.0.1:1").unwrap();
        Prober::new(
            control,
            "http://127.0.0.1:2",
            "PROXY",
            ProberConfig {
                test_urls: vec![
                    "http://t.example/a".to_string(),
                    "http://t.example/b".to_string(),
                ],
                timeout: Duration::from_secs(3),
                required_successes: 1,
            },
        )
    }

    #[tokio::test]
    async fn test_probe_failure_keeps_node_and_fingerprint() {
        let prober = unreachable_prober();

        let result = prober.probe("jp-01", "fp-abc").await;

        assert!(!result.success);
        assert_eq!(result.node, "jp-01");
        assert_eq!(result.fingerprint, "fp-abc");
        assert!(result.error.is_some());
        assert!(result.url.is_none());
    }

    #[tokio::test]
    async fn test_on_demand_test_propagates_control_errors() {
        let prober = unreachable_prober();

        // The switch call itself fails, so the error surfaces instead of a
        // failed report.
        assert!(prober
            .test_through_proxy("jp-01", "http://t.example/ip")
            .await
            .is_err());
    }

    #[test]
    fn test_required_successes_never_zero() {
        let config = ProbeConfig {
            required_url_successes: 0,
            ..ProbeConfig::default()
        };
        let prober_config = ProberConfig::from_probe_config(&config);
        assert_eq!(prober_config.required_successes, 1);
    }
}
