use crate::error::{Result, PoolError};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Probe scheduling and scoring configuration
    pub probe: ProbeConfig,
    /// Supervised engine process configuration
    pub engine: EngineSettings,
    /// Selection defaults
    pub selection: SelectionConfig,
}

#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Base interval between probes of one node, in seconds (default: 300)
    pub base_interval: u64,
    /// Lower clamp for the adaptive probe interval (default: 60)
    pub min_interval: u64,
    /// Upper clamp for the adaptive probe interval (default: 1800)
    pub max_interval: u64,
    /// Scheduling pass tick, in seconds (default: 5)
    pub tick: u64,
    /// Overall timeout for one probe, in seconds (default: 15)
    pub timeout: u64,
    /// Maximum probes dispatched in parallel per pass (default: 10)
    pub max_concurrent: usize,
    /// URLs tested through the engine during a probe
    pub test_urls: Vec<String>,
    /// How many test URLs must succeed for the probe to count as a success
    pub required_url_successes: usize,
    /// Success-ratio hard floor; below it a node is forced to critical
    pub min_success_ratio: f64,
    /// EMA smoothing factor for score and latency updates
    pub smoothing_alpha: f64,
    /// Latency ceiling for the multiplicative score penalty, in milliseconds
    pub latency_ceiling_ms: f64,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Path to the proxy-engine binary (locating/installing it is the caller's job)
    pub binary: PathBuf,
    /// Directory where rendered configurations are written
    pub config_dir: PathBuf,
    /// Local forward-proxy port exposed by the engine (default: 7890)
    pub proxy_port: u16,
    /// Control API port (default: 9090)
    pub api_port: u16,
    /// Selector group name the pool drives via the control API (default: PROXY)
    pub selector_group: String,
    /// Seconds to wait for the control endpoint after spawning (default: 30)
    pub startup_timeout: u64,
    /// Seconds between liveness checks of the child process (default: 10)
    pub liveness_interval: u64,
    /// Bounded restart attempts after an unexpected exit (default: 5)
    pub max_restarts: u32,
    /// Seconds to wait between restart attempts (default: 2)
    pub restart_backoff: u64,
}

#[derive(Debug, Clone)]
pub struct SelectionConfig {
    /// Default strategy when the caller does not pass one
    /// (health_weighted, round_robin, least_used, random)
    pub default_strategy: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let min_success_ratio: f64 = get_env_or("POOL_PROBE_MIN_SUCCESS_RATIO", "0.25")
            .parse()
            .map_err(|_| {
                PoolError::InvalidConfig("POOL_PROBE_MIN_SUCCESS_RATIO must be a number".into())
            })?;
        if !(0.0..=1.0).contains(&min_success_ratio) {
            return Err(PoolError::InvalidConfig(
                "POOL_PROBE_MIN_SUCCESS_RATIO must be within [0, 1]".into(),
            ));
        }

        let smoothing_alpha: f64 = get_env_or("POOL_PROBE_SMOOTHING_ALPHA", "0.3")
            .parse()
            .map_err(|_| {
                PoolError::InvalidConfig("POOL_PROBE_SMOOTHING_ALPHA must be a number".into())
            })?;
        if !(0.0..=1.0).contains(&smoothing_alpha) {
            return Err(PoolError::InvalidConfig(
                "POOL_PROBE_SMOOTHING_ALPHA must be within [0, 1]".into(),
            ));
        }

        let min_interval = get_env_parsed("POOL_PROBE_MIN_INTERVAL", "60")?;
        let max_interval = get_env_parsed("POOL_PROBE_MAX_INTERVAL", "1800")?;
        if min_interval > max_interval {
            return Err(PoolError::InvalidConfig(
                "POOL_PROBE_MIN_INTERVAL must not exceed POOL_PROBE_MAX_INTERVAL".into(),
            ));
        }

        Ok(Config {
            probe: ProbeConfig {
                base_interval: get_env_parsed("POOL_PROBE_BASE_INTERVAL", "300")?,
                min_interval,
                max_interval,
                tick: get_env_parsed("POOL_PROBE_TICK", "5")?,
                timeout: get_env_parsed("POOL_PROBE_TIMEOUT", "15")?,
                max_concurrent: get_env_or("POOL_PROBE_MAX_CONCURRENT", "10")
                    .parse()
                    .unwrap_or(10),
                test_urls: parse_test_urls(&get_env_or(
                    "POOL_PROBE_TEST_URLS",
                    "http://www.gstatic.com/generate_204,https://www.google.com/generate_204,http://httpbin.org/ip",
                )),
                required_url_successes: get_env_or("POOL_PROBE_REQUIRED_URL_SUCCESSES", "1")
                    .parse()
                    .unwrap_or(1)
                    .max(1),
                min_success_ratio,
                smoothing_alpha,
                latency_ceiling_ms: get_env_or("POOL_PROBE_LATENCY_CEILING_MS", "2000")
                    .parse()
                    .unwrap_or(2000.0),
            },
            engine: EngineSettings {
                binary: PathBuf::from(get_env_or("POOL_ENGINE_BINARY", "mihomo")),
                config_dir: PathBuf::from(get_env_or("POOL_ENGINE_CONFIG_DIR", "./engine_configs")),
                proxy_port: get_env_or("POOL_ENGINE_PROXY_PORT", "7890").parse().map_err(
                    |_| PoolError::InvalidConfig("POOL_ENGINE_PROXY_PORT must be a valid port".into()),
                )?,
                api_port: get_env_or("POOL_ENGINE_API_PORT", "9090").parse().map_err(
                    |_| PoolError::InvalidConfig("POOL_ENGINE_API_PORT must be a valid port".into()),
                )?,
                selector_group: get_env_or("POOL_ENGINE_SELECTOR_GROUP", "PROXY"),
                startup_timeout: get_env_parsed("POOL_ENGINE_STARTUP_TIMEOUT", "30")?,
                liveness_interval: get_env_parsed("POOL_ENGINE_LIVENESS_INTERVAL", "10")?,
                max_restarts: get_env_or("POOL_ENGINE_MAX_RESTARTS", "5").parse().unwrap_or(5),
                restart_backoff: get_env_parsed("POOL_ENGINE_RESTART_BACKOFF", "2")?,
            },
            selection: SelectionConfig {
                default_strategy: get_env_or("POOL_SELECTION_STRATEGY", "health_weighted"),
            },
        })
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            base_interval: 300,
            min_interval: 60,
            max_interval: 1800,
            tick: 5,
            timeout: 15,
            max_concurrent: 10,
            test_urls: vec![
                "http://www.gstatic.com/generate_204".to_string(),
                "https://www.google.com/generate_204".to_string(),
                "http://httpbin.org/ip".to_string(),
            ],
            required_url_successes: 1,
            min_success_ratio: 0.25,
            smoothing_alpha: 0.3,
            latency_ceiling_ms: 2000.0,
        }
    }
}

impl ProbeConfig {
    pub fn base_interval(&self) -> Duration {
        Duration::from_secs(self.base_interval)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_secs(self.max_interval)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout.max(1))
    }
}

impl EngineSettings {
    /// Local forward-proxy URL handed out to callers
    pub fn proxy_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.proxy_port)
    }

    /// Control endpoint base URL
    pub fn api_base(&self) -> String {
        format!("http://127.0.0.1:{}", self.api_port)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout.max(1))
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_secs(self.liveness_interval.max(1))
    }

    pub fn restart_backoff(&self) -> Duration {
        Duration::from_secs(self.restart_backoff)
    }
}

fn parse_test_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn get_env_parsed(key: &str, default: &str) -> Result<u64> {
    get_env_or(key, default)
        .parse()
        .map_err(|_| PoolError::InvalidConfig(format!("{} must be a valid number", key)))
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const CONFIG_ENV_KEYS: &[&str] = &[
        "POOL_PROBE_BASE_INTERVAL",
        "POOL_PROBE_MIN_INTERVAL",
        "POOL_PROBE_MAX_INTERVAL",
        "POOL_PROBE_TICK",
        "POOL_PROBE_TIMEOUT",
        "POOL_PROBE_MAX_CONCURRENT",
        "POOL_PROBE_TEST_URLS",
        "POOL_PROBE_REQUIRED_URL_SUCCESSES",
        "POOL_PROBE_MIN_SUCCESS_RATIO",
        "POOL_PROBE_SMOOTHING_ALPHA",
        "POOL_PROBE_LATENCY_CEILING_MS",
        "POOL_ENGINE_BINARY",
        "POOL_ENGINE_CONFIG_DIR",
        "POOL_ENGINE_PROXY_PORT",
        "POOL_ENGINE_API_PORT",
        "POOL_ENGINE_SELECTOR_GROUP",
        "POOL_ENGINE_STARTUP_TIMEOUT",
        "POOL_ENGINE_LIVENESS_INTERVAL",
        "POOL_ENGINE_MAX_RESTARTS",
        "POOL_ENGINE_RESTART_BACKOFF",
        "POOL_SELECTION_STRATEGY",
    ];

    struct EnvGuard {
        saved: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(keys: &[&str]) -> Self {
            let saved = keys
                .iter()
                .map(|&key| {
                    let old = env::var(key).ok();
                    env::remove_var(key);
                    (key.to_string(), old)
                })
                .collect();

            Self { saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.saved.drain(..) {
                match value {
                    Some(v) => env::set_var(key, v),
                    None => env::remove_var(key),
                }
            }
        }
    }

    #[test]
    fn test_config_from_env_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        let config = Config::from_env().unwrap();

        assert_eq!(config.probe.base_interval, 300);
        assert_eq!(config.probe.min_interval, 60);
        assert_eq!(config.probe.max_interval, 1800);
        assert_eq!(config.probe.max_concurrent, 10);
        assert_eq!(config.probe.test_urls.len(), 3);
        assert!((config.probe.min_success_ratio - 0.25).abs() < 1e-9);
        assert!((config.probe.smoothing_alpha - 0.3).abs() < 1e-9);

        assert_eq!(config.engine.proxy_port, 7890);
        assert_eq!(config.engine.api_port, 9090);
        assert_eq!(config.engine.selector_group, "PROXY");
        assert_eq!(config.engine.max_restarts, 5);

        assert_eq!(config.selection.default_strategy, "health_weighted");
    }

    #[test]
    fn test_config_from_env_overrides() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("POOL_PROBE_BASE_INTERVAL", "120");
        env::set_var("POOL_PROBE_TEST_URLS", "http://a.example/ok , http://b.example/ok");
        env::set_var("POOL_ENGINE_PROXY_PORT", "17890");
        env::set_var("POOL_ENGINE_BINARY", "/opt/engine/mihomo");
        env::set_var("POOL_SELECTION_STRATEGY", "round_robin");

        let config = Config::from_env().unwrap();

        assert_eq!(config.probe.base_interval, 120);
        assert_eq!(
            config.probe.test_urls,
            vec![
                "http://a.example/ok".to_string(),
                "http://b.example/ok".to_string()
            ]
        );
        assert_eq!(config.engine.proxy_port, 17890);
        assert_eq!(config.engine.binary, PathBuf::from("/opt/engine/mihomo"));
        assert_eq!(config.selection.default_strategy, "round_robin");
    }

    #[test]
    fn test_config_from_env_invalid_port() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("POOL_ENGINE_API_PORT", "not-a-port");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_from_env_rejects_bad_ratio() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("POOL_PROBE_MIN_SUCCESS_RATIO", "1.5");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_from_env_rejects_inverted_interval_bounds() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        env::set_var("POOL_PROBE_MIN_INTERVAL", "600");
        env::set_var("POOL_PROBE_MAX_INTERVAL", "60");
        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig(_)));
    }

    #[test]
    fn test_engine_settings_formatters() {
        let _lock = ENV_LOCK.lock().unwrap();
        let _guard = EnvGuard::new(CONFIG_ENV_KEYS);

        let config = Config::from_env().unwrap();
        assert_eq!(config.engine.proxy_url(), "http://127.0.0.1:7890");
        assert_eq!(config.engine.api_base(), "http://127.0.0.1:9090");
    }
}
