use thiserror::Error;

/// Unified error type for the proxypool crate
///
/// Probe failures are deliberately absent: a failed probe is recorded as a
/// `ProbeResult` with `success = false` and never crosses the prober boundary
/// as an error. Likewise, "no healthy proxy" is expressed as `None` from
/// selection, not as an error variant.
#[derive(Error, Debug)]
pub enum PoolError {
    // Engine process errors
    #[error("Engine startup failed: {0}")]
    EngineStartup(String),

    #[error("Engine crashed and could not be restarted after {attempts} attempts")]
    EngineCrash { attempts: u32 },

    #[error("Engine control request failed: {0}")]
    Control(String),

    // Collaborator errors
    #[error("Configuration render failed: {0}")]
    ConfigRender(String),

    #[error("Node source failed: {0}")]
    NodeSource(String),

    // Lifecycle errors
    #[error("Proxy pool is not running")]
    NotRunning,

    #[error("Unknown proxy node: {0}")]
    NodeUnknown(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // HTTP errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for proxypool operations
pub type Result<T> = std::result::Result<T, PoolError>;

impl PoolError {
    /// Whether this error means the engine cannot serve traffic at all
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PoolError::EngineStartup(_)
                | PoolError::EngineCrash { .. }
                | PoolError::ConfigRender(_)
        )
    }
}

// Convert from URL parse errors
impl From<url::ParseError> for PoolError {
    fn from(err: url::ParseError) -> Self {
        PoolError::InvalidConfig(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(PoolError::EngineStartup("binary missing".to_string()).is_fatal());
        assert!(PoolError::EngineCrash { attempts: 5 }.is_fatal());
        assert!(PoolError::ConfigRender("bad template".to_string()).is_fatal());

        assert!(!PoolError::NotRunning.is_fatal());
        assert!(!PoolError::NodeUnknown("a".to_string()).is_fatal());
        assert!(!PoolError::InvalidConfig("x".to_string()).is_fatal());
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            PoolError::EngineCrash { attempts: 3 }.to_string(),
            "Engine crashed and could not be restarted after 3 attempts"
        );
        assert_eq!(
            PoolError::NodeUnknown("jp-01".to_string()).to_string(),
            "Unknown proxy node: jp-01"
        );
    }
}
